pub mod api_error;
pub mod auth;
pub mod config_providers;
pub mod http_handler;
pub mod middleware;
pub mod mgmt_client;
pub mod record_store;
pub mod sftp;
pub mod ship_directory;

/// Re-export commonly used types from adapters
pub use api_error::ApiError;
pub use auth::{Claims, TokenAuthority};
pub use config_providers::FileConfigProvider;
pub use http_handler::{AppState, HttpHandler};
pub use middleware::*;
pub use mgmt_client::TcpMgmtConnector;
pub use record_store::InMemoryRecordStore;
pub use sftp::SftpFileTransport;
pub use ship_directory::ConfigShipDirectory;
