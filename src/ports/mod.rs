pub mod config_provider;
pub mod file_transport;
pub mod mgmt_transport;
pub mod record_store;
pub mod ship_directory;

pub use file_transport::{FileTransport, FileTransportError, FileTransportResult};
pub use mgmt_transport::{MgmtConnector, MgmtSession, TransportError, TransportResult};
pub use record_store::{RecordStore, RecordStoreError, RecordStoreResult};
pub use ship_directory::{CrewAccount, DirectoryError, DirectoryResult, RouterEndpoint, ShipDirectory};
