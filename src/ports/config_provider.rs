use async_trait::async_trait;
use eyre::Result;
use tokio::sync::mpsc;

use crate::config::models::ServerConfig;

/// Source of the portal configuration, including the ship registry that backs
/// the in-process ship directory.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Load and deserialize the current configuration.
    async fn load_config(&self) -> Result<ServerConfig>;

    /// Validated configurations, one per settled change of the source. The
    /// receiver can be taken once; later calls return `None`.
    fn watch(&self) -> Option<mpsc::Receiver<ServerConfig>>;
}
