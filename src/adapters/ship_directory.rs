use std::{collections::HashMap, sync::Arc};

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::{
    config::models::ServerConfig,
    ports::ship_directory::{
        CrewAccount, DirectoryError, DirectoryResult, RouterEndpoint, ShipDirectory,
    },
};

#[derive(Debug)]
struct ShipEntry {
    endpoint: RouterEndpoint,
    crew: Vec<CrewAccount>,
}

/// Ship directory backed by the `ships` section of the configuration.
///
/// Reloads swap the whole snapshot; a lookup that already resolved keeps the
/// endpoint it got.
pub struct ConfigShipDirectory {
    ships: ArcSwap<HashMap<String, ShipEntry>>,
}

impl ConfigShipDirectory {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            ships: ArcSwap::from_pointee(Self::snapshot(config)),
        }
    }

    /// Replace the registry with the ships of `config`
    pub fn reload(&self, config: &ServerConfig) {
        let snapshot = Self::snapshot(config);
        tracing::info!(ships = snapshot.len(), "ship directory reloaded");
        self.ships.store(Arc::new(snapshot));
    }

    pub fn len(&self) -> usize {
        self.ships.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(config: &ServerConfig) -> HashMap<String, ShipEntry> {
        config
            .ships
            .iter()
            .map(|ship| {
                (
                    ship.id.clone(),
                    ShipEntry {
                        endpoint: ship.endpoint(),
                        crew: ship.crew_accounts(),
                    },
                )
            })
            .collect()
    }

    fn with_entry<T>(
        &self,
        ship_id: &str,
        read: impl FnOnce(&ShipEntry) -> Option<T>,
    ) -> DirectoryResult<T> {
        self.ships
            .load()
            .get(ship_id)
            .and_then(read)
            .ok_or_else(|| DirectoryError::NotFound(ship_id.to_string()))
    }
}

#[async_trait]
impl ShipDirectory for ConfigShipDirectory {
    async fn resolve(&self, ship_id: &str) -> DirectoryResult<RouterEndpoint> {
        self.with_entry(ship_id, |entry| Some(entry.endpoint.clone()))
    }

    async fn crew(&self, ship_id: &str) -> DirectoryResult<Vec<CrewAccount>> {
        self.with_entry(ship_id, |entry| Some(entry.crew.clone()))
    }
}
