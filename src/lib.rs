//! Fleetlink - control plane for the onboard routers of a vessel fleet.
//!
//! Fleetlink sits behind the fleet portal and talks to each ship's router on
//! its behalf. For a chosen ship it dials the router's binary management
//! port, logs in, issues structured commands and closes the session again.
//! When the router cannot be reached the operation answers from a
//! synthetic profile instead, so the dashboard never stalls.
//!
//! # Features
//! - Health check (system resource + interface traffic)
//! - Hotspot session listing and kick
//! - Crew account sync owned by a marker comment
//! - Layer-7 firewall reconcile of marker-tagged rules
//! - Configuration script upload (SFTP) and import
//! - Reboot and an operator terminal
//! - Best-effort provisioning of voucher users and bandwidth profiles
//! - Live configuration reload of the ship registry
//! - Structured tracing and `metrics` counters for every router operation
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use fleetlink::{
//!     ConfigShipDirectory, RouterControl, SftpFileTransport, TcpMgmtConnector,
//!     config::ServerConfig,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg: ServerConfig = fleetlink::config::loader::load_config("fleetlink.toml").await?;
//! let control = RouterControl::new(
//!     Arc::new(ConfigShipDirectory::from_config(&cfg)),
//!     Arc::new(TcpMgmtConnector::new(cfg.router.login)),
//!     Arc::new(SftpFileTransport::new()),
//!     cfg.router.control_settings()?,
//! );
//! let health = control.health("IMO9562623").await?;
//! println!("{} connected={}", health.board, health.connected);
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! Ports (traits in [`ports`]) separate the feature operations in [`core`]
//! from the transports, directory and record store in [`adapters`]. Tests
//! swap the adapters for in-memory fakes.
//!
//! # Error Handling
//! Feature operations return [`core::ControlResult`]; only unreachable
//! routers and rejected logins degrade, every other router error surfaces.
//! Startup and configuration code returns `eyre::Result<T>` with context.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{
        ConfigShipDirectory, FileConfigProvider, HttpHandler, InMemoryRecordStore,
        SftpFileTransport, TcpMgmtConnector,
    },
    core::{ControlError, RouterControl},
    utils::GracefulShutdown,
};
