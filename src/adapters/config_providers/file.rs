//! Config file provider with debounced, validated live reload.
//!
//! Editors tend to write a file in several steps, so change events are
//! collapsed until the file has been quiet for the debounce window. Only a
//! configuration that parses and passes validation is handed on; anything
//! else is logged and the running configuration stays in place.
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use eyre::{Context, Result};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::{
    config::{loader::load_config, models::ServerConfig, validation::ServerConfigValidator},
    ports::config_provider::ConfigProvider,
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

pub struct FileConfigProvider {
    path: PathBuf,
    debounce: Duration,
    // Dropping the watcher stops notifications
    _watcher: notify::RecommendedWatcher,
    events: std::sync::Mutex<Option<mpsc::Receiver<()>>>,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (tx, rx) = mpsc::channel(16);
        let watcher = watch_file(&path, tx)?;
        Ok(Self {
            path,
            debounce: DEFAULT_DEBOUNCE,
            _watcher: watcher,
            events: std::sync::Mutex::new(Some(rx)),
        })
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn watch_file(path: &Path, tx: mpsc::Sender<()>) -> Result<notify::RecommendedWatcher> {
    let file_name = path
        .file_name()
        .ok_or_else(|| eyre::eyre!("Invalid config path: {}", path.display()))?
        .to_owned();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(event) => {
            let relevant = event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove();
            if relevant && event.paths.iter().any(|p| p.file_name() == Some(&file_name)) {
                tracing::trace!(kind = ?event.kind, "config file event");
                // Dropped events are fine: the reload task re-reads the file
                let _ = tx.try_send(());
            }
        }
        Err(e) => tracing::error!(error = %e, "config file watch error"),
    })?;

    // Watch the directory so replace-by-rename saves are seen too
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .wrap_err("Failed to watch config directory")?;
    Ok(watcher)
}

/// Load the file and reject configurations the server could not run with
async fn load_validated(path: &Path) -> Result<ServerConfig> {
    let path_str = path
        .to_str()
        .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?;
    let config = load_config(path_str).await?;
    ServerConfigValidator::validate(&config).wrap_err("configuration failed validation")?;
    Ok(config)
}

async fn reload_loop(
    path: PathBuf,
    debounce: Duration,
    mut events: mpsc::Receiver<()>,
    reloads: mpsc::Sender<ServerConfig>,
) {
    while events.recv().await.is_some() {
        // Wait for the writer to finish
        loop {
            match tokio::time::timeout(debounce, events.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        match load_validated(&path).await {
            Ok(config) => {
                tracing::info!(path = %path.display(), ships = config.ships.len(), "configuration change accepted");
                if reloads.send(config).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = format!("{e:#}"), "rejected configuration change; keeping current configuration");
            }
        }
    }
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    async fn load_config(&self) -> Result<ServerConfig> {
        let path_str = self
            .path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", self.path.display()))?;
        load_config(path_str).await
    }

    fn watch(&self) -> Option<mpsc::Receiver<ServerConfig>> {
        let events = match self.events.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }?;
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "no async runtime; config reload disabled");
                return None;
            }
        };

        let (tx, rx) = mpsc::channel(1);
        runtime.spawn(reload_loop(self.path.clone(), self.debounce, events, tx));
        Some(rx)
    }
}
