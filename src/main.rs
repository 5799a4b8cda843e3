use std::{net::SocketAddr, path::Path, sync::Arc};

use arc_swap::ArcSwap;
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use fleetlink::{
    adapters::{
        AppState, ConfigShipDirectory, FileConfigProvider, HttpHandler, InMemoryRecordStore,
        SftpFileTransport, TcpMgmtConnector, TokenAuthority, auth::ADMIN_ROLE,
    },
    config::{ServerConfig, ServerConfigValidator, loader::load_config},
    core::RouterControl,
    metrics,
    ports::config_provider::ConfigProvider,
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "fleetlink.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "fleetlink.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "fleetlink.toml")]
        config: String,
    },
    /// Start the portal API server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "fleetlink.toml")]
        config: String,
    },
    /// Mint a bearer token signed with the configured secret
    Token {
        #[clap(short, long, default_value = "fleetlink.toml")]
        config: String,
        #[clap(short, long)]
        username: String,
        #[clap(short, long, default_value = ADMIN_ROLE)]
        role: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Token {
            config,
            username,
            role,
        }) => token_command(&config, &username, &role).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    // Kept alive for the server's lifetime; dropping it stops the file watch
    let config_provider =
        FileConfigProvider::new(config_path).context("Failed to create config provider")?;
    let initial_config: ServerConfig = config_provider
        .load_config()
        .await
        .with_context(|| format!("Failed to load initial config from {config_path}"))?;

    tracing_setup::init_from_config(&initial_config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;
    metrics::init_metrics().map_err(|e| eyre!("Failed to initialize metrics: {}", e))?;

    ServerConfigValidator::validate(&initial_config)
        .map_err(|e| eyre!("Invalid configuration in {config_path}: {e}"))?;
    if initial_config.auth.jwt_secret == "CHANGE_ME_SECRET" {
        tracing::warn!("auth.jwt_secret is the default value; set FLEETLINK__AUTH__JWT_SECRET");
    }

    let addr: SocketAddr = initial_config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let settings = initial_config
        .router
        .control_settings()
        .context("Invalid router settings")?;

    let directory = Arc::new(ConfigShipDirectory::from_config(&initial_config));
    let control = Arc::new(RouterControl::new(
        directory.clone(),
        Arc::new(TcpMgmtConnector::new(initial_config.router.login)),
        Arc::new(SftpFileTransport::new()),
        settings,
    ));
    let config_holder = Arc::new(ArcSwap::from_pointee(initial_config));

    spawn_config_watcher(&config_provider, config_holder.clone(), directory.clone());

    let state = Arc::new(AppState {
        control,
        records: Arc::new(InMemoryRecordStore::new()),
        config: config_holder.clone(),
    });
    let app = HttpHandler::new(state)
        .context("Failed to build HTTP handler")?
        .router();

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        signal_handler_shutdown.run_signal_handler().await;
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    {
        let config = config_holder.load();
        tracing::info!(
            listen_addr = %addr,
            ships = directory.len(),
            default_ship = ?config.portal.default_ship_id,
            "fleetlink portal API starting"
        );
        println!(
            "fleetlink listening on {} ({} ships configured)",
            addr,
            directory.len()
        );
    }

    let shutdown = graceful_shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = shutdown.wait_for_shutdown_signal().await;
            tracing::info!(?reason, "shutting down HTTP server");
        })
        .await
        .context("Server error")?;

    tracing::info!("graceful shutdown completed");
    Ok(())
}

/// Apply validated config reloads. Settings read at startup (listen
/// address, token secret, CORS, router timeouts) need a restart.
fn spawn_config_watcher(
    provider: &FileConfigProvider,
    config_holder: Arc<ArcSwap<ServerConfig>>,
    directory: Arc<ConfigShipDirectory>,
) {
    let Some(mut reloads) = provider.watch() else {
        tracing::warn!("config change notifications unavailable; live reload disabled");
        return;
    };

    let path = provider.path().display().to_string();
    tokio::spawn(async move {
        tracing::info!(%path, "config watcher task started");
        while let Some(new_config) = reloads.recv().await {
            directory.reload(&new_config);
            config_holder.store(Arc::new(new_config));
            tracing::info!("configuration reloaded");
        }
        tracing::info!("config watcher task is shutting down");
    });
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            let unconfigured = config
                .ships
                .iter()
                .filter(|s| s.router_ip.trim().is_empty())
                .count();
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Ships: {} ({} without router address)", config.ships.len(), unconfigured);
            println!(
                "   • Default Ship: {}",
                config.portal.default_ship_id.as_deref().unwrap_or("none")
            );
            println!("   • Router Login: {:?}", config.router.login);
            println!("   • CORS Origins: {}", config.cors.allowed_origins.join(", "));
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8080')");
            println!("   • Use humantime durations such as '3s' or '24h'");
            println!("   • Give every ship with a router_ip a router_user");
            println!("   • Make portal.default_ship_id name a configured ship");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# fleetlink configuration

# The address the portal API listens on
listen_addr = "127.0.0.1:8080"

[auth]
# Override with FLEETLINK__AUTH__JWT_SECRET
jwt_secret = "CHANGE_ME_SECRET"
token_ttl = "24h"

[cors]
allowed_origins = ["http://localhost:5173"]
max_age = "12h"

[router]
mgmt_dial_timeout = "3s"
health_dial_timeout = "2s"
ssh_dial_timeout = "5s"
monitor_interface = "ether1"
# "challenge" (MD5 challenge/response) or "plain"
login = "challenge"
degraded_bucket = "10s"

[portal]
# Ship used by /api/online-users and by provisioning requests without ship_id
default_ship_id = "IMO9562623"

[logging]
level = "info"
format = "json"

[[ships]]
id = "IMO9562623"
name = "Ocean Star"
router_ip = "192.168.88.1"
router_port = 8728
ssh_port = 22
router_user = "admin"
router_pass = ""

[[ships.crew]]
username = "crew01"
password = "change-me"
data_plan = "DataPlan"
status = "Active"

# A ship whose router is not set up yet is served in degraded mode
# [[ships]]
# id = "IMO9700001"
# name = "Sea Breeze"
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'fleetlink serve --config {config_path}' to start the server");
    Ok(())
}

/// Print a bearer token for `username`
async fn token_command(config_path: &str, username: &str, role: &str) -> Result<()> {
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    let ttl = config.auth.token_ttl()?;
    let token = TokenAuthority::new(&config.auth.jwt_secret)
        .issue(username, role, ttl)
        .map_err(|e| eyre!("{e}"))?;
    println!("{token}");
    Ok(())
}
