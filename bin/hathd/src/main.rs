//! Hath Daemon - Edge cache node for the coordinated peer-to-peer
//! distribution network.
//!
//! Startup order matters: the clock is synced and settings fetched before
//! any signed call depends on them, TLS material is installed before the
//! listener binds, and readiness is announced only once the listener is
//! accepting (the coordinator probes inbound connectivity immediately).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use hath_core::ClientIdentity;
use hath_gateway::{router, serve, Gateway};
use hath_rpc::RpcClient;
use hath_store::BlobStore;

/// Hath edge cache node.
#[derive(Parser)]
#[command(name = "hathd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv), raising the configured log level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path (defaults to ~/.hath/config.toml)
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Config {
    /// Identity sent to the coordinator
    client_id: String,
    /// MAC secret and PKCS#12 password
    client_key: String,
    /// On-disk path for the blob store
    db_file: PathBuf,
    /// Verbose HTTP request logging
    debug: bool,
    /// Minimum log severity
    log_level: String,
    /// Write successful peer fetches back to the store
    cache_writeback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_key: String::new(),
            db_file: PathBuf::from(".hath/db"),
            debug: false,
            log_level: "warn".to_string(),
            cache_writeback: true,
        }
    }
}

/// Resolves the config path, preferring the CLI flag.
fn config_path(cli: &Cli) -> PathBuf {
    if let Some(path) = &cli.config {
        return path.clone();
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hath")
        .join("config.toml")
}

/// Loads configuration from the TOML file, then applies environment
/// overrides: keys uppercased with `.` and `-` replaced by `_`.
fn load_config(path: &PathBuf) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {path:?}"))?;
        toml::from_str(&content).with_context(|| format!("parse config file {path:?}"))?
    } else {
        info!("no config file at {:?}, using defaults", path);
        Config::default()
    };

    if let Ok(v) = std::env::var("CLIENT_ID") {
        config.client_id = v;
    }
    if let Ok(v) = std::env::var("CLIENT_KEY") {
        config.client_key = v;
    }
    if let Ok(v) = std::env::var("DB_FILE") {
        config.db_file = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("DEBUG") {
        config.debug = matches!(v.as_str(), "1" | "true" | "yes");
    }
    if let Ok(v) = std::env::var("LOG_LEVEL") {
        config.log_level = v;
    }
    if let Ok(v) = std::env::var("CACHE_WRITEBACK") {
        config.cache_writeback = !matches!(v.as_str(), "0" | "false" | "no");
    }

    Ok(config)
}

fn init_logging(config: &Config, verbose: u8) -> Result<()> {
    let level: Level = config
        .log_level
        .parse()
        .with_context(|| format!("invalid log_level {:?}", config.log_level))?;
    let level = raise_level(level, verbose);

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("set up logging")?;
    Ok(())
}

/// Raises a log level by one severity step per `-v`.
fn raise_level(level: Level, steps: u8) -> Level {
    let mut level = level;
    for _ in 0..steps {
        level = match level {
            Level::ERROR => Level::WARN,
            Level::WARN => Level::INFO,
            Level::INFO => Level::DEBUG,
            _ => Level::TRACE,
        };
    }
    level
}

/// Waits for SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                warn!(%err, "cannot listen for SIGTERM, falling back to ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&config_path(&cli))?;
    init_logging(&config, cli.verbose)?;

    let identity = ClientIdentity::new(config.client_id.clone(), config.client_key.clone())
        .context("invalid client identity")?;
    let client = Arc::new(RpcClient::new(identity).context("build coordinator client")?);

    info!("syncing coordinator clock");
    client.sync_time_delta().await.context("sync server time")?;
    info!("fetching remote settings");
    client.fetch_settings(false).await.context("log in to coordinator")?;

    info!("fetching workload certificate");
    client
        .refresh_certificate()
        .await
        .context("install workload certificate")?;

    let store = Arc::new(BlobStore::open(&config.db_file).context("open blob store")?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let gateway = Arc::new(
        Gateway::new(
            Arc::clone(&client),
            store,
            config.cache_writeback,
            shutdown_rx.clone(),
        )
        .context("build gateway")?,
    );

    let mut app = router(gateway);
    if config.debug {
        info!("HTTP request logging enabled");
        app = app.layer(TraceLayer::new_for_http());
    }

    let port = client.settings().server_port;
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("bind listener on port {port}"))?;
    let server = tokio::spawn(serve(listener, app, client.cert_store(), shutdown_rx));

    // The socket is accepting; the coordinator may probe the moment we
    // announce.
    client.notify_start().await.context("announce readiness")?;
    info!(port, "node is online");

    shutdown_signal().await;
    info!("shutting down");

    // Tell the coordinator first so it stops routing requests here, then
    // stop accepting and drain.
    if let Err(err) = client.notify_stop().await {
        warn!(%err, "shutdown notification failed");
    }
    let _ = shutdown_tx.send(true);

    server.await.context("join listener")?.context("listener error")?;
    info!("clean exit");
    Ok(())
}
