use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use webdoctor::checkers::CheckerRegistry;
use webdoctor::parsers::Dialect;
use webdoctor::server::{
    HealthCheckEngine, PrometheusMetrics, ResultBroadcaster, ResultStore, ServerSettings,
    config_source,
};
use webdoctor::version::VERSION;
use webdoctor::web::{AppState, create_axum_router};

#[derive(Parser, Debug)]
#[command(author, about, long_about = None)]
struct Args {
    /// Path to the TOML settings file
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Health check configuration file (stdin is used when piped)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration dialect: `block` or `attribute`
    #[arg(short, long)]
    dialect: Option<Dialect>,

    /// Print the version and exit
    #[arg(long)]
    version: bool,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "webdoctor.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    if args.version {
        println!("webdoctor version: {VERSION}");
        return Ok(());
    }

    let mut settings = ServerSettings::load(args.settings.as_deref())?;
    if let Some(config) = args.config {
        settings.config_path = config;
    }
    if let Some(dialect) = args.dialect {
        settings.dialect = dialect;
    }

    init_logging(&settings.log_dir);
    info!("Starting webdoctor, version: {}", VERSION);

    let config = config_source::load(&settings.config_path, settings.dialect);

    let store = Arc::new(ResultStore::new());
    let broadcaster = Arc::new(ResultBroadcaster::with_capacity(settings.broadcast_capacity));
    let metrics = Arc::new(PrometheusMetrics::new()?);
    let registry = CheckerRegistry::with_defaults();
    info!(checkers = registry.len(), "Registered protocol checkers");

    let engine = HealthCheckEngine::new(
        config,
        registry,
        store.clone(),
        metrics.clone(),
        broadcaster.clone(),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_handle = tokio::spawn(engine.run(shutdown_rx.clone()));

    let app_state = Arc::new(AppState {
        store,
        broadcaster,
        metrics,
    });
    let app = create_axum_router(app_state);

    let addr: SocketAddr = settings.listen_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    tokio::spawn(shutdown_signal(shutdown_tx));
    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stopped| *stopped).await;
        })
        .await?;

    if let Err(e) = engine_handle.await {
        error!(error = %e, "Health check engine task failed");
    }
    info!("webdoctor stopped");
    Ok(())
}
