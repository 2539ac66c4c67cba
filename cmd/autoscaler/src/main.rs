use clap::{Parser, ValueEnum};
use pkg_api::AppState;
use pkg_api::server::{ServerConfig, start_server};
use pkg_constants::autoscaler::REQUEUE_SECS;
use pkg_constants::network::{
    DEFAULT_API_PORT, DEFAULT_WEBHOOK_HOST, DEFAULT_WEBHOOK_PORT, WEBHOOK_PATH,
};
use pkg_constants::paths::{DEFAULT_CONFIG, DEFAULT_DATA_DIR};
use pkg_controllers::dependents::BuildContext;
use pkg_controllers::{Reconciler, ScalingPolicy, ScalingTargetController};
use pkg_metrics::MetricsRegistry;
use pkg_state::ResourceStore;
use pkg_state::client::StateStore;
use pkg_state::memory::MemoryStore;
use pkg_types::config::{ControllerConfigFile, load_config_file};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "autoscaler",
    about = "Alert-driven autoscaler: reconciles ScalingTargets and scales workloads on alerts"
)]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_CONFIG)]
    config: String,

    /// Directory for SlateDB state storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Port the alert webhook listens on
    #[arg(long)]
    webhook_port: Option<u16>,

    /// Port for health, metrics and the management API
    #[arg(long)]
    api_port: Option<u16>,

    /// Webhook URL written into generated Alertmanager configs
    #[arg(long)]
    webhook_url: Option<String>,

    /// Max concurrent reconciliation passes
    #[arg(long)]
    workers: Option<usize>,

    /// Keep state in memory only (nothing survives a restart)
    #[arg(long)]
    ephemeral: bool,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    // Load config file (returns defaults if file not found)
    let file_cfg: ControllerConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);

    // Merge: CLI args > config file > defaults
    let data_dir = cli
        .data_dir
        .or(file_cfg.data_dir)
        .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
    let webhook_port = cli
        .webhook_port
        .or(file_cfg.webhook_port)
        .unwrap_or(DEFAULT_WEBHOOK_PORT);
    let api_port = cli.api_port.or(file_cfg.api_port).unwrap_or(DEFAULT_API_PORT);
    let webhook_url = cli.webhook_url.or(file_cfg.webhook_url).unwrap_or_else(|| {
        format!(
            "http://{}:{}{}",
            DEFAULT_WEBHOOK_HOST, webhook_port, WEBHOOK_PATH
        )
    });
    let workers = cli.workers.or(file_cfg.workers).unwrap_or(4);
    let requeue = Duration::from_secs(file_cfg.requeue_seconds.unwrap_or(REQUEUE_SECS));
    let policy = file_cfg
        .scaling_policy
        .as_ref()
        .map(ScalingPolicy::from_config)
        .unwrap_or_default();

    if webhook_port == api_port {
        anyhow::bail!("webhook and API ports must differ (both {})", api_port);
    }

    info!("Starting autoscaler");
    info!("  Webhook port: {}", webhook_port);
    info!("  API port:     {}", api_port);
    info!("  Webhook URL:  {}", webhook_url);
    info!("  Workers:      {}", workers);
    info!("  Requeue:      {}s", requeue.as_secs());

    let persistent = if cli.ephemeral {
        info!("  State:        in-memory");
        None
    } else {
        info!("  Data dir:     {}", data_dir);
        Some(StateStore::new(&data_dir).await?)
    };
    let store: Arc<dyn ResourceStore> = match &persistent {
        Some(state_store) => Arc::new(state_store.clone()),
        None => Arc::new(MemoryStore::new()),
    };
    let metrics = Arc::new(MetricsRegistry::for_autoscaler());

    let reconciler = Reconciler::new(store.clone(), metrics.clone())
        .with_context(BuildContext { webhook_url })
        .with_requeue(requeue);
    ScalingTargetController::new(store.clone(), reconciler, metrics.clone())
        .with_workers(workers)
        .start();

    let state = AppState {
        store,
        policy: Arc::new(policy),
        metrics,
    };
    let config = ServerConfig {
        webhook_addr: SocketAddr::from(([0, 0, 0, 0], webhook_port)),
        api_addr: SocketAddr::from(([0, 0, 0, 0], api_port)),
    };

    tokio::select! {
        result = start_server(config, state) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    if let Some(state_store) = persistent {
        state_store.close().await?;
    }
    Ok(())
}
