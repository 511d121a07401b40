use std::{env, sync::Arc, time::Duration};

use cfgsync_core::{EnvFileMaterializer, FsArtifactStore, ReconcileContext, TenantIdentity};
use cfgsync_directory::{ApiDirectory, ApiDirectoryConfig, SnapshotDirectory, SnapshotRefresher};
use cfgsync_server::config::{AppConfig, loader::load_config};
use cfgsync_server::{AppState, ServerBuilder, shutdown_signal};

const DEFAULT_CONFIG_PATH: &str = "cfgsync.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigSource {
    CliArgument,
    EnvironmentVariable,
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (CFGSYNC_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    cfgsync_server::observability::init_tracing();

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );
    cfgsync_server::observability::apply_logging_level(&cfg.logging.level);

    if let Err(e) = run(cfg).await {
        tracing::error!(error = %e, "agent exited with error");
        std::process::exit(1);
    }
}

async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let tenant = TenantIdentity::new(cfg.agent.namespace.clone(), cfg.agent.tenant.clone());

    let mut api_config = ApiDirectoryConfig::default()
        .with_base_url(cfg.control_plane.url.clone())
        .with_request_timeout(Duration::from_millis(cfg.control_plane.timeout_ms));
    api_config.token_file = cfg.control_plane.token_file.clone();
    api_config.ca_file = cfg.control_plane.ca_file.clone();
    api_config.tenant_group = cfg.control_plane.tenant_group.clone();
    api_config.tenant_version = cfg.control_plane.tenant_version.clone();
    let live = Arc::new(ApiDirectory::new(api_config)?);

    let snapshot = Arc::new(SnapshotDirectory::new());
    let mut refresher = SnapshotRefresher::new(
        live.clone(),
        snapshot.clone(),
        tenant.clone(),
        Duration::from_millis(cfg.snapshot.refresh_interval_ms),
    );
    if !cfg.snapshot.enabled {
        // Fill the snapshot once, retrying until the control plane answers.
        refresher = refresher.until_synced();
    }
    let refresher_handle = refresher.spawn();

    let ctx = ReconcileContext::new(
        tenant.clone(),
        snapshot.clone(),
        live,
        Arc::new(FsArtifactStore::new(cfg.agent.config_file.clone())),
        Arc::new(EnvFileMaterializer::new(cfg.materializer.cluster_domain.clone())),
    )
    .with_live_timeout(cfg.live_timeout());

    tracing::info!(
        tenant = %tenant,
        config_file = %cfg.agent.config_file.display(),
        snapshot_polling = cfg.snapshot.enabled,
        "agent bound"
    );

    let state = AppState::new(ctx, cfg.request_timeout()).with_snapshot(snapshot);
    let shutdown = async move {
        shutdown_signal().await;
        refresher_handle.shutdown().await;
        tracing::info!("snapshot refresher stopped, draining requests");
    };
    ServerBuilder::new(state)
        .with_config(cfg)
        .build()
        .run_with_shutdown(shutdown)
        .await
}

/// `--config <path>` wins over `CFGSYNC_CONFIG`, which wins over
/// `cfgsync.toml` in the working directory.
fn resolve_config_path() -> (String, ConfigSource) {
    pick_config_path(env::args().skip(1), env::var("CFGSYNC_CONFIG").ok())
}

fn pick_config_path(
    args: impl IntoIterator<Item = String>,
    from_env: Option<String>,
) -> (String, ConfigSource) {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if let Some(path) = arg.strip_prefix("--config=") {
            return (path.to_string(), ConfigSource::CliArgument);
        }
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    match from_env.filter(|p| !p.is_empty()) {
        Some(path) => (path, ConfigSource::EnvironmentVariable),
        None => (DEFAULT_CONFIG_PATH.to_string(), ConfigSource::Default),
    }
}
