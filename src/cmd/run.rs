//! `fanfetch run`: start the fetch server.
//!
//! Loads configuration from a file (explicit, auto-detected, or built-in
//! defaults), applies CLI overrides, starts the cache sweeper and the Axum
//! HTTP server, and on shutdown cancels in-flight calls and stops the
//! sweeper.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use crate::cli::RunArgs;
use crate::config::model::Config;
use crate::config::sources::FileSource;
use crate::config::validation::{retry_budget_warning, validate};
use crate::config::{ConfigSource, ConfigVersion};
use crate::error::FanfetchError;
use crate::logging;
use crate::server::{self, AppState, LoadedConfig};

pub async fn execute(args: RunArgs) -> Result<(), FanfetchError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let loaded = load_config(&args).await?;
    let state = Arc::new(AppState::from_config(loaded));
    let config = state.config();

    let sweeper = state.orchestrator.cache().spawn_sweeper();
    let router = server::build_router(Arc::clone(&state), args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        config_source = %state.loaded.source_name,
        config_version = %state.loaded.version,
        max_targets = config.fetch.max_targets,
        deadline_ms = config.fetch.deadline_ms,
        cache_ttl_ms = config.cache.ttl_ms,
        "fanfetch started"
    );

    let shutdown = state.shutdown.clone();
    let graceful_shutdown = async move {
        server::shutdown_signal().await;
        shutdown.cancel();
    };

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful_shutdown)
    .await?;

    sweeper.stop().await;
    tracing::info!("fanfetch stopped");
    Ok(())
}

async fn load_config(args: &RunArgs) -> Result<LoadedConfig, FanfetchError> {
    let source = match args.config.as_deref() {
        Some(path) => Some(FileSource::new(path.to_path_buf())?),
        None => FileSource::detect(Path::new(".")).await?,
    };

    let mut loaded = match source {
        Some(source) => {
            let (config, version) = source.load().await?;
            LoadedConfig {
                config: Arc::new(config),
                version,
                source_name: source.path().display().to_string(),
                loaded_at: std::time::Instant::now(),
            }
        }
        None => {
            tracing::info!("no config file found, using built-in defaults");
            LoadedConfig::builtin()
        }
    };

    let overridden = args.deadline_ms.is_some() || args.max_targets.is_some();
    if overridden {
        let config = apply_overrides((*loaded.config).clone(), args)?;
        loaded.config = Arc::new(config);
    }
    // A file source already warned about its own values.
    if overridden || loaded.version == ConfigVersion::Builtin {
        if let Some(warning) = retry_budget_warning(&loaded.config) {
            tracing::warn!(source = %loaded.source_name, "{warning}");
        }
    }

    Ok(loaded)
}

/// Apply CLI/env overrides and re-validate, since an override can break an
/// invariant the file satisfied (e.g. a deadline below the attempt timeout).
fn apply_overrides(mut config: Config, args: &RunArgs) -> Result<Config, FanfetchError> {
    if let Some(deadline_ms) = args.deadline_ms {
        config.fetch.deadline_ms = deadline_ms;
    }
    if let Some(max_targets) = args.max_targets {
        config.fetch.max_targets = max_targets;
    }
    validate(&config).map_err(|errors| FanfetchError::ConfigValidation { errors })?;
    Ok(config)
}
