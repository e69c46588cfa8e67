use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::VERSION;
use crate::core::config::Settings;
use crate::core::dispatch::HttpDispatcher;
use crate::core::hooks::HookSet;
use crate::core::lifecycle::LifecycleManager;
use crate::core::process::{ProcessStore, SqliteProcessStore};
use crate::core::service::WatchService;
use crate::core::state::StateStore;
use crate::core::terminal;
use crate::logging;

pub async fn run_watch(args: &[String], start: usize) -> Result<()> {
    let (mut settings, mut warnings) = Settings::from_env();
    warnings.extend(settings.apply_flags(args, start));

    logging::init(settings.log_level, settings.log_file.as_deref())?;
    terminal::print_banner();
    for w in &warnings {
        warn!("{}", w);
    }
    info!("Starting dozer {}", VERSION);

    let mut hooks = HookSet::load(&settings.webhooks).await?;
    hooks.validate().context("Webhook configuration is invalid")?;
    if hooks.is_empty() {
        warn!("No webhooks configured, processes will be tracked but nothing will fire");
    }

    let store = SqliteProcessStore::open(&settings.database)?;
    store.ping().await?;
    let process_types = store
        .process_types()
        .await
        .context("Failed to load process types")?;
    if process_types.is_empty() {
        warn!("process_type table is empty, processType triggers will never match");
    } else {
        info!("Loaded {} process type(s)", process_types.len());
    }
    hooks.resolve_process_type_codes(&process_types);

    let dispatcher = HttpDispatcher::new(settings.webhook_timeout)
        .context("Failed to build the HTTP client")?;

    let service = WatchService::new(
        Arc::new(store),
        Arc::new(hooks),
        Arc::new(dispatcher),
        StateStore::new(&settings.state),
        settings.poll_interval,
        settings.dispatch_concurrency,
    );

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(service)));
    lifecycle.start().await?;
    debug!("Lifecycle state: {:?}", lifecycle.state());

    shutdown_signal().await;
    lifecycle.shutdown().await?;
    terminal::print_goodbye();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => {
                warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, shutting down");
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
