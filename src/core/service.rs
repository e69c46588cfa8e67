use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::dispatch::{DispatchGroup, Dispatcher};
use crate::core::hooks::HookSet;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::poller::ChangePoller;
use crate::core::process::ProcessStore;
use crate::core::state::{PollState, StateStore};

/// How long shutdown lets queued and running deliveries finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
/// How long cancelled deliveries get to unwind.
const ABANDON_TIMEOUT: Duration = Duration::from_secs(1);

/// Owns the poll loop and its dispatch group for the lifetime of `run`.
pub struct WatchService {
    poller: Arc<ChangePoller>,
    dispatch: Arc<DispatchGroup>,
    state_store: StateStore,
    interval: Duration,
    drain_timeout: Duration,
    poll_cancel: CancellationToken,
    dispatch_cancel: CancellationToken,
    poll_loop: Option<JoinHandle<()>>,
}

impl WatchService {
    pub fn new(
        store: Arc<dyn ProcessStore>,
        hooks: Arc<HookSet>,
        dispatcher: Arc<dyn Dispatcher>,
        state_store: StateStore,
        interval: Duration,
        max_in_flight: usize,
    ) -> Self {
        let dispatch_cancel = CancellationToken::new();
        let dispatch = Arc::new(DispatchGroup::new(
            dispatcher,
            max_in_flight,
            dispatch_cancel.clone(),
        ));
        let poller = Arc::new(ChangePoller::new(
            store,
            hooks,
            dispatch.clone(),
            PollState::default(),
        ));
        Self {
            poller,
            dispatch,
            state_store,
            interval,
            drain_timeout: DRAIN_TIMEOUT,
            poll_cancel: CancellationToken::new(),
            dispatch_cancel,
            poll_loop: None,
        }
    }
}

#[async_trait]
impl LifecycleComponent for WatchService {
    async fn on_init(&mut self) -> Result<()> {
        if !self.state_store.exists() {
            info!(
                "No state at {}, starting from the newest process",
                self.state_store.path().display()
            );
            self.poller.prime_cursor().await?;
            return Ok(());
        }

        let loaded = self.state_store.load().context("Failed to load poll state")?;
        info!(
            "Resuming from process id {} with {} in-flight process(es)",
            loaded.last_poll_process_id,
            loaded.executing_processes.len()
        );
        *self.poller.state().lock().await = loaded;
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        info!("Polling every {:?}", self.interval);
        let poller = self.poller.clone();
        self.poll_loop = Some(tokio::spawn(
            poller.run(self.interval, self.poll_cancel.clone()),
        ));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        self.poll_cancel.cancel();

        if let Some(handle) = self.poll_loop.take() {
            if let Err(e) = handle.await {
                warn!("Poll loop ended abnormally: {}", e);
            }
        }

        // the last cycle's matches are already queued; give them the drain window
        if !self.dispatch.drain(self.drain_timeout).await {
            warn!(
                "Abandoning {} webhook(s) still running after {:?}",
                self.dispatch.in_flight(),
                self.drain_timeout
            );
            self.dispatch_cancel.cancel();
            self.dispatch.drain(ABANDON_TIMEOUT).await;
        }

        let state = self.poller.state().lock().await.clone();
        if let Err(e) = self.state_store.save(&state) {
            error!("Failed to save poll state: {}", e);
            return Err(e.into());
        }
        info!(
            "Saved poll state to {} (cursor: {}, in flight: {})",
            self.state_store.path().display(),
            state.last_poll_process_id,
            state.executing_processes.len()
        );
        Ok(())
    }
}
