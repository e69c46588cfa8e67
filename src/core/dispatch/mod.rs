mod http;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::core::hooks::Hook;
use crate::core::hooks::template::TemplateError;
use crate::core::process::ProcessRecord;

pub use http::HttpDispatcher;

pub const DEFAULT_MAX_IN_FLIGHT: usize = 32;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("bad response ({0})")]
    BadStatus(u16),
    #[error("request body could not be rendered: {0}")]
    Template(#[from] TemplateError),
    #[error("unsupported method '{0}'")]
    Method(String),
}

/// Delivers one webhook for one process. Failures are reported, never retried.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn fire(&self, process: &ProcessRecord, hook: &Hook) -> Result<(), DispatchError>;
}

/// Fire-and-forget delivery tasks sharing one cancellation token.
///
/// At most `max_in_flight` deliveries run at once; the rest wait for a
/// permit. Cancelling the token abandons queued and running deliveries.
pub struct DispatchGroup {
    dispatcher: Arc<dyn Dispatcher>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl DispatchGroup {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        max_in_flight: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            cancel,
        }
    }

    pub fn submit(&self, process: Arc<ProcessRecord>, hook: Hook) {
        let dispatcher = self.dispatcher.clone();
        let permits = self.permits.clone();
        let cancel = self.cancel.clone();
        let dispatch_id = uuid::Uuid::new_v4();

        debug!(
            "Queued webhook '{}' for process {} ({})",
            hook.description, process.id, dispatch_id
        );

        self.tracker.spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(
                        "Abandoned queued webhook (hook: '{}', url: '{}', process id: '{}')",
                        hook.description, hook.url, process.id
                    );
                    return;
                }
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(
                        "Cancelled in-progress webhook (hook: '{}', url: '{}', process id: '{}')",
                        hook.description, hook.url, process.id
                    );
                }
                result = dispatcher.fire(&process, &hook) => match result {
                    Ok(()) => info!(
                        "Fired webhook '{}' for process {} ({})",
                        hook.description, process.id, dispatch_id
                    ),
                    Err(e) => warn!(
                        "Failed to fire webhook (hook: '{}', url: '{}', process id: '{}'): {}",
                        hook.description, hook.url, process.id, e
                    ),
                },
            }
        });
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits up to `timeout` for every submitted delivery to finish.
    /// Returns false if some were still running when time ran out.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok()
    }
}

/// Records every fire instead of sending anything.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingDispatcher {
    fired: std::sync::Mutex<Vec<(i64, String)>>,
}

#[cfg(test)]
impl RecordingDispatcher {
    pub(crate) fn fired(&self) -> Vec<(i64, String)> {
        self.fired.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn fire(&self, process: &ProcessRecord, hook: &Hook) -> Result<(), DispatchError> {
        self.fired
            .lock()
            .unwrap()
            .push((process.id, hook.description.clone()));
        Ok(())
    }
}
