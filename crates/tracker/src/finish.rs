//! Job completion handles.

use fmr_common::{FmrError, JobId};
use std::sync::Arc;
use tokio::sync::watch;

/// Terminal result of a job: its id on success, the propagated failure
/// otherwise.
pub type JobOutcome = Result<JobId, FmrError>;

/// Clonable, multi-waiter handle resolving once with the job's outcome.
///
/// Handed out by `submit`/`status`; completed by the lifecycle controller
/// when the job's metadata reaches its terminal phase, or by shutdown.
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    tx: Arc<watch::Sender<Option<JobOutcome>>>,
}

impl CompletionHandle {
    /// Unresolved handle.
    pub(crate) fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(None)),
        }
    }

    /// Handle that is already resolved.
    pub(crate) fn finished(outcome: JobOutcome) -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(Some(outcome))),
        }
    }

    /// Resolve the handle; only the first call takes effect. Returns
    /// whether this call resolved it.
    pub(crate) fn complete(&self, outcome: JobOutcome) -> bool {
        let mut outcome = Some(outcome);
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = outcome.take();
                true
            } else {
                false
            }
        })
    }

    /// Outcome if already resolved.
    pub fn try_outcome(&self) -> Option<JobOutcome> {
        self.tx.borrow().clone()
    }

    /// Wait for the outcome.
    pub async fn wait(&self) -> JobOutcome {
        let mut rx = self.tx.subscribe();
        let resolved = rx
            .wait_for(|slot| slot.is_some())
            .await
            .expect("sender kept alive by this handle");
        resolved.clone().expect("checked by wait_for")
    }
}
