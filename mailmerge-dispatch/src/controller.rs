//! Lifecycle of one batch run at a time.
//!
//! The controller is the only writer of [`RunState`]. Every transition goes
//! through a single `watch` channel with a compare-and-update, and progress
//! is broadcast from inside that same update, so a progress event can never
//! be published for a run that has already finished or been cancelled.

use std::sync::Arc;

use mailmerge_common::{Recipient, Template, internal};
use mailmerge_tracing::traced;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    error::ControlError,
    policy::{Pacing, RetryPolicy},
    scheduler::BatchScheduler,
    token::TokenSource,
    transport::Transport,
    types::{BatchEnd, BatchProgress, RunState},
};

/// Progress events buffered per subscriber when none is configured
const DEFAULT_PROGRESS_CAPACITY: usize = 64;

/// The published state, tagged with the run it belongs to so that events
/// from an old run can be told apart from the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Ledger {
    run: u64,
    state: RunState,
}

impl Ledger {
    /// `Running` → `Running` with new counts, clamped to the run's total.
    fn record(&mut self, run: u64, progress: BatchProgress) -> bool {
        if self.run != run {
            return false;
        }

        match &mut self.state {
            RunState::Running {
                total,
                succeeded,
                failed,
            } => {
                *succeeded = progress.succeeded.min(*total);
                *failed = progress.failed.min(*total - *succeeded);
                true
            }
            _ => false,
        }
    }

    /// `Running` → `Finished`, keeping the last reported counts.
    fn finish(&mut self, run: u64) -> bool {
        match self.state {
            RunState::Running {
                succeeded, failed, ..
            } if self.run == run => {
                self.state = RunState::Finished { succeeded, failed };
                true
            }
            _ => false,
        }
    }

    /// `Running` → `Cancelled`, keeping the last reported counts.
    fn cancel(&mut self, run: u64) -> bool {
        match self.state {
            RunState::Running {
                succeeded, failed, ..
            } if self.run == run => {
                self.state = RunState::Cancelled { succeeded, failed };
                true
            }
            _ => false,
        }
    }

    /// `Finished`/`Cancelled` → `Idle`.
    fn clear(&mut self) -> Result<bool, ControlError> {
        match self.state {
            RunState::Running { .. } => Err(ControlError::RunInProgress),
            RunState::Idle => Ok(false),
            RunState::Finished { .. } | RunState::Cancelled { .. } => {
                self.state = RunState::Idle;
                Ok(true)
            }
        }
    }
}

/// Cancel run `run`: move the ledger to `Cancelled` first, then stop the
/// scheduler, so no progress can slip in between.
fn cancel_run(ledger: &watch::Sender<Ledger>, run: u64, token: &CancellationToken) {
    if ledger.send_if_modified(|ledger| ledger.cancel(run)) {
        internal!(level = INFO, run, "Batch run cancelled");
    }

    token.cancel();
}

/// Lets the holder cancel one specific run.
///
/// The handle stays valid to call after the run ends; cancelling a run that
/// is no longer `Running` does nothing.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    run: u64,
    token: CancellationToken,
    ledger: Arc<watch::Sender<Ledger>>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        cancel_run(&self.ledger, self.run, &self.token);
    }

    /// Whether the run this handle belongs to is still `Running`.
    #[must_use]
    pub fn is_live(&self) -> bool {
        let ledger = self.ledger.borrow();
        ledger.run == self.run && ledger.state.is_running()
    }
}

/// Read-only view of the controller's [`RunState`].
#[derive(Debug, Clone)]
pub struct RunStateWatcher {
    receiver: watch::Receiver<Ledger>,
}

impl RunStateWatcher {
    #[must_use]
    pub fn current(&self) -> RunState {
        self.receiver.borrow().state
    }

    /// Wait for the next state change. `None` once the controller is gone.
    pub async fn changed(&mut self) -> Option<RunState> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().state)
    }

    /// Wait until no run is `Running`. `None` once the controller is gone.
    pub async fn settled(&mut self) -> Option<RunState> {
        self.receiver
            .wait_for(|ledger| !ledger.state.is_running())
            .await
            .ok()
            .map(|ledger| ledger.state)
    }
}

/// Owns the lifecycle of batch runs, one at a time.
///
/// Observers either poll [`Self::state`], watch it with
/// [`Self::watch_state`], or receive every progress report in order through
/// [`Self::subscribe`]. A subscriber that falls more than the configured
/// capacity behind loses the oldest reports; the state watcher always holds
/// the latest counts.
///
/// Dropping the controller cancels any run in progress.
pub struct BatchController {
    scheduler: Arc<BatchScheduler>,
    tokens: Arc<dyn TokenSource>,
    ledger: Arc<watch::Sender<Ledger>>,
    progress: broadcast::Sender<BatchProgress>,
    active: Mutex<Option<CancellationHandle>>,
    /// Serializes `start`, which suspends while acquiring the token
    starting: AsyncMutex<()>,
}

impl std::fmt::Debug for BatchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchController")
            .field("scheduler", &self.scheduler)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl BatchController {
    /// A `progress_capacity` of zero uses the default of 64.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenSource>,
        retry: RetryPolicy,
        pacing: Pacing,
        progress_capacity: usize,
    ) -> Self {
        let capacity = if progress_capacity == 0 {
            DEFAULT_PROGRESS_CAPACITY
        } else {
            progress_capacity
        };

        let (ledger, _) = watch::channel(Ledger::default());
        let (progress, _) = broadcast::channel(capacity);

        Self {
            scheduler: Arc::new(BatchScheduler::new(transport, retry, pacing)),
            tokens,
            ledger: Arc::new(ledger),
            progress,
            active: Mutex::new(None),
            starting: AsyncMutex::new(()),
        }
    }

    /// Begin sending `template` to every recipient in the background.
    ///
    /// The access token is acquired once, before the run enters `Running`.
    /// A run may start from `Idle`, `Finished` or `Cancelled`.
    ///
    /// # Errors
    ///
    /// - [`ControlError::InvalidState`] while another run is `Running`; that
    ///   run is unaffected
    /// - [`ControlError::EmptyBatch`] when there are no recipients
    /// - [`ControlError::PreFlight`] when no access token could be acquired;
    ///   the state is left as it was
    #[traced(
        instrument(level = tracing::Level::DEBUG, skip_all, err),
        timing(precision = "ms"),
        level = "debug"
    )]
    pub async fn start(
        &self,
        recipients: impl Into<Arc<[Recipient]>> + Send,
        template: Template,
    ) -> Result<CancellationHandle, ControlError> {
        let _starting = self.starting.lock().await;

        if self.state().is_running() {
            return Err(ControlError::InvalidState);
        }

        let recipients: Arc<[Recipient]> = recipients.into();
        if recipients.is_empty() {
            return Err(ControlError::EmptyBatch);
        }

        let token = self.tokens.acquire().await?;

        // Run ids only advance here, under `starting`
        let total = recipients.len();
        let run = self.ledger.borrow().run + 1;

        // The handle must be reachable through `cancel` before anyone can
        // observe the run as `Running`
        let handle = CancellationHandle {
            run,
            token: CancellationToken::new(),
            ledger: self.ledger.clone(),
        };
        *self.active.lock() = Some(handle.clone());

        self.ledger.send_modify(|ledger| {
            ledger.run = run;
            ledger.state = RunState::Running {
                total,
                succeeded: 0,
                failed: 0,
            };
        });

        internal!(level = INFO, run, total, "Batch run started");

        let scheduler = self.scheduler.clone();
        let ledger = self.ledger.clone();
        let progress = self.progress.clone();
        let cancel = handle.token.clone();

        tokio::spawn(async move {
            let end = scheduler
                .run(&recipients, &template, &token, &cancel, |counts| {
                    ledger.send_if_modified(|current| {
                        if current.record(run, counts) {
                            // A lagging or absent subscriber is not an error
                            let _ = progress.send(counts);
                            true
                        } else {
                            false
                        }
                    });
                })
                .await;

            match end {
                BatchEnd::Completed(counts) => {
                    if ledger.send_if_modified(|current| current.finish(run)) {
                        internal!(
                            level = INFO,
                            run,
                            succeeded = counts.succeeded,
                            failed = counts.failed,
                            "Batch run finished"
                        );
                    }
                }
                // Normally already recorded by whoever cancelled
                BatchEnd::Cancelled(_) => {
                    ledger.send_if_modified(|current| current.cancel(run));
                }
            }
        });

        Ok(handle)
    }

    /// Cancel the run in progress, if any.
    ///
    /// The state becomes `Cancelled` with the counts from the last progress
    /// report. Calling this when nothing is running does nothing.
    pub fn cancel(&self) {
        if let Some(handle) = self.active.lock().as_ref() {
            handle.cancel();
        }
    }

    /// Return to `Idle` after a run has finished or been cancelled.
    ///
    /// # Errors
    ///
    /// [`ControlError::RunInProgress`] while a run is `Running`.
    pub fn clear(&self) -> Result<(), ControlError> {
        let mut result = Ok(());

        self.ledger.send_if_modified(|ledger| match ledger.clear() {
            Ok(changed) => changed,
            Err(err) => {
                result = Err(err);
                false
            }
        });

        if result.is_ok() {
            self.active.lock().take();
        }

        result
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.ledger.borrow().state
    }

    /// Receive every progress report from now on, in order.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BatchProgress> {
        self.progress.subscribe()
    }

    #[must_use]
    pub fn watch_state(&self) -> RunStateWatcher {
        RunStateWatcher {
            receiver: self.ledger.subscribe(),
        }
    }

    /// Wait until no run is `Running` and return the resulting state.
    pub async fn settled(&self) -> RunState {
        let mut receiver = self.ledger.subscribe();

        match receiver.wait_for(|ledger| !ledger.state.is_running()).await {
            Ok(ledger) => ledger.state,
            Err(_) => self.state(),
        }
    }
}

impl Drop for BatchController {
    fn drop(&mut self) {
        self.cancel();
    }
}
