use serde::{Deserialize, Serialize};

/// Final result of sending one message, after any retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Cumulative counts over the messages settled so far in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchProgress {
    #[must_use]
    pub const fn new(succeeded: usize, failed: usize) -> Self {
        Self { succeeded, failed }
    }

    pub const fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.succeeded += 1,
            Outcome::Failure => self.failed += 1,
        }
    }

    /// Messages that have reached an outcome
    #[must_use]
    pub const fn settled(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Lifecycle of the current run, as observed through the controller.
///
/// ```text
/// Idle --start--> Running --all chunks done--> Finished
///                    |
///                    +------cancel------------> Cancelled
/// Finished / Cancelled --clear--> Idle
/// Finished / Cancelled --start--> Running
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Idle,
    Running {
        total: usize,
        succeeded: usize,
        failed: usize,
    },
    Finished {
        succeeded: usize,
        failed: usize,
    },
    Cancelled {
        succeeded: usize,
        failed: usize,
    },
}

impl RunState {
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// A run reached `Finished` or `Cancelled` and has not been cleared.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Cancelled { .. })
    }

    /// Counts carried by the state; zero while idle.
    #[must_use]
    pub const fn progress(&self) -> BatchProgress {
        match *self {
            Self::Idle => BatchProgress::new(0, 0),
            Self::Running {
                succeeded, failed, ..
            }
            | Self::Finished { succeeded, failed }
            | Self::Cancelled { succeeded, failed } => BatchProgress::new(succeeded, failed),
        }
    }

    #[must_use]
    pub const fn total(&self) -> Option<usize> {
        match *self {
            Self::Running { total, .. } => Some(total),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Running {
                total,
                succeeded,
                failed,
            } => write!(
                f,
                "Running ({}/{total}, {succeeded} succeeded, {failed} failed)",
                succeeded + failed
            ),
            Self::Finished { succeeded, failed } => {
                write!(f, "Finished ({succeeded} succeeded, {failed} failed)")
            }
            Self::Cancelled { succeeded, failed } => {
                write!(f, "Cancelled ({succeeded} succeeded, {failed} failed)")
            }
        }
    }
}

/// How a scheduler run ended, with the counts last reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchEnd {
    Completed(BatchProgress),
    Cancelled(BatchProgress),
}

impl BatchEnd {
    #[must_use]
    pub const fn progress(&self) -> BatchProgress {
        match *self {
            Self::Completed(progress) | Self::Cancelled(progress) => progress,
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
