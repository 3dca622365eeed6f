//! Batch dispatch of rendered messages to an external mail service.
//!
//! The pipeline has three layers:
//! - [`RetryingSender`] sends one message, retrying a bounded number of
//!   times, and always resolves to an [`Outcome`]
//! - [`BatchScheduler`] walks the recipients in fixed-width chunks, sending
//!   each chunk concurrently and pausing between chunks to respect the
//!   provider's send quota, reporting cumulative [`BatchProgress`]
//! - [`BatchController`] owns the lifecycle of one run at a time and
//!   publishes [`RunState`] and progress to observers
//!
//! The mail service itself sits behind the [`Transport`] trait, and the
//! credential it needs behind [`TokenSource`].

mod controller;
mod error;
pub mod policy;
mod scheduler;
pub mod token;
pub mod transport;
mod types;
mod unit;

pub use controller::{BatchController, CancellationHandle, RunStateWatcher};
pub use error::{
    ControlError, PermanentError, SystemError, TemporaryError, TokenError, TransportError,
};
pub use policy::{Pacing, RetryPolicy};
pub use scheduler::BatchScheduler;
pub use token::{AccessToken, CachedTokenSource, EnvTokenSource, StaticTokenSource, TokenSource};
pub use transport::Transport;
pub use types::{BatchEnd, BatchProgress, Outcome, RunState};
pub use unit::RetryingSender;
