//! Policies governing how a batch is paced and how failed sends are retried.
//!
//! - [`RetryPolicy`]: how often and how far apart a single send is retried
//! - [`Pacing`]: how many sends run together and how long to wait between
//!   groups, derived from the provider's send quota

pub mod pacing;
pub mod retry;

pub use pacing::Pacing;
pub use retry::RetryPolicy;
