//! Configuration and run orchestration for the `mailmerge` binary.

pub mod config;
pub mod controller;

pub use config::{Mailmerge, TokenConfig, find_config_file};
pub use controller::{Preview, SHUTDOWN_BROADCAST, preview, shutdown};
