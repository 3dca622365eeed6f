//! Send pacing.
//!
//! The provider enforces a per-second send quota. Rather than tracking a
//! token bucket, a batch is cut into fixed-width chunks: every send in a
//! chunk runs together, and the next chunk waits out the interval.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    /// Sends in flight at once. A width of zero is treated as one.
    ///
    /// Default: 1
    #[serde(default = "defaults::width")]
    pub width: usize,

    /// Pause between consecutive chunks (in milliseconds).
    ///
    /// Default: 500 milliseconds
    #[serde(default = "defaults::interval_ms")]
    pub interval_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            width: defaults::width(),
            interval_ms: defaults::interval_ms(),
        }
    }
}

impl Pacing {
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "An interval of more than u64::MAX milliseconds is not meaningful"
    )]
    pub const fn new(width: usize, interval: Duration) -> Self {
        Self {
            width,
            interval_ms: interval.as_millis() as u64,
        }
    }

    /// Effective chunk width, never zero
    #[must_use]
    pub const fn chunk_width(&self) -> usize {
        if self.width == 0 { 1 } else { self.width }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Number of chunks a batch of `recipients` is split into.
    #[must_use]
    pub const fn chunk_count(&self, recipients: usize) -> usize {
        recipients.div_ceil(self.chunk_width())
    }

    /// Sustained send rate this pacing allows, ignoring time spent sending.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        reason = "Widths and intervals are far below the precision limit of f64"
    )]
    pub fn messages_per_second(&self) -> f64 {
        if self.interval_ms == 0 {
            return f64::INFINITY;
        }

        self.chunk_width() as f64 * 1000.0 / self.interval_ms as f64
    }
}

mod defaults {
    pub const fn width() -> usize {
        1
    }

    pub const fn interval_ms() -> u64 {
        500
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_defaults() {
        let pacing = Pacing::default();
        assert_eq!(pacing.chunk_width(), 1);
        assert_eq!(pacing.interval(), Duration::from_millis(500));
        assert!((pacing.messages_per_second() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_width_is_one() {
        let pacing = Pacing::new(0, Duration::from_millis(100));
        assert_eq!(pacing.chunk_width(), 1);
        assert_eq!(pacing.chunk_count(3), 3);
    }

    #[test]
    fn test_chunk_count() {
        let pacing = Pacing::new(3, Duration::ZERO);
        assert_eq!(pacing.chunk_count(0), 0);
        assert_eq!(pacing.chunk_count(1), 1);
        assert_eq!(pacing.chunk_count(3), 1);
        assert_eq!(pacing.chunk_count(7), 3);
        assert!(pacing.messages_per_second().is_infinite());
    }

    #[test]
    fn test_pacing_from_config() {
        let pacing: Pacing = ron::from_str("(width: 14, interval_ms: 1000)").unwrap();
        assert_eq!(pacing, Pacing::new(14, Duration::from_secs(1)));

        let pacing: Pacing = ron::from_str("()").unwrap();
        assert_eq!(pacing, Pacing::default());
    }
}
