//! Mock transport for pipeline tests
//!
//! Records every attempt and can be scripted to:
//! - Fail every attempt for chosen recipients
//! - Fail the first N attempts for chosen recipients
//! - Take a fixed (virtual) time per attempt, to observe concurrency
//!
//! ```rust,ignore
//! let transport = MockTransport::builder()
//!     .failing_for("b@example.com")
//!     .failing_times("c@example.com", 1)
//!     .with_latency(Duration::from_millis(100))
//!     .build();
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use ahash::AHashMap;
use async_trait::async_trait;
use mailmerge_common::RenderedMessage;
use mailmerge_dispatch::{AccessToken, TemporaryError, Transport, TransportError};
use parking_lot::Mutex;

/// One call to [`Transport::send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub to: String,
    pub subject: String,
    pub token: String,
}

#[derive(Debug, Default)]
pub struct MockTransportBuilder {
    always_fail: Vec<String>,
    fail_times: AHashMap<String, usize>,
    latency: Duration,
}

impl MockTransportBuilder {
    #[must_use]
    pub fn failing_for(mut self, email: &str) -> Self {
        self.always_fail.push(email.to_string());
        self
    }

    #[must_use]
    pub fn failing_times(mut self, email: &str, times: usize) -> Self {
        self.fail_times.insert(email.to_string(), times);
        self
    }

    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn build(self) -> Arc<MockTransport> {
        Arc::new(MockTransport {
            always_fail: self.always_fail,
            fail_times: self.fail_times,
            latency: self.latency,
            attempts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }
}

#[derive(Debug)]
pub struct MockTransport {
    always_fail: Vec<String>,
    fail_times: AHashMap<String, usize>,
    latency: Duration,
    attempts: Mutex<Vec<Attempt>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Decrements the in-flight count even when the send is dropped mid-way
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTransport {
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    /// Succeeds at everything immediately
    pub fn healthy() -> Arc<Self> {
        Self::builder().build()
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn calls_for(&self, email: &str) -> usize {
        self.attempts
            .lock()
            .iter()
            .filter(|attempt| attempt.to == email)
            .count()
    }

    /// Recipients in the order their first attempt started
    pub fn first_attempt_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        for attempt in self.attempts.lock().iter() {
            if !order.contains(&attempt.to) {
                order.push(attempt.to.clone());
            }
        }
        order
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(&self, email: &str, previous_attempts: usize) -> bool {
        self.always_fail.iter().any(|address| address == email)
            || self
                .fail_times
                .get(email)
                .is_some_and(|times| previous_attempts < *times)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        message: &RenderedMessage,
        token: &AccessToken,
    ) -> Result<(), TransportError> {
        let previous_attempts = self.calls_for(&message.to);
        self.attempts.lock().push(Attempt {
            to: message.to.clone(),
            subject: message.subject.clone(),
            token: token.secret().to_string(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.should_fail(&message.to, previous_attempts) {
            Err(TemporaryError::ConnectionFailed(format!("{} refused", message.to)).into())
        } else {
            Ok(())
        }
    }
}
