//! Sending one message with bounded retry.

use std::sync::Arc;

use mailmerge_common::{
    RenderedMessage, outgoing,
    tracing::{debug, warn},
};

use crate::{policy::RetryPolicy, token::AccessToken, transport::Transport, types::Outcome};

/// Wraps a [`Transport`] so that a single message always resolves to an
/// [`Outcome`].
///
/// Every failure is retried the same way regardless of its classification;
/// one recipient's failure never reaches the caller as an error. The message
/// is re-sent identically on each attempt, so a send that succeeded on the
/// server but failed on the way back may be delivered twice.
#[derive(Clone)]
pub struct RetryingSender {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryingSender {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `message`, retrying up to the policy's budget with its fixed
    /// delay in between.
    pub async fn send(&self, message: &RenderedMessage, token: &AccessToken) -> Outcome {
        let mut retries = 0;

        loop {
            match self.transport.send(message, token).await {
                Ok(()) => {
                    outgoing!(to = %message.to, attempts = retries + 1, "Message sent");
                    return Outcome::Success;
                }
                Err(err) if self.policy.should_retry(retries) => {
                    debug!(
                        to = %message.to,
                        attempt = retries + 1,
                        kind = err.kind(),
                        error = %err,
                        "Send failed, retrying in {:?}",
                        self.policy.delay()
                    );

                    tokio::time::sleep(self.policy.delay()).await;
                    retries += 1;
                }
                Err(err) => {
                    warn!(
                        to = %message.to,
                        attempts = retries + 1,
                        kind = err.kind(),
                        error = %err,
                        "Giving up on message"
                    );
                    return Outcome::Failure;
                }
            }
        }
    }
}

impl std::fmt::Debug for RetryingSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingSender")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
