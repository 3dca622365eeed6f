//! The seam between the pipeline and the mail service.

pub mod smtp;

use async_trait::async_trait;
use mailmerge_common::RenderedMessage;

pub use self::smtp::{AuthMechanism, SmtpConfig, SmtpTransport, TlsMode};
use crate::{error::TransportError, token::AccessToken};

/// Performs one best-effort send of one rendered message.
///
/// Implementations do not retry; a single call is a single attempt.
/// Retrying is the job of [`crate::RetryingSender`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// Any failure to hand the message to the mail service.
    async fn send(
        &self,
        message: &RenderedMessage,
        token: &AccessToken,
    ) -> Result<(), TransportError>;
}
