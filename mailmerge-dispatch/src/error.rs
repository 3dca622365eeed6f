//! Typed errors for dispatch.
//!
//! [`TransportError`] classifies a failed send as permanent, temporary or
//! system. The pipeline retries all three the same way; the classification
//! exists for logging and for callers that want to report on it.
//!
//! [`ControlError`] covers misuse of the [`crate::BatchController`] and
//! failures before a run begins.

use thiserror::Error;

/// A failed attempt to hand one message to the mail service.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failure unlikely to succeed on retry (e.g., 5xx SMTP codes).
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    /// Failure that may succeed on retry (e.g., 4xx SMTP codes, timeouts).
    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    /// Problem on our side (bad configuration, message construction).
    #[error("System error: {0}")]
    System(#[from] SystemError),
}

#[derive(Debug, Error)]
pub enum PermanentError {
    /// Recipient address is invalid or rejected by the server.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Message was rejected by the server (e.g., policy violation, spam).
    #[error("Message rejected: {0}")]
    MessageRejected(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
}

#[derive(Debug, Error)]
pub enum TemporaryError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Provider quota or rate limit hit.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// Server returned a temporary failure code.
    #[error("Temporary SMTP error: {0}")]
    SmtpTemporary(String),
}

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The message could not be assembled (bad sender address, content type).
    #[error("Failed to build message: {0}")]
    MessageBuild(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransportError {
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }

    /// Short label for log fields
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Permanent(_) => "permanent",
            Self::Temporary(_) => "temporary",
            Self::System(_) => "system",
        }
    }
}

/// Transient reply codes providers use when throttling a sender
const RATE_LIMIT_CODES: [&str; 4] = ["421", "450", "451", "452"];

const RATE_LIMIT_HINTS: [&str; 5] = ["rate", "quota", "too many", "limit", "try again later"];

/// Whether a transient SMTP reply is the provider throttling us rather than
/// some other temporary failure.
fn is_rate_limit(code: &str, message: &str) -> bool {
    let message = message.to_ascii_lowercase();

    RATE_LIMIT_CODES.contains(&code) && RATE_LIMIT_HINTS.iter().any(|hint| message.contains(hint))
}

/// Classify SMTP client errors by response code and failure mode:
///
/// - **421/450/451/452 with a throttling message** → Temporary (rate limited)
/// - **Other 4xx responses** → Temporary
/// - **5xx responses** → Permanent (authentication failures included)
/// - **Timeouts** → Temporary
/// - **Connection/TLS/network problems** → Temporary
/// - **Anything else** → System
impl From<lettre::transport::smtp::Error> for TransportError {
    fn from(error: lettre::transport::smtp::Error) -> Self {
        let message = error.to_string();

        if error.is_transient() {
            let code = error.status().map(|code| code.to_string());

            if code.is_some_and(|code| is_rate_limit(&code, &message)) {
                Self::Temporary(TemporaryError::RateLimited(message))
            } else {
                Self::Temporary(TemporaryError::SmtpTemporary(message))
            }
        } else if error.is_permanent() {
            if error
                .status()
                .is_some_and(|code| code.to_string().starts_with("535"))
            {
                Self::Permanent(PermanentError::AuthenticationFailed(message))
            } else {
                Self::Permanent(PermanentError::MessageRejected(message))
            }
        } else if error.is_timeout() {
            Self::Temporary(TemporaryError::Timeout(message))
        } else if error.is_client() {
            Self::System(SystemError::Internal(message))
        } else {
            Self::Temporary(TemporaryError::ConnectionFailed(message))
        }
    }
}

impl From<lettre::address::AddressError> for TransportError {
    fn from(error: lettre::address::AddressError) -> Self {
        Self::Permanent(PermanentError::InvalidRecipient(error.to_string()))
    }
}

impl From<lettre::error::Error> for TransportError {
    fn from(error: lettre::error::Error) -> Self {
        Self::System(SystemError::MessageBuild(error.to_string()))
    }
}

/// Failure to obtain the credential a run sends with.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Access token unavailable: {0}")]
    Unavailable(String),

    #[error("Environment variable {0} is not set")]
    MissingVariable(String),
}

/// Rejected run-control operations. None of these affect a run already in
/// flight.
#[derive(Debug, Error)]
pub enum ControlError {
    /// `start` was called while a run is still in progress.
    #[error("A batch run is already in progress")]
    InvalidState,

    /// `clear` was called while a run is still in progress.
    #[error("Send batch work in progress")]
    RunInProgress,

    /// `start` was called with no recipients.
    #[error("There are no recipients to send to")]
    EmptyBatch,

    /// Acquiring the access token failed, so the run never began.
    #[error("Pre-flight failed: {0}")]
    PreFlight(#[from] TokenError),
}
