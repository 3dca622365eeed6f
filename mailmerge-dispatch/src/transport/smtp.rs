//! Sending through an SMTP submission server with `lettre`.
//!
//! The run's access token is used as the authentication secret, so the same
//! transport serves password (`PLAIN`/`LOGIN`) and `OAuth2` (`XOAUTH2`)
//! providers. The underlying connection pool is rebuilt whenever the token
//! changes.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment as MimeAttachment, Mailbox, MultiPart, header::ContentType},
    transport::smtp::{
        SMTP_PORT, SUBMISSION_PORT, SUBMISSIONS_PORT,
        authentication::{Credentials, Mechanism},
        client::{Tls, TlsParameters},
    },
};
use mailmerge_common::{RenderedMessage, outgoing};
use mailmerge_tracing::traced;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::Transport;
use crate::{
    error::{SystemError, TransportError},
    token::AccessToken,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlsMode {
    /// No encryption. Only sensible against a local relay.
    Plaintext,
    /// Upgrade with `STARTTLS`; the connection fails if the server cannot
    #[default]
    StartTls,
    /// Implicit TLS from the first byte
    Tls,
}

impl TlsMode {
    const fn default_port(self) -> u16 {
        match self {
            Self::Plaintext => SMTP_PORT,
            Self::StartTls => SUBMISSION_PORT,
            Self::Tls => SUBMISSIONS_PORT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMechanism {
    #[default]
    Plain,
    Login,
    Xoauth2,
}

impl From<AuthMechanism> for Mechanism {
    fn from(mechanism: AuthMechanism) -> Self {
        match mechanism {
            AuthMechanism::Plain => Self::Plain,
            AuthMechanism::Login => Self::Login,
            AuthMechanism::Xoauth2 => Self::Xoauth2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    /// Defaults to the standard port for the TLS mode (25, 587 or 465)
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub tls: TlsMode,
    pub username: String,
    #[serde(default)]
    pub mechanism: AuthMechanism,
    /// Sender mailbox, e.g. `"Ada Lovelace <ada@example.com>"`
    pub from: String,
    /// Per-command timeout (in seconds).
    ///
    /// Default: 30 seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    30
}

impl SmtpConfig {
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.tls.default_port())
    }
}

pub struct SmtpTransport {
    config: SmtpConfig,
    from: Mailbox,
    /// The pool built for the most recent token, keyed by its secret
    pool: Mutex<Option<(Arc<str>, AsyncSmtpTransport<Tokio1Executor>)>>,
}

impl std::fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SmtpTransport {
    /// # Errors
    ///
    /// If the configured sender is not a valid mailbox.
    pub fn new(config: SmtpConfig) -> Result<Self, TransportError> {
        let from = config.from.parse::<Mailbox>().map_err(|err| {
            SystemError::Configuration(format!("Invalid sender {:?}: {err}", config.from))
        })?;

        Ok(Self {
            config,
            from,
            pool: Mutex::new(None),
        })
    }

    fn build_pool(
        &self,
        token: &AccessToken,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let host = self.config.host.as_str();

        let tls = match self.config.tls {
            TlsMode::Plaintext => Tls::None,
            TlsMode::StartTls => Tls::Required(TlsParameters::new(host.to_string())?),
            TlsMode::Tls => Tls::Wrapper(TlsParameters::new(host.to_string())?),
        };

        Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(self.config.port())
            .tls(tls)
            .timeout(Some(Duration::from_secs(self.config.timeout_secs)))
            .credentials(Credentials::new(
                self.config.username.clone(),
                token.secret().to_string(),
            ))
            .authentication(vec![self.config.mechanism.into()])
            .build())
    }

    fn pool_for(
        &self,
        token: &AccessToken,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let mut pool = self.pool.lock();

        if let Some((_, transport)) = pool
            .as_ref()
            .filter(|(secret, _)| **secret == *token.secret())
        {
            return Ok(transport.clone());
        }

        let transport = self.build_pool(token)?;
        *pool = Some((Arc::from(token.secret()), transport.clone()));

        Ok(transport)
    }

    /// Assemble the MIME message: a text/HTML alternative, wrapped in a
    /// mixed part when there are attachments.
    pub(crate) fn build_message(
        &self,
        message: &RenderedMessage,
    ) -> Result<Message, TransportError> {
        let to = message.to.parse::<Mailbox>()?;

        let alternative =
            MultiPart::alternative_plain_html(message.text_body.clone(), message.html_body.clone());

        let body = if message.attachments.is_empty() {
            alternative
        } else {
            message.attachments.iter().try_fold(
                MultiPart::mixed().multipart(alternative),
                |body, attachment| {
                    let content_type =
                        ContentType::parse(&attachment.content_type).map_err(|err| {
                            SystemError::MessageBuild(format!(
                                "{}: invalid content type {:?}: {err}",
                                attachment.filename, attachment.content_type
                            ))
                        })?;

                    Ok::<_, TransportError>(body.singlepart(
                        MimeAttachment::new(attachment.filename.clone())
                            .body(attachment.data.to_vec(), content_type),
                    ))
                },
            )?
        };

        Ok(Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .multipart(body)?)
    }

    #[traced(
        instrument(level = tracing::Level::TRACE, skip_all, fields(to = %message.to), err),
        timing(precision = "ms")
    )]
    async fn deliver(
        &self,
        message: &RenderedMessage,
        token: &AccessToken,
    ) -> Result<(), TransportError> {
        let email = self.build_message(message)?;
        let pool = self.pool_for(token)?;

        let response = pool.send(email).await?;
        outgoing!(
            to = %message.to,
            code = %response.code(),
            "Message accepted"
        );

        Ok(())
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(
        &self,
        message: &RenderedMessage,
        token: &AccessToken,
    ) -> Result<(), TransportError> {
        self.deliver(message, token).await
    }
}
