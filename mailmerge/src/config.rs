use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use mailmerge_common::AttachmentLimits;
use mailmerge_dispatch::{
    BatchController, CachedTokenSource, EnvTokenSource, Pacing, RetryPolicy, StaticTokenSource,
    TokenSource, Transport,
    transport::{SmtpConfig, SmtpTransport},
};
use serde::Deserialize;

/// Where the access token for a run comes from
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum TokenConfig {
    /// A fixed secret, such as an app password
    Static(String),
    /// Read from an environment variable at the start of every run
    Env {
        variable: String,
        /// Seconds a token stays valid once read
        #[serde(default)]
        lifetime_secs: Option<u64>,
    },
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::Env {
            variable: "MAILMERGE_TOKEN".to_string(),
            lifetime_secs: None,
        }
    }
}

impl TokenConfig {
    #[must_use]
    pub fn source(&self) -> Arc<dyn TokenSource> {
        let inner: Arc<dyn TokenSource> = match self {
            Self::Static(secret) => Arc::new(StaticTokenSource::new(secret.as_str())),
            Self::Env {
                variable,
                lifetime_secs,
            } => Arc::new(EnvTokenSource::new(
                variable.as_str(),
                lifetime_secs.map(Duration::from_secs),
            )),
        };

        Arc::new(CachedTokenSource::new(inner))
    }
}

/// The `mailmerge.config.ron` file.
#[derive(Debug, Clone, Deserialize)]
pub struct Mailmerge {
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub pacing: Pacing,
    #[serde(default)]
    pub attachments: AttachmentLimits,
    /// Progress reports buffered for a slow observer
    ///
    /// Default: 64
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
}

const fn default_progress_capacity() -> usize {
    64
}

impl Mailmerge {
    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or is not valid configuration.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
        })?;

        Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config in {}: {e}", path.display()))
    }

    /// # Errors
    ///
    /// If `content` is not valid configuration.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(content)?)
    }

    /// # Errors
    ///
    /// If the SMTP section is invalid.
    pub fn transport(&self) -> anyhow::Result<Arc<dyn Transport>> {
        Ok(Arc::new(SmtpTransport::new(self.smtp.clone())?))
    }

    #[must_use]
    pub fn batch_controller(&self, transport: Arc<dyn Transport>) -> BatchController {
        BatchController::new(
            transport,
            self.token.source(),
            self.retry,
            self.pacing,
            self.progress_capacity,
        )
    }
}

/// Find the configuration file using the following precedence:
/// 1. `explicit`, from the `--config` flag
/// 2. `MAILMERGE_CONFIG` environment variable
/// 3. ./mailmerge.config.ron (current working directory)
/// 4. /etc/mailmerge/mailmerge.config.ron (system-wide config)
///
/// # Errors
///
/// If an explicitly named file does not exist, or none of the default
/// locations has one.
pub fn find_config_file(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Ok(env_path) = std::env::var("MAILMERGE_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "MAILMERGE_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        PathBuf::from("./mailmerge.config.ron"),
        PathBuf::from("/etc/mailmerge/mailmerge.config.ron"),
    ];

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config flag\n  - MAILMERGE_CONFIG environment variable\n{paths_tried}"
    )
}
