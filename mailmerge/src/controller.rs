use std::sync::{Arc, LazyLock};

use mailmerge_common::{Recipient, RenderedMessage, Signal, Template, internal};
use mailmerge_dispatch::{BatchProgress, RunState, Transport};
use mailmerge_template::{PreviewWarning, preview_warnings, render, render_message};
use mailmerge_tracing::traced;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::config::Mailmerge;

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Wait for Ctrl-C or `SIGTERM`, then tell everyone listening on
/// [`SHUTDOWN_BROADCAST`] to stop.
///
/// # Errors
///
/// If the signal handlers cannot be installed.
#[traced(instrument(level = tracing::Level::TRACE))]
pub async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = WARN, "CTRL+C entered -- cancelling the batch run");
        }
        _ = terminate.recv() => {
            internal!(level = WARN, "Terminate Signal received, cancelling the batch run");
        }
    };

    // Nobody listening means there is nothing left to cancel
    let _ = SHUTDOWN_BROADCAST.send(Signal::Shutdown);

    Ok(())
}

/// A rendered message and everything that looks wrong with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub message: RenderedMessage,
    pub warnings: Vec<PreviewWarning>,
}

/// Render the message for one recipient and check it. Link checks need
/// the Markdown source, so the body is inspected before it is flattened.
#[must_use]
pub fn preview(template: &Template, recipient: &Recipient) -> Preview {
    let message = render_message(template, recipient);
    let warnings = preview_warnings(
        &message.subject,
        &render(&template.body, recipient),
        message.attachments.len(),
    );

    Preview { message, warnings }
}

impl Mailmerge {
    /// Send `template` to every recipient and wait for the run to end.
    ///
    /// `report` sees every progress event along with the batch size. A
    /// [`Signal::Shutdown`] on `shutdown` cancels the run, which still ends
    /// normally with a `Cancelled` state.
    ///
    /// # Errors
    ///
    /// If the attachments break the configured limits, or the run cannot
    /// be started.
    #[traced(
        instrument(level = tracing::Level::TRACE, skip_all, err),
        timing(precision = "s"),
        level = "info"
    )]
    pub async fn send<F>(
        &self,
        transport: Arc<dyn Transport>,
        recipients: Vec<Recipient>,
        template: Template,
        mut shutdown: broadcast::Receiver<Signal>,
        mut report: F,
    ) -> anyhow::Result<RunState>
    where
        F: FnMut(BatchProgress, usize) + Send,
    {
        self.attachments.check(&template.attachments)?;

        let total = recipients.len();
        let controller = self.batch_controller(transport);
        let mut progress = controller.subscribe();
        let mut watcher = controller.watch_state();

        let handle = controller.start(recipients, template).await?;
        internal!(level = INFO, total, pacing = ?self.pacing, "Batch run in progress");

        let mut listening = true;
        let state = loop {
            tokio::select! {
                biased;

                event = progress.recv() => match event {
                    Ok(counts) => report(counts, total),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Progress display fell behind, skipped {skipped} report(s)");
                    }
                    Err(RecvError::Closed) => break controller.settled().await,
                },

                signal = shutdown.recv(), if listening => match signal {
                    Ok(Signal::Shutdown) => handle.cancel(),
                    Err(RecvError::Closed) => listening = false,
                    Err(RecvError::Lagged(_)) => {}
                },

                state = watcher.changed() => match state {
                    Some(state) if state.is_running() => {}
                    Some(state) => break state,
                    None => break controller.settled().await,
                },
            }
        };

        // Reports published just before the run ended
        while let Ok(counts) = progress.try_recv() {
            report(counts, total);
        }

        Ok(state)
    }
}
