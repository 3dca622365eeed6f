//! Paced, chunked dispatch of a whole batch.

use std::sync::Arc;

use futures_util::future::join_all;
use mailmerge_common::{Recipient, Template, internal};
use mailmerge_template::render_message;
use mailmerge_tracing::traced;
use tokio_util::sync::CancellationToken;

use crate::{
    policy::{Pacing, RetryPolicy},
    token::AccessToken,
    transport::Transport,
    types::{BatchEnd, BatchProgress},
    unit::RetryingSender,
};

/// Drives a [`RetryingSender`] over an ordered list of recipients.
///
/// Recipients are cut into consecutive chunks of [`Pacing::chunk_width`].
/// Chunks run strictly in order; the sends within a chunk run concurrently
/// on the calling task. Once every send in a chunk has settled its outcomes
/// are added to the running counts and reported, and the next chunk waits
/// out [`Pacing::interval`]. There is no wait after the last chunk.
///
/// Cancellation is checked between chunks and raced against both the
/// in-flight chunk and the inter-chunk wait. Sends still in flight when it
/// fires are dropped and their outcomes never reported, so the returned
/// counts always equal the last progress report.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    sender: RetryingSender,
    pacing: Pacing,
}

impl BatchScheduler {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy, pacing: Pacing) -> Self {
        Self {
            sender: RetryingSender::new(transport, retry),
            pacing,
        }
    }

    #[must_use]
    pub const fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    /// Send `template` to every recipient, calling `on_progress` with the
    /// cumulative counts after each chunk.
    #[traced(
        instrument(level = tracing::Level::DEBUG, skip_all, fields(recipients = recipients.len())),
        timing(precision = "ms"),
        level = "debug"
    )]
    pub async fn run<F>(
        &self,
        recipients: &[Recipient],
        template: &Template,
        token: &AccessToken,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> BatchEnd
    where
        F: FnMut(BatchProgress) + Send,
    {
        let mut progress = BatchProgress::default();

        for (index, chunk) in recipients.chunks(self.pacing.chunk_width()).enumerate() {
            if index > 0 {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return BatchEnd::Cancelled(progress),
                    () = tokio::time::sleep(self.pacing.interval()) => {}
                }
            }

            if cancel.is_cancelled() {
                return BatchEnd::Cancelled(progress);
            }

            internal!(chunk = index, size = chunk.len(), "Sending chunk");

            let messages = chunk
                .iter()
                .map(|recipient| render_message(template, recipient))
                .collect::<Vec<_>>();

            let sends = join_all(
                messages
                    .iter()
                    .map(|message| self.sender.send(message, token)),
            );

            let outcomes = tokio::select! {
                biased;
                () = cancel.cancelled() => return BatchEnd::Cancelled(progress),
                outcomes = sends => outcomes,
            };

            // Cancelled while the last send was settling
            if cancel.is_cancelled() {
                return BatchEnd::Cancelled(progress);
            }

            for outcome in outcomes {
                progress.record(outcome);
            }

            internal!(
                chunk = index,
                succeeded = progress.succeeded,
                failed = progress.failed,
                "Chunk settled"
            );
            on_progress(progress);
        }

        BatchEnd::Completed(progress)
    }
}
