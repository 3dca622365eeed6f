#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use ahash::AHashMap;
use async_trait::async_trait;
use mailmerge::{Mailmerge, preview};
use mailmerge_common::{Attachment, Recipient, RenderedMessage, Signal, Template};
use mailmerge_dispatch::{
    AccessToken, BatchProgress, PermanentError, RunState, Transport, TransportError,
};
use mailmerge_template::{PreviewWarning, VariableLocation};
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

const CONFIG: &str = r#"(
    smtp: (host: "localhost", username: "relay", from: "noreply@example.com"),
    token: Static("secret"),
    retry: (retries: 1, delay_ms: 100),
    pacing: (width: 1, interval_ms: 500),
    attachments: (max_size_mb: 1, max_files: 1),
)"#;

/// Rejects anything addressed to `bounce@`
#[derive(Default)]
struct Recording {
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for Recording {
    async fn send(
        &self,
        message: &RenderedMessage,
        token: &AccessToken,
    ) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(token.secret(), "secret");

        if message.to.starts_with("bounce@") {
            Err(PermanentError::InvalidRecipient(message.to.clone()).into())
        } else {
            Ok(())
        }
    }
}

fn recipient(email: &str, name: &str) -> Recipient {
    Recipient::new(email, AHashMap::from_iter([("name".to_string(), name.to_string())]))
}

#[tokio::test(start_paused = true)]
async fn test_send_reports_progress_and_final_state() {
    let config = Mailmerge::parse(CONFIG).unwrap();
    let transport = Arc::new(Recording::default());
    let (_signals, shutdown) = broadcast::channel(1);
    let mut reports = Vec::new();

    let state = config
        .send(
            transport.clone(),
            vec![
                recipient("ada@example.com", "Ada"),
                recipient("bounce@example.com", "Nobody"),
                recipient("bob@example.com", "Bob"),
            ],
            Template::new("Hi {{name}}", "Hello {{name}}"),
            shutdown,
            |progress, total| reports.push((progress, total)),
        )
        .await
        .unwrap();

    assert_eq!(
        state,
        RunState::Finished {
            succeeded: 2,
            failed: 1
        }
    );
    assert_eq!(
        reports,
        vec![
            (BatchProgress::new(1, 0), 3),
            (BatchProgress::new(1, 1), 3),
            (BatchProgress::new(2, 1), 3),
        ]
    );
    // One retry for the bounce
    assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_signal_cancels_run() {
    let config = Mailmerge::parse(CONFIG).unwrap();
    let transport = Arc::new(Recording::default());
    let (signals, shutdown) = broadcast::channel(1);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        signals.send(Signal::Shutdown).unwrap();
    });

    let state = config
        .send(
            transport.clone(),
            vec![
                recipient("ada@example.com", "Ada"),
                recipient("bob@example.com", "Bob"),
                recipient("cy@example.com", "Cy"),
            ],
            Template::new("Hi", "Hello"),
            shutdown,
            |_, _| {},
        )
        .await
        .unwrap();

    assert_eq!(
        state,
        RunState::Cancelled {
            succeeded: 1,
            failed: 0
        }
    );
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_attachment_limits_checked_before_sending() {
    let config = Mailmerge::parse(CONFIG).unwrap();
    let transport = Arc::new(Recording::default());
    let (_signals, shutdown) = broadcast::channel(1);

    let template = Template::new("Hi", "Hello").with_attachments(vec![
        Attachment::new("a.txt", "text/plain", b"a".to_vec()),
        Attachment::new("b.txt", "text/plain", b"b".to_vec()),
    ]);

    let result = config
        .send(
            transport.clone(),
            vec![recipient("ada@example.com", "Ada")],
            template,
            shutdown,
            |_, _| {},
        )
        .await;

    assert!(result.is_err());
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_preview_warnings() {
    let template = Template::new("Hi {{name}}", "Dear {{name}} {{surname}},\n\nSee attached.");

    let rendered = preview(&template, &recipient("ada@example.com", "Ada"));

    assert_eq!(rendered.message.subject, "Hi Ada");
    assert_eq!(
        rendered.warnings,
        vec![
            PreviewWarning::Attachment,
            PreviewWarning::Variable {
                name: "surname".to_string(),
                location: VariableLocation::Body,
            },
        ]
    );
}

#[test]
fn test_preview_checks_markdown_links() {
    let template = Template::new(
        "Hi",
        "Hello **{{name}}**, read [the news](https://example.com/news?utm_source=mail).",
    );

    let rendered = preview(&template, &recipient("ada@example.com", "Ada"));

    assert_eq!(rendered.message.text_body, "Hello Ada, read the news.");
    assert_eq!(
        rendered.warnings,
        vec![PreviewWarning::CheckLink {
            href: "https://example.com/news?utm_source=mail".to_string(),
        }]
    );
}
