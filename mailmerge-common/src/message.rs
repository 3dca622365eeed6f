use std::sync::Arc;

use crate::attachment::Attachment;

/// The subject and body a batch is rendered from, plus the attachments sent
/// to every recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    pub subject: String,
    pub body: String,
    pub attachments: Arc<[Attachment]>,
}

impl Template {
    #[must_use]
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            attachments: Arc::from([]),
        }
    }

    #[must_use]
    pub fn with_attachments(mut self, attachments: impl Into<Arc<[Attachment]>>) -> Self {
        self.attachments = attachments.into();
        self
    }
}

/// One fully rendered message, ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub attachments: Arc<[Attachment]>,
}
