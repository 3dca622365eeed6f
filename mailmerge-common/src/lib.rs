//! Types shared by every mailmerge crate: recipients, templates,
//! attachments, rendered messages, and the logging setup.

pub mod attachment;
pub mod error;
pub mod logging;
pub mod message;
pub mod recipient;

pub use attachment::{Attachment, AttachmentLimits};
pub use error::{AttachmentError, RosterError};
pub use message::{RenderedMessage, Template};
pub use recipient::{Recipient, Roster};
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
