//! Turning a [`Template`] and a [`Recipient`] into a [`RenderedMessage`].
//!
//! - [`render`] substitutes `{{name}}` placeholders from a recipient's fields
//! - [`body`] renders a Markdown body as HTML and as plain text
//! - [`warnings`] inspects a rendered preview for likely mistakes

pub mod body;
pub mod render;
pub mod warnings;

use mailmerge_common::{Recipient, RenderedMessage, Template};

pub use render::{render, unresolved_variables};
pub use warnings::{PreviewWarning, VariableLocation, preview_warnings};

/// Render the subject and body of `template` for one recipient.
///
/// Placeholders are substituted in the Markdown source, which is then
/// rendered to the HTML and plain-text parts. Unresolved placeholders are
/// left verbatim; use [`preview_warnings`] to surface them.
#[must_use]
pub fn render_message(template: &Template, recipient: &Recipient) -> RenderedMessage {
    let markdown = render(&template.body, recipient);

    RenderedMessage {
        to: recipient.email().to_string(),
        subject: render(&template.subject, recipient),
        html_body: body::to_html(&markdown),
        text_body: body::to_text(&markdown),
        attachments: template.attachments.clone(),
    }
}
