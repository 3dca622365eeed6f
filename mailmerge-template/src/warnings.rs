//! Checks run over a rendered preview before a batch is sent. Warnings never
//! block a send; they are surfaced so the author can double check.

use std::{fmt, sync::LazyLock};

use regex::Regex;
use url::Url;

use crate::{body::to_plain, render::unresolved_variables};

#[allow(clippy::unwrap_used, reason = "The pattern is a valid constant")]
static MENTIONS_ATTACHMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\battachments?\b|\battached\b").unwrap());

const TRACKING_PARAMETERS: [&str; 3] = ["utm_source", "utm_medium", "utm_campaign"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableLocation {
    Subject,
    Body,
}

impl fmt::Display for VariableLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Subject => "subject",
            Self::Body => "body",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewWarning {
    /// A link is missing one of the `utm_*` campaign tracking parameters
    CheckLink { href: String },
    /// The body talks about an attachment but nothing is attached
    Attachment,
    /// A placeholder was not resolved for this recipient
    Variable {
        name: String,
        location: VariableLocation,
    },
}

impl fmt::Display for PreviewWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckLink { href } => {
                write!(f, "Link {href} is missing utm_source/utm_medium/utm_campaign")
            }
            Self::Attachment => f.write_str("The body mentions an attachment but none is attached"),
            Self::Variable { name, location } => {
                write!(f, "Variable {{{{{name}}}}} in the {location} has no matching column")
            }
        }
    }
}

fn has_tracking_parameters(href: &str) -> bool {
    let Ok(url) = Url::parse(href) else {
        return false;
    };

    TRACKING_PARAMETERS.iter().all(|parameter| {
        url.query_pairs()
            .any(|(key, value)| key == *parameter && !value.is_empty())
    })
}

/// Inspect a rendered subject and Markdown body.
///
/// Links are taken from the Markdown link syntax. The attachment and
/// variable checks run over the plain-text rendering, so markup around a
/// placeholder does not hide it.
///
/// Warnings are returned in a stable order: links, then the attachment
/// check, then unresolved variables in the subject and finally in the body.
#[must_use]
pub fn preview_warnings(subject: &str, body: &str, attachments: usize) -> Vec<PreviewWarning> {
    let plain = to_plain(body);

    let mut warnings: Vec<PreviewWarning> = plain
        .links
        .into_iter()
        .filter(|href| !has_tracking_parameters(href))
        .map(|href| PreviewWarning::CheckLink { href })
        .collect();

    if attachments == 0 && MENTIONS_ATTACHMENT.is_match(&plain.text) {
        warnings.push(PreviewWarning::Attachment);
    }

    for (text, location) in [
        (subject, VariableLocation::Subject),
        (plain.text.as_str(), VariableLocation::Body),
    ] {
        warnings.extend(
            unresolved_variables(text)
                .into_iter()
                .map(|name| PreviewWarning::Variable { name, location }),
        );
    }

    warnings
}
