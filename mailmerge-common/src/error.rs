//! Error types for loading the inputs of a batch: the recipient roster and
//! the attachments.

use std::io;

use thiserror::Error;

use crate::recipient::Recipient;

/// Errors that can occur while reading a recipient roster.
#[derive(Debug, Error)]
pub enum RosterError {
    /// The header row is missing or has no columns.
    #[error("Invalid headers provided")]
    NoHeaders,

    /// Every row was empty or had an empty email column.
    #[error("No recipient rows found")]
    NoRows,

    /// One or more rows carry something that is not an email address in the
    /// first column. Holds the zero-based row index of every offender.
    #[error(
        "Invalid email provided in {} row(s). Please make sure that the email address is the first column of your CSV.",
        .0.len()
    )]
    InvalidEmails(Vec<(usize, Recipient)>),

    /// The file could not be parsed as delimited text.
    #[error("Malformed roster: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error reading roster: {0}")]
    Io(#[from] io::Error),
}

/// Errors that can occur while preparing attachments for a batch.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Attachment {filename} is {size} bytes, the limit is {limit} bytes")]
    TooLarge {
        filename: String,
        size: usize,
        limit: usize,
    },

    #[error("{count} attachments given, at most {limit} are allowed")]
    TooMany { count: usize, limit: usize },

    #[error("Failed to read attachment {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}
