//! Recipient rosters: delimited text where the first column holds the email
//! address and every column is available to templates.

use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
    sync::{Arc, LazyLock},
};

use ahash::AHashMap;
use mailmerge_tracing::traced;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{error::RosterError, internal};

#[allow(clippy::unwrap_used, reason = "The pattern is a valid constant")]
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9._%-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})$").unwrap());

/// One row of the roster. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    email: String,
    fields: AHashMap<String, String>,
}

impl Recipient {
    /// Build a recipient from its column values. The `email` field is always
    /// present in [`Self::get`], overriding any column of the same name.
    #[must_use]
    pub fn new(email: impl Into<String>, mut fields: AHashMap<String, String>) -> Self {
        let email = email.into();
        fields.insert("email".to_string(), email.clone());

        Self { email, fields }
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Look up a column value by its header name
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    #[must_use]
    pub const fn fields(&self) -> &AHashMap<String, String> {
        &self.fields
    }

    #[must_use]
    pub fn has_valid_email(&self) -> bool {
        EMAIL.is_match(&self.email)
    }
}

/// A parsed roster: the header row, in file order, and the recipient rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    pub columns: Arc<[String]>,
    pub rows: Vec<Recipient>,
}

impl Roster {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Work out the delimiter from the file extension, falling back to sniffing
/// the header line for a tab.
fn delimiter_for(path: &Path, header: &str) -> u8 {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match by_extension.as_deref() {
        Some("tsv" | "tab") => b'\t',
        Some("csv") => b',',
        _ if header.contains('\t') => b'\t',
        _ => b',',
    }
}

/// Load a roster from a CSV or TSV file.
///
/// # Errors
///
/// See [`parse_roster`]; additionally any error opening the file.
#[traced(instrument(level = tracing::Level::TRACE, err))]
pub fn load_roster(path: &Path) -> Result<Roster, RosterError> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = {
        let buffer = reader.fill_buf()?;
        let end = buffer
            .iter()
            .position(|&b| b == b'\n')
            .unwrap_or(buffer.len());
        String::from_utf8_lossy(&buffer[..end]).into_owned()
    };

    parse_roster(reader, delimiter_for(path, &header))
}

/// Parse a roster from delimited text with a header row.
///
/// The first column is treated as the email address whatever its header
/// says. Rows whose email is empty are dropped before validation. Cell
/// values are taken as written, so an address padded with whitespace is
/// reported as invalid.
///
/// # Errors
///
/// - [`RosterError::NoHeaders`] if there is no header row
/// - [`RosterError::NoRows`] if no row has an email
/// - [`RosterError::InvalidEmails`] listing every row with a malformed email
/// - [`RosterError::Csv`] for malformed input
pub fn parse_roster<R: Read>(input: R, delimiter: u8) -> Result<Roster, RosterError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(input);

    let columns: Arc<[String]> = reader
        .headers()?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>()
        .into();

    if columns.iter().all(String::is_empty) {
        return Err(RosterError::NoHeaders);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let email = record.get(0).unwrap_or_default();
        if email.is_empty() {
            continue;
        }

        let fields = columns
            .iter()
            .zip(record.iter())
            .map(|(column, value)| (column.clone(), value.to_string()))
            .collect();

        rows.push(Recipient::new(email, fields));
    }

    if rows.is_empty() {
        return Err(RosterError::NoRows);
    }

    let invalid: Vec<(usize, Recipient)> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| !row.has_valid_email())
        .map(|(index, row)| (index, row.clone()))
        .collect();

    if !invalid.is_empty() {
        return Err(RosterError::InvalidEmails(invalid));
    }

    internal!(
        level = DEBUG,
        "Parsed roster with {} columns and {} rows",
        columns.len(),
        rows.len()
    );

    Ok(Roster { columns, rows })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_first_column_is_email_regardless_of_header() {
        let input = "Address,name,team\nalice@example.com,Alice,red\nbob@example.org,Bob,blue\n";
        let roster = parse_roster(input.as_bytes(), b',').unwrap();

        assert_eq!(&*roster.columns, ["Address", "name", "team"]);
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.rows[0].email(), "alice@example.com");
        assert_eq!(roster.rows[0].get("name"), Some("Alice"));
        assert_eq!(roster.rows[0].get("Address"), Some("alice@example.com"));
        assert_eq!(roster.rows[1].get("email"), Some("bob@example.org"));
    }

    #[test]
    fn test_rows_without_email_are_skipped() {
        let input = "email,name\n,Nobody\ncarol@example.com,Carol\n\n";
        let roster = parse_roster(input.as_bytes(), b',').unwrap();

        assert_eq!(roster.len(), 1);
        assert_eq!(roster.rows[0].get("name"), Some("Carol"));
    }

    #[test]
    fn test_no_rows() {
        let input = "email,name\n,Nobody\n";
        let err = parse_roster(input.as_bytes(), b',').unwrap_err();
        assert!(matches!(err, RosterError::NoRows));
    }

    #[test]
    fn test_no_headers() {
        let err = parse_roster("".as_bytes(), b',').unwrap_err();
        assert!(matches!(err, RosterError::NoHeaders));
    }

    #[test]
    fn test_invalid_emails_are_all_reported() {
        let input = "email\nok@example.com\nnot-an-email\nalso@bad\nfine@example.net\n";
        let err = parse_roster(input.as_bytes(), b',').unwrap_err();

        let rows = match err {
            RosterError::InvalidEmails(rows) => rows,
            other => panic!("expected InvalidEmails, got {other:?}"),
        };
        let indices: Vec<usize> = rows.iter().map(|(index, _)| *index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(rows[0].1.email(), "not-an-email");
    }

    #[test]
    fn test_padded_email_is_invalid() {
        let input = "email,name\n alice@example.com,Alice\n   ,Blank\n";
        let err = parse_roster(input.as_bytes(), b',').unwrap_err();

        let RosterError::InvalidEmails(rows) = &err else {
            panic!("expected InvalidEmails, got {err:?}");
        };
        let emails: Vec<&str> = rows.iter().map(|(_, row)| row.email()).collect();
        assert_eq!(emails, vec![" alice@example.com", "   "]);
    }

    #[test]
    fn test_tab_separated() {
        let input = "email\tfirst name\ndave@example.com\tDave\n";
        let roster = parse_roster(input.as_bytes(), b'\t').unwrap();
        assert_eq!(roster.rows[0].get("first name"), Some("Dave"));
    }

    #[test]
    fn test_delimiter_detection() {
        assert_eq!(delimiter_for(Path::new("list.tsv"), "a,b"), b'\t');
        assert_eq!(delimiter_for(Path::new("list.CSV"), "a\tb"), b',');
        assert_eq!(delimiter_for(Path::new("list.txt"), "a\tb"), b'\t');
        assert_eq!(delimiter_for(Path::new("list"), "a,b"), b',');
    }

    #[test]
    fn test_load_roster_from_file() {
        let mut file = tempfile::Builder::new().suffix(".tsv").tempfile().unwrap();
        writeln!(file, "email\tname").unwrap();
        writeln!(file, "erin@example.com\tErin").unwrap();

        let roster = load_roster(file.path()).unwrap();
        assert_eq!(roster.rows[0].get("name"), Some("Erin"));
    }
}
