//! Record-Line Codec
//!
//! Every durable byte in the store — WAL entries and segment lines alike —
//! is a single UTF-8 text line of the form `key,value\n`. This module owns
//! that format: rendering, parsing, and the validation rules that keep it
//! unambiguous.
//!
//! # Format constraints
//!
//! - Keys and values are non-empty.
//! - Neither may contain the field separator `,` or the line terminator
//!   `\n` — a line must split into exactly two fields.
//!
//! Validation failures never touch disk: the engine rejects offending
//! input before any WAL or memtable mutation. Parse failures, by contrast,
//! indicate on-disk corruption and are treated as integrity errors by the
//! callers in [`crate::wal`] and [`crate::segment`].

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use thiserror::Error;

/// Field separator between key and value.
pub const FIELD_SEPARATOR: char = ',';

/// Line terminator after each record.
pub const LINE_TERMINATOR: char = '\n';

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors raised by record validation and parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// Key is the empty string.
    #[error("key is empty")]
    EmptyKey,

    /// Value is the empty string.
    #[error("value is empty")]
    EmptyValue,

    /// Key contains `,` or `\n`.
    #[error("key contains a reserved delimiter")]
    DelimiterInKey,

    /// Value contains `,` or `\n`.
    #[error("value contains a reserved delimiter")]
    DelimiterInValue,

    /// An on-disk line did not split into exactly `key,value`.
    #[error("malformed record line: {0:?}")]
    MalformedLine(String),
}

// ------------------------------------------------------------------------------------------------
// Codec
// ------------------------------------------------------------------------------------------------

/// Renders a key-value pair as a record line, terminator included.
pub fn format_entry(key: &str, value: &str) -> String {
    let mut line = String::with_capacity(key.len() + value.len() + 2);
    line.push_str(key);
    line.push(FIELD_SEPARATOR);
    line.push_str(value);
    line.push(LINE_TERMINATOR);
    line
}

/// Parses one record line into `(key, value)`.
///
/// Accepts the line with or without its trailing terminator. A line with
/// no separator, an empty field, or more than one separator is corrupt.
pub fn parse_line(line: &str) -> Result<(String, String), RecordError> {
    let body = line.strip_suffix(LINE_TERMINATOR).unwrap_or(line);

    let (key, value) = body
        .split_once(FIELD_SEPARATOR)
        .ok_or_else(|| RecordError::MalformedLine(body.to_string()))?;

    if key.is_empty() || value.is_empty() || value.contains(FIELD_SEPARATOR) {
        return Err(RecordError::MalformedLine(body.to_string()));
    }

    Ok((key.to_string(), value.to_string()))
}

// ------------------------------------------------------------------------------------------------
// Validation
// ------------------------------------------------------------------------------------------------

/// Validates a key against the format constraints.
pub fn validate_key(key: &str) -> Result<(), RecordError> {
    if key.is_empty() {
        return Err(RecordError::EmptyKey);
    }
    if key.contains(FIELD_SEPARATOR) || key.contains(LINE_TERMINATOR) {
        return Err(RecordError::DelimiterInKey);
    }
    Ok(())
}

/// Validates a full key-value pair against the format constraints.
pub fn validate(key: &str, value: &str) -> Result<(), RecordError> {
    validate_key(key)?;
    if value.is_empty() {
        return Err(RecordError::EmptyValue);
    }
    if value.contains(FIELD_SEPARATOR) || value.contains(LINE_TERMINATOR) {
        return Err(RecordError::DelimiterInValue);
    }
    Ok(())
}
