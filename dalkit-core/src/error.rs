//! Error types for dalkit-core.

use crate::types::{ElementType, NodeKind};
use thiserror::Error;

/// Result type alias for dalkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every dalkit node operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A node, attribute or file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A node or file with this name already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The named node exists but is of a different kind.
    #[error("'{name}' is a {found}, not a {expected}")]
    KindMismatch {
        name: String,
        expected: NodeKind,
        found: NodeKind,
    },

    /// A value does not have the element type required by its target.
    #[error("type mismatch for '{name}': expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: ElementType,
        found: ElementType,
    },

    /// Row values do not conform to the table schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The schema can no longer change because rows exist.
    #[error("schema of table '{0}' is locked: rows have been appended")]
    SchemaLocked(String),

    /// A region lies outside the current array dimensions.
    #[error("region out of bounds: {0}")]
    OutOfBounds(String),

    /// A row range lies outside the table.
    #[error("{count} rows from index {start} out of range for table with {rows} rows")]
    OutOfRange { start: usize, count: usize, rows: usize },

    /// Data element count does not match the target shape.
    #[error("shape mismatch: expected {expected} elements, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    /// Dimensions or chunk sizes are not usable.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// The array cannot grow to the requested dimensions.
    #[error("array '{0}' cannot be extended to the requested dimensions")]
    NotExtensible(String),

    /// Malformed predicate text.
    #[error("parse error: {0}")]
    ParseError(String),

    /// A column name that is not part of the table schema.
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// Unreadable, corrupt or unsupported backing file.
    #[error("format error: {0}")]
    FormatError(String),

    /// The dataset (or this handle) has been closed.
    #[error("dataset is closed")]
    Closed,

    /// Write attempted on a dataset opened read-only.
    #[error("dataset is read-only: {0}")]
    ReadOnly(String),

    /// Operation not available for the dataset's storage kind.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl Error {
    /// Returns true if the error leaves the owning dataset unusable.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Closed | Error::FormatError(_))
    }
}

impl From<sqlparser::parser::ParserError> for Error {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        Error::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_errors() {
        assert!(Error::Closed.is_terminal());
        assert!(Error::FormatError("bad magic".into()).is_terminal());
        assert!(!Error::NotFound("x".into()).is_terminal());
    }

    #[test]
    fn test_out_of_range_message() {
        let err = Error::OutOfRange {
            start: 3,
            count: 4,
            rows: 5,
        };
        assert_eq!(
            err.to_string(),
            "4 rows from index 3 out of range for table with 5 rows"
        );
    }
}
