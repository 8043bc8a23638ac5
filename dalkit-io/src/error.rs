//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
///
/// Storage-level failures carry the shared [`dalkit_core::Error`] taxonomy;
/// operating system and HDF5 failures are kept as their own variants.
#[derive(Error, Debug)]
pub enum Error {
    /// Node, schema or format error from the shared taxonomy.
    #[error(transparent)]
    Core(#[from] dalkit_core::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed options file.
    #[error("invalid options: {0}")]
    Config(#[from] serde_json::Error),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl Error {
    /// The taxonomy error, if this is one.
    #[must_use]
    pub fn core(&self) -> Option<&dalkit_core::Error> {
        match self {
            Error::Core(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true for `Closed` and `FormatError`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.core().is_some_and(dalkit_core::Error::is_terminal)
    }

    pub(crate) fn format(message: impl Into<String>) -> Self {
        Error::Core(dalkit_core::Error::FormatError(message.into()))
    }
}

/// Maps a failed file open to `NotFound` when the file is missing and to
/// `FormatError` when it exists but cannot be read as a dataset.
pub(crate) fn open_error(path: &std::path::Path, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::Core(dalkit_core::Error::NotFound(path.display().to_string()))
    } else {
        Error::format(format!("{}: cannot read dataset: {err}", path.display()))
    }
}
