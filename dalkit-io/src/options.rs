//! Dataset open options.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// How a dataset file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoMode {
    /// Open an existing file; every write fails with `ReadOnly`.
    ReadOnly,
    /// Open an existing file for reading and writing.
    #[default]
    ReadWrite,
    /// Create a new file, replacing any existing one.
    Create,
    /// Create a new file; fail with `AlreadyExists` if one exists.
    CreateNew,
    /// Open the file if it exists, otherwise create it.
    OpenOrCreate,
}

impl IoMode {
    #[must_use]
    pub fn is_writable(self) -> bool {
        self != IoMode::ReadOnly
    }
}

/// Storage layout of a dataset, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// Groups, tables and arrays.
    #[default]
    Hierarchical,
    /// Tables only, directly under the root.
    Columnar,
}

impl StorageKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            StorageKind::Hierarchical => 0,
            StorageKind::Columnar => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(StorageKind::Hierarchical),
            1 => Some(StorageKind::Columnar),
            _ => None,
        }
    }
}

/// Options for [`Dataset::open_with_options`](crate::Dataset::open_with_options).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetOptions {
    pub mode: IoMode,
    /// Used when the file is created; an existing file keeps its own kind.
    pub storage_kind: StorageKind,
    /// Call `fsync` on the file before it replaces the previous version.
    pub sync_on_flush: bool,
    /// Rows per block for [`Table::scan`](crate::Table::scan) when no size
    /// is given.
    pub scan_buffer_rows: usize,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            mode: IoMode::ReadWrite,
            storage_kind: StorageKind::Hierarchical,
            sync_on_flush: true,
            scan_buffer_rows: 1024,
        }
    }
}

impl DatasetOptions {
    #[must_use]
    pub fn with_mode(mut self, mode: IoMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_storage_kind(mut self, storage_kind: StorageKind) -> Self {
        self.storage_kind = storage_kind;
        self
    }

    #[must_use]
    pub fn with_sync_on_flush(mut self, sync: bool) -> Self {
        self.sync_on_flush = sync;
        self
    }

    #[must_use]
    pub fn with_scan_buffer_rows(mut self, rows: usize) -> Self {
        self.scan_buffer_rows = rows;
        self
    }

    /// Loads options from a JSON file. Missing fields keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Loads options from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string is not valid JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
