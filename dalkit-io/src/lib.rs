//! dalkit-io: Dataset storage for dalkit.
//!
//! This crate provides the node tree (datasets, groups, tables and arrays),
//! filtered table queries, and the native single-file container, read
//! through memory-mapped files via memmap2. With the `hdf5` feature a
//! dataset can be exported to and imported from HDF5 files.
//!

mod array;
mod attrs;
mod codec;
mod dataset;
mod error;
mod group;
#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod options;
pub mod query;
mod reader;
mod table;
mod tree;

pub use array::Array;
pub use attrs::Attributes;
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use group::Group;
pub use options::{DatasetOptions, IoMode, StorageKind};
pub use query::{query, ColumnView};
pub use reader::MappedFileReader;
pub use table::{Table, TableScan, TableState};

#[cfg(feature = "hdf5")]
pub use crate::hdf5::{export_hdf5, import_hdf5};

pub use dalkit_core::{
    Attribute, Buffer, Char, Column, Complex, Element, ElementType, NodeKind, Predicate, Region,
    Row, Schema,
};
