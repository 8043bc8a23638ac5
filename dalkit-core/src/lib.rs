//! dalkit-core: Core types for hierarchical scientific datasets.
//!
//! This crate provides the storage-independent pieces shared by every dalkit
//! backend: the element type system, typed buffers, attribute stores, table
//! schemas, hyperslab regions and row predicates.
//!

mod buffer;
pub mod attribute;
pub mod error;
pub mod predicate;
pub mod region;
pub mod schema;
pub mod types;

pub use attribute::{Attribute, AttributeStore};
pub use buffer::Buffer;
pub use error::{Error, Result};
pub use predicate::{BoundPredicate, CompareOp, Literal, Predicate};
pub use region::Region;
pub use schema::{Column, Row, Schema};
pub use types::{Char, Element, ElementType, NodeKind};

pub use num_complex::Complex;
