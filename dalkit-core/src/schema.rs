//! Table schemas and rows.

use crate::buffer::Buffer;
use crate::types::{Element, ElementType};
use crate::{Error, Result};
use std::ops::Index;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One column declaration: name, element type and elements per cell.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Column {
    pub name: String,
    pub element_type: ElementType,
    pub element_count: usize,
}

impl Column {
    /// A single-element column.
    pub fn new(name: impl Into<String>, element_type: ElementType) -> Self {
        Self::array(name, element_type, 1)
    }

    /// A column whose cells hold `element_count` values.
    pub fn array(name: impl Into<String>, element_type: ElementType, element_count: usize) -> Self {
        Self {
            name: name.into(),
            element_type,
            element_count,
        }
    }
}

/// Ordered list of uniquely named columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema from column declarations.
    ///
    /// # Errors
    /// Returns `AlreadyExists` on duplicate names, `InvalidShape` on a zero
    /// element count.
    pub fn from_columns(columns: impl IntoIterator<Item = Column>) -> Result<Self> {
        let mut schema = Self::new();
        for column in columns {
            schema.push(column)?;
        }
        Ok(schema)
    }

    /// Builder form of [`Schema::push`].
    ///
    /// # Errors
    /// See [`Schema::push`].
    pub fn with_column(mut self, column: Column) -> Result<Self> {
        self.push(column)?;
        Ok(self)
    }

    /// Appends a column declaration.
    ///
    /// # Errors
    /// Returns `AlreadyExists` on a duplicate name, `InvalidShape` on a zero
    /// element count.
    pub fn push(&mut self, column: Column) -> Result<()> {
        if column.element_count == 0 {
            return Err(Error::InvalidShape(format!(
                "column '{}' must hold at least one element per row",
                column.name
            )));
        }
        if self.index_of(&column.name).is_some() {
            return Err(Error::AlreadyExists(format!("column '{}'", column.name)));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Removes a column declaration.
    ///
    /// # Errors
    /// Returns `UnknownColumn` if absent.
    pub fn remove(&mut self, name: &str) -> Result<Column> {
        let index = self
            .index_of(name)
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))?;
        Ok(self.columns.remove(index))
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Looks up a column by name.
    ///
    /// # Errors
    /// Returns `UnknownColumn` if absent.
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.index_of(name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Checks one row tuple against the schema.
    ///
    /// # Errors
    /// Returns `SchemaMismatch` on wrong arity, element type or element count.
    pub fn check_row(&self, values: &[Buffer]) -> Result<()> {
        self.check_columns(values, 1)
    }

    /// Checks flat per-column buffers holding `count` rows.
    ///
    /// # Errors
    /// Returns `SchemaMismatch` on wrong arity, element type or element count.
    pub fn check_columns(&self, values: &[Buffer], count: usize) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::SchemaMismatch(
                "table has no columns".to_string(),
            ));
        }
        if values.len() != self.columns.len() {
            return Err(Error::SchemaMismatch(format!(
                "expected {} columns, found {}",
                self.columns.len(),
                values.len()
            )));
        }
        for (column, value) in self.columns.iter().zip(values) {
            if value.element_type() != column.element_type {
                return Err(Error::SchemaMismatch(format!(
                    "column '{}' holds {}, found {}",
                    column.name,
                    column.element_type,
                    value.element_type()
                )));
            }
            let expected = column.element_count.checked_mul(count).ok_or_else(|| {
                Error::SchemaMismatch(format!(
                    "column '{}': {count} rows of {} values overflow",
                    column.name, column.element_count
                ))
            })?;
            if value.len() != expected {
                return Err(Error::SchemaMismatch(format!(
                    "column '{}' expects {} values for {} rows, found {}",
                    column.name,
                    expected,
                    count,
                    value.len()
                )));
            }
        }
        Ok(())
    }
}

/// One table row: a cell buffer per column, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(Vec<Buffer>);

impl Row {
    #[must_use]
    pub fn new(values: Vec<Buffer>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn values(&self) -> &[Buffer] {
        &self.0
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Buffer> {
        self.0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Buffer> {
        self.0.get(index)
    }

    /// First element of cell `index` as `T`, if present and of that type.
    #[must_use]
    pub fn value<T: Element>(&self, index: usize) -> Option<T> {
        self.get(index)?.as_slice::<T>()?.first().cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Index<usize> for Row {
    type Output = Buffer;

    fn index(&self, index: usize) -> &Buffer {
        &self.0[index]
    }
}
