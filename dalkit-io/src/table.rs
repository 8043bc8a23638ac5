//! Append-only tables.
//!
//! Rows are stored column-major: one flat [`Buffer`] per column holding
//! `rows * element_count` values. Row indices are zero-based and never
//! change once assigned.

use crate::dataset::Handle;
use crate::query::{self, ColumnView};
use crate::Result;
use dalkit_core::{AttributeStore, Buffer, Column, ElementType, Error, Predicate, Row, Schema};

/// Lifecycle of a table handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    /// No columns declared yet.
    Unscheduled,
    /// Columns declared; rows may be appended.
    SchemaFixed,
    /// The handle or its dataset was closed.
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TableData {
    pub(crate) attributes: AttributeStore,
    pub(crate) schema: Schema,
    pub(crate) columns: Vec<Buffer>,
    pub(crate) rows: usize,
}

impl TableData {
    pub(crate) fn new(schema: Schema) -> Self {
        let columns = schema
            .columns()
            .iter()
            .map(|c| Buffer::empty(c.element_type))
            .collect();
        Self {
            attributes: AttributeStore::new(),
            schema,
            columns,
            rows: 0,
        }
    }

    pub(crate) fn add_column(&mut self, column: Column) -> dalkit_core::Result<()> {
        if self.rows > 0 {
            return Err(Error::SchemaLocked(format!(
                "cannot add column '{}' to a table with {} rows",
                column.name, self.rows
            )));
        }
        let element_type = column.element_type;
        self.schema.push(column)?;
        self.columns.push(Buffer::empty(element_type));
        Ok(())
    }

    pub(crate) fn remove_column(&mut self, name: &str) -> dalkit_core::Result<()> {
        if self.rows > 0 {
            return Err(Error::SchemaLocked(format!(
                "cannot remove column '{name}' from a table with {} rows",
                self.rows
            )));
        }
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))?;
        self.schema.remove(name)?;
        self.columns.remove(index);
        Ok(())
    }

    /// Validates every column before touching any, so a failed append
    /// leaves the table unchanged.
    pub(crate) fn append_rows(&mut self, values: &[Buffer], count: usize) -> dalkit_core::Result<()> {
        self.schema.check_columns(values, count)?;
        let rows = self.rows.checked_add(count).ok_or_else(|| {
            Error::SchemaMismatch(format!("{count} more rows overflow the row count {}", self.rows))
        })?;
        for (column, value) in self.columns.iter_mut().zip(values) {
            column.extend_from(value);
        }
        self.rows = rows;
        Ok(())
    }

    pub(crate) fn check_range(&self, start: usize, count: usize) -> dalkit_core::Result<()> {
        match start.checked_add(count) {
            Some(end) if end <= self.rows => Ok(()),
            _ => Err(Error::OutOfRange {
                start,
                count,
                rows: self.rows,
            }),
        }
    }

    pub(crate) fn read_rows(&self, start: usize, count: usize) -> dalkit_core::Result<Vec<Row>> {
        self.check_range(start, count)?;
        Ok((start..start + count)
            .map(|row| {
                Row::new(
                    self.schema
                        .columns()
                        .iter()
                        .zip(&self.columns)
                        .map(|(c, data)| {
                            let width = c.element_count;
                            data.slice(row * width..(row + 1) * width)
                        })
                        .collect(),
                )
            })
            .collect())
    }

    pub(crate) fn column(&self, name: &str) -> dalkit_core::Result<Buffer> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))?;
        Ok(self.columns[index].clone())
    }
}

/// Handle to a table node.
pub struct Table {
    handle: Handle,
}

impl Table {
    pub(crate) fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

    fn read<R>(&self, f: impl FnOnce(&TableData) -> dalkit_core::Result<R>) -> Result<R> {
        let path = self.handle.segments();
        self.handle.read(|node, _| f(node.as_table(path)?))
    }

    fn write<R>(&self, f: impl FnOnce(&mut TableData) -> dalkit_core::Result<R>) -> Result<R> {
        let path = self.handle.segments();
        self.handle.write(|node, _| f(node.as_table_mut(path)?))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    #[must_use]
    pub fn path(&self) -> String {
        self.handle.path()
    }

    /// Current lifecycle state; never fails.
    #[must_use]
    pub fn state(&self) -> TableState {
        match self.read(|t| Ok(t.schema.is_empty())) {
            Ok(true) => TableState::Unscheduled,
            Ok(false) => TableState::SchemaFixed,
            Err(_) => TableState::Closed,
        }
    }

    /// Declares a new column.
    ///
    /// # Errors
    /// Returns `AlreadyExists` on a duplicate name, `InvalidShape` for a zero
    /// element count and `SchemaLocked` once the table holds rows.
    pub fn add_column(&self, name: &str, element_type: ElementType, element_count: usize) -> Result<()> {
        self.write(|t| t.add_column(Column::array(name, element_type, element_count)))
    }

    /// Drops a column declaration.
    ///
    /// # Errors
    /// Returns `UnknownColumn` if absent and `SchemaLocked` once the table
    /// holds rows.
    pub fn remove_column(&self, name: &str) -> Result<()> {
        self.write(|t| t.remove_column(name))
    }

    /// Appends one row: a buffer per column in declaration order, each
    /// holding exactly the column's element count.
    ///
    /// # Errors
    /// Returns `SchemaMismatch` on wrong arity, element type or count.
    pub fn append_row(&self, values: &[Buffer]) -> Result<()> {
        self.write(|t| t.append_rows(values, 1))
    }

    /// Appends `count` rows from one flat buffer per column, each holding
    /// `count * element_count` values. All rows are appended or none.
    ///
    /// # Errors
    /// Returns `SchemaMismatch` on wrong arity, element type or count.
    pub fn append_rows(&self, values: &[Buffer], count: usize) -> Result<()> {
        self.write(|t| t.append_rows(values, count))
    }

    /// Reads `count` rows starting at `start`, in index order.
    ///
    /// # Errors
    /// Returns `OutOfRange` if `start + count` exceeds the row count.
    pub fn read_rows(&self, start: usize, count: usize) -> Result<Vec<Row>> {
        self.read(|t| t.read_rows(start, count))
    }

    /// Number of rows, including appends not yet flushed.
    ///
    /// # Errors
    /// Returns `Closed` after close.
    pub fn number_of_rows(&self) -> Result<usize> {
        self.read(|t| Ok(t.rows))
    }

    /// Column declarations in order.
    ///
    /// # Errors
    /// Returns `Closed` after close.
    pub fn list_columns(&self) -> Result<Vec<Column>> {
        self.read(|t| Ok(t.schema.columns().to_vec()))
    }

    /// # Errors
    /// Returns `Closed` after close.
    pub fn schema(&self) -> Result<Schema> {
        self.read(|t| Ok(t.schema.clone()))
    }

    /// Every value of one column, row-major across multi-element cells.
    ///
    /// # Errors
    /// Returns `UnknownColumn` if absent.
    pub fn column(&self, name: &str) -> Result<Buffer> {
        self.read(|t| t.column(name))
    }

    /// Iterates over the table in blocks of `buffer_rows` rows, or the
    /// dataset's `scan_buffer_rows` when `None`. The row count is fixed
    /// when the scan starts.
    ///
    /// # Errors
    /// Returns `Closed` after close.
    pub fn scan(&self, buffer_rows: Option<usize>) -> Result<TableScan<'_>> {
        let path = self.handle.segments();
        let (total, default_rows) = self.handle.read(|node, state| {
            Ok((node.as_table(path)?.rows, state.scan_buffer_rows()))
        })?;
        Ok(TableScan {
            table: self,
            next: 0,
            total,
            buffer_rows: buffer_rows.unwrap_or(default_rows).max(1),
        })
    }

    /// Selects `columns` of the rows matching `predicate` text. An empty
    /// column list selects every column; blank text matches every row.
    ///
    /// # Errors
    /// Returns `ParseError`, `UnknownColumn` or `TypeMismatch`.
    pub fn query(&self, columns: &[&str], predicate: &str) -> Result<ColumnView> {
        let predicate = Predicate::parse(predicate)?;
        self.query_with(columns, &predicate)
    }

    /// Like [`Table::query`] with a structured predicate.
    ///
    /// # Errors
    /// Returns `UnknownColumn` or `TypeMismatch`.
    pub fn query_with(&self, columns: &[&str], predicate: &Predicate) -> Result<ColumnView> {
        self.read(|t| query::select(t, columns, predicate))
    }

    /// Flushes the dataset and releases this handle.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn close(&self) -> Result<()> {
        self.handle.close()
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").field("path", &self.path()).finish()
    }
}

/// Block-wise row iterator returned by [`Table::scan`].
pub struct TableScan<'a> {
    table: &'a Table,
    next: usize,
    total: usize,
    buffer_rows: usize,
}

impl Iterator for TableScan<'_> {
    type Item = Result<Vec<Row>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let count = self.buffer_rows.min(self.total - self.next);
        let block = self.table.read_rows(self.next, count);
        match block {
            Ok(_) => self.next += count,
            // stop after reporting the failure
            Err(_) => self.next = self.total,
        }
        Some(block)
    }
}
