//! Filtered column queries.
//!
//! A query binds its predicate to the table schema once, then makes a single
//! forward pass over the rows. The result is a detached [`ColumnView`]: later
//! appends to the table do not change it.

use crate::table::{Table, TableData};
use crate::Result;
use dalkit_core::{Buffer, Element, Error, Predicate};

/// Columns of the rows that matched a query, in table row order.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnView {
    names: Vec<String>,
    columns: Vec<Buffer>,
    rows: Vec<usize>,
}

impl ColumnView {
    /// Selected column names, in request order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Table indices of the matching rows.
    #[must_use]
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Number of matching rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one selected column for every matching row.
    ///
    /// # Errors
    /// Returns `UnknownColumn` if the column was not selected.
    pub fn column(&self, name: &str) -> dalkit_core::Result<&Buffer> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    /// Typed borrow of a selected column, `None` if absent or of another type.
    #[must_use]
    pub fn column_as<T: Element>(&self, name: &str) -> Option<&[T]> {
        self.column(name).ok()?.as_slice::<T>()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Buffer)> {
        self.names.iter().map(String::as_str).zip(&self.columns)
    }
}

/// Runs a text query against `table`.
///
/// # Errors
/// Returns `ParseError`, `UnknownColumn` or `TypeMismatch`.
pub fn query(table: &Table, columns: &[&str], predicate: &str) -> Result<ColumnView> {
    table.query(columns, predicate)
}

pub(crate) fn select(
    table: &TableData,
    columns: &[&str],
    predicate: &Predicate,
) -> dalkit_core::Result<ColumnView> {
    let names: Vec<String> = if columns.is_empty() {
        table.schema.names()
    } else {
        columns.iter().map(|c| (*c).to_string()).collect()
    };
    let indices = names
        .iter()
        .map(|n| {
            table
                .schema
                .index_of(n)
                .ok_or_else(|| Error::UnknownColumn(n.clone()))
        })
        .collect::<dalkit_core::Result<Vec<_>>>()?;
    let bound = predicate.bind(&table.schema)?;

    let rows: Vec<usize> = (0..table.rows)
        .filter(|&row| bound.matches(&table.columns, row))
        .collect();

    let declared = table.schema.columns();
    let columns = indices
        .iter()
        .map(|&i| table.columns[i].gather_blocks(&rows, declared[i].element_count))
        .collect();
    Ok(ColumnView {
        names,
        columns,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dalkit_core::{Column, ElementType, Schema};

    fn antenna_table() -> TableData {
        let schema = Schema::from_columns([
            Column::new("ANTENNA1", ElementType::I32),
            Column::new("ANTENNA2", ElementType::I32),
            Column::array("UVW", ElementType::F64, 3),
        ])
        .unwrap();
        let mut table = TableData::new(schema);
        table
            .append_rows(
                &[
                    Buffer::I32(vec![0, 0, 1, 1, 2]),
                    Buffer::I32(vec![1, 2, 0, 2, 0]),
                    Buffer::F64((0..15).map(f64::from).collect()),
                ],
                5,
            )
            .unwrap();
        table
    }

    #[test]
    fn test_select_matching_rows() {
        let table = antenna_table();
        let p = Predicate::parse("ANTENNA1 = 1 AND ANTENNA2 = 0").unwrap();
        let view = select(&table, &["ANTENNA1", "UVW"], &p).unwrap();
        assert_eq!(view.rows(), &[2]);
        assert_eq!(view.column_as::<i32>("ANTENNA1"), Some(&[1][..]));
        assert_eq!(view.column("UVW").unwrap(), &Buffer::F64(vec![6.0, 7.0, 8.0]));
        assert!(matches!(view.column("ANTENNA2"), Err(Error::UnknownColumn(_))));
    }

    #[test]
    fn test_no_match_keeps_types() {
        let table = antenna_table();
        let view = select(&table, &[], &Predicate::eq("ANTENNA1", 9)).unwrap();
        assert!(view.is_empty());
        assert_eq!(view.names(), &["ANTENNA1", "ANTENNA2", "UVW"]);
        assert_eq!(view.column("UVW").unwrap(), &Buffer::F64(vec![]));
    }

    #[test]
    fn test_unknown_selected_column() {
        let table = antenna_table();
        assert!(matches!(
            select(&table, &["TIME"], &Predicate::All),
            Err(Error::UnknownColumn(c)) if c == "TIME"
        ));
    }
}
