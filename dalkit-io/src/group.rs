//! Group handles.

use crate::array::{Array, ArrayData};
use crate::dataset::Handle;
use crate::options::StorageKind;
use crate::table::{Table, TableData};
use crate::tree::{GroupData, Node};
use crate::Result;
use dalkit_core::{ElementType, Error, NodeKind, Schema};
use log::debug;

/// A named container of groups, tables and arrays.
pub struct Group {
    handle: Handle,
}

impl Group {
    pub(crate) fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Last path segment, `/` for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Slash-separated path from the root.
    #[must_use]
    pub fn path(&self) -> String {
        self.handle.path()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    fn insert(&self, name: &str, node: Node) -> Result<Handle> {
        let kind = node.kind();
        self.handle.write(|group, storage| {
            if storage == StorageKind::Columnar && kind != NodeKind::Table {
                return Err(Error::Unsupported(format!(
                    "columnar datasets hold tables only, cannot create {kind} '{name}'"
                )));
            }
            group.as_group_mut(&[])?.insert(name, node)
        })?;
        let child = self.handle.child(name);
        debug!("Created {kind} {}", child.path());
        Ok(child)
    }

    /// Creates a child group.
    ///
    /// # Errors
    /// Returns `AlreadyExists` on a name collision and `Unsupported` in a
    /// columnar dataset.
    pub fn create_group(&self, name: &str) -> Result<Group> {
        let handle = self.insert(name, Node::Group(GroupData::default()))?;
        Ok(Group::from_handle(handle))
    }

    /// Creates a child table. Without a schema the table starts with no
    /// columns; add them with [`Table::add_column`].
    ///
    /// # Errors
    /// Returns `AlreadyExists` on a name collision.
    pub fn create_table(&self, name: &str, schema: Option<Schema>) -> Result<Table> {
        let data = TableData::new(schema.unwrap_or_default());
        let handle = self.insert(name, Node::Table(data))?;
        Ok(Table::from_handle(handle))
    }

    /// Creates a child array filled with zeros (empty strings for `Str`).
    ///
    /// With `chunk_dims` the array is extensible along every dimension.
    ///
    /// # Errors
    /// Returns `InvalidShape` for an empty or zero-sized shape,
    /// `ShapeMismatch` if the chunk rank differs, `AlreadyExists` on a name
    /// collision and `Unsupported` in a columnar dataset.
    pub fn create_array(
        &self,
        name: &str,
        dims: &[usize],
        element_type: ElementType,
        chunk_dims: Option<&[usize]>,
    ) -> Result<Array> {
        let data = ArrayData::new(dims, element_type, chunk_dims)?;
        let handle = self.insert(name, Node::Array(data))?;
        Ok(Array::from_handle(handle))
    }

    fn open_child(&self, name: &str, expected: NodeKind) -> Result<Handle> {
        self.handle.read(|node, _| {
            node.as_group(&[])?.child(name, expected)?;
            Ok(())
        })?;
        Ok(self.handle.child(name))
    }

    /// # Errors
    /// Returns `NotFound` if absent, `KindMismatch` if `name` is not a group.
    pub fn open_group(&self, name: &str) -> Result<Group> {
        Ok(Group::from_handle(self.open_child(name, NodeKind::Group)?))
    }

    /// # Errors
    /// Returns `NotFound` if absent, `KindMismatch` if `name` is not a table.
    pub fn open_table(&self, name: &str) -> Result<Table> {
        Ok(Table::from_handle(self.open_child(name, NodeKind::Table)?))
    }

    /// # Errors
    /// Returns `NotFound` if absent, `KindMismatch` if `name` is not an array.
    pub fn open_array(&self, name: &str) -> Result<Array> {
        Ok(Array::from_handle(self.open_child(name, NodeKind::Array)?))
    }

    /// Names and kinds of the immediate children, in name order.
    ///
    /// # Errors
    /// Returns `Closed` after close.
    pub fn list(&self) -> Result<Vec<(String, NodeKind)>> {
        self.handle.read(|node, _| Ok(node.as_group(&[])?.list()))
    }

    /// # Errors
    /// Returns `Closed` after close.
    pub fn contains(&self, name: &str) -> Result<bool> {
        self.handle
            .read(|node, _| Ok(node.as_group(&[])?.children.contains_key(name)))
    }

    /// Flushes the dataset and releases this handle.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn close(&self) -> Result<()> {
        self.handle.close()
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group").field("path", &self.path()).finish()
    }
}
