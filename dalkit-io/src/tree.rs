//! In-memory node tree.
//!
//! A dataset holds its whole tree in memory between flushes. Children are
//! owned values keyed by name, so the tree cannot contain cycles and
//! listings come out in name order.

use crate::array::ArrayData;
use crate::table::TableData;
use dalkit_core::{AttributeStore, Error, NodeKind, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Group(GroupData),
    Table(TableData),
    Array(ArrayData),
}

impl Node {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            Node::Group(_) => NodeKind::Group,
            Node::Table(_) => NodeKind::Table,
            Node::Array(_) => NodeKind::Array,
        }
    }

    pub(crate) fn attributes(&self) -> &AttributeStore {
        match self {
            Node::Group(g) => &g.attributes,
            Node::Table(t) => &t.attributes,
            Node::Array(a) => &a.attributes,
        }
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut AttributeStore {
        match self {
            Node::Group(g) => &mut g.attributes,
            Node::Table(t) => &mut t.attributes,
            Node::Array(a) => &mut a.attributes,
        }
    }

    /// Walks `path` from this node.
    pub(crate) fn resolve(&self, path: &[String]) -> Result<&Node> {
        let mut node = self;
        for (depth, name) in path.iter().enumerate() {
            node = node
                .as_group(&path[..depth])?
                .children
                .get(name)
                .ok_or_else(|| Error::NotFound(join(&path[..=depth])))?;
        }
        Ok(node)
    }

    pub(crate) fn resolve_mut(&mut self, path: &[String]) -> Result<&mut Node> {
        let mut node = self;
        for (depth, name) in path.iter().enumerate() {
            node = node
                .as_group_mut(&path[..depth])?
                .children
                .get_mut(name)
                .ok_or_else(|| Error::NotFound(join(&path[..=depth])))?;
        }
        Ok(node)
    }

    pub(crate) fn as_group(&self, path: &[String]) -> Result<&GroupData> {
        match self {
            Node::Group(g) => Ok(g),
            other => Err(kind_mismatch(path, NodeKind::Group, other.kind())),
        }
    }

    pub(crate) fn as_group_mut(&mut self, path: &[String]) -> Result<&mut GroupData> {
        match self {
            Node::Group(g) => Ok(g),
            other => Err(kind_mismatch(path, NodeKind::Group, other.kind())),
        }
    }

    pub(crate) fn as_table(&self, path: &[String]) -> Result<&TableData> {
        match self {
            Node::Table(t) => Ok(t),
            other => Err(kind_mismatch(path, NodeKind::Table, other.kind())),
        }
    }

    pub(crate) fn as_table_mut(&mut self, path: &[String]) -> Result<&mut TableData> {
        match self {
            Node::Table(t) => Ok(t),
            other => Err(kind_mismatch(path, NodeKind::Table, other.kind())),
        }
    }

    pub(crate) fn as_array(&self, path: &[String]) -> Result<&ArrayData> {
        match self {
            Node::Array(a) => Ok(a),
            other => Err(kind_mismatch(path, NodeKind::Array, other.kind())),
        }
    }

    pub(crate) fn as_array_mut(&mut self, path: &[String]) -> Result<&mut ArrayData> {
        match self {
            Node::Array(a) => Ok(a),
            other => Err(kind_mismatch(path, NodeKind::Array, other.kind())),
        }
    }
}

/// A group's attributes and children.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct GroupData {
    pub(crate) attributes: AttributeStore,
    pub(crate) children: BTreeMap<String, Node>,
}

impl GroupData {
    pub(crate) fn insert(&mut self, name: &str, node: Node) -> Result<()> {
        check_name(name)?;
        if self.children.contains_key(name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }
        self.children.insert(name.to_string(), node);
        Ok(())
    }

    /// Looks up a child of the expected kind.
    pub(crate) fn child(&self, name: &str, expected: NodeKind) -> Result<&Node> {
        let node = self
            .children
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        if node.kind() != expected {
            return Err(Error::KindMismatch {
                name: name.to_string(),
                expected,
                found: node.kind(),
            });
        }
        Ok(node)
    }

    pub(crate) fn list(&self) -> Vec<(String, NodeKind)> {
        self.children
            .iter()
            .map(|(name, node)| (name.clone(), node.kind()))
            .collect()
    }

    /// Paths of every table below this group, depth first in name order.
    pub(crate) fn table_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, node) in &self.children {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            match node {
                Node::Table(_) => out.push(path),
                Node::Group(g) => g.table_paths(&path, out),
                Node::Array(_) => {}
            }
        }
    }

    /// Indented tree listing.
    pub(crate) fn summary(&self, depth: usize, out: &mut String) {
        for (name, node) in &self.children {
            let indent = "  ".repeat(depth);
            let _ = match node {
                Node::Group(_) => writeln!(out, "{indent}{name}/"),
                Node::Table(t) => writeln!(
                    out,
                    "{indent}{name} [table: {} columns, {} rows]",
                    t.schema.len(),
                    t.rows
                ),
                Node::Array(a) => writeln!(
                    out,
                    "{indent}{name} [array: {} {:?}{}]",
                    a.element_type,
                    a.dims,
                    if a.chunk.is_some() { " extensible" } else { "" }
                ),
            };
            if let Node::Group(g) = node {
                g.summary(depth + 1, out);
            }
        }
    }
}

/// Splits a slash-separated path, ignoring empty segments.
pub(crate) fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn join(path: &[String]) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.join("/")
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') {
        return Err(Error::InvalidShape(format!(
            "invalid node name '{name}': names must be non-empty and contain no '/'"
        )));
    }
    Ok(())
}

fn kind_mismatch(path: &[String], expected: NodeKind, found: NodeKind) -> Error {
    Error::KindMismatch {
        name: join(path),
        expected,
        found,
    }
}
