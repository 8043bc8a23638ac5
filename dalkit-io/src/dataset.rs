//! Dataset files and the shared state behind every node handle.

use crate::array::Array;
use crate::codec;
use crate::error::open_error;
use crate::group::Group;
use crate::options::{DatasetOptions, IoMode, StorageKind};
use crate::reader::MappedFileReader;
use crate::table::Table;
use crate::tree::{join, split_path, GroupData, Node};
use crate::{Error, Result};
use dalkit_core::{ElementType, NodeKind, Schema};
use log::{debug, info, warn};
use std::cell::{Cell, RefCell};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// State shared by a dataset and every handle opened from it.
pub(crate) struct State {
    path: PathBuf,
    options: DatasetOptions,
    root: Node,
    closed: bool,
    dirty: bool,
}

impl State {
    pub(crate) fn storage_kind(&self) -> StorageKind {
        self.options.storage_kind
    }

    pub(crate) fn scan_buffer_rows(&self) -> usize {
        self.options.scan_buffer_rows
    }

    /// Writes the tree to a sibling file and renames it over the target.
    fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(dalkit_core::Error::Closed.into());
        }
        if !self.dirty {
            return Ok(());
        }
        let bytes = codec::encode(&self.root, self.options.storage_kind);
        let staging = staging_path(&self.path);
        if let Err(e) = write_file(&staging, &bytes, self.options.sync_on_flush)
            .and_then(|()| fs::rename(&staging, &self.path))
        {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
        self.dirty = false;
        info!(
            "Flushed {} ({} bytes)",
            self.path.display(),
            bytes.len()
        );
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

fn write_file(path: &Path, bytes: &[u8], sync: bool) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    if sync {
        file.sync_all()?;
    }
    Ok(())
}

/// A node handle: shared dataset state plus the node's path from the root.
///
/// Handles are released individually by `close`; closing the dataset
/// releases all of them.
pub(crate) struct Handle {
    shared: Rc<RefCell<State>>,
    path: Vec<String>,
    released: Cell<bool>,
}

impl Handle {
    fn new(shared: Rc<RefCell<State>>, path: Vec<String>) -> Self {
        Self {
            shared,
            path,
            released: Cell::new(false),
        }
    }

    pub(crate) fn child(&self, name: &str) -> Handle {
        let mut path = self.path.clone();
        path.push(name.to_string());
        Handle::new(Rc::clone(&self.shared), path)
    }

    pub(crate) fn at(&self, path: &str) -> Handle {
        let mut full = self.path.clone();
        full.extend(split_path(path));
        Handle::new(Rc::clone(&self.shared), full)
    }

    pub(crate) fn path(&self) -> String {
        join(&self.path)
    }

    pub(crate) fn segments(&self) -> &[String] {
        &self.path
    }

    pub(crate) fn name(&self) -> &str {
        self.path.last().map_or("/", String::as_str)
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.released.get() && !self.shared.borrow().closed
    }

    fn check_open(&self, state: &State) -> Result<()> {
        if self.released.get() || state.closed {
            return Err(dalkit_core::Error::Closed.into());
        }
        Ok(())
    }

    /// Runs `f` on this handle's node.
    pub(crate) fn read<R>(
        &self,
        f: impl FnOnce(&Node, &State) -> dalkit_core::Result<R>,
    ) -> Result<R> {
        self.inspect(|node, state| Ok(f(node, state)?))
    }

    /// Like [`Handle::read`] for callbacks that fail with I/O errors.
    pub(crate) fn inspect<R>(&self, f: impl FnOnce(&Node, &State) -> Result<R>) -> Result<R> {
        let state = self.shared.borrow();
        self.check_open(&state)?;
        let node = state.root.resolve(&self.path)?;
        f(node, &state)
    }

    /// Runs `f` on this handle's node for mutation; marks the dataset dirty
    /// when `f` succeeds.
    pub(crate) fn write<R>(
        &self,
        f: impl FnOnce(&mut Node, StorageKind) -> dalkit_core::Result<R>,
    ) -> Result<R> {
        let mut state = self.shared.borrow_mut();
        self.check_open(&state)?;
        if !state.options.mode.is_writable() {
            return Err(dalkit_core::Error::ReadOnly(state.path.display().to_string()).into());
        }
        let kind = state.options.storage_kind;
        let node = state.root.resolve_mut(&self.path)?;
        let out = f(node, kind)?;
        state.dirty = true;
        Ok(out)
    }

    pub(crate) fn flush(&self) -> Result<()> {
        let mut state = self.shared.borrow_mut();
        self.check_open(&state)?;
        state.flush()
    }

    /// Flushes the dataset and releases this handle only. Repeated calls
    /// and calls after the dataset closed are no-ops.
    pub(crate) fn close(&self) -> Result<()> {
        if self.released.get() {
            return Ok(());
        }
        let mut state = self.shared.borrow_mut();
        if !state.closed {
            state.flush()?;
        }
        self.released.set(true);
        debug!("Released handle {}", join(&self.path));
        Ok(())
    }
}

/// A dataset file and its root group.
///
/// The whole node tree is held in memory; [`Dataset::flush`] and
/// [`Dataset::close`] persist it. Dropping a dataset without closing it
/// discards unflushed changes.
///
/// Handles share state through `Rc`, so a dataset and its handles stay on
/// the thread that opened them.
pub struct Dataset {
    handle: Handle,
}

impl Dataset {
    /// Creates a new dataset file. The root group is created implicitly.
    ///
    /// # Errors
    /// Returns `AlreadyExists` if the file exists; use
    /// [`Dataset::open_with_options`] with [`IoMode::Create`] to overwrite.
    pub fn create<P: AsRef<Path>>(path: P, kind: StorageKind) -> Result<Self> {
        let options = DatasetOptions::default()
            .with_mode(IoMode::CreateNew)
            .with_storage_kind(kind);
        Self::open_with_options(path, &options)
    }

    /// Opens an existing dataset for reading and writing.
    ///
    /// # Errors
    /// Returns `NotFound` if the file is missing and `FormatError` if it is
    /// corrupt or of an unsupported kind.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, &DatasetOptions::default())
    }

    /// Opens an existing dataset without write access.
    ///
    /// # Errors
    /// See [`Dataset::open`].
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, &DatasetOptions::default().with_mode(IoMode::ReadOnly))
    }

    /// Opens or creates a dataset according to `options.mode`.
    ///
    /// # Errors
    /// Returns `NotFound`, `AlreadyExists` or `FormatError` depending on the
    /// mode and the file, or an I/O error.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: &DatasetOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let exists = path.exists();
        let create = match options.mode {
            IoMode::ReadOnly | IoMode::ReadWrite => false,
            IoMode::Create => true,
            IoMode::CreateNew => {
                if exists {
                    return Err(
                        dalkit_core::Error::AlreadyExists(path.display().to_string()).into(),
                    );
                }
                true
            }
            IoMode::OpenOrCreate => !exists,
        };

        let mut options = options.clone();
        let state = if create {
            let mut state = State {
                path,
                options,
                root: Node::Group(GroupData::default()),
                closed: false,
                dirty: true,
            };
            state.flush()?;
            info!(
                "Created {:?} dataset {}",
                state.options.storage_kind,
                state.path.display()
            );
            state
        } else {
            let reader = MappedFileReader::open(&path).map_err(|e| match e {
                Error::Io(io) => open_error(&path, io),
                other => other,
            })?;
            let (kind, root) = codec::decode(reader.as_bytes())?;
            options.storage_kind = kind;
            info!(
                "Opened {:?} dataset {} ({} bytes, {:?})",
                kind,
                path.display(),
                reader.len(),
                options.mode
            );
            State {
                path,
                options,
                root,
                closed: false,
                dirty: false,
            }
        };

        Ok(Self {
            handle: Handle::new(Rc::new(RefCell::new(state)), Vec::new()),
        })
    }

    /// Writes pending changes to disk.
    ///
    /// # Errors
    /// Returns `Closed` after close, or an I/O error; on I/O failure the
    /// previous file contents are left intact.
    pub fn flush(&self) -> Result<()> {
        self.handle.flush()
    }

    /// Flushes pending changes and releases the dataset. Every handle opened
    /// from it fails with `Closed` afterwards. Closing twice is a no-op.
    ///
    /// # Errors
    /// Returns an error if the final flush fails; the dataset then stays
    /// open so the caller can retry.
    pub fn close(&self) -> Result<()> {
        let mut state = self.handle.shared.borrow_mut();
        if state.closed {
            return Ok(());
        }
        state.flush()?;
        state.closed = true;
        info!("Closed dataset {}", state.path.display());
        Ok(())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handle.shared.borrow().closed
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.handle.shared.borrow().path.clone()
    }

    #[must_use]
    pub fn storage_kind(&self) -> StorageKind {
        self.handle.shared.borrow().options.storage_kind
    }

    #[must_use]
    pub fn mode(&self) -> IoMode {
        self.handle.shared.borrow().options.mode
    }

    #[must_use]
    pub fn options(&self) -> DatasetOptions {
        self.handle.shared.borrow().options.clone()
    }

    /// Returns true if there are changes not yet flushed.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.handle.shared.borrow().dirty
    }

    /// The root group.
    ///
    /// # Errors
    /// Returns `Closed` after close.
    pub fn root(&self) -> Result<Group> {
        self.handle.read(|_, _| Ok(()))?;
        Ok(Group::from_handle(self.handle.at("")))
    }

    /// Creates a group under the root.
    ///
    /// # Errors
    /// See [`Group::create_group`].
    pub fn create_group(&self, name: &str) -> Result<Group> {
        self.root()?.create_group(name)
    }

    /// Creates a table under the root.
    ///
    /// # Errors
    /// See [`Group::create_table`].
    pub fn create_table(&self, name: &str, schema: Option<Schema>) -> Result<Table> {
        self.root()?.create_table(name, schema)
    }

    /// Creates an array under the root.
    ///
    /// # Errors
    /// See [`Group::create_array`].
    pub fn create_array(
        &self,
        name: &str,
        dims: &[usize],
        element_type: ElementType,
        chunk_dims: Option<&[usize]>,
    ) -> Result<Array> {
        self.root()?.create_array(name, dims, element_type, chunk_dims)
    }

    /// Opens a group by slash-separated path from the root.
    ///
    /// # Errors
    /// Returns `NotFound` or `KindMismatch`.
    pub fn open_group(&self, path: &str) -> Result<Group> {
        let handle = self.open_at(path, NodeKind::Group)?;
        Ok(Group::from_handle(handle))
    }

    /// Opens a table by slash-separated path from the root.
    ///
    /// # Errors
    /// Returns `NotFound` or `KindMismatch`.
    pub fn open_table(&self, path: &str) -> Result<Table> {
        let handle = self.open_at(path, NodeKind::Table)?;
        Ok(Table::from_handle(handle))
    }

    /// Opens an array by slash-separated path from the root.
    ///
    /// # Errors
    /// Returns `NotFound` or `KindMismatch`.
    pub fn open_array(&self, path: &str) -> Result<Array> {
        let handle = self.open_at(path, NodeKind::Array)?;
        Ok(Array::from_handle(handle))
    }

    fn open_at(&self, path: &str, expected: NodeKind) -> Result<Handle> {
        let handle = self.handle.at(path);
        let segments = handle.segments().to_vec();
        self.handle.read(|root, _| {
            let node = root.resolve(&segments)?;
            if node.kind() != expected {
                return Err(dalkit_core::Error::KindMismatch {
                    name: join(&segments),
                    expected,
                    found: node.kind(),
                });
            }
            Ok(())
        })?;
        debug!("Opened {expected} {}", handle.path());
        Ok(handle)
    }

    /// Names and kinds of the root's children.
    ///
    /// # Errors
    /// Returns `Closed` after close.
    pub fn list(&self) -> Result<Vec<(String, NodeKind)>> {
        self.root()?.list()
    }

    /// Slash-separated paths of every table in the dataset.
    ///
    /// # Errors
    /// Returns `Closed` after close.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        self.handle.read(|root, _| {
            let mut paths = Vec::new();
            root.as_group(&[])?.table_paths("", &mut paths);
            Ok(paths)
        })
    }

    /// Indented listing of the node tree.
    ///
    /// # Errors
    /// Returns `Closed` after close.
    pub fn summary(&self) -> Result<String> {
        self.handle.read(|root, state| {
            let mut out = format!(
                "{} ({:?})\n",
                state.path.display(),
                state.options.storage_kind
            );
            root.as_group(&[])?.summary(1, &mut out);
            Ok(out)
        })
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        if let Ok(state) = self.handle.shared.try_borrow() {
            if state.dirty && !state.closed {
                warn!(
                    "Dataset {} dropped with unflushed changes",
                    state.path.display()
                );
            }
        }
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.handle.shared.borrow();
        f.debug_struct("Dataset")
            .field("path", &state.path)
            .field("storage_kind", &state.options.storage_kind)
            .field("mode", &state.options.mode)
            .field("closed", &state.closed)
            .finish()
    }
}

