//! HDF5 translation.
//!
//! Groups map to HDF5 groups and arrays to HDF5 datasets; extensible arrays
//! become chunked datasets with unlimited maximum dims. A table becomes a
//! group tagged `DALKIT_CLASS = "TABLE"` holding one dataset per column,
//! shaped `(rows,)` or `(rows, element_count)`, with the column order in
//! `DALKIT_COLUMNS`. Strings are variable-length UTF-8.
//!
//! `Char` has no HDF5 counterpart; it is stored as `u8` and datasets carry
//! `DALKIT_TYPE = "char"` so the type survives a round trip. Char attributes
//! come back as `U8`. Attributes named `DALKIT_*` are reserved.
//!
//! Complex values are compounds with `real` and `imag` members; any such
//! compound of `i16` or `f32` pairs reads back as the matching complex type.

use crate::array::ArrayData;
use crate::dataset::Dataset;
use crate::options::StorageKind;
use crate::table::TableData;
use crate::tree::{GroupData, Node};
use crate::{Error, Result};
use dalkit_core::{Attribute, AttributeStore, Buffer, Char, Column, Complex, Schema};
use hdf5::types::{FloatSize, H5Type, IntSize, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Container, File, Group, Location, SimpleExtents};
use log::{debug, info, warn};
use std::path::Path;
use std::str::FromStr;

const CLASS_ATTR: &str = "DALKIT_CLASS";
const COLUMNS_ATTR: &str = "DALKIT_COLUMNS";
const TYPE_ATTR: &str = "DALKIT_TYPE";
const STORAGE_ATTR: &str = "DALKIT_STORAGE";
const RESERVED_PREFIX: &str = "DALKIT_";
const TABLE_CLASS: &str = "TABLE";
const CHAR_TYPE: &str = "char";

#[derive(hdf5::H5Type, Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
struct ComplexI16 {
    real: i16,
    imag: i16,
}

#[derive(hdf5::H5Type, Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
struct ComplexF32 {
    real: f32,
    imag: f32,
}

/// Rows per chunk for table column datasets.
const TABLE_CHUNK_ROWS: usize = 1024;
const MAX_DEPTH: usize = 256;

/// Writes the whole tree of `dataset` to a new HDF5 file.
///
/// Unflushed changes are included.
///
/// # Errors
/// Returns `Closed` after close, or an error if HDF5 I/O fails.
pub fn export_hdf5<P: AsRef<Path>>(dataset: &Dataset, path: P) -> Result<()> {
    let file = File::create(&path)?;
    dataset.handle().inspect(|root, state| {
        let kind = match state.storage_kind() {
            StorageKind::Hierarchical => "hierarchical",
            StorageKind::Columnar => "columnar",
        };
        set_attr_str(&file, STORAGE_ATTR, kind)?;
        export_group(&file, root.as_group(&[])?)
    })?;
    info!("Exported dataset to HDF5 file {}", path.as_ref().display());
    Ok(())
}

/// Builds a new dataset at `target` from the HDF5 file at `source`.
///
/// HDF5 objects without a dalkit counterpart (compound types, fixed-length
/// strings, empty datasets) are skipped with a warning.
///
/// # Errors
/// Returns `AlreadyExists` if `target` exists, `Unsupported` if a columnar
/// target would need groups or arrays, and `FormatError` for inconsistent
/// tables.
pub fn import_hdf5<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    target: Q,
    kind: StorageKind,
) -> Result<Dataset> {
    let file = File::open(&source)?;
    let root = import_group(&file, 0)?;
    if kind == StorageKind::Columnar {
        if let Some((name, node)) = root
            .children
            .iter()
            .find(|(_, node)| !matches!(node, Node::Table(_)))
        {
            return Err(dalkit_core::Error::Unsupported(format!(
                "columnar datasets hold tables only, found {} '{name}'",
                node.kind()
            ))
            .into());
        }
    }
    let dataset = Dataset::create(target, kind)?;
    dataset.handle().write(|node, _| {
        *node = Node::Group(root);
        Ok(())
    })?;
    dataset.flush()?;
    info!("Imported HDF5 file {}", source.as_ref().display());
    Ok(dataset)
}

/// Runs `$body` with `$v` bound to the buffer as a slice of an HDF5 type.
macro_rules! with_h5_slice {
    ($buffer:expr, $v:ident => $body:expr) => {
        match $buffer {
            Buffer::Char(chars) => {
                let bytes: Vec<u8> = chars.iter().map(|c| c.0).collect();
                let $v = bytes.as_slice();
                $body
            }
            Buffer::I8(x) => {
                let $v = x.as_slice();
                $body
            }
            Buffer::I16(x) => {
                let $v = x.as_slice();
                $body
            }
            Buffer::I32(x) => {
                let $v = x.as_slice();
                $body
            }
            Buffer::I64(x) => {
                let $v = x.as_slice();
                $body
            }
            Buffer::U8(x) => {
                let $v = x.as_slice();
                $body
            }
            Buffer::U16(x) => {
                let $v = x.as_slice();
                $body
            }
            Buffer::U32(x) => {
                let $v = x.as_slice();
                $body
            }
            Buffer::U64(x) => {
                let $v = x.as_slice();
                $body
            }
            Buffer::F32(x) => {
                let $v = x.as_slice();
                $body
            }
            Buffer::F64(x) => {
                let $v = x.as_slice();
                $body
            }
            Buffer::ComplexI16(x) => {
                let pairs: Vec<ComplexI16> = x
                    .iter()
                    .map(|c| ComplexI16 { real: c.re, imag: c.im })
                    .collect();
                let $v = pairs.as_slice();
                $body
            }
            Buffer::ComplexF32(x) => {
                let pairs: Vec<ComplexF32> = x
                    .iter()
                    .map(|c| ComplexF32 { real: c.re, imag: c.im })
                    .collect();
                let $v = pairs.as_slice();
                $body
            }
            Buffer::Str(strings) => {
                let unicode = strings
                    .iter()
                    .map(|s| to_var_len_unicode(s))
                    .collect::<Result<Vec<_>>>()?;
                let $v = unicode.as_slice();
                $body
            }
        }
    };
}

fn export_group(group: &Group, data: &GroupData) -> Result<()> {
    write_attributes(group, &data.attributes)?;
    for (name, node) in &data.children {
        match node {
            Node::Group(child) => export_group(&group.create_group(name)?, child)?,
            Node::Table(table) => export_table(&group.create_group(name)?, table)?,
            Node::Array(array) => export_array(group, name, array)?,
        }
        debug!("Exported {} {name}", node.kind());
    }
    Ok(())
}

fn export_table(group: &Group, table: &TableData) -> Result<()> {
    set_attr_str(group, CLASS_ATTR, TABLE_CLASS)?;
    let names = table
        .schema
        .names()
        .iter()
        .map(|n| to_var_len_unicode(n))
        .collect::<Result<Vec<_>>>()?;
    write_attr_values(group, COLUMNS_ATTR, &names, false)?;
    write_attributes(group, &table.attributes)?;

    let chunk_rows = table.rows.clamp(1, TABLE_CHUNK_ROWS);
    for (column, data) in table.schema.columns().iter().zip(&table.columns) {
        let (dims, chunk) = if column.element_count == 1 {
            (vec![table.rows], vec![chunk_rows])
        } else {
            (
                vec![table.rows, column.element_count],
                vec![chunk_rows, column.element_count],
            )
        };
        let dataset = with_h5_slice!(data, v => write_dataset(group, &column.name, &dims, Some(&chunk), v)?);
        if matches!(data, Buffer::Char(_)) {
            set_attr_str(&dataset, TYPE_ATTR, CHAR_TYPE)?;
        }
    }
    Ok(())
}

fn export_array(group: &Group, name: &str, array: &ArrayData) -> Result<()> {
    let chunk = array.chunk.as_deref();
    let dataset = with_h5_slice!(&array.data, v => write_dataset(group, name, &array.dims, chunk, v)?);
    if matches!(array.data, Buffer::Char(_)) {
        set_attr_str(&dataset, TYPE_ATTR, CHAR_TYPE)?;
    }
    write_attributes(&dataset, &array.attributes)
}

fn write_dataset<T: H5Type>(
    group: &Group,
    name: &str,
    dims: &[usize],
    chunk: Option<&[usize]>,
    values: &[T],
) -> Result<hdf5::Dataset> {
    let builder = group.new_dataset::<T>();
    let dataset = match chunk {
        Some(chunk) => builder
            .shape(SimpleExtents::resizable(dims.to_vec()))
            .chunk(chunk.to_vec())
            .create(name)?,
        None => builder.shape(dims.to_vec()).create(name)?,
    };
    if !values.is_empty() {
        dataset.write_raw(values)?;
    }
    Ok(dataset)
}

fn write_attributes(location: &Location, attributes: &AttributeStore) -> Result<()> {
    for (name, attribute) in attributes.iter() {
        if name.starts_with(RESERVED_PREFIX) {
            warn!("Skipping reserved attribute name {name}");
            continue;
        }
        let scalar = attribute.is_scalar();
        with_h5_slice!(attribute.value(), v => write_attr_values(location, name, v, scalar)?);
    }
    Ok(())
}

fn write_attr_values<T: H5Type>(
    location: &Location,
    name: &str,
    values: &[T],
    scalar: bool,
) -> Result<()> {
    match values {
        [value] if scalar => {
            location.new_attr::<T>().create(name)?.write_scalar(value)?;
        }
        _ => {
            location
                .new_attr::<T>()
                .shape(values.len())
                .create(name)?
                .write_raw(values)?;
        }
    }
    Ok(())
}

fn set_attr_str(location: &Location, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    location
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::format(format!("string not representable in HDF5: {e}")))
}

fn import_group(group: &Group, depth: usize) -> Result<GroupData> {
    if depth > MAX_DEPTH {
        return Err(Error::format(format!(
            "HDF5 group {} nested too deeply",
            group.name()
        )));
    }
    let mut data = GroupData {
        attributes: read_attributes(group)?,
        ..GroupData::default()
    };
    for name in group.member_names()? {
        let node = if let Ok(child) = group.group(&name) {
            if read_attr_str(&child, CLASS_ATTR)?.as_deref() == Some(TABLE_CLASS) {
                Node::Table(import_table(&child)?)
            } else {
                Node::Group(import_group(&child, depth + 1)?)
            }
        } else if let Ok(dataset) = group.dataset(&name) {
            match import_array(&dataset)? {
                Some(array) => Node::Array(array),
                None => {
                    warn!("Skipping HDF5 dataset {} with no dalkit counterpart", dataset.name());
                    continue;
                }
            }
        } else {
            warn!("Skipping HDF5 member {name} of unknown kind");
            continue;
        };
        debug!("Imported {} {name}", node.kind());
        data.insert(&name, node)?;
    }
    Ok(data)
}

fn import_table(group: &Group) -> Result<TableData> {
    let names = match group.attr(COLUMNS_ATTR) {
        Ok(attr) => attr
            .read_raw::<VarLenUnicode>()?
            .iter()
            .map(ToString::to_string)
            .collect(),
        Err(_) => group.member_names()?,
    };

    let mut schema = Schema::new();
    let mut columns = Vec::with_capacity(names.len());
    let mut rows = None;
    for name in names {
        let dataset = group.dataset(&name)?;
        let shape = dataset.shape();
        let (column_rows, element_count) = match shape.as_slice() {
            [r] => (*r, 1),
            [r, n] => (*r, *n),
            _ => {
                return Err(Error::format(format!(
                    "table column {name} has shape {shape:?}"
                )))
            }
        };
        if *rows.get_or_insert(column_rows) != column_rows {
            return Err(Error::format(format!(
                "table column {name} has {column_rows} rows, expected {}",
                rows.unwrap_or_default()
            )));
        }
        let is_char = read_attr_str(&dataset, TYPE_ATTR)?.as_deref() == Some(CHAR_TYPE);
        let data = read_container(&dataset, is_char)?.ok_or_else(|| {
            dalkit_core::Error::Unsupported(format!(
                "table column {name} has an unsupported HDF5 type"
            ))
        })?;
        schema
            .push(Column::array(name, data.element_type(), element_count))
            .map_err(|e| Error::format(format!("bad table schema: {e}")))?;
        columns.push(data);
    }

    Ok(TableData {
        attributes: read_attributes(group)?,
        schema,
        columns,
        rows: rows.unwrap_or(0),
    })
}

fn import_array(dataset: &hdf5::Dataset) -> Result<Option<ArrayData>> {
    let is_char = read_attr_str(dataset, TYPE_ATTR)?.as_deref() == Some(CHAR_TYPE);
    let Some(data) = read_container(dataset, is_char)? else {
        return Ok(None);
    };
    let mut dims = dataset.shape();
    if dims.is_empty() {
        dims.push(1);
    }
    if dims.contains(&0) {
        return Ok(None);
    }
    let chunk = if dataset.is_resizable() {
        dataset.chunk()
    } else {
        None
    };
    let mut array = ArrayData::from_parts(dims, data.element_type(), chunk, data)?;
    array.attributes = read_attributes(dataset)?;
    Ok(Some(array))
}

fn read_attributes(location: &Location) -> Result<AttributeStore> {
    let mut store = AttributeStore::new();
    for name in location.attr_names()? {
        if name.starts_with(RESERVED_PREFIX) {
            continue;
        }
        let attr = location.attr(&name)?;
        match read_container(&attr, false)? {
            Some(value) => store.set(&name, Attribute::from_buffer(value, attr.ndim() == 0))?,
            None => warn!("Skipping attribute {name} with unsupported HDF5 type"),
        }
    }
    Ok(store)
}

fn read_attr_str(location: &Location, name: &str) -> Result<Option<String>> {
    match location.attr(name) {
        Ok(attr) => {
            let value: VarLenUnicode = attr.read_scalar()?;
            Ok(Some(value.to_string()))
        }
        Err(_) => Ok(None),
    }
}

/// Reads a dataset or attribute into a buffer; `None` for HDF5 types with
/// no dalkit counterpart.
fn read_container(container: &Container, is_char: bool) -> Result<Option<Buffer>> {
    let buffer = match container.dtype()?.to_descriptor()? {
        TypeDescriptor::Integer(IntSize::U1) => Buffer::I8(container.read_raw()?),
        TypeDescriptor::Integer(IntSize::U2) => Buffer::I16(container.read_raw()?),
        TypeDescriptor::Integer(IntSize::U4) => Buffer::I32(container.read_raw()?),
        TypeDescriptor::Integer(IntSize::U8) => Buffer::I64(container.read_raw()?),
        TypeDescriptor::Unsigned(IntSize::U1) => {
            let bytes: Vec<u8> = container.read_raw()?;
            if is_char {
                Buffer::Char(bytes.into_iter().map(Char).collect())
            } else {
                Buffer::U8(bytes)
            }
        }
        TypeDescriptor::Unsigned(IntSize::U2) => Buffer::U16(container.read_raw()?),
        TypeDescriptor::Unsigned(IntSize::U4) => Buffer::U32(container.read_raw()?),
        TypeDescriptor::Unsigned(IntSize::U8) => Buffer::U64(container.read_raw()?),
        TypeDescriptor::Float(FloatSize::U4) => Buffer::F32(container.read_raw()?),
        TypeDescriptor::Float(FloatSize::U8) => Buffer::F64(container.read_raw()?),
        TypeDescriptor::Boolean => Buffer::U8(
            container
                .read_raw::<bool>()?
                .into_iter()
                .map(u8::from)
                .collect(),
        ),
        TypeDescriptor::VarLenUnicode => Buffer::Str(
            container
                .read_raw::<VarLenUnicode>()?
                .iter()
                .map(ToString::to_string)
                .collect(),
        ),
        TypeDescriptor::VarLenAscii => Buffer::Str(
            container
                .read_raw::<VarLenAscii>()?
                .iter()
                .map(ToString::to_string)
                .collect(),
        ),
        TypeDescriptor::Compound(compound) => {
            let member = |name: &str| {
                compound
                    .fields
                    .iter()
                    .find(|field| field.name == name)
                    .map(|field| &field.ty)
            };
            match (compound.fields.len(), member("real"), member("imag")) {
                (
                    2,
                    Some(TypeDescriptor::Integer(IntSize::U2)),
                    Some(TypeDescriptor::Integer(IntSize::U2)),
                ) => Buffer::ComplexI16(
                    container
                        .read_raw::<ComplexI16>()?
                        .into_iter()
                        .map(|c| Complex::new(c.real, c.imag))
                        .collect(),
                ),
                (
                    2,
                    Some(TypeDescriptor::Float(FloatSize::U4)),
                    Some(TypeDescriptor::Float(FloatSize::U4)),
                ) => Buffer::ComplexF32(
                    container
                        .read_raw::<ComplexF32>()?
                        .into_iter()
                        .map(|c| Complex::new(c.real, c.imag))
                        .collect(),
                ),
                _ => return Ok(None),
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Attributes;
    use dalkit_core::{ElementType, Region};
    use tempfile::tempdir;

    #[test]
    fn test_hdf5_roundtrip() {
        let dir = tempdir().unwrap();
        let source = Dataset::create(dir.path().join("obs.dal"), StorageKind::Hierarchical).unwrap();
        source.set_attribute_str("TELESCOPE", "LOFAR").unwrap();
        source
            .set_attribute_list("SUBBANDS", vec![100_u16, 101, 102])
            .unwrap();

        let beam = source.create_group("beam_0").unwrap();
        beam.set_attribute("FREQ", 1.5e8_f64).unwrap();
        let stokes = beam
            .create_array("stokes_i", &[2, 3], ElementType::F32, Some(&[1, 3]))
            .unwrap();
        stokes
            .write_all(vec![0.5_f32, 1.5, 2.5, 3.5, 4.5, 5.5])
            .unwrap();
        let visibilities = beam
            .create_array("visibilities", &[2], ElementType::ComplexF32, None)
            .unwrap();
        visibilities
            .write_all(vec![Complex::new(1.0_f32, -1.0), Complex::new(0.25, 4.0)])
            .unwrap();
        visibilities
            .set_attribute("GAIN", Complex::new(3_i16, -7))
            .unwrap();

        let schema = Schema::from_columns([
            Column::new("ANTENNA1", ElementType::I32),
            Column::new("NAME", ElementType::Str),
            Column::array("FLAG", ElementType::Char, 2),
        ])
        .unwrap();
        let table = source.create_table("MAIN", Some(schema)).unwrap();
        table
            .append_rows(
                &[
                    Buffer::I32(vec![0, 1]),
                    Buffer::from(vec!["CS001", "CS002"]),
                    Buffer::Char(vec![Char(b'y'), Char(b'n'), Char(b'n'), Char(b'n')]),
                ],
                2,
            )
            .unwrap();

        let h5_path = dir.path().join("obs.h5");
        export_hdf5(&source, &h5_path).unwrap();

        let imported =
            import_hdf5(&h5_path, dir.path().join("copy.dal"), StorageKind::Hierarchical).unwrap();
        assert_eq!(
            imported.attribute_as::<String>("TELESCOPE").unwrap(),
            "LOFAR"
        );
        assert_eq!(
            imported.attribute_list_as::<u16>("SUBBANDS").unwrap(),
            vec![100, 101, 102]
        );
        let beam = imported.open_group("beam_0").unwrap();
        assert_eq!(beam.attribute_as::<f64>("FREQ").unwrap(), 1.5e8);

        let stokes = imported.open_array("beam_0/stokes_i").unwrap();
        assert_eq!(stokes.dims().unwrap(), vec![2, 3]);
        assert!(stokes.is_extensible().unwrap());
        assert_eq!(
            stokes
                .read_region(&Region::new(vec![1, 0], vec![1, 3]).unwrap())
                .unwrap(),
            Buffer::F32(vec![3.5, 4.5, 5.5])
        );

        let visibilities = imported.open_array("beam_0/visibilities").unwrap();
        assert_eq!(
            visibilities.read_all().unwrap(),
            Buffer::ComplexF32(vec![Complex::new(1.0, -1.0), Complex::new(0.25, 4.0)])
        );
        assert_eq!(
            visibilities.attribute_as::<Complex<i16>>("GAIN").unwrap(),
            Complex::new(3, -7)
        );

        let table = imported.open_table("MAIN").unwrap();
        assert_eq!(table.schema().unwrap(), source.open_table("MAIN").unwrap().schema().unwrap());
        let rows = table.read_rows(0, 2).unwrap();
        assert_eq!(rows[1].value::<String>(1), Some("CS002".to_string()));
        assert_eq!(rows[0][2], Buffer::Char(vec![Char(b'y'), Char(b'n')]));
    }

    #[test]
    fn test_import_columnar_rejects_groups() {
        let dir = tempdir().unwrap();
        let h5_path = dir.path().join("plain.h5");
        {
            let file = File::create(&h5_path).unwrap();
            file.create_group("nested").unwrap();
        }
        let err = import_hdf5(&h5_path, dir.path().join("t.dal"), StorageKind::Columnar).unwrap_err();
        assert!(matches!(
            err,
            Error::Core(dalkit_core::Error::Unsupported(_))
        ));
        assert!(!dir.path().join("t.dal").exists());
    }
}
