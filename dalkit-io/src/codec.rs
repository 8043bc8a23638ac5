//! Native container format.
//!
//! A file is a fixed 32-byte header followed by the encoded node tree.
//! All integers are little-endian.
//!
//! Header layout:
//! - magic: 8 bytes (`DALKIT\0\x01`)
//! - version: 2 bytes
//! - storage kind: 1 byte
//! - reserved: 5 bytes
//! - payload length: 8 bytes
//! - payload checksum: 4 bytes (CRC32)
//! - padding: 4 bytes
//!
//! The payload is the root node. Every node starts with a tag byte and its
//! attributes; groups then list their children, tables their schema, row
//! count and column data, arrays their shape, chunking and data.

use crate::array::ArrayData;
use crate::options::StorageKind;
use crate::table::TableData;
use crate::tree::{GroupData, Node};
use crate::{Error, Result};
use bytes::{Buf, BufMut};
use dalkit_core::{Attribute, AttributeStore, Buffer, Char, Column, Complex, ElementType, Schema};
use std::collections::BTreeMap;

pub(crate) const MAGIC: [u8; 8] = *b"DALKIT\0\x01";
pub(crate) const VERSION: u16 = 1;
pub(crate) const HEADER_SIZE: usize = 32;

const TAG_GROUP: u8 = 0;
const TAG_TABLE: u8 = 1;
const TAG_ARRAY: u8 = 2;

const MAX_DEPTH: usize = 256;

/// Encodes a whole tree, header included.
pub(crate) fn encode(root: &Node, kind: StorageKind) -> Vec<u8> {
    let mut payload = Vec::new();
    put_node(&mut payload, root);

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.put_slice(&MAGIC);
    out.put_u16_le(VERSION);
    out.put_u8(kind.tag());
    out.put_bytes(0, 5); // reserved
    out.put_u64_le(payload.len() as u64);
    out.put_u32_le(crc32fast::hash(&payload));
    out.put_u32_le(0); // padding
    out.extend_from_slice(&payload);
    out
}

/// Decodes a file image into its storage kind and root node.
///
/// # Errors
/// Returns `FormatError` for a bad header, checksum or payload.
pub(crate) fn decode(bytes: &[u8]) -> Result<(StorageKind, Node)> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::format(format!(
            "file is {} bytes, shorter than the {HEADER_SIZE}-byte header",
            bytes.len()
        )));
    }
    let mut header = &bytes[..HEADER_SIZE];
    let mut magic = [0_u8; 8];
    header.copy_to_slice(&mut magic);
    if magic != MAGIC {
        return Err(Error::format("not a dalkit dataset (bad magic)"));
    }
    let version = header.get_u16_le();
    if version != VERSION {
        return Err(Error::format(format!("unsupported format version {version}")));
    }
    let kind_tag = header.get_u8();
    let kind = StorageKind::from_tag(kind_tag)
        .ok_or_else(|| Error::format(format!("unsupported storage kind {kind_tag}")))?;
    header.advance(5);
    let payload_len = header.get_u64_le();
    let checksum = header.get_u32_le();

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() as u64 != payload_len {
        return Err(Error::format(format!(
            "payload is {} bytes, header declares {payload_len}",
            payload.len()
        )));
    }
    if crc32fast::hash(payload) != checksum {
        return Err(Error::format("payload checksum mismatch"));
    }

    let mut reader = Reader { buf: payload };
    let root = reader.node(0)?;
    if reader.buf.has_remaining() {
        return Err(Error::format(format!(
            "{} trailing bytes after the root node",
            reader.buf.remaining()
        )));
    }
    if !matches!(root, Node::Group(_)) {
        return Err(Error::format("root node is not a group"));
    }
    Ok((kind, root))
}

fn put_len(out: &mut Vec<u8>, len: usize) {
    out.put_u64_le(len as u64);
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_len(out, s.len());
    out.put_slice(s.as_bytes());
}

fn put_node(out: &mut Vec<u8>, node: &Node) {
    match node {
        Node::Group(g) => {
            out.put_u8(TAG_GROUP);
            put_attributes(out, &g.attributes);
            put_len(out, g.children.len());
            for (name, child) in &g.children {
                put_str(out, name);
                put_node(out, child);
            }
        }
        Node::Table(t) => {
            out.put_u8(TAG_TABLE);
            put_attributes(out, &t.attributes);
            put_len(out, t.schema.len());
            for column in t.schema.columns() {
                put_str(out, &column.name);
                out.put_u8(column.element_type.tag());
                put_len(out, column.element_count);
            }
            put_len(out, t.rows);
            for data in &t.columns {
                put_buffer(out, data);
            }
        }
        Node::Array(a) => {
            out.put_u8(TAG_ARRAY);
            put_attributes(out, &a.attributes);
            out.put_u8(a.element_type.tag());
            put_len(out, a.dims.len());
            for &d in &a.dims {
                put_len(out, d);
            }
            match &a.chunk {
                Some(chunk) => {
                    out.put_u8(1);
                    for &c in chunk {
                        put_len(out, c);
                    }
                }
                None => out.put_u8(0),
            }
            put_buffer(out, &a.data);
        }
    }
}

fn put_attributes(out: &mut Vec<u8>, attributes: &AttributeStore) {
    put_len(out, attributes.len());
    for (name, attribute) in attributes.iter() {
        put_str(out, name);
        out.put_u8(u8::from(attribute.is_scalar()));
        put_buffer(out, attribute.value());
    }
}

fn put_buffer(out: &mut Vec<u8>, buffer: &Buffer) {
    out.put_u8(buffer.element_type().tag());
    put_len(out, buffer.len());
    match buffer {
        Buffer::Char(v) => v.iter().for_each(|c| out.put_u8(c.0)),
        Buffer::I8(v) => v.iter().for_each(|&x| out.put_i8(x)),
        Buffer::I16(v) => v.iter().for_each(|&x| out.put_i16_le(x)),
        Buffer::I32(v) => v.iter().for_each(|&x| out.put_i32_le(x)),
        Buffer::I64(v) => v.iter().for_each(|&x| out.put_i64_le(x)),
        Buffer::U8(v) => out.put_slice(v),
        Buffer::U16(v) => v.iter().for_each(|&x| out.put_u16_le(x)),
        Buffer::U32(v) => v.iter().for_each(|&x| out.put_u32_le(x)),
        Buffer::U64(v) => v.iter().for_each(|&x| out.put_u64_le(x)),
        Buffer::F32(v) => v.iter().for_each(|&x| out.put_f32_le(x)),
        Buffer::F64(v) => v.iter().for_each(|&x| out.put_f64_le(x)),
        Buffer::Str(v) => v.iter().for_each(|s| put_str(out, s)),
        Buffer::ComplexI16(v) => v.iter().for_each(|c| {
            out.put_i16_le(c.re);
            out.put_i16_le(c.im);
        }),
        Buffer::ComplexF32(v) => v.iter().for_each(|c| {
            out.put_f32_le(c.re);
            out.put_f32_le(c.im);
        }),
    }
}

/// Bounds-checked payload cursor; `bytes::Buf` getters panic on underflow.
struct Reader<'a> {
    buf: &'a [u8],
}

macro_rules! read_vec {
    ($self:ident, $len:expr, $width:expr, $get:ident) => {{
        $self.need($len.checked_mul($width))?;
        (0..$len).map(|_| $self.buf.$get()).collect()
    }};
}

impl Reader<'_> {
    fn need(&self, n: Option<usize>) -> Result<()> {
        match n {
            Some(n) if n <= self.buf.remaining() => Ok(()),
            _ => Err(Error::format("truncated payload")),
        }
    }

    fn u8(&mut self) -> Result<u8> {
        self.need(Some(1))?;
        Ok(self.buf.get_u8())
    }

    fn len(&mut self) -> Result<usize> {
        self.need(Some(8))?;
        usize::try_from(self.buf.get_u64_le())
            .map_err(|_| Error::format("length does not fit in memory"))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.len()?;
        self.need(Some(len))?;
        let bytes = self.buf[..len].to_vec();
        self.buf.advance(len);
        String::from_utf8(bytes).map_err(|_| Error::format("invalid UTF-8 string"))
    }

    fn element_type(&mut self) -> Result<ElementType> {
        let tag = self.u8()?;
        ElementType::from_tag(tag).ok_or_else(|| Error::format(format!("unknown element type {tag}")))
    }

    fn node(&mut self, depth: usize) -> Result<Node> {
        if depth > MAX_DEPTH {
            return Err(Error::format("node tree nested too deeply"));
        }
        let tag = self.u8()?;
        let attributes = self.attributes()?;
        match tag {
            TAG_GROUP => {
                let count = self.len()?;
                let mut children = BTreeMap::new();
                for _ in 0..count {
                    let name = self.string()?;
                    let child = self.node(depth + 1)?;
                    if children.insert(name.clone(), child).is_some() {
                        return Err(Error::format(format!("duplicate child '{name}'")));
                    }
                }
                Ok(Node::Group(GroupData {
                    attributes,
                    children,
                }))
            }
            TAG_TABLE => self.table(attributes).map(Node::Table),
            TAG_ARRAY => self.array(attributes).map(Node::Array),
            other => Err(Error::format(format!("unknown node tag {other}"))),
        }
    }

    fn attributes(&mut self) -> Result<AttributeStore> {
        let count = self.len()?;
        let mut store = AttributeStore::new();
        for _ in 0..count {
            let name = self.string()?;
            let scalar = self.u8()? != 0;
            let value = self.buffer()?;
            if store.contains(&name) {
                return Err(Error::format(format!("duplicate attribute '{name}'")));
            }
            store.set(&name, Attribute::from_buffer(value, scalar))?;
        }
        Ok(store)
    }

    fn table(&mut self, attributes: AttributeStore) -> Result<TableData> {
        let count = self.len()?;
        let mut schema = Schema::new();
        for _ in 0..count {
            let name = self.string()?;
            let element_type = self.element_type()?;
            let element_count = self.len()?;
            schema
                .push(Column::array(name, element_type, element_count))
                .map_err(|e| Error::format(format!("bad table schema: {e}")))?;
        }
        let rows = self.len()?;
        let mut columns = Vec::with_capacity(schema.len());
        for column in schema.columns() {
            let data = self.buffer()?;
            let expected = rows.checked_mul(column.element_count);
            if data.element_type() != column.element_type || Some(data.len()) != expected {
                return Err(Error::format(format!(
                    "column '{}' data does not match {rows} rows of {} x {}",
                    column.name, column.element_count, column.element_type
                )));
            }
            columns.push(data);
        }
        Ok(TableData {
            attributes,
            schema,
            columns,
            rows,
        })
    }

    fn array(&mut self, attributes: AttributeStore) -> Result<ArrayData> {
        let element_type = self.element_type()?;
        let rank = self.len()?;
        self.need(rank.checked_mul(8))?;
        let dims = (0..rank).map(|_| self.len()).collect::<Result<Vec<_>>>()?;
        let chunk = match self.u8()? {
            0 => None,
            _ => {
                self.need(rank.checked_mul(8))?;
                Some((0..rank).map(|_| self.len()).collect::<Result<Vec<_>>>()?)
            }
        };
        let data = self.buffer()?;
        let mut array = ArrayData::from_parts(dims, element_type, chunk, data)
            .map_err(|e| Error::format(format!("bad array: {e}")))?;
        array.attributes = attributes;
        Ok(array)
    }

    fn buffer(&mut self) -> Result<Buffer> {
        let element_type = self.element_type()?;
        let len = self.len()?;
        let buffer = match element_type {
            ElementType::Char => {
                self.need(Some(len))?;
                let v = self.buf[..len].iter().copied().map(Char).collect();
                self.buf.advance(len);
                Buffer::Char(v)
            }
            ElementType::I8 => Buffer::I8(read_vec!(self, len, 1, get_i8)),
            ElementType::I16 => Buffer::I16(read_vec!(self, len, 2, get_i16_le)),
            ElementType::I32 => Buffer::I32(read_vec!(self, len, 4, get_i32_le)),
            ElementType::I64 => Buffer::I64(read_vec!(self, len, 8, get_i64_le)),
            ElementType::U8 => {
                self.need(Some(len))?;
                let v = self.buf[..len].to_vec();
                self.buf.advance(len);
                Buffer::U8(v)
            }
            ElementType::U16 => Buffer::U16(read_vec!(self, len, 2, get_u16_le)),
            ElementType::U32 => Buffer::U32(read_vec!(self, len, 4, get_u32_le)),
            ElementType::U64 => Buffer::U64(read_vec!(self, len, 8, get_u64_le)),
            ElementType::F32 => Buffer::F32(read_vec!(self, len, 4, get_f32_le)),
            ElementType::F64 => Buffer::F64(read_vec!(self, len, 8, get_f64_le)),
            ElementType::Str => {
                // every string carries at least its 8-byte length
                self.need(len.checked_mul(8))?;
                Buffer::Str((0..len).map(|_| self.string()).collect::<Result<Vec<_>>>()?)
            }
            ElementType::ComplexI16 => {
                self.need(len.checked_mul(4))?;
                Buffer::ComplexI16(
                    (0..len)
                        .map(|_| Complex::new(self.buf.get_i16_le(), self.buf.get_i16_le()))
                        .collect(),
                )
            }
            ElementType::ComplexF32 => {
                self.need(len.checked_mul(8))?;
                Buffer::ComplexF32(
                    (0..len)
                        .map(|_| Complex::new(self.buf.get_f32_le(), self.buf.get_f32_le()))
                        .collect(),
                )
            }
        };
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dalkit_core::Schema;

    fn sample_tree() -> Node {
        let mut root = GroupData::default();
        root.attributes
            .set("TELESCOPE", Attribute::scalar("LOFAR".to_string()))
            .unwrap();
        root.attributes
            .set("FREQS", Attribute::list(vec![1.5_f64, f64::NAN, -0.0]))
            .unwrap();

        let schema = Schema::from_columns([
            Column::new("NAME", ElementType::Str),
            Column::array("FLAG", ElementType::Char, 2),
        ])
        .unwrap();
        let mut table = TableData::new(schema);
        table
            .append_rows(
                &[
                    Buffer::from(vec!["CS001", ""]),
                    Buffer::Char(vec![Char(b'y'), Char(b'n'), Char(0), Char(255)]),
                ],
                2,
            )
            .unwrap();

        let mut array = ArrayData::new(&[2, 3], ElementType::I64, Some(&[1, 3])).unwrap();
        array.data = Buffer::I64(vec![i64::MIN, -1, 0, 1, 2, i64::MAX]);

        let mut visibilities = ArrayData::new(&[2], ElementType::ComplexF32, None).unwrap();
        visibilities.data =
            Buffer::ComplexF32(vec![Complex::new(1.5, -0.25), Complex::new(f32::MIN, f32::MAX)]);
        visibilities
            .attributes
            .set("GAIN", Attribute::scalar(Complex::new(-3_i16, 7)))
            .unwrap();

        let mut sub = GroupData::default();
        sub.insert("antennas", Node::Table(table)).unwrap();
        root.insert("station", Node::Group(sub)).unwrap();
        root.insert("beam", Node::Array(array)).unwrap();
        root.insert("visibilities", Node::Array(visibilities)).unwrap();
        Node::Group(root)
    }

    #[test]
    fn test_roundtrip_is_bit_exact() {
        let tree = sample_tree();
        let bytes = encode(&tree, StorageKind::Hierarchical);
        assert_eq!(&bytes[..8], &MAGIC);
        let (kind, decoded) = decode(&bytes).unwrap();
        assert_eq!(kind, StorageKind::Hierarchical);

        // NaN != NaN, so compare the re-encoded image instead
        assert_eq!(encode(&decoded, kind), bytes);
        let Node::Group(root) = decoded else {
            panic!("root should be a group");
        };
        let freqs = root.attributes.get_list_as::<f64>("FREQS").unwrap();
        assert!(freqs[1].is_nan());
        assert!(freqs[2].is_sign_negative());

        let Node::Array(visibilities) = &root.children["visibilities"] else {
            panic!("visibilities should be an array");
        };
        assert_eq!(
            visibilities.data,
            Buffer::ComplexF32(vec![Complex::new(1.5, -0.25), Complex::new(f32::MIN, f32::MAX)])
        );
        assert_eq!(
            visibilities.attributes.get_as::<Complex<i16>>("GAIN").unwrap(),
            Complex::new(-3, 7)
        );
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let mut payload = vec![TAG_GROUP];
        payload.put_u64_le(2);
        for value in [1_u8, 2] {
            put_str(&mut payload, "NAME");
            payload.put_u8(1);
            put_buffer(&mut payload, &Buffer::U8(vec![value]));
        }
        payload.put_u64_le(0);
        let mut bytes = Vec::new();
        bytes.put_slice(&MAGIC);
        bytes.put_u16_le(VERSION);
        bytes.put_u8(0);
        bytes.put_bytes(0, 5);
        bytes.put_u64_le(payload.len() as u64);
        bytes.put_u32_le(crc32fast::hash(&payload));
        bytes.put_u32_le(0);
        bytes.extend_from_slice(&payload);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::Core(dalkit_core::Error::FormatError(ref m)) if m.contains("duplicate attribute")
        ));
    }

    #[test]
    fn test_header_errors() {
        let bytes = encode(&sample_tree(), StorageKind::Columnar);
        assert!(decode(&bytes[..10]).unwrap_err().is_terminal());

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(decode(&bad_magic).unwrap_err().is_terminal());

        let mut bad_version = bytes.clone();
        bad_version[8] = 9;
        assert!(decode(&bad_version).is_err());

        let mut bad_kind = bytes.clone();
        bad_kind[10] = 42;
        assert!(decode(&bad_kind).is_err());
    }

    #[test]
    fn test_corruption_detected() {
        let bytes = encode(&sample_tree(), StorageKind::Hierarchical);

        let mut flipped = bytes.clone();
        let last = flipped.len() - 1;
        flipped[last] ^= 0xFF;
        let err = decode(&flipped).unwrap_err();
        assert!(matches!(
            err,
            Error::Core(dalkit_core::Error::FormatError(ref m)) if m.contains("checksum")
        ));

        assert!(decode(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn test_huge_length_does_not_allocate() {
        // a group claiming u64::MAX children with a valid checksum
        let mut payload = vec![TAG_GROUP];
        payload.put_u64_le(0);
        payload.put_u64_le(u64::MAX);
        let mut bytes = Vec::new();
        bytes.put_slice(&MAGIC);
        bytes.put_u16_le(VERSION);
        bytes.put_u8(0);
        bytes.put_bytes(0, 5);
        bytes.put_u64_le(payload.len() as u64);
        bytes.put_u32_le(crc32fast::hash(&payload));
        bytes.put_u32_le(0);
        bytes.extend_from_slice(&payload);
        assert!(decode(&bytes).is_err());
    }
}
