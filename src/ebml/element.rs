//! In-memory element tree
//!
//! Documents are composed from borrowed parts: a [`Master`] holds an ordered
//! slice of child references, a [`Leaf`] owns its typed value and a
//! [`LeafRef`] borrows one. Outer sizes are computed on the way down, so a
//! tree writes itself in a single pass with no buffering. Reusing a leaf
//! under several masters is fine; cycles are forbidden and undetected.

use super::writer::EbmlWriter;
use super::{id_len, size_field_len, EbmlValue, Id};
use crate::io;
use crate::Result;

/// One node of an EBML document.
pub trait Element {
    fn id(&self) -> Id;

    /// Size of the data area in bytes.
    fn data_size(&self) -> usize;

    /// Writes the data area only.
    fn write_data(&self, writer: &mut EbmlWriter<&mut dyn io::Write>) -> Result<()>;

    /// Encoded size of the whole element: id, size field and data.
    fn outer_size(&self) -> usize {
        let data_size = self.data_size();
        id_len(self.id()) + size_field_len(data_size) + data_size
    }

    /// Writes the whole element.
    fn write(&self, writer: &mut EbmlWriter<&mut dyn io::Write>) -> Result<()> {
        writer.write_id(self.id())?;
        writer.write_size(self.data_size())?;
        self.write_data(writer)
    }
}

/// Writes an element tree to any byte sink.
pub fn write_into<W: io::Write>(element: &dyn Element, sink: &mut W) -> Result<()> {
    let mut writer = EbmlWriter::new(sink as &mut dyn io::Write);
    element.write(&mut writer)
}

/// A leaf element owning its value.
pub struct Leaf<V: EbmlValue> {
    id: Id,
    value: V,
}

impl<V: EbmlValue> Leaf<V> {
    pub fn new(id: Id, value: V) -> Self {
        Leaf { id, value }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn set_value(&mut self, value: V) {
        self.value = value;
    }
}

impl<V: EbmlValue> Element for Leaf<V> {
    fn id(&self) -> Id {
        self.id
    }

    fn data_size(&self) -> usize {
        self.value.data_size()
    }

    fn write_data(&self, writer: &mut EbmlWriter<&mut dyn io::Write>) -> Result<()> {
        writer.write_value(&self.value)
    }
}

/// A leaf element borrowing its value; the value must outlive the leaf.
pub struct LeafRef<'a, V: EbmlValue + ?Sized> {
    id: Id,
    value: &'a V,
}

impl<'a, V: EbmlValue + ?Sized> LeafRef<'a, V> {
    pub fn new(id: Id, value: &'a V) -> Self {
        LeafRef { id, value }
    }

    pub fn value(&self) -> &V {
        self.value
    }
}

impl<'a, V: EbmlValue + ?Sized> Element for LeafRef<'a, V> {
    fn id(&self) -> Id {
        self.id
    }

    fn data_size(&self) -> usize {
        self.value.data_size()
    }

    fn write_data(&self, writer: &mut EbmlWriter<&mut dyn io::Write>) -> Result<()> {
        writer.write_value(self.value)
    }
}

/// An element containing other elements. Children must outlive the master
/// and are written in slice order.
pub struct Master<'a> {
    id: Id,
    children: &'a [&'a dyn Element],
}

impl<'a> Master<'a> {
    pub fn new(id: Id, children: &'a [&'a dyn Element]) -> Self {
        Master { id, children }
    }

    pub fn children(&self) -> &[&dyn Element] {
        self.children
    }
}

impl<'a> Element for Master<'a> {
    fn id(&self) -> Id {
        self.id
    }

    /// The data size of a master is the sum of its children's outer sizes.
    fn data_size(&self) -> usize {
        self.children.iter().map(|child| child.outer_size()).sum()
    }

    fn write_data(&self, writer: &mut EbmlWriter<&mut dyn io::Write>) -> Result<()> {
        for child in self.children {
            child.write(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{ID_DOC_TYPE, ID_DOC_TYPE_VERSION, ID_EBML};
    use super::*;
    use crate::io::SliceWriter;

    #[test]
    fn leaf_sizes() {
        let version = Leaf::new(ID_DOC_TYPE_VERSION, 2u32);
        assert_eq!(version.data_size(), 1);
        // 2-byte id + 1-byte size field + 1 data byte
        assert_eq!(version.outer_size(), 4);

        let empty = Leaf::new(ID_DOC_TYPE_VERSION, 0u32);
        assert_eq!(empty.outer_size(), 3);
    }

    #[test]
    fn master_sums_children() {
        let doc_type = LeafRef::new(ID_DOC_TYPE, "webm");
        let version = Leaf::new(ID_DOC_TYPE_VERSION, 2u32);
        let children: [&dyn Element; 2] = [&doc_type, &version];
        let master = Master::new(ID_EBML, &children);
        assert_eq!(master.data_size(), doc_type.outer_size() + version.outer_size());
        // 4-byte id + 1-byte size field + children
        assert_eq!(master.outer_size(), 5 + master.data_size());
    }

    #[test]
    fn tree_writes_depth_first() {
        let doc_type = LeafRef::new(ID_DOC_TYPE, "webm");
        let version = Leaf::new(ID_DOC_TYPE_VERSION, 2u32);
        let children: [&dyn Element; 2] = [&doc_type, &version];
        let master = Master::new(ID_EBML, &children);

        let mut buf = [0u8; 32];
        let mut sink = SliceWriter::new(&mut buf);
        write_into(&master, &mut sink).unwrap();
        let written = sink.written();
        assert_eq!(written.len(), master.outer_size());
        assert_eq!(&written[..4], &[0x1a, 0x45, 0xdf, 0xa3]);
        assert_eq!(written[4], 0x80 | 11);
        assert_eq!(&written[5..7], &[0x42, 0x82]);
        assert_eq!(written[7], 0x84);
        assert_eq!(&written[8..12], b"webm");
        assert_eq!(&written[12..16], &[0x42, 0x87, 0x81, 0x02]);
    }

    #[test]
    fn shared_leaf_is_a_dag() {
        let shared = Leaf::new(ID_DOC_TYPE_VERSION, 7u32);
        let left_children: [&dyn Element; 1] = [&shared];
        let right_children: [&dyn Element; 1] = [&shared];
        let left = Master::new(ID_EBML, &left_children);
        let right = Master::new(ID_EBML, &right_children);
        assert_eq!(left.data_size(), right.data_size());
    }
}
