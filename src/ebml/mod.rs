//! EBML binary format support
//!
//! Variable-length self-describing IDs and size fields, big-endian typed
//! data, per <http://ebml.sourceforge.net/specs/>. The writer serializes,
//! the element tree composes documents in memory, and the parser streams
//! them back with bounded-size enforcement.

mod element;
mod parser;
mod writer;

pub use self::element::{write_into, Element, Leaf, LeafRef, Master};
pub use self::parser::{EbmlParser, ElementHead};
pub use self::writer::EbmlWriter;

use crate::io;
use crate::Result;

/// An EBML element identifier, leading marker bit included.
pub type Id = u32;

/// Well-known element ids.
pub const ID_EBML: Id = 0x1A45_DFA3;
pub const ID_EBML_VERSION: Id = 0x4286;
pub const ID_EBML_READ_VERSION: Id = 0x42f7;
pub const ID_EBML_MAX_ID_LENGTH: Id = 0x42f2;
pub const ID_EBML_MAX_SIZE_LENGTH: Id = 0x42f3;
pub const ID_DOC_TYPE: Id = 0x4282;
pub const ID_DOC_TYPE_VERSION: Id = 0x4287;
pub const ID_DOC_TYPE_READ_VERSION: Id = 0x4285;
pub const ID_CRC32: Id = 0xbf;
pub const ID_VOID: Id = 0xec;

/// Number of bytes an id occupies on the wire, 0 when the id is invalid.
///
/// The topmost set bit is the self-describing marker and is part of the id.
pub fn id_len(id: Id) -> usize {
    if id < 1 << 7 {
        // Not an EBML id
        0
    } else if id < 1 << 8 {
        1
    } else if id < 1 << 15 {
        2
    } else if id < 1 << 22 {
        3
    } else if id < 1 << 29 {
        4
    } else {
        0
    }
}

/// Number of bytes needed to encode a data size, 0 when it is too large.
///
/// An all-ones payload means "unknown size" and is reserved, hence the
/// `- 1` at every boundary.
pub fn size_field_len(size: usize) -> usize {
    let size = size as u64;
    for n in 1..=8u32 {
        if size < (1u64 << (7 * n)) - 1 {
            return n as usize;
        }
    }
    0
}

/// A value that knows its EBML data encoding.
pub trait EbmlValue {
    /// Encoded data byte count.
    fn data_size(&self) -> usize;

    /// Writes exactly `data_size()` bytes to the sink.
    fn write_data(&self, sink: &mut dyn io::Write) -> Result<()>;
}

fn put(sink: &mut dyn io::Write, bytes: &[u8]) -> Result<()> {
    if sink.write_all(bytes) == bytes.len() {
        Ok(())
    } else {
        Err(crate::Error::Transport)
    }
}

/// Booleans encode as nothing when false, one byte when true.
impl EbmlValue for bool {
    fn data_size(&self) -> usize {
        if *self {
            1
        } else {
            0
        }
    }

    fn write_data(&self, sink: &mut dyn io::Write) -> Result<()> {
        if *self {
            put(sink, &[1])
        } else {
            Ok(())
        }
    }
}

/// Floats encode as nothing when exactly zero, else 4 big-endian bytes.
impl EbmlValue for f32 {
    fn data_size(&self) -> usize {
        if *self == 0.0 {
            0
        } else {
            4
        }
    }

    fn write_data(&self, sink: &mut dyn io::Write) -> Result<()> {
        if *self == 0.0 {
            Ok(())
        } else {
            put(sink, &self.to_bits().to_be_bytes())
        }
    }
}

macro_rules! unsigned_value {
    ($($uint:ty),+) => {
        $(
            /// Unsigned integers encode in the fewest whole bytes, none at
            /// all for zero.
            impl EbmlValue for $uint {
                fn data_size(&self) -> usize {
                    let bits = <$uint>::BITS - self.leading_zeros();
                    ((bits + 7) / 8) as usize
                }

                fn write_data(&self, sink: &mut dyn io::Write) -> Result<()> {
                    let bytes = self.to_be_bytes();
                    put(sink, &bytes[bytes.len() - self.data_size()..])
                }
            }
        )+
    };
}

unsigned_value!(u8, u16, u32, u64);

macro_rules! signed_value {
    ($($int:ty => $uint:ty),+) => {
        $(
            /// Signed integers reuse the unsigned encoding of their bit
            /// pattern at the same width.
            impl EbmlValue for $int {
                fn data_size(&self) -> usize {
                    (*self as $uint).data_size()
                }

                fn write_data(&self, sink: &mut dyn io::Write) -> Result<()> {
                    (*self as $uint).write_data(sink)
                }
            }
        )+
    };
}

signed_value!(i8 => u8, i16 => u16, i32 => u32, i64 => u64);

/// Strings encode without a terminator.
impl EbmlValue for str {
    fn data_size(&self) -> usize {
        self.len()
    }

    fn write_data(&self, sink: &mut dyn io::Write) -> Result<()> {
        put(sink, self.as_bytes())
    }
}

/// Binary data encodes verbatim.
impl EbmlValue for [u8] {
    fn data_size(&self) -> usize {
        self.len()
    }

    fn write_data(&self, sink: &mut dyn io::Write) -> Result<()> {
        put(sink, self)
    }
}

impl<'a, V: EbmlValue + ?Sized> EbmlValue for &'a V {
    fn data_size(&self) -> usize {
        (**self).data_size()
    }

    fn write_data(&self, sink: &mut dyn io::Write) -> Result<()> {
        (**self).write_data(sink)
    }
}
