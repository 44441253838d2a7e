//! Streaming EBML parser
//!
//! Single-pass and recursive: after [`EbmlParser::parse`] announces an
//! element, the caller either consumes its payload with a typed reader,
//! skips it, or descends into it with [`EbmlParser::sub_parser`]. A child
//! parser reads *through* its parent, so every byte it consumes is counted
//! against each enclosing element's bounded outer size.

use super::Id;
use crate::io::Read;
use crate::{Error, Result};

/// Id and data size of the element just parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHead {
    pub id: Id,
    pub size: usize,
}

pub struct EbmlParser<'a> {
    reader: &'a mut dyn Read,
    bytes_read: usize,
    outer_size: Option<usize>,
    element_id: Id,
    element_size: usize,
}

/// Every read through a parser counts toward its own consumption, and —
/// because a child's reader *is* its parent — toward every enclosing
/// element's too.
impl<'a> Read for EbmlParser<'a> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = self.reader.read(buf);
        self.bytes_read += n;
        n
    }
}

impl<'a> EbmlParser<'a> {
    /// A parser with no outer bound; it never reports "no more".
    pub fn new(reader: &'a mut dyn Read) -> Self {
        EbmlParser {
            reader,
            bytes_read: 0,
            outer_size: None,
            element_id: 0,
            element_size: 0,
        }
    }

    /// A parser bounded to `outer_size` bytes.
    pub fn with_outer_size(reader: &'a mut dyn Read, outer_size: usize) -> Self {
        EbmlParser {
            reader,
            bytes_read: 0,
            outer_size: Some(outer_size),
            element_id: 0,
            element_size: 0,
        }
    }

    /// Bytes consumed through this parser so far.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Id of the element last announced by [`parse`](Self::parse).
    pub fn element_id(&self) -> Id {
        self.element_id
    }

    /// Data size of the element last announced by [`parse`](Self::parse).
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Restarts accounting from the current stream position.
    pub fn reset(&mut self) {
        self.bytes_read = 0;
    }

    /// Parses one element head. The stream must lie at an element start.
    ///
    /// Returns `Ok(None)` when the outer size is exactly consumed,
    /// [`Error::Overrun`] when it was exceeded, and [`Error::Format`] on an
    /// invalid id or size field.
    pub fn parse(&mut self) -> Result<Option<ElementHead>> {
        if let Some(outer) = self.outer_size {
            if self.bytes_read == outer {
                return Ok(None);
            }
            if self.bytes_read > outer {
                return Err(Error::Overrun);
            }
        }
        let id = self.parse_id()?;
        let size = self.parse_size()?;
        self.element_id = id;
        self.element_size = size;
        Ok(Some(ElementHead { id, size }))
    }

    /// A parser over the current element's payload.
    ///
    /// While the child lives, the parent is exclusively borrowed; dropping
    /// the child resumes the parent exactly where the nested consumption
    /// left it.
    pub fn sub_parser(&mut self) -> EbmlParser<'_> {
        let outer_size = self.element_size;
        EbmlParser {
            reader: self,
            bytes_read: 0,
            outer_size: Some(outer_size),
            element_id: 0,
            element_size: 0,
        }
    }

    /// Skips the current element's payload.
    pub fn skip_element(&mut self) -> Result<()> {
        let mut scratch = [0u8; 16];
        let mut left = self.element_size;
        while left > 0 {
            let take = left.min(scratch.len());
            if self.read_all(&mut scratch[..take]) < take {
                return Err(Error::Format);
            }
            left -= take;
        }
        Ok(())
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let wanted = buf.len();
        if self.read_all(buf) < wanted {
            Err(Error::Format)
        } else {
            Ok(())
        }
    }

    /// Decodes an id, leading marker included. Zero never comes back.
    fn parse_id(&mut self) -> Result<Id> {
        let mut first = [0u8; 1];
        self.fill(&mut first)?;
        let b0 = first[0];
        let extra = if b0 & 0x80 != 0 {
            return Ok(Id::from(b0));
        } else if b0 & 0x40 != 0 {
            1
        } else if b0 & 0x20 != 0 {
            2
        } else if b0 & 0x10 != 0 {
            3
        } else {
            return Err(Error::Format);
        };
        let mut rest = [0u8; 3];
        self.fill(&mut rest[..extra])?;
        let mut id = Id::from(b0);
        for &byte in &rest[..extra] {
            id = (id << 8) | Id::from(byte);
        }
        Ok(id)
    }

    /// Decodes a size field, marker bit stripped.
    fn parse_size(&mut self) -> Result<usize> {
        let mut first = [0u8; 1];
        self.fill(&mut first)?;
        let b0 = first[0];
        let (extra, mut value) = if b0 & 0x80 != 0 {
            (0usize, u64::from(b0 & 0x7f))
        } else if b0 & 0x40 != 0 {
            (1, u64::from(b0 & 0x3f))
        } else if b0 & 0x20 != 0 {
            (2, u64::from(b0 & 0x1f))
        } else if b0 & 0x10 != 0 {
            (3, u64::from(b0 & 0x0f))
        } else if b0 & 0x08 != 0 {
            (4, u64::from(b0 & 0x07))
        } else if b0 & 0x04 != 0 {
            (5, u64::from(b0 & 0x03))
        } else if b0 & 0x02 != 0 {
            (6, u64::from(b0 & 0x01))
        } else if b0 & 0x01 != 0 {
            (7, 0)
        } else {
            return Err(Error::Format);
        };
        let mut rest = [0u8; 7];
        self.fill(&mut rest[..extra])?;
        for &byte in &rest[..extra] {
            value = (value << 8) | u64::from(byte);
        }
        // An all-ones payload means "unknown size", which a bounded store
        // cannot represent
        if value == (1u64 << (7 * (extra as u32 + 1))) - 1 {
            return Err(Error::Format);
        }
        if value > usize::MAX as u64 {
            return Err(Error::Format);
        }
        Ok(value as usize)
    }

    fn read_uint(&mut self, max_len: usize) -> Result<u64> {
        let len = self.element_size;
        if len > max_len {
            return Err(Error::Format);
        }
        let mut bytes = [0u8; 8];
        self.fill(&mut bytes[..len])?;
        let mut value = 0u64;
        for &byte in &bytes[..len] {
            value = (value << 8) | u64::from(byte);
        }
        Ok(value)
    }

    /// Reads the current element as an unsigned integer of up to 8 bytes.
    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_uint(8)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_uint(4).map(|v| v as u32)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_uint(2).map(|v| v as u16)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_uint(1).map(|v| v as u8)
    }

    /// Signed integers share the unsigned bit pattern at the same width.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_u32().map(|v| v as i32)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_u64().map(|v| v as i64)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_u32().map(|v| v != 0)
    }

    /// Reads the current element as a float: zero-length means 0.0.
    pub fn read_f32(&mut self) -> Result<f32> {
        match self.element_size {
            0 => Ok(0.0),
            4 => {
                let mut bytes = [0u8; 4];
                self.fill(&mut bytes)?;
                Ok(f32::from_bits(u32::from_be_bytes(bytes)))
            }
            _ => Err(Error::Format),
        }
    }

    /// Reads the current element's bytes into `buf`.
    ///
    /// A payload larger than `buf` is truncated but fully consumed, so the
    /// stream stays positioned at the next element.
    pub fn read_binary<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b [u8]> {
        let len = self.element_size;
        let keep = len.min(buf.len());
        self.fill(&mut buf[..keep])?;
        let mut left = len - keep;
        let mut scratch = [0u8; 16];
        while left > 0 {
            let take = left.min(scratch.len());
            self.fill(&mut scratch[..take])?;
            left -= take;
        }
        Ok(&buf[..keep])
    }

    /// Reads the current element as UTF-8 text.
    pub fn read_str<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b str> {
        let bytes = self.read_binary(buf)?;
        core::str::from_utf8(bytes).map_err(|_| Error::Format)
    }
}
