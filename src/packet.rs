//! Typed packet payloads over frames
//!
//! A thin little-endian codec for the fixed-width message bodies carried
//! inside HDLC frames: integers on their natural width, floats on four
//! bytes, booleans as the four-byte words `vrai`/`faux`, strings as a
//! 32-bit length followed by the bytes. The framing layer supplies
//! integrity; this layer only supplies layout.

use crate::hdlc::HdlcSender;
use crate::{Error, Result};

/// Boolean wire words.
const TRUE_WORD: u32 = 0x7672_6169; // 'vrai'
const FALSE_WORD: u32 = 0x6661_7578; // 'faux'

/// Appends typed values to a frame being built in an [`HdlcSender`].
pub struct PacketWriter<'a, const CAP: usize> {
    sender: &'a mut HdlcSender<CAP>,
}

impl<'a, const CAP: usize> PacketWriter<'a, CAP> {
    pub fn new(sender: &'a mut HdlcSender<CAP>) -> Self {
        PacketWriter { sender }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        if self.sender.write(bytes) == bytes.len() {
            Ok(())
        } else {
            Err(Error::Capacity)
        }
    }

    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    pub fn put_f32(&mut self, value: f32) -> Result<()> {
        self.put(&value.to_bits().to_le_bytes())
    }

    pub fn put_bool(&mut self, value: bool) -> Result<()> {
        self.put_u32(if value { TRUE_WORD } else { FALSE_WORD })
    }

    /// A 32-bit byte count followed by the string bytes, no terminator.
    pub fn put_str(&mut self, value: &str) -> Result<()> {
        self.put_u32(value.len() as u32)?;
        self.put(value.as_bytes())
    }

    /// Raw bytes, the receiver must know their extent.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.put(bytes)
    }
}

/// Reads typed values out of a received frame payload.
pub struct PacketParser<'a> {
    payload: &'a [u8],
    offset: usize,
}

impl<'a> PacketParser<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        PacketParser { payload, offset: 0 }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.offset
    }

    pub fn at_end(&self) -> bool {
        self.offset >= self.payload.len()
    }

    pub fn rewind(&mut self) {
        self.offset = 0;
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::Format);
        }
        let bytes = &self.payload[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        self.get_u32().map(f32::from_bits)
    }

    /// Anything but the `faux` word reads as true.
    pub fn get_bool(&mut self) -> Result<bool> {
        self.get_u32().map(|word| word != FALSE_WORD)
    }

    /// A length-prefixed string's bytes.
    pub fn get_string(&mut self) -> Result<&'a [u8]> {
        let len = self.get_u32()? as usize;
        self.take(len)
    }

    pub fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    /// The rest of the payload, consuming it.
    pub fn rest(&mut self) -> &'a [u8] {
        let bytes = &self.payload[self.offset..];
        self.offset = self.payload.len();
        bytes
    }
}
