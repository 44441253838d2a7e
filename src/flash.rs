//! NOR flash capability
//!
//! The record store sees flash as a numbered array of physical erase blocks
//! (PEBs) behind the [`PebFlash`] trait: memory-mapped reads, whole-block
//! erase, and write-line-granular programming where bits only ever move from
//! 1 to 0 between erases.

#[cfg(feature = "embedded-storage")]
use crate::Error;
use crate::Result;

/// Smallest programmable unit, in bytes.
///
/// On LPC parts the on-chip controller ECC-protects each 16-byte line, so a
/// line can be programmed only once per erase cycle.
pub const WRITE_LINE: usize = 16;

/// A compile-time-sized array of physical erase blocks.
///
/// Contracts:
/// - `peb_program` accepts any offset and length that are multiples of
///   [`WRITE_LINE`]; between erases only 1→0 bit transitions are legal.
/// - `peb_erase` restores every bit of the block to 1.
/// - Failures surface as [`Error::Transport`]; this layer does not retry.
pub trait PebFlash {
    /// Number of physical erase blocks.
    const PEB_COUNT: u8;
    /// Size of every erase block in bytes; a power of two and a multiple of
    /// [`WRITE_LINE`].
    const PEB_SIZE: u32;

    /// Memory-mapped read view of one erase block.
    fn peb_slice(&self, peb: u8) -> &[u8];

    /// Erases one block.
    fn peb_erase(&mut self, peb: u8) -> Result<()>;

    /// Programs bytes at `offset` within the block.
    fn peb_program(&mut self, peb: u8, offset: u32, bytes: &[u8]) -> Result<()>;

    /// Whether every byte of the block reads back as 0xFF.
    fn peb_is_blank(&self, peb: u8) -> bool {
        self.peb_slice(peb).iter().all(|&b| b == 0xff)
    }
}

/// Linear byte-addressed view over the whole PEB array.
///
/// Address 0 is the first byte of PEB 0; block `i` starts at
/// `i * PEB_SIZE`. This is the seam other `embedded-storage` consumers plug
/// into when they share the device with the record store.
#[cfg(feature = "embedded-storage")]
pub struct FlashRegion<'a, F: PebFlash> {
    flash: &'a mut F,
}

#[cfg(feature = "embedded-storage")]
impl<'a, F: PebFlash> FlashRegion<'a, F> {
    pub fn new(flash: &'a mut F) -> Self {
        FlashRegion { flash }
    }

    fn capacity_bytes() -> u32 {
        u32::from(F::PEB_COUNT) * F::PEB_SIZE
    }

    fn split(offset: u32) -> Result<(u8, u32)> {
        if offset >= Self::capacity_bytes() {
            return Err(Error::Capacity);
        }
        Ok(((offset / F::PEB_SIZE) as u8, offset % F::PEB_SIZE))
    }
}

#[cfg(feature = "embedded-storage")]
impl embedded_storage::nor_flash::NorFlashError for Error {
    fn kind(&self) -> embedded_storage::nor_flash::NorFlashErrorKind {
        use embedded_storage::nor_flash::NorFlashErrorKind::*;

        match self {
            Error::Capacity => OutOfBounds,
            Error::Format => NotAligned,
            _ => Other,
        }
    }
}

#[cfg(feature = "embedded-storage")]
impl<'a, F: PebFlash> embedded_storage::nor_flash::ErrorType for FlashRegion<'a, F> {
    type Error = Error;
}

#[cfg(feature = "embedded-storage")]
impl<'a, F: PebFlash> embedded_storage::nor_flash::ReadNorFlash for FlashRegion<'a, F> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<()> {
        if offset as usize + bytes.len() > Self::capacity_bytes() as usize {
            return Err(Error::Capacity);
        }
        let mut offset = offset;
        let mut rest = bytes;
        while !rest.is_empty() {
            let (peb, at) = Self::split(offset)?;
            let chunk = rest.len().min((F::PEB_SIZE - at) as usize);
            let (head, tail) = rest.split_at_mut(chunk);
            head.copy_from_slice(&self.flash.peb_slice(peb)[at as usize..at as usize + chunk]);
            rest = tail;
            offset += chunk as u32;
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        Self::capacity_bytes() as usize
    }
}

#[cfg(feature = "embedded-storage")]
impl<'a, F: PebFlash> embedded_storage::nor_flash::NorFlash for FlashRegion<'a, F> {
    const WRITE_SIZE: usize = WRITE_LINE;
    const ERASE_SIZE: usize = F::PEB_SIZE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<()> {
        if from % F::PEB_SIZE != 0 || to % F::PEB_SIZE != 0 {
            return Err(Error::Format);
        }
        if to > Self::capacity_bytes() || from > to {
            return Err(Error::Capacity);
        }
        for peb in from / F::PEB_SIZE..to / F::PEB_SIZE {
            self.flash.peb_erase(peb as u8)?;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<()> {
        if offset as usize % WRITE_LINE != 0 || bytes.len() % WRITE_LINE != 0 {
            return Err(Error::Format);
        }
        if offset as usize + bytes.len() > Self::capacity_bytes() as usize {
            return Err(Error::Capacity);
        }
        let mut offset = offset;
        let mut bytes = bytes;
        while !bytes.is_empty() {
            let (peb, at) = Self::split(offset)?;
            let chunk = bytes.len().min((F::PEB_SIZE - at) as usize);
            self.flash.peb_program(peb, at, &bytes[..chunk])?;
            bytes = &bytes[chunk..];
            offset += chunk as u32;
        }
        Ok(())
    }
}
