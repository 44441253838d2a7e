#![allow(dead_code)]

// Filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html

use lpcnor::flash::{PebFlash, WRITE_LINE};
use lpcnor::{Error, Result};

pub const PEB_COUNT: u8 = 3;
pub const PEB_SIZE: u32 = 4096;
pub const PAGE_SIZE: usize = WRITE_LINE;

/// RAM-backed NOR flash: programming can only clear bits, erasing restores
/// a whole block to ones. Every operation is logged and the device can be
/// told to fail from the Nth operation on, which doubles as a power cut at
/// operation granularity.
pub struct RamFlash {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    pub operations: Vec<Operation>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Erase { peb: u8 },
    Program { peb: u8, offset: u32, len: usize },
}

impl RamFlash {
    pub fn new() -> Self {
        RamFlash {
            buf: vec![0xffu8; PEB_SIZE as usize * PEB_COUNT as usize],
            fail_after_operation: usize::MAX,
            operations: Vec::new(),
        }
    }

    pub fn fail_after(&mut self, operation: usize) {
        self.fail_after_operation = operation;
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
    }

    pub fn erases(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Erase { .. }))
            .count()
    }

    pub fn dump_operations(&self) {
        println!("Operations:");
        for op in &self.operations {
            println!("  {:?}", op);
        }
    }

    fn faulted(&self) -> bool {
        self.operations.len() >= self.fail_after_operation
    }
}

impl Default for RamFlash {
    fn default() -> Self {
        RamFlash::new()
    }
}

impl PebFlash for RamFlash {
    const PEB_COUNT: u8 = PEB_COUNT;
    const PEB_SIZE: u32 = PEB_SIZE;

    fn peb_slice(&self, peb: u8) -> &[u8] {
        let start = usize::from(peb) * PEB_SIZE as usize;
        &self.buf[start..start + PEB_SIZE as usize]
    }

    fn peb_erase(&mut self, peb: u8) -> Result<()> {
        assert!(peb < PEB_COUNT);
        if self.faulted() {
            return Err(Error::Transport);
        }
        self.operations.push(Operation::Erase { peb });
        let start = usize::from(peb) * PEB_SIZE as usize;
        for byte in &mut self.buf[start..start + PEB_SIZE as usize] {
            *byte = 0xff;
        }
        Ok(())
    }

    fn peb_program(&mut self, peb: u8, offset: u32, bytes: &[u8]) -> Result<()> {
        assert!(peb < PEB_COUNT);
        assert!(offset as usize % WRITE_LINE == 0, "unaligned program");
        assert!(bytes.len() % WRITE_LINE == 0, "partial write line");
        assert!(offset as usize + bytes.len() <= PEB_SIZE as usize);
        if self.faulted() {
            return Err(Error::Transport);
        }
        self.operations.push(Operation::Program {
            peb,
            offset,
            len: bytes.len(),
        });
        let start = usize::from(peb) * PEB_SIZE as usize + offset as usize;
        for (i, &value) in bytes.iter().enumerate() {
            // NOR programming can only move bits from 1 to 0
            self.buf[start + i] &= value;
        }
        Ok(())
    }
}

/// Raw little-endian views of the on-flash layout, for asserting what the
/// engine actually persisted.
pub mod raw {
    use super::*;

    pub fn header_magic(flash: &RamFlash, peb: u8) -> u16 {
        let s = flash.peb_slice(peb);
        u16::from_le_bytes([s[0], s[1]])
    }

    pub fn header_is_valid(flash: &RamFlash, peb: u8) -> bool {
        let s = flash.peb_slice(peb);
        let stored = u32::from_le_bytes([s[12], s[13], s[14], s[15]]);
        header_magic(flash, peb) == 0xacdc && stored == lpcnor::crc32::crc32_of(&s[..12])
    }

    pub fn header_leb(flash: &RamFlash, peb: u8) -> u8 {
        flash.peb_slice(peb)[2]
    }

    pub fn header_generation(flash: &RamFlash, peb: u8) -> u8 {
        flash.peb_slice(peb)[3] & 0x3
    }

    pub fn header_erase_count(flash: &RamFlash, peb: u8) -> u32 {
        let s = flash.peb_slice(peb);
        u32::from_le_bytes([s[5], s[6], s[7], 0])
    }

    pub fn header_transferred_slots(flash: &RamFlash, peb: u8) -> u16 {
        let s = flash.peb_slice(peb);
        u16::from_le_bytes([s[8], s[9]])
    }

    pub fn slot_line(flash: &RamFlash, peb: u8, index: u16) -> &[u8] {
        let offset = 16 + usize::from(index) * 16;
        &flash.peb_slice(peb)[offset..offset + 16]
    }

    pub fn slot_page(flash: &RamFlash, peb: u8, index: u16) -> u16 {
        let line = slot_line(flash, peb, index);
        u16::from_le_bytes([line[0], line[1]])
    }

    pub fn slot_size(flash: &RamFlash, peb: u8, index: u16) -> u16 {
        let line = slot_line(flash, peb, index);
        u16::from_le_bytes([line[2], line[3]])
    }

    pub fn slot_data_crc(flash: &RamFlash, peb: u8, index: u16) -> u32 {
        let line = slot_line(flash, peb, index);
        u32::from_le_bytes([line[8], line[9], line[10], line[11]])
    }

    pub fn slot_is_blank(flash: &RamFlash, peb: u8, index: u16) -> bool {
        slot_line(flash, peb, index).iter().all(|&b| b == 0xff)
    }

    pub fn page(flash: &RamFlash, peb: u8, page: u16) -> &[u8] {
        let offset = usize::from(page) * PAGE_SIZE;
        &flash.peb_slice(peb)[offset..offset + PAGE_SIZE]
    }
}
