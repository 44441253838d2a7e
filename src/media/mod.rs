//! Wear-levelled record store ("media engine")
//!
//! The engine manages a set of NOR erase blocks called physical erase blocks
//! (PEBs). Each in-use PEB carries a header naming the logical erase block
//! (LEB) it backs; one PEB is always kept spare so a LEB can be migrated
//! atomically. Within a LEB, record slots grow upward right after the
//! header while record data pages grow downward from the high end, and the
//! two must never meet.
//!
//! A record is created in two phases: reserve space ([`Media::create`]),
//! stream bytes in ([`Media::append`]), then commit ([`Media::commit`]).
//! The commit programs the record's slot in a single write line, which is
//! the atomic transition: before it the record does not exist, after it the
//! record is valid and CRC-protected. Deletion programs the slot a second
//! time, clearing its page and size bits, which can never produce a valid
//! slot. Space freed by deletion is reclaimed when the LEB is next switched
//! onto the spare.
//!
//! Power may be cut at any instant: mount rediscovers the store from the
//! headers and slots alone, discards a half-switched spare, and accounts
//! reserved-but-uncommitted pages so the next switch reclaims them.

mod header;
mod slot;
mod writer;

pub use self::slot::{Ptr, TempPtr};
pub use self::writer::RecordWriter;

use self::header::PebHeader;
use self::slot::{Slot, INLINE_DATA_SIZE, LEB_INVALID, SLOT_SIZE};
use crate::crc32::crc32_of;
use crate::flash::{PebFlash, WRITE_LINE};
use crate::{Error, Result};

#[cfg(feature = "defmt")]
use defmt::trace;

/// One page is one write line.
pub const PAGE_SIZE: usize = WRITE_LINE;

const HEADER_SIZE: usize = WRITE_LINE;
const SLOT_ARRAY_OFFSET: usize = HEADER_SIZE;
const PEB_INVALID: u8 = 0xff;

/// Most logical erase blocks one engine can manage.
pub const LEB_LIMIT: usize = 8;

/// Whether to resume from the stored state or start from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MountMode {
    /// Resume; fails if the PEBs are corrupted beyond self-repair.
    Normal,
    /// Format every PEB and start empty. Erase counts are preserved where
    /// readable, averaged where not.
    Erase,
}

/// In-RAM bookkeeping for one LEB. Rebuilt on mount, never persisted.
#[derive(Debug, Clone, Copy)]
struct LebInfo {
    peb: u8,
    /// Lowest page occupied by record data, or the page count when none is.
    lowest_busy_page: u16,
    /// Pages referenced by valid slots; the rest below `lowest_busy_page`
    /// is garbage a switch would reclaim.
    nb_busy_pages: u16,
    nb_slots: u16,
}

impl LebInfo {
    const fn reset(page_count: u16) -> LebInfo {
        LebInfo {
            peb: PEB_INVALID,
            lowest_busy_page: page_count,
            nb_busy_pages: 0,
            nb_slots: 0,
        }
    }

    fn is_valid(&self) -> bool {
        self.peb != PEB_INVALID
    }

    fn reclaimable_pages(&self, page_count: u16) -> u16 {
        page_count - self.lowest_busy_page - self.nb_busy_pages
    }
}

/// Per-LEB usage snapshot for diagnostics and wear monitoring.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LebStats {
    pub peb: u8,
    pub erase_count: u32,
    pub nb_slots: u16,
    pub nb_busy_pages: u16,
    pub lowest_busy_page: u16,
}

struct Scan {
    healthy: bool,
    avg_erase_count: u32,
}

/// The record store. Owns the flash capability and the LEB table.
pub struct Media<F: PebFlash> {
    flash: F,
    lebs: [LebInfo; LEB_LIMIT],
    spare: u8,
}

impl<F: PebFlash> Media<F> {
    pub fn new(flash: F) -> Media<F> {
        assert!(F::PEB_COUNT >= 2, "need at least one LEB and a spare");
        assert!(
            usize::from(F::PEB_COUNT - 1) <= LEB_LIMIT,
            "LEB table too small for this flash"
        );
        assert!(
            F::PEB_SIZE.is_power_of_two() && F::PEB_SIZE as usize % WRITE_LINE == 0,
            "impossible erase block geometry"
        );
        Media {
            flash,
            lebs: [LebInfo::reset(Self::page_count()); LEB_LIMIT],
            spare: PEB_INVALID,
        }
    }

    /// Read access to the underlying flash.
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Releases the flash capability.
    pub fn release(self) -> F {
        self.flash
    }

    fn leb_count() -> u8 {
        F::PEB_COUNT - 1
    }

    fn page_count() -> u16 {
        (F::PEB_SIZE as usize / PAGE_SIZE) as u16
    }

    fn pages_for(size: usize) -> u16 {
        ((size + PAGE_SIZE - 1) / PAGE_SIZE) as u16
    }

    /// First page the data area may use, given a slot count.
    fn slots_end_page(nb_slots: u16) -> u16 {
        Self::pages_for(SLOT_ARRAY_OFFSET + usize::from(nb_slots) * SLOT_SIZE)
    }

    fn header(&self, peb: u8) -> Option<PebHeader> {
        PebHeader::decode(&self.flash.peb_slice(peb)[..HEADER_SIZE])
    }

    fn erase_count(&self, peb: u8) -> u32 {
        self.header(peb).map(|h| h.erase_count).unwrap_or(u32::MAX)
    }

    fn slot_line(&self, peb: u8, index: u16) -> &[u8] {
        let offset = SLOT_ARRAY_OFFSET + usize::from(index) * SLOT_SIZE;
        &self.flash.peb_slice(peb)[offset..offset + SLOT_SIZE]
    }

    fn program_slot(&mut self, peb: u8, index: u16, line: &[u8; SLOT_SIZE]) -> Result<()> {
        let offset = (SLOT_ARRAY_OFFSET + usize::from(index) * SLOT_SIZE) as u32;
        self.flash.peb_program(peb, offset, line)
    }

    fn pg_is_blank(&self, peb: u8, page: u16) -> bool {
        let offset = usize::from(page) * PAGE_SIZE;
        self.flash.peb_slice(peb)[offset..offset + PAGE_SIZE]
            .iter()
            .all(|&b| b == 0xff)
    }

    /// Writes a fresh PEB header. This is the only program that commits
    /// store-level state, so it must not be torn apart by interrupt code
    /// touching the same flash controller.
    fn write_leb_header(
        &mut self,
        peb: u8,
        leb: u8,
        generation: u8,
        transferred_slots: u16,
        erase_count: u32,
    ) -> Result<()> {
        let line = PebHeader::new(leb, generation, transferred_slots, erase_count).encode();
        let flash = &mut self.flash;
        interrupt_free(|| flash.peb_program(peb, 0, &line))
    }

    /// Sets up the store.
    ///
    /// After a successful mount every LEB has a backing valid PEB and one
    /// PEB is the spare.
    pub fn mount(&mut self, mode: MountMode) -> Result<()> {
        let scan = self.scan_pebs();
        #[cfg(feature = "defmt")]
        trace!("media: mount healthy={}", scan.healthy);
        match mode {
            MountMode::Normal => {
                if scan.healthy {
                    Ok(())
                } else {
                    Err(Error::Format)
                }
            }
            MountMode::Erase => self.format_lebs(scan.avg_erase_count),
        }
    }

    /// Scans every PEB, classifying them and rebuilding the LEB table.
    fn scan_pebs(&mut self) -> Scan {
        let page_count = Self::page_count();
        let leb_count = Self::leb_count();
        for info in self.lebs.iter_mut() {
            *info = LebInfo::reset(page_count);
        }
        self.spare = PEB_INVALID;

        let mut sum_erase = 0u32;
        let mut nb_erase = 0u32;
        let mut healthy = true;

        for peb in 0..F::PEB_COUNT {
            if self.flash.peb_is_blank(peb) {
                // A second spare means corruption
                if self.spare != PEB_INVALID {
                    healthy = false;
                    break;
                }
                self.spare = peb;
                continue;
            }
            let ph = match self.header(peb) {
                Some(ph) => ph,
                None => {
                    // Bad header. Usable as spare if none is registered yet
                    if self.spare != PEB_INVALID {
                        healthy = false;
                        break;
                    }
                    self.spare = peb;
                    continue;
                }
            };
            if ph.leb >= leb_count {
                // More LEBs on flash than configured
                healthy = false;
                break;
            }
            sum_erase += ph.erase_count;
            nb_erase += 1;

            let previous = self.lebs[usize::from(ph.leb)].peb;
            if previous != PEB_INVALID {
                // Duplicate LEB, left behind by a power cut during a switch.
                // The generation-younger PEB wins; the loser is the spare.
                if self.spare != PEB_INVALID {
                    healthy = false;
                    break;
                }
                let newer = match self.header(previous) {
                    Some(prev) => ph.is_more_recent_than(&prev),
                    None => true,
                };
                if newer {
                    self.spare = previous;
                    self.lebs[usize::from(ph.leb)].peb = peb;
                } else {
                    self.spare = peb;
                }
            } else {
                self.lebs[usize::from(ph.leb)].peb = peb;
            }
        }

        if healthy {
            healthy = self.spare != PEB_INVALID
                && (0..leb_count).all(|leb| self.lebs[usize::from(leb)].is_valid());
        }

        if healthy {
            healthy = self.scan_slots();
        }

        Scan {
            healthy,
            avg_erase_count: if nb_erase > 0 { sum_erase / nb_erase } else { 0 },
        }
    }

    /// Walks every LEB's slot array, counting slots and busy pages, then
    /// extends the busy area over any uncommitted data left by a power cut.
    fn scan_slots(&mut self) -> bool {
        let page_count = Self::page_count();
        // All lines past the header could in principle be slots
        let max_slots = (F::PEB_SIZE as usize - HEADER_SIZE) / SLOT_SIZE;

        for leb in 0..Self::leb_count() {
            let info = self.lebs[usize::from(leb)];
            let fence = match self.header(info.peb) {
                Some(ph) => ph.transferred_slots,
                None => return false,
            };

            let nb_slots;
            let mut nb_busy = 0u16;
            let mut lowest = page_count;
            let mut index = 0u16;
            loop {
                if usize::from(index) >= max_slots {
                    return false;
                }
                let line = self.slot_line(info.peb, index);
                if index >= fence && Slot::line_is_blank(line) {
                    // First blank slot past the transfer fence ends the array
                    nb_slots = index;
                    break;
                }
                let slot = Slot::decode(line);
                if slot.is_valid() && !slot.is_inline() {
                    nb_busy += Self::pages_for(usize::from(slot.size));
                    if slot.page < lowest {
                        lowest = slot.page;
                    }
                }
                // Invalid slots are garbage; their size is unreliable, skip them
                index += 1;
            }

            // Data programmed below the busy area without a committed slot
            // belongs to an interrupted write; treat it as occupied so the
            // next switch reclaims it.
            let floor = Self::slots_end_page(nb_slots);
            for page in floor..lowest {
                if !self.pg_is_blank(info.peb, page) {
                    lowest = page;
                    break;
                }
            }

            self.lebs[usize::from(leb)] = LebInfo {
                peb: info.peb,
                lowest_busy_page: lowest,
                nb_busy_pages: nb_busy,
                nb_slots,
            };
        }
        true
    }

    /// Formats every PEB: LEB n on PEB n, the last PEB as the spare.
    fn format_lebs(&mut self, erase_count: u32) -> Result<()> {
        #[cfg(feature = "defmt")]
        trace!("media: formatting, erase_count={}", erase_count);
        let page_count = Self::page_count();
        for leb in 0..Self::leb_count() {
            let peb = leb;
            self.lebs[usize::from(leb)] = LebInfo::reset(page_count);
            if !self.flash.peb_is_blank(peb) {
                self.flash.peb_erase(peb)?;
            }
            self.write_leb_header(peb, leb, 0, 0, erase_count)?;
            self.lebs[usize::from(leb)].peb = peb;
        }
        let spare = Self::leb_count();
        if !self.flash.peb_is_blank(spare) {
            self.flash.peb_erase(spare)?;
        }
        self.spare = spare;
        Ok(())
    }

    /// Pointer to the first valid record, blank when the store is empty.
    pub fn first(&self) -> Ptr {
        self.next(Ptr::blank())
    }

    /// Pointer to the next valid record after `ptr`, blank when exhausted.
    /// A blank `ptr` starts from the beginning.
    pub fn next(&self, ptr: Ptr) -> Ptr {
        let (start_leb, mut index) = if ptr.is_blank() {
            (0u8, 0u16)
        } else {
            (ptr.leb, ptr.slot + 1)
        };
        for leb in start_leb..Self::leb_count() {
            let info = &self.lebs[usize::from(leb)];
            while index < info.nb_slots {
                if Slot::decode(self.slot_line(info.peb, index)).is_valid() {
                    return Ptr::new(leb, index);
                }
                index += 1;
            }
            index = 0;
        }
        Ptr::blank()
    }

    /// Iterates the pointers of all valid records.
    pub fn records(&self) -> Records<'_, F> {
        Records {
            media: self,
            ptr: self.first(),
        }
    }

    fn checked_slot(&self, ptr: Ptr) -> Result<Slot> {
        if ptr.is_blank() || ptr.leb >= Self::leb_count() {
            return Err(Error::Format);
        }
        let info = &self.lebs[usize::from(ptr.leb)];
        if !info.is_valid() || ptr.slot >= info.nb_slots {
            return Err(Error::Format);
        }
        let slot = Slot::decode(self.slot_line(info.peb, ptr.slot));
        if slot.is_valid() {
            Ok(slot)
        } else {
            Err(Error::Format)
        }
    }

    /// Length of a committed record in bytes.
    pub fn size_of(&self, ptr: Ptr) -> Result<usize> {
        self.checked_slot(ptr).map(|slot| usize::from(slot.size))
    }

    /// The record's bytes, straight from flash.
    ///
    /// The slice stays valid until the next mutating operation; the record
    /// itself stays put until it is deleted or its LEB is switched.
    pub fn address_of(&self, ptr: Ptr) -> Result<&[u8]> {
        let slot = self.checked_slot(ptr)?;
        let peb = self.lebs[usize::from(ptr.leb)].peb;
        let size = usize::from(slot.size);
        if slot.is_inline() {
            let offset = SLOT_ARRAY_OFFSET + usize::from(ptr.slot) * SLOT_SIZE + 4;
            Ok(&self.flash.peb_slice(peb)[offset..offset + size])
        } else {
            let offset = usize::from(slot.page) * PAGE_SIZE;
            Ok(&self.flash.peb_slice(peb)[offset..offset + size])
        }
    }

    /// Checks a record's integrity.
    ///
    /// Inline data is covered by the slot CRC already; external data is
    /// re-read and compared against the CRC the commit declared.
    pub fn verify(&self, ptr: Ptr) -> bool {
        let slot = match self.checked_slot(ptr) {
            Ok(slot) => slot,
            Err(_) => return false,
        };
        if slot.is_inline() {
            return true;
        }
        let peb = self.lebs[usize::from(ptr.leb)].peb;
        let offset = usize::from(slot.page) * PAGE_SIZE;
        let data = &self.flash.peb_slice(peb)[offset..offset + usize::from(slot.size)];
        crc32_of(data) == slot.data_crc()
    }

    /// The record's bytes after an integrity check.
    ///
    /// Like [`address_of`](Self::address_of), but external data must match
    /// the CRC it was committed with.
    pub fn read(&self, ptr: Ptr) -> Result<&[u8]> {
        let slot = self.checked_slot(ptr)?;
        if !slot.is_inline() {
            let peb = self.lebs[usize::from(ptr.leb)].peb;
            let offset = usize::from(slot.page) * PAGE_SIZE;
            let data = &self.flash.peb_slice(peb)[offset..offset + usize::from(slot.size)];
            if crc32_of(data) != slot.data_crc() {
                return Err(Error::Integrity);
            }
        }
        self.address_of(ptr)
    }

    /// Picks a LEB with room for `data_size` bytes, switching one onto the
    /// spare if that is what it takes.
    fn choose_leb(&mut self, data_size: usize) -> Result<u8> {
        let page_count = Self::page_count();
        let pages_needed = if data_size <= INLINE_DATA_SIZE {
            0
        } else {
            Self::pages_for(data_size)
        };

        let mut chosen = LEB_INVALID;
        let mut chosen_wear = u32::MAX;
        let mut collect = LEB_INVALID;
        let mut collect_wear = u32::MAX;
        for leb in 0..Self::leb_count() {
            let info = self.lebs[usize::from(leb)];
            // Space for the header, the slots and one more slot for this
            // record; the strict comparison below keeps one blank slot as
            // the array terminator
            let overhead = Self::slots_end_page(info.nb_slots + 1);
            let free_pages = info.lowest_busy_page.saturating_sub(overhead);
            let wear = self.erase_count(info.peb);
            if pages_needed < free_pages {
                if wear < chosen_wear {
                    chosen_wear = wear;
                    chosen = leb;
                }
            } else if pages_needed < free_pages + info.reclaimable_pages(page_count)
                && wear <= collect_wear
            {
                collect_wear = wear;
                collect = leb;
            }
        }

        if chosen != LEB_INVALID {
            return Ok(chosen);
        }
        if collect != LEB_INVALID {
            self.switch_leb(collect)?;
            return Ok(collect);
        }
        Err(Error::Capacity)
    }

    /// Migrates one LEB's live records onto the spare PEB, compacting its
    /// data pages. Slot indices are preserved; vacant slots stay blank.
    /// Writing the new PEB header is the last program and commits the
    /// switch; anything before it leaves the old PEB authoritative.
    fn switch_leb(&mut self, leb: u8) -> Result<()> {
        #[cfg(feature = "defmt")]
        trace!("media: switching leb {}", leb);
        let page_count = Self::page_count();

        // Wear continuity: reuse the spare's own count when its header is
        // readable, otherwise average the active PEBs
        let spare_erase_count = match self.header(self.spare) {
            Some(ph) => ph.erase_count,
            None => {
                let mut sum = 0u32;
                for l in 0..Self::leb_count() {
                    sum += self.erase_count(self.lebs[usize::from(l)].peb);
                }
                sum / u32::from(Self::leb_count())
            }
        };
        if !self.flash.peb_is_blank(self.spare) {
            self.flash.peb_erase(self.spare)?;
        }

        let info = self.lebs[usize::from(leb)];
        let src_header = match self.header(info.peb) {
            Some(ph) => ph,
            None => return Err(Error::Format),
        };

        let spare = self.spare;
        let mut dest_page = page_count;
        let mut nb_busy = 0u16;
        for index in 0..info.nb_slots {
            let slot = Slot::decode(self.slot_line(info.peb, index));
            if !slot.is_valid() {
                // Vacant or deleted: the destination line stays blank at the
                // same index, preserving the numbering
                continue;
            }
            let size = usize::from(slot.size);
            if slot.is_inline() {
                let line = Slot::encode_inline(&slot.payload[..size]);
                self.program_slot(spare, index, &line)?;
            } else {
                let pages = Self::pages_for(size);
                dest_page -= pages;
                for page in 0..pages {
                    let mut line = [0xffu8; PAGE_SIZE];
                    let src = usize::from(slot.page + page) * PAGE_SIZE;
                    line.copy_from_slice(&self.flash.peb_slice(info.peb)[src..src + PAGE_SIZE]);
                    let dst = u32::from(dest_page + page) * PAGE_SIZE as u32;
                    self.flash.peb_program(spare, dst, &line)?;
                }
                nb_busy += pages;
                let line = Slot::encode_external(dest_page, slot.size, slot.data_crc());
                self.program_slot(spare, index, &line)?;
            }
        }

        // The commit point: a valid header adopts the spare as the LEB
        self.write_leb_header(
            spare,
            leb,
            src_header.next_generation(),
            info.nb_slots,
            spare_erase_count + 1,
        )?;

        // The old PEB becomes the spare; it is not erased yet so its erase
        // count stays readable for wear accounting
        self.spare = info.peb;
        self.lebs[usize::from(leb)] = LebInfo {
            peb: spare,
            lowest_busy_page: dest_page,
            nb_busy_pages: nb_busy,
            nb_slots: info.nb_slots,
        };
        Ok(())
    }

    /// Reserves space for a record of `data_size` bytes.
    pub fn create(&mut self, data_size: usize) -> Result<TempPtr> {
        if data_size > usize::from(u16::MAX) {
            return Err(Error::Capacity);
        }
        let leb = self.choose_leb(data_size)?;
        if data_size <= INLINE_DATA_SIZE {
            // The data will live in the slot; no pages move
            return Ok(TempPtr::inline(leb, data_size as u16));
        }
        let pages = Self::pages_for(data_size);
        let info = &mut self.lebs[usize::from(leb)];
        let page = info.lowest_busy_page - pages;
        info.lowest_busy_page = page;
        Ok(TempPtr::external(leb, page, data_size as u16))
    }

    /// Appends bytes to an uncommitted record.
    ///
    /// Bytes are gathered into whole write lines; long aligned runs program
    /// straight from the caller's buffer. A trailing partial line stays
    /// buffered until commit.
    pub fn append(&mut self, temp: &mut TempPtr, bytes: &[u8]) -> Result<()> {
        if usize::from(temp.pos) + bytes.len() > usize::from(temp.size) {
            return Err(Error::Capacity);
        }
        let all = bytes;
        let mut bytes = bytes;
        let peb = self.lebs[usize::from(temp.leb)].peb;
        let base = u32::from(temp.page) * PAGE_SIZE as u32;

        // Top up a previously buffered partial line
        let buffered = usize::from(temp.pos) % WRITE_LINE;
        if buffered > 0 {
            let take = (WRITE_LINE - buffered).min(bytes.len());
            temp.buffer[buffered..buffered + take].copy_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            temp.pos += take as u16;
            if buffered + take == WRITE_LINE {
                let offset = base + u32::from(temp.pos) - WRITE_LINE as u32;
                let line = temp.buffer;
                self.flash.peb_program(peb, offset, &line)?;
            }
        }

        // Whole lines go straight from the caller's buffer
        let remainder = bytes.len() % WRITE_LINE;
        if bytes.len() >= WRITE_LINE {
            let chunk = bytes.len() - remainder;
            self.flash
                .peb_program(peb, base + u32::from(temp.pos), &bytes[..chunk])?;
            temp.pos += chunk as u16;
            bytes = &bytes[chunk..];
        }

        // Trailing partial line waits for more data or for commit
        if remainder > 0 {
            temp.buffer[..remainder].copy_from_slice(bytes);
            temp.pos += remainder as u16;
        }

        temp.crc.process(all);
        Ok(())
    }

    /// Commits a record, turning the reservation into a valid slot.
    ///
    /// On failure the reserved space is lost until the next switch; the
    /// slot, if programmed at all, will not verify.
    pub fn commit(&mut self, mut temp: TempPtr) -> Result<Ptr> {
        let leb = temp.leb;
        let peb = self.lebs[usize::from(leb)].peb;

        // Pad the unused tail with 0xFF, less strain on the cells
        let remainder = usize::from(temp.pos) % WRITE_LINE;
        if remainder > 0 {
            for byte in temp.buffer[remainder..].iter_mut() {
                *byte = 0xff;
            }
        }
        if !temp.is_inline() && remainder > 0 {
            let offset =
                u32::from(temp.page) * PAGE_SIZE as u32 + u32::from(temp.pos) - remainder as u32;
            self.flash.peb_program(peb, offset, &temp.buffer)?;
        }

        // First blank slot wins; only extend the array when there is none
        let nb_slots = self.lebs[usize::from(leb)].nb_slots;
        let mut slot_index = nb_slots;
        for index in 0..nb_slots {
            if Slot::line_is_blank(self.slot_line(peb, index)) {
                slot_index = index;
                break;
            }
        }
        if slot_index == nb_slots {
            self.lebs[usize::from(leb)].nb_slots += 1;
        }

        if temp.is_inline() {
            let size = usize::from(temp.size);
            let line = Slot::encode_inline(&temp.buffer[..size]);
            self.program_slot(peb, slot_index, &line)?;
            // No data pages were consumed
        } else {
            let line = Slot::encode_external(temp.page, temp.size, temp.crc.result());
            self.program_slot(peb, slot_index, &line)?;
            self.lebs[usize::from(leb)].nb_busy_pages += Self::pages_for(usize::from(temp.size));
        }
        Ok(Ptr::new(leb, slot_index))
    }

    /// Creates, fills and commits a record in one call.
    pub fn write(&mut self, data: &[u8]) -> Result<Ptr> {
        let mut temp = self.create(data.len())?;
        self.append(&mut temp, data)?;
        self.commit(temp)
    }

    /// Marks a record deleted.
    ///
    /// A single line program clears the slot's page and size; its pages stay
    /// physically occupied until the LEB is switched.
    pub fn delete(&mut self, ptr: Ptr) -> Result<()> {
        let slot = self.checked_slot(ptr)?;
        let pages = if slot.is_inline() {
            0
        } else {
            Self::pages_for(usize::from(slot.size))
        };
        let peb = self.lebs[usize::from(ptr.leb)].peb;
        self.program_slot(peb, ptr.slot, &Slot::deleted_line())?;
        self.lebs[usize::from(ptr.leb)].nb_busy_pages -= pages;
        Ok(())
    }

    /// Usage snapshot of one LEB.
    pub fn leb_stats(&self, leb: u8) -> Option<LebStats> {
        if leb >= Self::leb_count() {
            return None;
        }
        let info = &self.lebs[usize::from(leb)];
        if !info.is_valid() {
            return None;
        }
        Some(LebStats {
            peb: info.peb,
            erase_count: self.erase_count(info.peb),
            nb_slots: info.nb_slots,
            nb_busy_pages: info.nb_busy_pages,
            lowest_busy_page: info.lowest_busy_page,
        })
    }
}

/// Runs `f` with interrupts masked.
#[cfg(target_arch = "riscv32")]
fn interrupt_free<R>(f: impl FnOnce() -> R) -> R {
    riscv::interrupt::free(|_| f())
}

/// Host builds have no interrupts to mask.
#[cfg(not(target_arch = "riscv32"))]
fn interrupt_free<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Iterator over the pointers of all valid records.
pub struct Records<'a, F: PebFlash> {
    media: &'a Media<F>,
    ptr: Ptr,
}

impl<'a, F: PebFlash> Iterator for Records<'a, F> {
    type Item = Ptr;

    fn next(&mut self) -> Option<Ptr> {
        let ptr = self.ptr;
        if ptr.is_blank() {
            return None;
        }
        self.ptr = self.media.next(ptr);
        Some(ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoFlash;
    impl PebFlash for NoFlash {
        const PEB_COUNT: u8 = 3;
        const PEB_SIZE: u32 = 4096;
        fn peb_slice(&self, _peb: u8) -> &[u8] {
            &[]
        }
        fn peb_erase(&mut self, _peb: u8) -> Result<()> {
            Ok(())
        }
        fn peb_program(&mut self, _peb: u8, _offset: u32, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn page_math() {
        assert_eq!(Media::<NoFlash>::pages_for(0), 0);
        assert_eq!(Media::<NoFlash>::pages_for(1), 1);
        assert_eq!(Media::<NoFlash>::pages_for(16), 1);
        assert_eq!(Media::<NoFlash>::pages_for(17), 2);
        assert_eq!(Media::<NoFlash>::pages_for(200), 13);
        assert_eq!(Media::<NoFlash>::page_count(), 256);
        // Header plus N slots, rounded up to pages
        assert_eq!(Media::<NoFlash>::slots_end_page(0), 1);
        assert_eq!(Media::<NoFlash>::slots_end_page(3), 4);
    }
}
