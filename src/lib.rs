//! Storage and wire-protocol support for LPC-style NOR-flash MCUs
//!
//! The centrepiece is [`media`], a wear-levelled, power-safe record store
//! over the raw erase blocks exposed by [`flash`]. Around it: the [`ebml`]
//! codec and the [`hdlc`] framer for structured binary over a serial link
//! (composed by [`packet`]), the [`crc32`] engine they all share, the
//! [`io`] byte traits they plug into, and the cooperative [`sched`]uler
//! and [`mutex`] that sequence tasks driving any of the above.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod crc32;
pub mod ebml;
pub mod flash;
pub mod hdlc;
pub mod io;
pub mod media;
pub mod mutex;
pub mod packet;
pub mod sched;

/// Operation result.
pub type Result<T> = core::result::Result<T, Error>;

/// The error kinds surfaced by the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// Malformed binary: an invalid EBML id or size field, a packet
    /// underrun, or a CRC mismatch in a PEB header or record slot.
    Format,
    /// Stored record data disagrees with its slot-declared CRC. The record
    /// is readable but unreliable.
    Integrity,
    /// No logical erase block can host the requested allocation, even
    /// after one switch; or a bounded buffer cannot take more bytes.
    Capacity,
    /// The underlying flash program/erase or byte sink declined the
    /// operation.
    Transport,
    /// A parser consumed more bytes than its enclosing element allows.
    Overrun,
}
