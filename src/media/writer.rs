//! Streaming record writer
//!
//! Lets anything that talks to an [`io::Write`] sink serialize straight into
//! the store: reserve the space up front, stream the bytes, commit last.

use super::slot::{Ptr, TempPtr};
use super::Media;
use crate::flash::PebFlash;
use crate::io;
use crate::{Error, Result};

/// An [`io::Write`] adapter over an uncommitted record.
///
/// Any write failure poisons the writer; `commit` then reports it and the
/// reserved space is reclaimed by the next switch.
pub struct RecordWriter<'a, F: PebFlash> {
    media: &'a mut Media<F>,
    temp: Option<TempPtr>,
}

impl<'a, F: PebFlash> RecordWriter<'a, F> {
    /// Reserves `size` bytes in the store.
    pub fn new(media: &'a mut Media<F>, size: usize) -> Result<RecordWriter<'a, F>> {
        let temp = media.create(size)?;
        Ok(RecordWriter {
            media,
            temp: Some(temp),
        })
    }

    /// Whether no failure has occurred and the record can still be committed.
    pub fn good(&self) -> bool {
        self.temp.is_some()
    }

    /// Commits the record, yielding its pointer.
    pub fn commit(mut self) -> Result<Ptr> {
        match self.temp.take() {
            Some(temp) => self.media.commit(temp),
            None => Err(Error::Transport),
        }
    }
}

impl<'a, F: PebFlash> io::Write for RecordWriter<'a, F> {
    fn write(&mut self, bytes: &[u8]) -> usize {
        let mut temp = match self.temp.take() {
            Some(temp) => temp,
            None => return 0,
        };
        match self.media.append(&mut temp, bytes) {
            Ok(()) => {
                self.temp = Some(temp);
                bytes.len()
            }
            Err(_) => 0,
        }
    }
}
