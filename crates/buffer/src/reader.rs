use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::fragment::InputFragment;

/// Sequential record reader over a queue of input fragments.
///
/// `advance()` steps to the next record across fragment boundaries; typed
/// reads then consume the record left to right and `rewind()` jumps back to
/// its first byte. Reading past the current record or calling a read before
/// the first `advance()` is a programmer error caught by `debug_assert!`.
pub struct PageReader {
    queue: VecDeque<InputFragment>,
    current: Option<InputFragment>,
    next_record: usize,
    start: usize,
    end: usize,
    pos: usize,
}

impl PageReader {
    pub fn new(fragments: Vec<InputFragment>) -> Self {
        Self {
            queue: fragments.into(),
            current: None,
            next_record: 0,
            start: 0,
            end: 0,
            pos: 0,
        }
    }

    /// Move to the next record. Returns false when the queue is exhausted.
    pub fn advance(&mut self) -> bool {
        loop {
            if let Some(frag) = &self.current {
                if self.next_record < frag.record_count() {
                    let (start, end) = frag.record_range(self.next_record);
                    self.next_record += 1;
                    self.start = start;
                    self.end = end;
                    self.pos = start;
                    return true;
                }
            }
            match self.queue.pop_front() {
                Some(next) => {
                    self.current = Some(next);
                    self.next_record = 0;
                }
                None => {
                    self.current = None;
                    return false;
                }
            }
        }
    }

    /// Reset the read position to the start of the current record.
    pub fn rewind(&mut self) {
        self.pos = self.start;
    }

    /// Unread bytes left in the current record.
    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    fn contents(&self) -> &[u8] {
        debug_assert!(self.current.is_some(), "read before first advance");
        self.current.as_ref().map(|f| f.contents()).unwrap_or(&[])
    }

    /// The current record's full byte range.
    pub fn record_bytes(&self) -> &[u8] {
        let (start, end) = (self.start, self.end);
        &self.contents()[start..end]
    }

    pub fn read_slice(&mut self, len: usize) -> &[u8] {
        debug_assert!(self.pos + len <= self.end, "read past record end");
        let start = self.pos;
        self.pos += len;
        &self.contents()[start..start + len]
    }

    pub fn read_u8(&mut self) -> u8 {
        self.read_slice(1)[0]
    }

    pub fn read_u16(&mut self) -> u16 {
        u16::from_le_bytes(self.read_slice(2).try_into().unwrap())
    }

    pub fn read_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.read_slice(4).try_into().unwrap())
    }

    pub fn read_u64(&mut self) -> u64 {
        u64::from_le_bytes(self.read_slice(8).try_into().unwrap())
    }

    pub fn read_i32(&mut self) -> i32 {
        i32::from_le_bytes(self.read_slice(4).try_into().unwrap())
    }

    pub fn read_i64(&mut self) -> i64 {
        i64::from_le_bytes(self.read_slice(8).try_into().unwrap())
    }

    pub fn read_f64(&mut self) -> f64 {
        f64::from_le_bytes(self.read_slice(8).try_into().unwrap())
    }

    /// Unsigned byte-wise lexicographic compare of the two current records.
    pub fn compare_record(&self, other: &PageReader) -> Ordering {
        self.record_bytes().cmp(other.record_bytes())
    }
}
