use grist_core::{AccessMode, EngineConfig};

use crate::fragment::OutputFragment;
use crate::region::ByteRegion;

/// Receives each fragment the writer flushes, in flush order.
pub type FragmentSink = Box<dyn FnMut(OutputFragment) + Send>;

/// Sizing and layout knobs for a [`PageWriter`].
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Initial content capacity of each fragment.
    pub buffer_size: usize,
    /// Maximum records per fragment.
    pub max_records: usize,
    /// Fraction of `buffer_size` at which a completed record triggers a flush.
    pub flush_factor: f32,
    /// Whether records carry a key prefix recorded via `end_key`.
    pub has_key: bool,
    pub mode: AccessMode,
}

impl WriterOptions {
    pub fn from_config(config: &EngineConfig, has_key: bool) -> Self {
        Self {
            buffer_size: config.output_buffer_size,
            max_records: config.output_records_per_buffer,
            flush_factor: config.resolved_flush_factor(),
            has_key,
            mode: config.buffer_access_mode,
        }
    }
}

/// Sequential record writer that flushes full pages to a sink.
///
/// Appends are infallible: a record larger than the remaining capacity grows
/// the content region rather than failing. Completed records are tracked by
/// `end_page()`; a keyed writer additionally marks the key/value boundary
/// with `end_key()` before the first value byte. Partially written records
/// are never flushed.
pub struct PageWriter {
    region: ByteRegion,
    offsets: Vec<u64>,
    key_lengths: Vec<u64>,
    pending_key: Option<u64>,
    record_start: usize,
    flush_limit: usize,
    options: WriterOptions,
    sink: FragmentSink,
    closed: bool,
}

impl PageWriter {
    pub fn new(options: WriterOptions, sink: FragmentSink) -> Self {
        let flush_limit = (options.buffer_size as f32 * options.flush_factor) as usize;
        Self {
            region: ByteRegion::with_capacity(options.buffer_size, options.mode),
            offsets: vec![0],
            key_lengths: Vec::new(),
            pending_key: None,
            record_start: 0,
            flush_limit,
            options,
            sink,
            closed: false,
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.region.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.region.put_u16(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.region.put_u32(value);
    }

    pub fn put_u64(&mut self, value: u64) {
        self.region.put_u64(value);
    }

    pub fn put_i32(&mut self, value: i32) {
        self.region.put_i32(value);
    }

    pub fn put_i64(&mut self, value: i64) {
        self.region.put_i64(value);
    }

    pub fn put_f64(&mut self, value: f64) {
        self.region.put_f64(value);
    }

    pub fn put_slice(&mut self, src: &[u8]) {
        self.region.put_slice(src);
    }

    /// Mark the end of the current record's key prefix.
    pub fn end_key(&mut self) {
        debug_assert!(self.options.has_key, "end_key on an un-keyed writer");
        debug_assert!(self.pending_key.is_none(), "end_key called twice in one record");
        self.pending_key = Some((self.region.position() - self.record_start) as u64);
    }

    /// Complete the current record and flush the page if full.
    pub fn end_page(&mut self) {
        let pos = self.region.position();
        self.offsets.push(pos as u64);
        if self.options.has_key {
            debug_assert!(self.pending_key.is_some(), "keyed record completed without end_key");
            self.key_lengths.push(self.pending_key.take().unwrap_or(0));
        } else {
            debug_assert!(self.pending_key.is_none());
        }
        self.record_start = pos;
        if self.record_count() >= self.options.max_records || pos > self.flush_limit {
            self.flush();
        }
    }

    pub fn record_count(&self) -> usize {
        self.offsets.len() - 1
    }

    fn flush(&mut self) {
        if self.record_count() == 0 {
            return;
        }
        let contents = self.region.take();
        let offsets = std::mem::replace(&mut self.offsets, vec![0]);
        let keys = if self.options.has_key {
            Some(std::mem::take(&mut self.key_lengths))
        } else {
            None
        };
        self.region = ByteRegion::with_capacity(self.options.buffer_size, self.options.mode);
        self.record_start = 0;
        let fragment = OutputFragment::new(contents, offsets, keys);
        tracing::trace!(
            records = fragment.record_count(),
            bytes = fragment.total_bytes(),
            "flushing fragment"
        );
        (self.sink)(fragment);
    }

    /// Flush the tail fragment. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        debug_assert!(
            self.region.position() == self.record_start,
            "close with an unfinished record"
        );
        self.flush();
        self.closed = true;
    }
}

impl Drop for PageWriter {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if self.region.position() != self.record_start {
            tracing::warn!("dropping page writer with an unfinished record");
            return;
        }
        self.close();
    }
}
