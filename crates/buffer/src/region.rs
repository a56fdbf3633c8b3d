use grist_core::AccessMode;

/// Growable byte buffer with a write position and absolute typed reads.
///
/// All multi-byte values are little-endian. In `Unchecked` mode the typed
/// accessors skip slice bounds checks and rely on `debug_assert!` instead;
/// callers get that mode only by opting in through the engine config.
#[derive(Debug)]
pub struct ByteRegion {
    bytes: Vec<u8>,
    pos: usize,
    mode: AccessMode,
}

impl ByteRegion {
    pub fn with_capacity(capacity: usize, mode: AccessMode) -> Self {
        Self {
            bytes: vec![0u8; capacity],
            pos: 0,
            mode,
        }
    }

    pub fn from_vec(bytes: Vec<u8>, mode: AccessMode) -> Self {
        let pos = bytes.len();
        Self { bytes, pos, mode }
    }

    /// Current write position, equal to the number of bytes appended.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn reset(&mut self) {
        self.pos = 0;
    }

    fn ensure(&mut self, additional: usize) {
        let needed = self.pos + additional;
        if needed > self.bytes.len() {
            let grown = (self.bytes.len() * 2).max(needed);
            self.bytes.resize(grown, 0);
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.ensure(1);
        match self.mode {
            AccessMode::Checked => self.bytes[self.pos] = value,
            AccessMode::Unchecked => {
                debug_assert!(self.pos < self.bytes.len());
                unsafe { *self.bytes.get_unchecked_mut(self.pos) = value }
            }
        }
        self.pos += 1;
    }

    pub fn put_u16(&mut self, value: u16) {
        self.put_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.put_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.put_slice(&value.to_le_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.put_slice(&value.to_le_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.put_slice(&value.to_le_bytes());
    }

    pub fn put_f64(&mut self, value: f64) {
        self.put_slice(&value.to_le_bytes());
    }

    pub fn put_slice(&mut self, src: &[u8]) {
        self.ensure(src.len());
        let end = self.pos + src.len();
        match self.mode {
            AccessMode::Checked => self.bytes[self.pos..end].copy_from_slice(src),
            AccessMode::Unchecked => {
                debug_assert!(end <= self.bytes.len());
                unsafe {
                    self.bytes
                        .get_unchecked_mut(self.pos..end)
                        .copy_from_slice(src)
                }
            }
        }
        self.pos = end;
    }

    pub fn get_u8_at(&self, offset: usize) -> u8 {
        match self.mode {
            AccessMode::Checked => self.bytes[offset],
            AccessMode::Unchecked => {
                debug_assert!(offset < self.pos);
                unsafe { *self.bytes.get_unchecked(offset) }
            }
        }
    }

    fn get_array_at<const N: usize>(&self, offset: usize) -> [u8; N] {
        match self.mode {
            AccessMode::Checked => self.bytes[offset..offset + N].try_into().unwrap(),
            AccessMode::Unchecked => {
                debug_assert!(offset + N <= self.pos);
                unsafe { self.bytes.get_unchecked(offset..offset + N) }
                    .try_into()
                    .unwrap()
            }
        }
    }

    pub fn get_u16_at(&self, offset: usize) -> u16 {
        u16::from_le_bytes(self.get_array_at(offset))
    }

    pub fn get_u32_at(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.get_array_at(offset))
    }

    pub fn get_u64_at(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.get_array_at(offset))
    }

    pub fn get_i32_at(&self, offset: usize) -> i32 {
        i32::from_le_bytes(self.get_array_at(offset))
    }

    pub fn get_i64_at(&self, offset: usize) -> i64 {
        i64::from_le_bytes(self.get_array_at(offset))
    }

    pub fn get_f64_at(&self, offset: usize) -> f64 {
        f64::from_le_bytes(self.get_array_at(offset))
    }

    /// Borrow the bytes in `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> &[u8] {
        match self.mode {
            AccessMode::Checked => &self.bytes[start..end],
            AccessMode::Unchecked => {
                debug_assert!(start <= end && end <= self.pos);
                unsafe { self.bytes.get_unchecked(start..end) }
            }
        }
    }

    /// Take the written prefix out of the region, leaving it empty.
    pub fn take(&mut self) -> Vec<u8> {
        self.bytes.truncate(self.pos);
        self.pos = 0;
        std::mem::take(&mut self.bytes)
    }
}
