use std::sync::Arc;

/// One flushed page of records produced by a task.
///
/// Layout: `contents` holds the concatenated record bytes; `offsets` has
/// `records + 1` non-decreasing entries with `offsets[0] == 0` and the last
/// entry equal to the content length. Keyed ports additionally carry one key
/// length per record; the key is the record's prefix of that length.
///
/// All parts are `Arc`-shared so that resolving an edge with multiple
/// opposite ports clones fragments cheaply.
#[derive(Debug, Clone)]
pub struct OutputFragment {
    contents: Arc<Vec<u8>>,
    offsets: Arc<Vec<u64>>,
    key_lengths: Option<Arc<Vec<u64>>>,
}

impl OutputFragment {
    pub fn new(contents: Vec<u8>, offsets: Vec<u64>, key_lengths: Option<Vec<u64>>) -> Self {
        debug_assert!(!offsets.is_empty() && offsets[0] == 0);
        debug_assert_eq!(*offsets.last().unwrap() as usize, contents.len());
        if let Some(keys) = &key_lengths {
            debug_assert_eq!(keys.len(), offsets.len() - 1);
        }
        Self {
            contents: Arc::new(contents),
            offsets: Arc::new(offsets),
            key_lengths: key_lengths.map(Arc::new),
        }
    }

    pub fn record_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn has_key(&self) -> bool {
        self.key_lengths.is_some()
    }

    pub fn total_bytes(&self) -> usize {
        self.contents.len()
    }

    /// The full byte range of record `index` (key prefix included).
    pub fn record(&self, index: usize) -> &[u8] {
        let start = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        &self.contents[start..end]
    }

    /// Key prefix of record `index`; empty for un-keyed fragments.
    pub fn key(&self, index: usize) -> &[u8] {
        match &self.key_lengths {
            Some(keys) => &self.record(index)[..keys[index] as usize],
            None => &[],
        }
    }

    /// Value portion of record `index` (everything after the key prefix).
    pub fn value(&self, index: usize) -> &[u8] {
        match &self.key_lengths {
            Some(keys) => &self.record(index)[keys[index] as usize..],
            None => self.record(index),
        }
    }

    /// Seal into the input-side representation. The key table is dropped:
    /// keys only matter to scatter-gather resolution, which re-encodes them
    /// into dedicated key fragments.
    pub fn freeze(&self) -> InputFragment {
        InputFragment {
            contents: Arc::clone(&self.contents),
            offsets: Arc::clone(&self.offsets),
        }
    }
}

/// An immutable page of records on the input side of an edge.
#[derive(Debug, Clone)]
pub struct InputFragment {
    contents: Arc<Vec<u8>>,
    offsets: Arc<Vec<u64>>,
}

impl InputFragment {
    pub fn new(contents: Vec<u8>, offsets: Vec<u64>) -> Self {
        debug_assert!(!offsets.is_empty() && offsets[0] == 0);
        debug_assert_eq!(*offsets.last().unwrap() as usize, contents.len());
        Self {
            contents: Arc::new(contents),
            offsets: Arc::new(offsets),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), vec![0])
    }

    pub fn record_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn record(&self, index: usize) -> &[u8] {
        let start = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        &self.contents[start..end]
    }

    pub(crate) fn record_range(&self, index: usize) -> (usize, usize) {
        (self.offsets[index] as usize, self.offsets[index + 1] as usize)
    }

    pub(crate) fn contents(&self) -> &[u8] {
        &self.contents
    }
}
