use std::cmp::Ordering;
use std::sync::Mutex;

use grist_buffer::{InputCursor, InputFragment, OutputFragment};
use grist_core::EngineError;

use crate::{EdgeProcessor, ValueComparator};

/// Maximum key groups per re-encoded fragment.
pub const MAX_GROUPS_PER_FRAGMENT: usize = 1023;
/// Byte budget per fragment side (key or value) before starting a new one.
pub const FRAGMENT_SIZE_THRESHOLD: usize = 250 * 1024;

/// Position of one record inside the buffered fragment list.
#[derive(Debug, Clone, Copy)]
struct Entry {
    frag: usize,
    index: usize,
}

fn key_of(frags: &[OutputFragment], e: Entry) -> &[u8] {
    frags[e.frag].key(e.index)
}

fn value_of(frags: &[OutputFragment], e: Entry) -> &[u8] {
    frags[e.frag].value(e.index)
}

fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash = 0x811c_9dc5u32;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Partition index for a key: non-negative 31-bit hash modulo the count.
pub fn partition_of(key: &[u8], partition_count: usize) -> usize {
    (fnv1a(key) & 0x7fff_ffff) as usize % partition_count
}

struct State {
    fragments: Vec<OutputFragment>,
    processed: bool,
}

/// Scatter-gather edge: hash-partitions keyed records, sorts each partition
/// by unsigned key bytes (ties broken by the optional value comparator) and
/// re-encodes every partition into paired key/value fragment sequences, one
/// group per entry.
pub struct ScatterGatherEdge {
    partition_count: usize,
    comparator: Option<ValueComparator>,
    state: Mutex<State>,
}

impl ScatterGatherEdge {
    pub fn new(partition_count: usize, comparator: Option<ValueComparator>) -> Self {
        debug_assert!(partition_count >= 1);
        Self {
            partition_count,
            comparator,
            state: Mutex::new(State {
                fragments: Vec::new(),
                processed: false,
            }),
        }
    }

    fn order(&self, frags: &[OutputFragment], a: Entry, b: Entry) -> Ordering {
        match key_of(frags, a).cmp(key_of(frags, b)) {
            Ordering::Equal => match &self.comparator {
                Some(less) => {
                    let (va, vb) = (value_of(frags, a), value_of(frags, b));
                    if less(va, vb) {
                        Ordering::Less
                    } else if less(vb, va) {
                        Ordering::Greater
                    } else {
                        Ordering::Equal
                    }
                }
                None => Ordering::Equal,
            },
            ord => ord,
        }
    }
}

impl EdgeProcessor for ScatterGatherEdge {
    fn add(&self, fragments: Vec<OutputFragment>) {
        debug_assert!(fragments.iter().all(OutputFragment::has_key));
        let mut state = self.state.lock().unwrap();
        if state.processed {
            tracing::warn!(
                "fragment sequence added to an already resolved scatter-gather edge, dropping"
            );
            return;
        }
        state.fragments.extend(fragments);
    }

    fn process(&mut self) -> Result<Vec<InputCursor>, EngineError> {
        let fragments = {
            let mut state = self.state.lock().unwrap();
            if state.processed {
                return Err(EngineError::Invariant(
                    "scatter-gather edge processed twice".to_string(),
                ));
            }
            state.processed = true;
            std::mem::take(&mut state.fragments)
        };

        let mut buckets: Vec<Vec<Entry>> = vec![Vec::new(); self.partition_count];
        let mut total = 0usize;
        for (frag, fragment) in fragments.iter().enumerate() {
            for index in 0..fragment.record_count() {
                let entry = Entry { frag, index };
                let partition = partition_of(key_of(&fragments, entry), self.partition_count);
                buckets[partition].push(entry);
                total += 1;
            }
        }

        let mut cursors = Vec::with_capacity(self.partition_count);
        for bucket in &mut buckets {
            // Stable: equal entries keep their add order.
            bucket.sort_by(|&a, &b| self.order(&fragments, a, b));

            let mut builder = PartitionBuilder::new();
            let mut leader: Option<Entry> = None;
            for &entry in bucket.iter() {
                let key = key_of(&fragments, entry);
                let new_group = match leader {
                    Some(l) => key_of(&fragments, l) != key,
                    None => true,
                };
                if new_group {
                    builder.begin_group(key);
                    leader = Some(entry);
                }
                builder.push_value(value_of(&fragments, entry));
            }
            cursors.push(builder.finish());
        }
        tracing::debug!(
            records = total,
            partitions = self.partition_count,
            "scatter-gather edge resolved"
        );
        Ok(cursors)
    }
}

/// Re-encodes one partition's sorted entries into paired key/value
/// fragments without ever splitting a key group across fragments.
struct PartitionBuilder {
    key_bytes: Vec<u8>,
    key_offsets: Vec<u64>,
    value_bytes: Vec<u8>,
    value_offsets: Vec<u64>,
    keys: Vec<InputFragment>,
    values: Vec<InputFragment>,
    open_group: bool,
}

impl PartitionBuilder {
    fn new() -> Self {
        Self {
            key_bytes: Vec::new(),
            key_offsets: vec![0],
            value_bytes: Vec::new(),
            value_offsets: vec![0],
            keys: Vec::new(),
            values: Vec::new(),
            open_group: false,
        }
    }

    fn group_count(&self) -> usize {
        self.key_offsets.len() - 1
    }

    fn begin_group(&mut self, key: &[u8]) {
        self.close_group();
        if self.group_count() >= MAX_GROUPS_PER_FRAGMENT
            || self.key_bytes.len() >= FRAGMENT_SIZE_THRESHOLD
            || self.value_bytes.len() >= FRAGMENT_SIZE_THRESHOLD
        {
            self.flush();
        }
        self.key_bytes.extend_from_slice(key);
        self.key_offsets.push(self.key_bytes.len() as u64);
        self.open_group = true;
    }

    fn push_value(&mut self, value: &[u8]) {
        self.value_bytes.extend_from_slice(value);
    }

    fn close_group(&mut self) {
        if self.open_group {
            self.value_offsets.push(self.value_bytes.len() as u64);
            self.open_group = false;
        }
    }

    fn flush(&mut self) {
        debug_assert!(!self.open_group);
        if self.group_count() == 0 {
            return;
        }
        let key_bytes = std::mem::take(&mut self.key_bytes);
        let key_offsets = std::mem::replace(&mut self.key_offsets, vec![0]);
        let value_bytes = std::mem::take(&mut self.value_bytes);
        let value_offsets = std::mem::replace(&mut self.value_offsets, vec![0]);
        self.keys.push(InputFragment::new(key_bytes, key_offsets));
        self.values.push(InputFragment::new(value_bytes, value_offsets));
    }

    fn finish(mut self) -> InputCursor {
        self.close_group();
        self.flush();
        InputCursor::keyed(self.keys, self.values)
    }
}
