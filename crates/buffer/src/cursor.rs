use crate::fragment::InputFragment;

/// One input sequence handed to a downstream task.
///
/// A plain cursor is a queue of value fragments. A keyed cursor (scatter
/// gather) carries two queues iterated in lockstep: key fragment entry *i* is
/// the distinct key of group *i* and value fragment entry *i* is the
/// concatenation of that group's member values.
#[derive(Debug, Clone)]
pub struct InputCursor {
    values: Vec<InputFragment>,
    keys: Option<Vec<InputFragment>>,
}

impl InputCursor {
    pub fn plain(values: Vec<InputFragment>) -> Self {
        Self { values, keys: None }
    }

    pub fn keyed(keys: Vec<InputFragment>, values: Vec<InputFragment>) -> Self {
        debug_assert_eq!(keys.len(), values.len());
        debug_assert!(keys
            .iter()
            .zip(&values)
            .all(|(k, v)| k.record_count() == v.record_count()));
        Self {
            values,
            keys: Some(keys),
        }
    }

    pub fn empty() -> Self {
        Self::plain(Vec::new())
    }

    pub fn is_keyed(&self) -> bool {
        self.keys.is_some()
    }

    /// Total records (groups for a keyed cursor) across all fragments.
    pub fn record_count(&self) -> usize {
        self.values.iter().map(InputFragment::record_count).sum()
    }

    pub fn value_fragments(&self) -> &[InputFragment] {
        &self.values
    }

    pub fn key_fragments(&self) -> Option<&[InputFragment]> {
        self.keys.as_deref()
    }

    /// Split into the key queue (if any) and the value queue.
    pub fn into_parts(self) -> (Option<Vec<InputFragment>>, Vec<InputFragment>) {
        (self.keys, self.values)
    }
}
