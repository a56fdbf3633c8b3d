use std::sync::Mutex;

use grist_buffer::{InputCursor, OutputFragment};
use grist_core::EngineError;

use crate::EdgeProcessor;

struct State {
    fragments: Vec<OutputFragment>,
    processed: bool,
}

/// Broadcast edge: all contributions collapse into a single cursor carrying
/// the full record sequence in add order.
pub struct BroadcastEdge {
    state: Mutex<State>,
}

impl BroadcastEdge {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                fragments: Vec::new(),
                processed: false,
            }),
        }
    }
}

impl Default for BroadcastEdge {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeProcessor for BroadcastEdge {
    fn add(&self, fragments: Vec<OutputFragment>) {
        let mut state = self.state.lock().unwrap();
        if state.processed {
            tracing::warn!(
                "fragment sequence added to an already resolved broadcast edge, dropping"
            );
            return;
        }
        state.fragments.extend(fragments);
    }

    fn process(&mut self) -> Result<Vec<InputCursor>, EngineError> {
        let mut state = self.state.lock().unwrap();
        if state.processed {
            return Err(EngineError::Invariant(
                "broadcast edge processed twice".to_string(),
            ));
        }
        state.processed = true;
        let fragments = std::mem::take(&mut state.fragments);
        Ok(vec![InputCursor::plain(
            fragments.iter().map(OutputFragment::freeze).collect(),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(records: &[&[u8]]) -> OutputFragment {
        let mut contents = Vec::new();
        let mut offsets = vec![0u64];
        for rec in records {
            contents.extend_from_slice(rec);
            offsets.push(contents.len() as u64);
        }
        OutputFragment::new(contents, offsets, None)
    }

    #[test]
    fn single_cursor_preserving_add_order() {
        let mut edge = BroadcastEdge::new();
        edge.add(vec![fragment(&[b"a", b"b"])]);
        edge.add(vec![fragment(&[b"c"])]);

        let cursors = edge.process().unwrap();
        assert_eq!(cursors.len(), 1);
        let frags = cursors[0].value_fragments();
        assert_eq!(frags.len(), 2);
        assert_eq!(frags[0].record(0), b"a");
        assert_eq!(frags[0].record(1), b"b");
        assert_eq!(frags[1].record(0), b"c");
    }

    #[test]
    fn no_contributions_still_yields_one_cursor() {
        let mut edge = BroadcastEdge::new();
        let cursors = edge.process().unwrap();
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].record_count(), 0);
    }
}
