use std::sync::Mutex;

use grist_buffer::{InputCursor, OutputFragment};
use grist_core::EngineError;

use crate::EdgeProcessor;

struct State {
    sequences: Vec<Vec<OutputFragment>>,
    processed: bool,
}

/// Move edge: upstream task `i`'s fragment sequence becomes downstream task
/// `i`'s cursor, order preserved.
pub struct OneToOneEdge {
    state: Mutex<State>,
}

impl OneToOneEdge {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                sequences: Vec::new(),
                processed: false,
            }),
        }
    }
}

impl Default for OneToOneEdge {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeProcessor for OneToOneEdge {
    fn add(&self, fragments: Vec<OutputFragment>) {
        let mut state = self.state.lock().unwrap();
        if state.processed {
            tracing::warn!("fragment sequence added to an already resolved move edge, dropping");
            return;
        }
        state.sequences.push(fragments);
    }

    fn process(&mut self) -> Result<Vec<InputCursor>, EngineError> {
        let mut state = self.state.lock().unwrap();
        if state.processed {
            return Err(EngineError::Invariant(
                "move edge processed twice".to_string(),
            ));
        }
        state.processed = true;
        let sequences = std::mem::take(&mut state.sequences);
        Ok(sequences
            .into_iter()
            .map(|frags| InputCursor::plain(frags.iter().map(OutputFragment::freeze).collect()))
            .collect())
    }
}
