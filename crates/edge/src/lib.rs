//! Edge resolution: turning the fragment sequences produced by upstream
//! tasks into the input cursors consumed by downstream tasks, one strategy
//! per data movement kind.

pub mod broadcast;
pub mod one_to_one;
pub mod scatter_gather;

use std::sync::Arc;

use grist_buffer::{InputCursor, OutputFragment};
use grist_core::{EngineError, Movement};

pub use broadcast::BroadcastEdge;
pub use one_to_one::OneToOneEdge;
pub use scatter_gather::ScatterGatherEdge;

/// Secondary sort predicate for scatter-gather value ties: `a < b`.
pub type ValueComparator = Arc<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync>;

/// Buffers upstream contributions for one downstream input port and resolves
/// them into cursors.
///
/// `add` is called once per contributing upstream task, in task-index order,
/// possibly from multiple resolution sites; `process` runs exactly once. A
/// second `process` is an invariant violation and an `add` after `process`
/// is dropped with a warning.
pub trait EdgeProcessor: Send + Sync {
    /// Contribute one upstream task's output fragment sequence.
    fn add(&self, fragments: Vec<OutputFragment>);

    /// Resolve all contributions into downstream input cursors.
    fn process(&mut self) -> Result<Vec<InputCursor>, EngineError>;
}

/// Instantiate the edge strategy for a movement kind.
///
/// `Nothing` ports exchange no data-sets and get no processor. The
/// dispatch is exhaustive so a new movement kind cannot be forgotten.
pub fn for_movement(
    movement: Movement,
    partition_count: usize,
    comparator: Option<ValueComparator>,
) -> Option<Box<dyn EdgeProcessor>> {
    match movement {
        Movement::Nothing => None,
        Movement::OneToOne => Some(Box::new(OneToOneEdge::new())),
        Movement::Broadcast => Some(Box::new(BroadcastEdge::new())),
        Movement::ScatterGather => {
            Some(Box::new(ScatterGatherEdge::new(partition_count, comparator)))
        }
    }
}
