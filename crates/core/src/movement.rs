use serde::{Deserialize, Serialize};

/// Data movement policy of an edge: how upstream task outputs fan out to
/// downstream task inputs.
///
/// The kind set is closed; edge resolution dispatches over it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    /// The port exchanges no data-sets.
    Nothing,
    /// Upstream task `i`'s output becomes downstream task `i`'s input.
    OneToOne,
    /// Every downstream consumer observes the full output sequence.
    Broadcast,
    /// Records are hash-partitioned by key and each partition is sorted.
    ScatterGather,
}

impl Movement {
    /// Whether ports of this kind take part in edge resolution at all.
    pub fn exchanges_data(self) -> bool {
        self != Movement::Nothing
    }

    /// Whether downstream task count derives from this input's cardinality.
    pub fn is_data_parallel(self) -> bool {
        matches!(self, Movement::OneToOne | Movement::ScatterGather)
    }
}
