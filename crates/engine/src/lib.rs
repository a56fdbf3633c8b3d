//! Execution engine: user processor traits, the per-vertex task dispatcher
//! and the graph scheduler that drives vertices in dependency order over a
//! shared worker pool.

pub mod bridge;
pub mod comparator;
pub mod context;
pub mod io;
pub mod metrics;
pub mod processor;
pub mod runner;
pub mod scheduler;

pub use comparator::ComparatorRegistry;
pub use context::{TaskContext, VertexContext};
pub use io::IoBoard;
pub use metrics::{RunMetrics, VertexStats};
pub use processor::{TaskProcessor, TaskSchedule, VertexProcessor};
pub use scheduler::GraphExecutor;
