use thiserror::Error;

/// Errors surfaced by the execution core.
///
/// Invariant violations are planner/programmer errors and abort the run
/// immediately; task failures carry the original cause up through the
/// dispatcher to the scheduler.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("graph error: {0}")]
    Graph(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("processing failed: {0}")]
    Failed(String),

    #[error("task {task} failed: {source}")]
    Task {
        task: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Wrap an error with the identifier of the task it occurred in.
    pub fn in_task(self, task: impl Into<String>) -> Self {
        EngineError::Task {
            task: task.into(),
            source: Box::new(self),
        }
    }
}
