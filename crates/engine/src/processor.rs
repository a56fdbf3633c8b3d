use std::any::Any;

use grist_core::EngineError;

use crate::context::{TaskContext, VertexContext};

/// Opaque per-task payload carried from `initialize` to the task that runs it.
pub type TaskInfo = Box<dyn Any + Send>;

/// Fixed task list for vertices whose parallelism is not derived from a
/// data-parallel input (sources, typically).
#[derive(Default)]
pub struct TaskSchedule {
    infos: Vec<TaskInfo>,
}

impl TaskSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, info: TaskInfo) {
        self.infos.push(info);
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub(crate) fn into_infos(self) -> Vec<TaskInfo> {
        self.infos
    }
}

/// User logic attached to one vertex.
///
/// `initialize` runs once on the scheduler thread with all broadcast inputs
/// resolved; returning a schedule fixes the task count, returning `None`
/// derives it from the vertex's data-parallel inputs. Workers call
/// `create_task_processor` concurrently, so implementations share state
/// through interior mutability if they need to.
pub trait VertexProcessor: Send + Sync {
    fn initialize(
        &mut self,
        ctx: &mut VertexContext<'_>,
    ) -> Result<Option<TaskSchedule>, EngineError>;

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>, EngineError>;

    /// Vertex teardown. Always runs, even after a failed task.
    fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Per-worker task logic. Created lazily on the worker's first task and
/// closed when that worker drains.
pub trait TaskProcessor: Send {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<(), EngineError>;

    fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}
