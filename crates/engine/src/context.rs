use std::collections::HashMap;
use std::sync::Arc;

use grist_buffer::{InputCursor, PageWriter};
use grist_core::{EngineConfig, EngineError, GraphModel, PortId, VertexId};

use crate::io::IoBoard;
use crate::processor::TaskInfo;

/// Vertex-level view handed to `VertexProcessor::initialize`, carrying the
/// resolved broadcast inputs.
pub struct VertexContext<'a> {
    graph: &'a GraphModel,
    vertex: VertexId,
    config: &'a EngineConfig,
    broadcasts: &'a HashMap<PortId, InputCursor>,
}

impl<'a> VertexContext<'a> {
    pub(crate) fn new(
        graph: &'a GraphModel,
        vertex: VertexId,
        config: &'a EngineConfig,
        broadcasts: &'a HashMap<PortId, InputCursor>,
    ) -> Self {
        Self {
            graph,
            vertex,
            config,
            broadcasts,
        }
    }

    pub fn vertex_name(&self) -> &str {
        &self.graph.vertex(self.vertex).name
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    /// The single cursor of a broadcast input port.
    pub fn broadcast_input(&self, name: &str) -> Result<InputCursor, EngineError> {
        let port = self
            .graph
            .input_port(self.vertex, name)
            .ok_or_else(|| {
                EngineError::Graph(format!(
                    "vertex {} has no input port {name}",
                    self.vertex_name()
                ))
            })?;
        self.broadcasts.get(&port).cloned().ok_or_else(|| {
            EngineError::Invariant(format!(
                "input port {} is not a broadcast port",
                self.graph.port_label(port)
            ))
        })
    }
}

/// Per-task view handed to `TaskProcessor::run`.
pub struct TaskContext<'a> {
    graph: &'a GraphModel,
    vertex: VertexId,
    config: &'a EngineConfig,
    io: Arc<IoBoard>,
    task_index: usize,
    task_id: String,
    info: Option<TaskInfo>,
    inputs: HashMap<PortId, InputCursor>,
}

impl<'a> TaskContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        graph: &'a GraphModel,
        vertex: VertexId,
        config: &'a EngineConfig,
        io: Arc<IoBoard>,
        task_index: usize,
        info: Option<TaskInfo>,
        inputs: HashMap<PortId, InputCursor>,
    ) -> Self {
        let task_id = format!("{}-{}", graph.vertex(vertex).name, task_index);
        Self {
            graph,
            vertex,
            config,
            io,
            task_index,
            task_id,
            info,
            inputs,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn task_index(&self) -> usize {
        self.task_index
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    /// Take the opaque payload scheduled for this task, if any.
    pub fn take_info(&mut self) -> Option<TaskInfo> {
        self.info.take()
    }

    /// Take this task's cursor for a data-parallel input port.
    pub fn take_input(&mut self, name: &str) -> Result<InputCursor, EngineError> {
        let port = self
            .graph
            .input_port(self.vertex, name)
            .ok_or_else(|| {
                EngineError::Graph(format!(
                    "vertex {} has no input port {name}",
                    self.graph.vertex(self.vertex).name
                ))
            })?;
        self.inputs.remove(&port).ok_or_else(|| {
            EngineError::Invariant(format!(
                "input port {} has no cursor for task {}",
                self.graph.port_label(port),
                self.task_id
            ))
        })
    }

    /// Open a fresh page writer on an output port for this task.
    pub fn open_output(&self, name: &str) -> Result<PageWriter, EngineError> {
        let port = self
            .graph
            .output_port(self.vertex, name)
            .ok_or_else(|| {
                EngineError::Graph(format!(
                    "vertex {} has no output port {name}",
                    self.graph.vertex(self.vertex).name
                ))
            })?;
        self.io.open_output(self.graph, port, self.task_index)
    }
}
