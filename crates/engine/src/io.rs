use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use grist_buffer::{FragmentSink, InputCursor, OutputFragment, PageWriter, WriterOptions};
use grist_core::{EngineConfig, EngineError, GraphModel, Movement, PortId, VertexId};
use grist_edge::EdgeProcessor;

use crate::comparator::ComparatorRegistry;

struct IoState {
    /// Edge processors keyed by downstream input port, created when the
    /// upstream vertex resolves.
    inputs: HashMap<PortId, Box<dyn EdgeProcessor>>,
    /// Flushed fragments keyed by output port, then by producing task index.
    outputs: HashMap<PortId, BTreeMap<usize, Vec<OutputFragment>>>,
    resolved_inputs: HashSet<PortId>,
    resolved_outputs: HashSet<PortId>,
}

/// Shared exchange board between tasks, edge resolution and the scheduler.
///
/// Ports move through a strict state machine: an output port accumulates
/// fragments until its vertex resolves exactly once; an input port holds an
/// edge processor until its vertex consumes it exactly once. Violations are
/// invariant errors, not silent corruption.
pub struct IoBoard {
    config: EngineConfig,
    state: Mutex<IoState>,
}

impl IoBoard {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: Mutex::new(IoState {
                inputs: HashMap::new(),
                outputs: HashMap::new(),
                resolved_inputs: HashSet::new(),
                resolved_outputs: HashSet::new(),
            }),
        }
    }

    /// Open a writer for one task's output on `port`. Flushed fragments are
    /// recorded under the task index so move edges can preserve task order.
    pub fn open_output(
        self: &Arc<Self>,
        graph: &GraphModel,
        port: PortId,
        task_index: usize,
    ) -> Result<PageWriter, EngineError> {
        let info = graph.port(port);
        if info.movement == Movement::Nothing {
            return Err(EngineError::Invariant(format!(
                "output port {} exchanges no data",
                graph.port_label(port)
            )));
        }
        {
            let state = self.state.lock().unwrap();
            if state.resolved_outputs.contains(&port) {
                return Err(EngineError::Invariant(format!(
                    "output port {} already resolved",
                    graph.port_label(port)
                )));
            }
        }
        let options = WriterOptions::from_config(&self.config, info.has_key);
        let board = Arc::clone(self);
        let sink: FragmentSink = Box::new(move |fragment| {
            let mut state = board.state.lock().unwrap();
            state
                .outputs
                .entry(port)
                .or_default()
                .entry(task_index)
                .or_default()
                .push(fragment);
        });
        Ok(PageWriter::new(options, sink))
    }

    /// Consume the resolved cursors of an input port. Exactly once per port.
    pub fn take_input(
        &self,
        graph: &GraphModel,
        port: PortId,
    ) -> Result<Vec<InputCursor>, EngineError> {
        let mut processor = {
            let mut state = self.state.lock().unwrap();
            if !state.resolved_inputs.insert(port) {
                return Err(EngineError::Invariant(format!(
                    "input port {} consumed twice",
                    graph.port_label(port)
                )));
            }
            state.inputs.remove(&port).ok_or_else(|| {
                EngineError::Invariant(format!(
                    "input port {} is unresolved",
                    graph.port_label(port)
                ))
            })?
        };
        // Partition/sort work happens outside the board lock.
        processor.process()
    }

    /// Resolve all data-carrying output ports of a completed vertex,
    /// handing each task's fragment sequence to every opposite input port's
    /// edge processor in task-index order.
    pub fn resolve(
        &self,
        graph: &GraphModel,
        vertex: VertexId,
        task_count: usize,
        comparators: &ComparatorRegistry,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        for &out in &graph.vertex(vertex).outputs {
            let port = graph.port(out);
            if !port.movement.exchanges_data() {
                continue;
            }
            if !state.resolved_outputs.insert(out) {
                return Err(EngineError::Invariant(format!(
                    "output port {} resolved twice",
                    graph.port_label(out)
                )));
            }
            let by_task = state.outputs.remove(&out).unwrap_or_default();
            for &opposite in &port.opposites {
                if !state.inputs.contains_key(&opposite) {
                    let comparator = match &port.comparator {
                        Some(name) => Some(comparators.get(name).ok_or_else(|| {
                            EngineError::Config(format!("unknown value comparator: {name}"))
                        })?),
                        None => None,
                    };
                    match grist_edge::for_movement(
                        port.movement,
                        self.config.partition_count,
                        comparator,
                    ) {
                        Some(processor) => {
                            state.inputs.insert(opposite, processor);
                        }
                        None => continue,
                    }
                }
                let processor = &state.inputs[&opposite];
                for task in 0..task_count {
                    let fragments = by_task.get(&task).cloned().unwrap_or_default();
                    processor.add(fragments);
                }
            }
        }
        Ok(())
    }

    /// Drop all buffered state after an aborted run. Every discarded
    /// fragment goes through this one logged path.
    pub fn discard(&self, graph: &GraphModel) {
        let mut state = self.state.lock().unwrap();
        let buffered: usize = state
            .outputs
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum();
        let unconsumed: Vec<String> = state
            .inputs
            .keys()
            .map(|&p| graph.port_label(p))
            .collect();
        if buffered > 0 || !unconsumed.is_empty() {
            tracing::warn!(
                buffered_fragments = buffered,
                unconsumed_inputs = ?unconsumed,
                "discarding buffered edge data after aborted run"
            );
        }
        state.outputs.clear();
        state.inputs.clear();
    }
}
