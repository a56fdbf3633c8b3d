use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use grist_core::{EngineConfig, EngineError, GraphModel, VertexId};

use crate::comparator::ComparatorRegistry;
use crate::io::IoBoard;
use crate::metrics::{RunMetrics, VertexStats};
use crate::processor::VertexProcessor;
use crate::runner::VertexRunner;

/// Drives a whole graph run: vertices execute strictly one at a time in
/// producers-before-consumers order, each spreading its tasks over a worker
/// pool owned for the lifetime of the run.
pub struct GraphExecutor {
    graph: GraphModel,
    config: EngineConfig,
    processors: HashMap<VertexId, Box<dyn VertexProcessor>>,
    comparators: ComparatorRegistry,
}

impl GraphExecutor {
    pub fn new(graph: GraphModel, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            graph,
            config,
            processors: HashMap::new(),
            comparators: ComparatorRegistry::new(),
        })
    }

    pub fn graph(&self) -> &GraphModel {
        &self.graph
    }

    /// Bind the user processor for a vertex. Every vertex must be bound
    /// before `run`.
    pub fn register_processor(
        &mut self,
        vertex: &str,
        processor: Box<dyn VertexProcessor>,
    ) -> Result<(), EngineError> {
        let id = self
            .graph
            .vertex_by_name(vertex)
            .ok_or_else(|| EngineError::Graph(format!("unknown vertex: {vertex}")))?;
        if self.processors.insert(id, processor).is_some() {
            return Err(EngineError::Graph(format!(
                "vertex {vertex} already has a processor"
            )));
        }
        Ok(())
    }

    /// Register a named secondary sort predicate (`a < b`).
    pub fn register_comparator<F>(&mut self, name: &str, less: F)
    where
        F: Fn(&[u8], &[u8]) -> bool + Send + Sync + 'static,
    {
        self.comparators.register(name, less);
    }

    pub fn run(mut self) -> Result<RunMetrics, EngineError> {
        let started_at = Utc::now();
        for id in self.graph.vertex_ids() {
            if !self.processors.contains_key(&id) {
                return Err(EngineError::Graph(format!(
                    "vertex {} has no processor",
                    self.graph.vertex(id).name
                )));
            }
            for &port in &self.graph.vertex(id).outputs {
                if let Some(name) = &self.graph.port(port).comparator {
                    if !self.comparators.contains(name) {
                        return Err(EngineError::Config(format!(
                            "unknown value comparator: {name}"
                        )));
                    }
                }
            }
        }
        let order = self.graph.topological_order()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.resolved_worker_threads())
            .thread_name(|i| format!("grist-worker-{i}"))
            .build()
            .map_err(|err| EngineError::Config(format!("failed to build worker pool: {err}")))?;
        let io = Arc::new(IoBoard::new(self.config.clone()));
        tracing::info!(
            vertices = order.len(),
            threads = pool.current_num_threads(),
            "starting graph run"
        );

        let runner = VertexRunner::new(&self.graph, &self.config, &pool, Arc::clone(&io));
        let mut vertices = Vec::with_capacity(order.len());
        let mut total_tasks = 0;
        for id in order {
            let name = self.graph.vertex(id).name.clone();
            let vertex_start = Instant::now();
            let processor = self.processors.get_mut(&id).ok_or_else(|| {
                EngineError::Invariant(format!("vertex {name} lost its processor"))
            })?;
            let tasks = match runner.run(id, processor.as_mut()) {
                Ok(tasks) => tasks,
                Err(err) => {
                    tracing::error!(vertex = %name, error = %err, "vertex failed, aborting run");
                    io.discard(&self.graph);
                    return Err(err);
                }
            };
            if let Err(err) = io.resolve(&self.graph, id, tasks, &self.comparators) {
                io.discard(&self.graph);
                return Err(err);
            }
            let duration = vertex_start.elapsed();
            tracing::info!(vertex = %name, tasks, ?duration, "vertex finished");
            total_tasks += tasks;
            vertices.push(VertexStats {
                vertex: name,
                tasks,
                duration,
            });
        }

        Ok(RunMetrics {
            started_at,
            finished_at: Utc::now(),
            total_tasks,
            vertices,
        })
    }
}
