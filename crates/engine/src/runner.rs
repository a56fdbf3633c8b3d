use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use grist_buffer::InputCursor;
use grist_core::{EngineConfig, EngineError, GraphModel, Movement, PortId, VertexId};

use crate::context::{TaskContext, VertexContext};
use crate::io::IoBoard;
use crate::processor::{TaskInfo, TaskProcessor, VertexProcessor};

/// Runs one vertex: resolves its inputs, determines the task count and
/// drains the task queue over the shared worker pool.
pub struct VertexRunner<'a> {
    graph: &'a GraphModel,
    config: &'a EngineConfig,
    pool: &'a rayon::ThreadPool,
    io: Arc<IoBoard>,
}

fn bounded(value: usize, cap: usize) -> usize {
    if cap == 0 {
        value
    } else {
        value.min(cap)
    }
}

impl<'a> VertexRunner<'a> {
    pub fn new(
        graph: &'a GraphModel,
        config: &'a EngineConfig,
        pool: &'a rayon::ThreadPool,
        io: Arc<IoBoard>,
    ) -> Self {
        Self {
            graph,
            config,
            pool,
            io,
        }
    }

    /// Execute all tasks of `vertex`. Returns the task count on success.
    /// Vertex teardown runs regardless of the outcome.
    pub fn run(
        &self,
        vertex: VertexId,
        processor: &mut dyn VertexProcessor,
    ) -> Result<usize, EngineError> {
        let result = self.run_tasks(vertex, processor);
        let close_result = processor.close();
        match (result, close_result) {
            (Ok(tasks), Ok(())) => Ok(tasks),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                tracing::warn!(
                    vertex = %self.graph.vertex(vertex).name,
                    error = %close_err,
                    "vertex teardown failed after an earlier error"
                );
                Err(err)
            }
        }
    }

    fn run_tasks(
        &self,
        vertex: VertexId,
        processor: &mut dyn VertexProcessor,
    ) -> Result<usize, EngineError> {
        let name = self.graph.vertex(vertex).name.as_str();

        // Broadcast inputs resolve before the processor initializes.
        let mut broadcasts: HashMap<PortId, InputCursor> = HashMap::new();
        let mut data_parallel: Vec<PortId> = Vec::new();
        for &port in &self.graph.vertex(vertex).inputs {
            match self.graph.port(port).movement {
                Movement::Nothing => {}
                Movement::Broadcast => {
                    let mut cursors = self.io.take_input(self.graph, port)?;
                    if cursors.len() != 1 {
                        return Err(EngineError::Invariant(format!(
                            "broadcast input {} resolved to {} cursors, expected 1",
                            self.graph.port_label(port),
                            cursors.len()
                        )));
                    }
                    broadcasts.insert(port, cursors.remove(0));
                }
                Movement::OneToOne | Movement::ScatterGather => data_parallel.push(port),
            }
        }

        let schedule = {
            let mut ctx = VertexContext::new(self.graph, vertex, self.config, &broadcasts);
            processor.initialize(&mut ctx)?
        };

        let mut per_port: Vec<(PortId, Vec<InputCursor>)> = Vec::with_capacity(data_parallel.len());
        for &port in &data_parallel {
            per_port.push((port, self.io.take_input(self.graph, port)?));
        }
        if let Some(((first_port, first), rest)) = per_port.split_first() {
            for (port, cursors) in rest {
                if cursors.len() != first.len() {
                    return Err(EngineError::Invariant(format!(
                        "data-parallel inputs of vertex {name} disagree on cardinality: \
                         {} has {}, {} has {}",
                        self.graph.port_label(*first_port),
                        first.len(),
                        self.graph.port_label(*port),
                        cursors.len()
                    )));
                }
            }
        }

        let task_count = match (&schedule, per_port.is_empty()) {
            (Some(schedule), true) => schedule.len(),
            (None, false) => per_port[0].1.len(),
            (Some(_), false) => {
                return Err(EngineError::Invariant(format!(
                    "vertex {name} has both a task schedule and data-parallel inputs"
                )))
            }
            (None, true) => {
                return Err(EngineError::Invariant(format!(
                    "vertex {name} has neither a task schedule nor data-parallel inputs"
                )))
            }
        };

        let workers = bounded(
            bounded(
                self.pool.current_num_threads(),
                self.config.max_task_concurrency,
            ),
            self.graph.vertex(vertex).max_concurrency,
        )
        .min(task_count);
        tracing::info!(vertex = %name, tasks = task_count, workers, "running vertex");
        if task_count == 0 {
            return Ok(0);
        }

        let infos: Vec<Option<TaskInfo>> = match schedule {
            Some(schedule) => schedule.into_infos().into_iter().map(Some).collect(),
            None => (0..task_count).map(|_| None).collect(),
        };
        let mut port_cursors: Vec<(PortId, std::vec::IntoIter<InputCursor>)> = per_port
            .into_iter()
            .map(|(port, cursors)| (port, cursors.into_iter()))
            .collect();
        let mut tasks: VecDeque<TaskContext<'_>> = VecDeque::with_capacity(task_count);
        for (index, info) in infos.into_iter().enumerate() {
            let mut inputs = HashMap::new();
            for (port, cursors) in &mut port_cursors {
                if let Some(cursor) = cursors.next() {
                    inputs.insert(*port, cursor);
                }
            }
            tasks.push_back(TaskContext::new(
                self.graph,
                vertex,
                self.config,
                Arc::clone(&self.io),
                index,
                info,
                inputs,
            ));
        }

        let queue = Mutex::new(tasks);
        let abort = AtomicBool::new(false);
        let first_error: Mutex<Option<EngineError>> = Mutex::new(None);
        let executed = AtomicUsize::new(0);
        let shared: &dyn VertexProcessor = processor;

        self.pool.scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|_| worker_loop(shared, &queue, &abort, &first_error, &executed));
            }
        });

        let abandoned = queue.into_inner().unwrap().len();
        if abandoned > 0 {
            tracing::warn!(vertex = %name, abandoned, "abandoning unprocessed tasks after failure");
        }
        if let Some(err) = first_error.into_inner().unwrap() {
            return Err(err);
        }
        debug_assert_eq!(executed.into_inner(), task_count);
        Ok(task_count)
    }
}

fn worker_loop(
    processor: &dyn VertexProcessor,
    queue: &Mutex<VecDeque<TaskContext<'_>>>,
    abort: &AtomicBool,
    first_error: &Mutex<Option<EngineError>>,
    executed: &AtomicUsize,
) {
    // The task processor is created on this worker's first task; a worker
    // that never dequeues one never creates it.
    let mut task_processor: Option<Box<dyn TaskProcessor>> = None;
    loop {
        if abort.load(Ordering::Acquire) {
            break;
        }
        let task = queue.lock().unwrap().pop_front();
        let Some(mut task) = task else { break };
        tracing::debug!(task = task.task_id(), "task started");
        match run_one(processor, &mut task_processor, &mut task) {
            Ok(()) => {
                executed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(task = task.task_id(), "task finished");
            }
            Err(err) => {
                record_error(err.in_task(task.task_id()), abort, first_error);
                break;
            }
        }
    }
    if let Some(mut task_processor) = task_processor.take() {
        if let Err(err) = task_processor.close() {
            record_error(err, abort, first_error);
        }
    }
}

fn run_one(
    processor: &dyn VertexProcessor,
    slot: &mut Option<Box<dyn TaskProcessor>>,
    task: &mut TaskContext<'_>,
) -> Result<(), EngineError> {
    if slot.is_none() {
        *slot = Some(processor.create_task_processor()?);
    }
    match slot.as_mut() {
        Some(task_processor) => task_processor.run(task),
        None => Ok(()),
    }
}

fn record_error(err: EngineError, abort: &AtomicBool, first_error: &Mutex<Option<EngineError>>) {
    tracing::error!(error = %err, "task execution failed");
    abort.store(true, Ordering::Release);
    let mut slot = first_error.lock().unwrap();
    if slot.is_none() {
        *slot = Some(err);
    }
}
