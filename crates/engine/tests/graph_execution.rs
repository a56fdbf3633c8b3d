use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use grist_buffer::{PageReader, PageWriter};
use grist_core::{EngineConfig, EngineError, GraphBuilder, GraphModel, Movement};
use grist_engine::bridge::{
    GroupReader, KeyValueSerde, KeyValueWriter, ValueReader, ValueSerde, ValueWriter,
};
use grist_engine::{
    GraphExecutor, TaskContext, TaskProcessor, TaskSchedule, VertexContext, VertexProcessor,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.worker_threads = 2;
    config.partition_count = 3;
    config
}

/// u32-length-prefixed string values.
struct StringSerde;

impl ValueSerde for StringSerde {
    type Value = String;

    fn write_value(&self, value: &String, writer: &mut PageWriter) {
        writer.put_u32(value.len() as u32);
        writer.put_slice(value.as_bytes());
    }

    fn read_value(&self, reader: &mut PageReader) -> String {
        let len = reader.read_u32() as usize;
        String::from_utf8_lossy(reader.read_slice(len)).into_owned()
    }
}

/// Raw string keys with u64 count values.
struct CountSerde;

impl ValueSerde for CountSerde {
    type Value = u64;

    fn write_value(&self, value: &u64, writer: &mut PageWriter) {
        writer.put_u64(*value);
    }

    fn read_value(&self, reader: &mut PageReader) -> u64 {
        reader.read_u64()
    }
}

impl KeyValueSerde for CountSerde {
    type Key = String;

    fn write_key(&self, key: &String, writer: &mut PageWriter) {
        writer.put_slice(key.as_bytes());
    }

    fn read_key(&self, reader: &mut PageReader) -> String {
        let len = reader.remaining();
        String::from_utf8_lossy(reader.read_slice(len)).into_owned()
    }
}

/// Source vertex with one task per text, tokenizing into (word, 1) pairs.
struct WordSource {
    texts: Vec<&'static str>,
}

impl VertexProcessor for WordSource {
    fn initialize(
        &mut self,
        _ctx: &mut VertexContext<'_>,
    ) -> Result<Option<TaskSchedule>, EngineError> {
        let mut schedule = TaskSchedule::new();
        for text in &self.texts {
            schedule.push(Box::new(*text));
        }
        Ok(Some(schedule))
    }

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>, EngineError> {
        Ok(Box::new(WordSourceTask))
    }
}

struct WordSourceTask;

impl TaskProcessor for WordSourceTask {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<(), EngineError> {
        let info = ctx
            .take_info()
            .ok_or_else(|| EngineError::Failed("missing task info".to_string()))?;
        let text = info
            .downcast::<&'static str>()
            .map_err(|_| EngineError::Failed("unexpected task info type".to_string()))?;
        let mut out = KeyValueWriter::new(ctx.open_output("out")?, CountSerde);
        for word in text.split_whitespace() {
            out.put(&word.to_lowercase(), &1);
        }
        out.close();
        Ok(())
    }
}

/// Sink vertex summing counts per group into a shared map.
struct CountSink {
    results: Arc<Mutex<HashMap<String, u64>>>,
}

impl VertexProcessor for CountSink {
    fn initialize(
        &mut self,
        _ctx: &mut VertexContext<'_>,
    ) -> Result<Option<TaskSchedule>, EngineError> {
        Ok(None)
    }

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>, EngineError> {
        Ok(Box::new(CountSinkTask {
            results: Arc::clone(&self.results),
        }))
    }
}

struct CountSinkTask {
    results: Arc<Mutex<HashMap<String, u64>>>,
}

impl TaskProcessor for CountSinkTask {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<(), EngineError> {
        let mut groups = GroupReader::from_cursor(ctx.take_input("in")?, CountSerde)?;
        while let Some(word) = groups.next_group() {
            let mut sum = 0;
            while let Some(count) = groups.next_value() {
                sum += count;
            }
            *self.results.lock().unwrap().entry(word).or_insert(0) += sum;
        }
        Ok(())
    }
}

#[test]
fn word_count_over_two_sources() {
    init_tracing();
    let mut builder = GraphBuilder::new();
    let hello1 = builder.add_vertex("hello1", 0).unwrap();
    let hello2 = builder.add_vertex("hello2", 0).unwrap();
    let count = builder.add_vertex("count", 0).unwrap();
    let out1 = builder
        .add_keyed_output(hello1, "out", Movement::ScatterGather, None)
        .unwrap();
    let out2 = builder
        .add_keyed_output(hello2, "out", Movement::ScatterGather, None)
        .unwrap();
    let inp = builder
        .add_keyed_input(count, "in", Movement::ScatterGather)
        .unwrap();
    builder.connect(out1, inp).unwrap();
    builder.connect(out2, inp).unwrap();
    let graph = builder.build();

    let results = Arc::new(Mutex::new(HashMap::new()));
    let mut executor = GraphExecutor::new(graph, test_config()).unwrap();
    executor
        .register_processor(
            "hello1",
            Box::new(WordSource {
                texts: vec!["Hello World Hello"],
            }),
        )
        .unwrap();
    executor
        .register_processor(
            "hello2",
            Box::new(WordSource {
                texts: vec!["world grist World"],
            }),
        )
        .unwrap();
    executor
        .register_processor(
            "count",
            Box::new(CountSink {
                results: Arc::clone(&results),
            }),
        )
        .unwrap();

    let metrics = executor.run().unwrap();
    // one task per source text, one per partition on the reduce side
    assert_eq!(metrics.total_tasks, 1 + 1 + 3);

    let counts = results.lock().unwrap();
    assert_eq!(counts.get("hello"), Some(&2));
    assert_eq!(counts.get("world"), Some(&3));
    assert_eq!(counts.get("grist"), Some(&1));
    assert_eq!(counts.len(), 3);
}

/// Source with one task per entry of `per_task`, writing plain records.
struct RecordSource {
    per_task: Vec<Vec<String>>,
}

impl VertexProcessor for RecordSource {
    fn initialize(
        &mut self,
        _ctx: &mut VertexContext<'_>,
    ) -> Result<Option<TaskSchedule>, EngineError> {
        let mut schedule = TaskSchedule::new();
        for records in &self.per_task {
            schedule.push(Box::new(records.clone()));
        }
        Ok(Some(schedule))
    }

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>, EngineError> {
        Ok(Box::new(RecordSourceTask))
    }
}

struct RecordSourceTask;

impl TaskProcessor for RecordSourceTask {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<(), EngineError> {
        let info = ctx
            .take_info()
            .ok_or_else(|| EngineError::Failed("missing task info".to_string()))?;
        let records = info
            .downcast::<Vec<String>>()
            .map_err(|_| EngineError::Failed("unexpected task info type".to_string()))?;
        let mut out = ValueWriter::new(ctx.open_output("out")?, StringSerde);
        for record in records.iter() {
            out.put(record);
        }
        out.close();
        Ok(())
    }
}

/// Sink recording (task index, records) pairs from a plain input.
struct RecordSink {
    seen: Arc<Mutex<Vec<(usize, Vec<String>)>>>,
}

impl VertexProcessor for RecordSink {
    fn initialize(
        &mut self,
        _ctx: &mut VertexContext<'_>,
    ) -> Result<Option<TaskSchedule>, EngineError> {
        Ok(None)
    }

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>, EngineError> {
        Ok(Box::new(RecordSinkTask {
            seen: Arc::clone(&self.seen),
        }))
    }
}

struct RecordSinkTask {
    seen: Arc<Mutex<Vec<(usize, Vec<String>)>>>,
}

impl TaskProcessor for RecordSinkTask {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<(), EngineError> {
        let mut reader = ValueReader::from_cursor(ctx.take_input("in")?, StringSerde)?;
        let mut records = Vec::new();
        while let Some(record) = reader.next() {
            records.push(record);
        }
        self.seen.lock().unwrap().push((ctx.task_index(), records));
        Ok(())
    }
}

fn linear_graph(movement: Movement) -> GraphModel {
    let mut builder = GraphBuilder::new();
    let source = builder.add_vertex("source", 0).unwrap();
    let sink = builder.add_vertex("sink", 0).unwrap();
    let out = builder.add_output(source, "out", movement).unwrap();
    let inp = builder.add_input(sink, "in", movement).unwrap();
    builder.connect(out, inp).unwrap();
    builder.build()
}

#[test]
fn move_edge_preserves_task_correspondence() {
    init_tracing();
    let per_task: Vec<Vec<String>> = (0..3)
        .map(|t| (0..50).map(|i| format!("task{t}-rec{i:03}")).collect())
        .collect();

    // tiny buffers force every task through several fragments
    let mut config = test_config();
    config.output_buffer_size = 64;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut executor = GraphExecutor::new(linear_graph(Movement::OneToOne), config).unwrap();
    executor
        .register_processor(
            "source",
            Box::new(RecordSource {
                per_task: per_task.clone(),
            }),
        )
        .unwrap();
    executor
        .register_processor(
            "sink",
            Box::new(RecordSink {
                seen: Arc::clone(&seen),
            }),
        )
        .unwrap();
    executor.run().unwrap();

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_by_key(|(task, _)| *task);
    assert_eq!(seen.len(), 3);
    for (task, records) in seen {
        assert_eq!(records, per_task[task]);
    }
}

/// Consumer that drains its broadcast input during initialize and schedules
/// no tasks.
struct BroadcastSink {
    seen: Arc<Mutex<Vec<String>>>,
}

impl VertexProcessor for BroadcastSink {
    fn initialize(
        &mut self,
        ctx: &mut VertexContext<'_>,
    ) -> Result<Option<TaskSchedule>, EngineError> {
        let mut reader = ValueReader::from_cursor(ctx.broadcast_input("side")?, StringSerde)?;
        let mut seen = self.seen.lock().unwrap();
        while let Some(record) = reader.next() {
            seen.push(record);
        }
        Ok(Some(TaskSchedule::new()))
    }

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>, EngineError> {
        Err(EngineError::Failed(
            "broadcast sink schedules no tasks".to_string(),
        ))
    }
}

#[test]
fn broadcast_fans_out_to_every_consumer() {
    init_tracing();
    let mut builder = GraphBuilder::new();
    let source = builder.add_vertex("source", 0).unwrap();
    let left = builder.add_vertex("left", 0).unwrap();
    let right = builder.add_vertex("right", 0).unwrap();
    let out = builder
        .add_output(source, "out", Movement::Broadcast)
        .unwrap();
    let left_in = builder.add_input(left, "side", Movement::Broadcast).unwrap();
    let right_in = builder
        .add_input(right, "side", Movement::Broadcast)
        .unwrap();
    builder.connect(out, left_in).unwrap();
    builder.connect(out, right_in).unwrap();
    let graph = builder.build();

    let records: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
    let left_seen = Arc::new(Mutex::new(Vec::new()));
    let right_seen = Arc::new(Mutex::new(Vec::new()));
    let mut executor = GraphExecutor::new(graph, test_config()).unwrap();
    executor
        .register_processor(
            "source",
            Box::new(RecordSource {
                per_task: vec![records.clone()],
            }),
        )
        .unwrap();
    executor
        .register_processor(
            "left",
            Box::new(BroadcastSink {
                seen: Arc::clone(&left_seen),
            }),
        )
        .unwrap();
    executor
        .register_processor(
            "right",
            Box::new(BroadcastSink {
                seen: Arc::clone(&right_seen),
            }),
        )
        .unwrap();
    executor.run().unwrap();

    assert_eq!(*left_seen.lock().unwrap(), records);
    assert_eq!(*right_seen.lock().unwrap(), records);
}

/// Source whose task at `fail_index` fails.
struct FlakySource {
    tasks: usize,
    fail_index: usize,
}

impl VertexProcessor for FlakySource {
    fn initialize(
        &mut self,
        _ctx: &mut VertexContext<'_>,
    ) -> Result<Option<TaskSchedule>, EngineError> {
        let mut schedule = TaskSchedule::new();
        for i in 0..self.tasks {
            schedule.push(Box::new(i));
        }
        Ok(Some(schedule))
    }

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>, EngineError> {
        Ok(Box::new(FlakySourceTask {
            fail_index: self.fail_index,
        }))
    }
}

struct FlakySourceTask {
    fail_index: usize,
}

impl TaskProcessor for FlakySourceTask {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<(), EngineError> {
        if ctx.task_index() == self.fail_index {
            return Err(EngineError::Failed("synthetic task failure".to_string()));
        }
        let mut out = ValueWriter::new(ctx.open_output("out")?, StringSerde);
        out.put(&format!("record-{}", ctx.task_index()));
        out.close();
        Ok(())
    }
}

/// Sink that records whether it ever started.
struct TripwireSink {
    started: Arc<AtomicBool>,
}

impl VertexProcessor for TripwireSink {
    fn initialize(
        &mut self,
        _ctx: &mut VertexContext<'_>,
    ) -> Result<Option<TaskSchedule>, EngineError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(None)
    }

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>, EngineError> {
        Ok(Box::new(NoopTask))
    }
}

struct NoopTask;

impl TaskProcessor for NoopTask {
    fn run(&mut self, _ctx: &mut TaskContext<'_>) -> Result<(), EngineError> {
        Ok(())
    }
}

#[test]
fn failing_task_aborts_the_run() {
    init_tracing();
    let started = Arc::new(AtomicBool::new(false));
    let mut executor =
        GraphExecutor::new(linear_graph(Movement::OneToOne), test_config()).unwrap();
    executor
        .register_processor(
            "source",
            Box::new(FlakySource {
                tasks: 8,
                fail_index: 5,
            }),
        )
        .unwrap();
    executor
        .register_processor(
            "sink",
            Box::new(TripwireSink {
                started: Arc::clone(&started),
            }),
        )
        .unwrap();

    let err = executor.run().unwrap_err();
    assert!(matches!(err, EngineError::Task { .. }));
    assert!(!started.load(Ordering::SeqCst));
}

/// Vertex with no ports, counting its task executions.
struct CountingVertex {
    tasks: usize,
    executed: Arc<AtomicUsize>,
}

impl VertexProcessor for CountingVertex {
    fn initialize(
        &mut self,
        _ctx: &mut VertexContext<'_>,
    ) -> Result<Option<TaskSchedule>, EngineError> {
        let mut schedule = TaskSchedule::new();
        for i in 0..self.tasks {
            schedule.push(Box::new(i));
        }
        Ok(Some(schedule))
    }

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>, EngineError> {
        Ok(Box::new(CountingTask {
            executed: Arc::clone(&self.executed),
        }))
    }
}

struct CountingTask {
    executed: Arc<AtomicUsize>,
}

impl TaskProcessor for CountingTask {
    fn run(&mut self, _ctx: &mut TaskContext<'_>) -> Result<(), EngineError> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn orphan_vertex_runs_its_schedule() {
    init_tracing();
    let mut builder = GraphBuilder::new();
    builder.add_vertex("orphan", 0).unwrap();
    let executed = Arc::new(AtomicUsize::new(0));
    let mut executor = GraphExecutor::new(builder.build(), test_config()).unwrap();
    executor
        .register_processor(
            "orphan",
            Box::new(CountingVertex {
                tasks: 5,
                executed: Arc::clone(&executed),
            }),
        )
        .unwrap();

    let metrics = executor.run().unwrap();
    assert_eq!(executed.load(Ordering::SeqCst), 5);
    assert_eq!(metrics.total_tasks, 5);
    assert_eq!(metrics.vertices.len(), 1);
    assert_eq!(metrics.vertices[0].tasks, 5);
}

/// Sink that illegally returns a schedule despite a data-parallel input.
struct GreedySink;

impl VertexProcessor for GreedySink {
    fn initialize(
        &mut self,
        _ctx: &mut VertexContext<'_>,
    ) -> Result<Option<TaskSchedule>, EngineError> {
        let mut schedule = TaskSchedule::new();
        schedule.push(Box::new(0usize));
        Ok(Some(schedule))
    }

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>, EngineError> {
        Ok(Box::new(NoopTask))
    }
}

#[test]
fn schedule_with_data_parallel_input_is_rejected() {
    init_tracing();
    let mut executor =
        GraphExecutor::new(linear_graph(Movement::OneToOne), test_config()).unwrap();
    executor
        .register_processor(
            "source",
            Box::new(RecordSource {
                per_task: vec![vec!["x".into()]],
            }),
        )
        .unwrap();
    executor
        .register_processor("sink", Box::new(GreedySink))
        .unwrap();

    let err = executor.run().unwrap_err();
    assert!(matches!(err, EngineError::Invariant(_)));
}

#[test]
fn unregistered_comparator_fails_before_running() {
    init_tracing();
    let mut builder = GraphBuilder::new();
    let source = builder.add_vertex("source", 0).unwrap();
    let sink = builder.add_vertex("sink", 0).unwrap();
    let out = builder
        .add_keyed_output(source, "out", Movement::ScatterGather, Some("by_value"))
        .unwrap();
    let inp = builder
        .add_keyed_input(sink, "in", Movement::ScatterGather)
        .unwrap();
    builder.connect(out, inp).unwrap();

    let mut executor = GraphExecutor::new(builder.build(), test_config()).unwrap();
    executor
        .register_processor(
            "source",
            Box::new(WordSource {
                texts: vec!["one two"],
            }),
        )
        .unwrap();
    executor
        .register_processor(
            "sink",
            Box::new(CountSink {
                results: Arc::new(Mutex::new(HashMap::new())),
            }),
        )
        .unwrap();

    let err = executor.run().unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn unbound_vertex_fails_before_running() {
    init_tracing();
    let executed = Arc::new(AtomicUsize::new(0));
    let mut builder = GraphBuilder::new();
    builder.add_vertex("a", 0).unwrap();
    builder.add_vertex("b", 0).unwrap();
    let mut executor = GraphExecutor::new(builder.build(), test_config()).unwrap();
    executor
        .register_processor(
            "a",
            Box::new(CountingVertex {
                tasks: 1,
                executed: Arc::clone(&executed),
            }),
        )
        .unwrap();

    let err = executor.run().unwrap_err();
    assert!(matches!(err, EngineError::Graph(_)));
    assert_eq!(executed.load(Ordering::SeqCst), 0);
}
