use std::env;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_usize(key: &str, default: usize) -> usize {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// How the byte region performs bounds handling on typed accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Slice-indexed accesses; out-of-bounds panics.
    #[default]
    Checked,
    /// Unchecked accesses guarded by `debug_assert!` only.
    Unchecked,
}

/// Engine configuration, typically parsed from TOML/JSON or the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of worker threads in the shared pool. 0 = available parallelism.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Upper bound on concurrent tasks within one vertex. 0 = no extra cap.
    #[serde(default = "default_max_task_concurrency")]
    pub max_task_concurrency: usize,
    /// Number of partitions in scatter-gather edges.
    #[serde(default = "default_partition_count")]
    pub partition_count: usize,
    /// Output buffer size in bytes for freshly allocated fragments.
    #[serde(default = "default_output_buffer_size")]
    pub output_buffer_size: usize,
    /// Maximum number of records per output fragment.
    #[serde(default = "default_output_records_per_buffer")]
    pub output_records_per_buffer: usize,
    /// Fraction of the output buffer that triggers an early flush.
    #[serde(default = "default_output_flush_factor")]
    pub output_flush_factor: f32,
    /// Byte region access backend.
    #[serde(default)]
    pub buffer_access_mode: AccessMode,
}

fn default_worker_threads() -> usize {
    0
}
fn default_max_task_concurrency() -> usize {
    0
}
fn default_partition_count() -> usize {
    1
}
fn default_output_buffer_size() -> usize {
    256 * 1024
}
fn default_output_records_per_buffer() -> usize {
    16 * 1024
}
fn default_output_flush_factor() -> f32 {
    0.8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            max_task_concurrency: default_max_task_concurrency(),
            partition_count: default_partition_count(),
            output_buffer_size: default_output_buffer_size(),
            output_records_per_buffer: default_output_records_per_buffer(),
            output_flush_factor: default_output_flush_factor(),
            buffer_access_mode: AccessMode::default(),
        }
    }
}

impl EngineConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mode = match env_opt("GRIST_BUFFER_ACCESS_MODE").as_deref() {
            Some("unchecked") => AccessMode::Unchecked,
            Some("checked") | None => AccessMode::Checked,
            Some(other) => {
                tracing::warn!("unknown buffer access mode {:?}, using checked", other);
                AccessMode::Checked
            }
        };
        Self {
            worker_threads: env_usize("GRIST_WORKER_THREADS", defaults.worker_threads),
            max_task_concurrency: env_usize(
                "GRIST_MAX_TASK_CONCURRENCY",
                defaults.max_task_concurrency,
            ),
            partition_count: env_usize("GRIST_PARTITION_COUNT", defaults.partition_count),
            output_buffer_size: env_usize("GRIST_OUTPUT_BUFFER_SIZE", defaults.output_buffer_size),
            output_records_per_buffer: env_usize(
                "GRIST_OUTPUT_RECORDS_PER_BUFFER",
                defaults.output_records_per_buffer,
            ),
            output_flush_factor: env_f32(
                "GRIST_OUTPUT_FLUSH_FACTOR",
                defaults.output_flush_factor,
            ),
            buffer_access_mode: mode,
        }
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    /// Flush factor clamped to a sane range.
    pub fn resolved_flush_factor(&self) -> f32 {
        self.output_flush_factor.clamp(0.5, 0.99)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.partition_count == 0 {
            return Err(EngineError::Config(
                "partition_count must be at least 1".to_string(),
            ));
        }
        if self.output_buffer_size == 0 {
            return Err(EngineError::Config(
                "output_buffer_size must be non-zero".to_string(),
            ));
        }
        if self.output_records_per_buffer == 0 {
            return Err(EngineError::Config(
                "output_records_per_buffer must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
