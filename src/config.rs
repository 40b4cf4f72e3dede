//! Scheduler configuration: queue sizes and worker-fleet width. Deliberately minimal (no CLI
//! or file-layering surface at this layer — that belongs to whatever binary embeds the
//! runtime) but still a plain `serde`-deserializable struct, matching how configuration is
//! modeled elsewhere in this codebase.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Bounds for the scheduler's queues and worker fleet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SchedulerConfig {
    /// Capacity of the global task queue and the ready queue.
    pub queue_size: usize,
    /// Number of worker threads draining ready processes.
    pub number_of_workers: usize,
    /// Capacity of each process's mailbox.
    pub process_queue_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_size: 1024,
            number_of_workers: default_worker_count(),
            process_queue_size: 256,
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_size == 0 {
            return Err(ConfigError::ZeroQueueSize);
        }
        if self.process_queue_size == 0 {
            return Err(ConfigError::ZeroProcessQueueSize);
        }
        if self.number_of_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(())
    }
}
