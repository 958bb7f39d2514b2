//! Pipeline configuration.

use graphmill_core::defaults;

/// Worker pool and queue sizes for a resolution job. Every size is at
/// least 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    candidate_workers: usize,
    edge_workers: usize,
    queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            candidate_workers: defaults::CANDIDATE_WORKERS,
            edge_workers: defaults::EDGE_WORKERS,
            queue_capacity: defaults::QUEUE_CAPACITY,
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
        .max(1)
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `GRAPHMILL_CANDIDATE_WORKERS` | `5` | Candidate resolution workers |
    /// | `GRAPHMILL_EDGE_WORKERS` | `5` | Edge resolution workers |
    /// | `GRAPHMILL_QUEUE_CAPACITY` | `64` | Bound of each work queue |
    pub fn from_env() -> Self {
        Self {
            candidate_workers: env_usize("GRAPHMILL_CANDIDATE_WORKERS", defaults::CANDIDATE_WORKERS),
            edge_workers: env_usize("GRAPHMILL_EDGE_WORKERS", defaults::EDGE_WORKERS),
            queue_capacity: env_usize("GRAPHMILL_QUEUE_CAPACITY", defaults::QUEUE_CAPACITY),
        }
    }

    /// Workers checking candidates against the dedup index.
    pub fn candidate_workers(&self) -> usize {
        self.candidate_workers
    }

    /// Workers building edges to resolved vertices.
    pub fn edge_workers(&self) -> usize {
        self.edge_workers
    }

    /// Capacity of each work queue and of the result channel.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn with_candidate_workers(mut self, n: usize) -> Self {
        self.candidate_workers = n.max(1);
        self
    }

    pub fn with_edge_workers(mut self, n: usize) -> Self {
        self.edge_workers = n.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.candidate_workers, 5);
        assert_eq!(config.edge_workers, 5);
        assert_eq!(config.queue_capacity, 64);
    }

    #[test]
    fn test_pipeline_config_builder_clamps() {
        let config = PipelineConfig::default()
            .with_candidate_workers(0)
            .with_edge_workers(3)
            .with_queue_capacity(0);
        assert_eq!(config.candidate_workers(), 1);
        assert_eq!(config.edge_workers(), 3);
        assert_eq!(config.queue_capacity(), 1);
    }
}
