// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Rayon thread pool used by `ForEachItemParallel` (§4.E). Adapted from the
//! teacher's `RayonPoolManager`: a single named pool sized to the requested
//! worker count (falling back to available parallelism), rather than the
//! teacher's CPU-bound/mixed-workload split, since this engine has exactly
//! one parallel stage rather than several competing workload shapes.

use std::sync::Arc;

use pipeline_domain::error::PipelineError;

pub struct ForEachWorkerPool {
    pool: Arc<rayon::ThreadPool>,
}

impl ForEachWorkerPool {
    pub fn new(threads: usize) -> Result<Self, PipelineError> {
        let threads = if threads == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            threads
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("pipeline-foreach-{i}"))
            .build()
            .map_err(|e| PipelineError::InvalidConfiguration(format!("failed to build worker pool: {e}")))?;
        Ok(Self { pool: Arc::new(pool) })
    }

    pub fn pool(&self) -> &Arc<rayon::ThreadPool> {
        &self.pool
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_pool_with_the_requested_width() {
        let pool = ForEachWorkerPool::new(3).unwrap();
        assert_eq!(pool.thread_count(), 3);
    }

    #[test]
    fn zero_threads_falls_back_to_available_parallelism() {
        let pool = ForEachWorkerPool::new(0).unwrap();
        assert!(pool.thread_count() >= 1);
    }
}
