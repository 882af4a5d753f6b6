//! Block execution: sequential or across a fixed worker pool
//!
//! Workers are stateless with respect to each other: each receives one
//! self-contained pixel batch and returns one self-contained result.
//! Completed results may arrive out of order inside a wave, but every
//! result carries its originating block index, and each block writes to
//! its own disjoint window, so ordering never affects correctness.

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::errors::{RasterMathError, RasterResult};

use super::batch::PixelBatch;
use std::sync::Arc;

/// The per-block user function
///
/// Receives the batch of valid pixel vectors for one block and returns
/// the output batch, which must keep the row count and match the output
/// band count declared up front. A returned `Err` aborts the run.
pub type BlockFunction = Arc<dyn Fn(&PixelBatch) -> Result<PixelBatch, String> + Send + Sync>;

/// How blocks are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Function invoked in the caller's own control flow, block by block
    Sequential,
    /// Blocks fanned out over a fixed pool of this many workers
    Parallel(usize),
}

impl ExecutionMode {
    /// Mode for a worker count; one worker means no parallelism at all
    pub fn from_worker_count(workers: usize) -> Self {
        if workers <= 1 {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Parallel(workers)
        }
    }
}

/// Applies the user function to waves of blocks
pub struct BlockExecutor {
    pool: Option<ThreadPool>,
    workers: usize,
}

impl BlockExecutor {
    /// Create an executor for the given mode
    pub fn new(mode: ExecutionMode) -> RasterResult<Self> {
        match mode {
            ExecutionMode::Sequential => Ok(BlockExecutor {
                pool: None,
                workers: 1,
            }),
            ExecutionMode::Parallel(workers) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|e| {
                        RasterMathError::Configuration(format!(
                            "failed to build a {}-worker pool: {}",
                            workers, e
                        ))
                    })?;
                Ok(BlockExecutor {
                    pool: Some(pool),
                    workers,
                })
            }
        }
    }

    /// Number of workers backing this executor
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Apply the function to one batch and validate the result shape
    ///
    /// # Arguments
    /// * `function` - The user function
    /// * `batch` - Input batch
    /// * `expected_bands` - Band count declared by the output spec
    /// * `block` - Block index, attached to any error
    pub fn apply(
        function: &BlockFunction,
        batch: &PixelBatch,
        expected_bands: usize,
        block: usize,
    ) -> RasterResult<PixelBatch> {
        let output = function(batch).map_err(|message| RasterMathError::Compute {
            block,
            message,
        })?;

        if output.rows() != batch.rows() {
            return Err(RasterMathError::Compute {
                block,
                message: format!(
                    "function returned {} rows for {} input pixels",
                    output.rows(),
                    batch.rows()
                ),
            });
        }
        if output.bands() != expected_bands {
            return Err(RasterMathError::Compute {
                block,
                message: format!(
                    "function returned {} bands, output is declared with {}",
                    output.bands(),
                    expected_bands
                ),
            });
        }
        Ok(output)
    }

    /// Execute one wave of blocks, returning results in submission order
    ///
    /// Each entry pairs a block index with its batch. In parallel mode
    /// the wave is fanned out over the pool; each result still carries
    /// its block index so the caller can stop at the first error and
    /// leave later blocks unwritten.
    pub fn execute_wave(
        &self,
        function: &BlockFunction,
        wave: &[(usize, PixelBatch)],
        expected_bands: usize,
    ) -> Vec<(usize, RasterResult<PixelBatch>)> {
        match &self.pool {
            None => wave
                .iter()
                .map(|(block, batch)| {
                    (*block, Self::apply(function, batch, expected_bands, *block))
                })
                .collect(),
            Some(pool) => pool.install(|| {
                wave.par_iter()
                    .map(|(block, batch)| {
                        (*block, Self::apply(function, batch, expected_bands, *block))
                    })
                    .collect()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> BlockFunction {
        Arc::new(|batch: &PixelBatch| Ok(batch.clone()))
    }

    #[test]
    fn test_mode_from_worker_count() {
        assert_eq!(ExecutionMode::from_worker_count(0), ExecutionMode::Sequential);
        assert_eq!(ExecutionMode::from_worker_count(1), ExecutionMode::Sequential);
        assert_eq!(ExecutionMode::from_worker_count(4), ExecutionMode::Parallel(4));
    }

    #[test]
    fn test_shape_validation() {
        let batch = PixelBatch::from_values(2, 1, vec![1.0, 2.0]).unwrap();

        let wrong_rows: BlockFunction = Arc::new(|_| Ok(PixelBatch::new(1, 1)));
        assert!(matches!(
            BlockExecutor::apply(&wrong_rows, &batch, 1, 7),
            Err(RasterMathError::Compute { block: 7, .. })
        ));

        let wrong_bands: BlockFunction = Arc::new(|b: &PixelBatch| Ok(PixelBatch::new(b.rows(), 3)));
        assert!(BlockExecutor::apply(&wrong_bands, &batch, 1, 0).is_err());

        assert!(BlockExecutor::apply(&identity(), &batch, 1, 0).is_ok());
    }

    #[test]
    fn test_user_error_carries_block_index() {
        let batch = PixelBatch::new(1, 1);
        let failing: BlockFunction = Arc::new(|_| Err("bad pixel".to_string()));
        match BlockExecutor::apply(&failing, &batch, 1, 3) {
            Err(RasterMathError::Compute { block, message }) => {
                assert_eq!(block, 3);
                assert!(message.contains("bad pixel"));
            }
            other => panic!("expected a compute error, got {:?}", other),
        }
    }

    #[test]
    fn test_parallel_wave_matches_sequential() {
        let wave: Vec<(usize, PixelBatch)> = (0..8)
            .map(|i| {
                let values: Vec<f64> = (0..4).map(|v| (i * 4 + v) as f64).collect();
                (i, PixelBatch::from_values(4, 1, values).unwrap())
            })
            .collect();

        let double: BlockFunction =
            Arc::new(|b: &PixelBatch| b.map_rows(1, |row| vec![row[0] * 2.0]).map_err(|e| e.to_string()));

        let sequential = BlockExecutor::new(ExecutionMode::Sequential).unwrap();
        let parallel = BlockExecutor::new(ExecutionMode::Parallel(4)).unwrap();

        let a = sequential.execute_wave(&double, &wave, 1);
        let b = parallel.execute_wave(&double, &wave, 1);

        assert_eq!(a.len(), b.len());
        for ((ia, ra), (ib, rb)) in a.iter().zip(b.iter()) {
            assert_eq!(ia, ib);
            assert_eq!(ra.as_ref().unwrap(), rb.as_ref().unwrap());
        }
    }
}
