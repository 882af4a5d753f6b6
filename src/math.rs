//! The block processing orchestrator
//!
//! [`RasterMath`] owns the raster handles, the block plan, the mask plan
//! and the worker pool, and walks the phases
//! Configured -> Planned -> Running -> Completed/Failed. Callers either
//! drive the pull-style iterator themselves (`has_next`/`next_block`) or
//! declare function/output pairs and let `run` push every block through
//! read, execute and write.

use std::path::PathBuf;

use log::{error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::block::{
    BlockExecutor, BlockFunction, BlockReader, BlockWriter, ExecutionMode, PixelBatch,
    PositionIndex,
};
use crate::config::{RasterMathOptions, DEFAULTS};
use crate::errors::{RasterMathError, RasterResult};
use crate::grid::GridDataset;
use crate::mask::{BlockMask, MaskIndex, MaskPlan, MaskRule};
use crate::plan::{
    resolve_block_size, BlockGeometry, BlockPlan, BlockWindow, MemoryBudget, MemoryProbe,
    SystemMemoryProbe,
};
use crate::raster::{DataType, MemoryDataset, RasterDataset, RasterParams};
use crate::utils::logger::Logger;
use crate::utils::progress::ProgressTracker;

/// Draws attempted before giving up on finding an unmasked random block
const RANDOM_BLOCK_ATTEMPTS: usize = 32;

/// Lifecycle phase of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// Inputs opened, outputs declared, mask attached
    Configured,
    /// Block plan and mask plan computed
    Planned,
    /// Blocks being processed
    Running,
    /// All outputs flushed and closed
    Completed,
    /// Terminal failure; partial outputs remain on disk
    Failed,
}

/// Where an output raster is materialized
#[derive(Debug, Clone)]
pub enum OutputDestination {
    /// Grid container file at this path
    Path(PathBuf),
    /// In-memory dataset handed back after the run
    Memory,
}

/// Declaration of one output raster
///
/// Fixed before the first write; every block must produce a conforming
/// batch or the run fails.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    /// Band count of the output
    pub bands: usize,
    /// Storage data type of the output
    pub dtype: DataType,
    /// Nodata written at masked-out positions
    pub nodata: f64,
    /// Where the output lands
    pub destination: OutputDestination,
    /// Tile codec name for file destinations
    pub compression: String,
}

impl OutputSpec {
    /// Declare an in-memory output
    pub fn in_memory(bands: usize, dtype: DataType) -> Self {
        OutputSpec {
            bands,
            dtype,
            nodata: DEFAULTS.default_nodata,
            destination: OutputDestination::Memory,
            compression: "none".to_string(),
        }
    }

    /// Declare a file output, deflate-compressed by default
    pub fn to_path<P: Into<PathBuf>>(path: P, bands: usize, dtype: DataType) -> Self {
        OutputSpec {
            bands,
            dtype,
            nodata: DEFAULTS.default_nodata,
            destination: OutputDestination::Path(path.into()),
            compression: "deflate".to_string(),
        }
    }

    /// Set the nodata value
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = nodata;
        self
    }

    /// Set the tile codec for file destinations
    pub fn with_compression(mut self, name: &str) -> Self {
        self.compression = name.to_string();
        self
    }
}

/// One declared function/output pair
struct Operation {
    function: BlockFunction,
    spec: OutputSpec,
}

/// Block-wise raster processing engine
pub struct RasterMath {
    inputs: Vec<Box<dyn RasterDataset>>,
    mask: Option<(Box<dyn RasterDataset>, MaskRule)>,
    operations: Vec<Operation>,
    outputs: Vec<Box<dyn RasterDataset>>,
    options: RasterMathOptions,
    budget: MemoryBudget,
    logger: Option<Logger>,
    phase: EnginePhase,
    block_plan: BlockPlan,
    mask_plan: MaskPlan,
    block_size: (usize, usize),
    cursor: usize,
    total_bands: usize,
}

impl RasterMath {
    /// Open the engine over one or more input rasters
    ///
    /// Inputs are treated as one stack: their bands are concatenated in
    /// list order into the pixel vectors handed to user functions. All
    /// inputs must share the same extent and geotransform.
    pub fn new(inputs: Vec<Box<dyn RasterDataset>>) -> RasterResult<Self> {
        if inputs.is_empty() {
            return Err(RasterMathError::Configuration(
                "at least one input raster is required".to_string(),
            ));
        }

        let reference = inputs[0].params().clone();
        if reference.width == 0 || reference.height == 0 {
            return Err(RasterMathError::Configuration(format!(
                "input raster dimensions must be positive, got {}x{}",
                reference.width, reference.height
            )));
        }
        for (i, input) in inputs.iter().enumerate().skip(1) {
            reference.check_same_geometry(input.params(), &format!("input raster {}", i))?;
        }

        let total_bands = inputs.iter().map(|d| d.params().bands).sum();
        info!(
            "opened {} input raster(s), {}x{}, {} stacked band(s)",
            inputs.len(),
            reference.width,
            reference.height,
            total_bands
        );

        Ok(RasterMath {
            inputs,
            mask: None,
            operations: Vec::new(),
            outputs: Vec::new(),
            options: RasterMathOptions::default(),
            budget: MemoryBudget::new(Box::new(SystemMemoryProbe)),
            logger: None,
            phase: EnginePhase::Configured,
            block_plan: Vec::new(),
            mask_plan: Vec::new(),
            block_size: (0, 0),
            cursor: 0,
            total_bands,
        })
    }

    /// Replace the run options
    pub fn with_options(mut self, options: RasterMathOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the memory probe backing the block-size budget
    pub fn with_memory_probe(mut self, probe: Box<dyn MemoryProbe>) -> Self {
        self.budget = MemoryBudget::new(probe);
        self
    }

    /// Attach a log file recording the run's milestones
    pub fn with_log_file(mut self, path: &std::path::Path) -> RasterResult<Self> {
        self.logger = Some(Logger::new(path)?);
        Ok(self)
    }

    fn note(&self, message: &str) {
        if let Some(logger) = &self.logger {
            let _ = logger.log(message);
        }
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Parameters of the input stack's first raster
    pub fn params(&self) -> &RasterParams {
        self.inputs[0].params()
    }

    /// Stacked band count across all inputs
    pub fn band_count(&self) -> usize {
        self.total_bands
    }

    /// The computed block plan (empty before `plan`)
    pub fn blocks(&self) -> &[BlockWindow] {
        &self.block_plan
    }

    /// The computed mask plan (empty before `plan`)
    pub fn block_masks(&self) -> &[BlockMask] {
        &self.mask_plan
    }

    fn require_phase(&self, expected: EnginePhase, what: &str) -> RasterResult<()> {
        if self.phase != expected {
            return Err(RasterMathError::Configuration(format!(
                "{} requires the {:?} phase, engine is {:?}",
                what, expected, self.phase
            )));
        }
        Ok(())
    }

    fn require_planned(&self, what: &str) -> RasterResult<()> {
        if !matches!(self.phase, EnginePhase::Planned | EnginePhase::Running) {
            return Err(RasterMathError::Configuration(format!(
                "{} requires a planned engine, engine is {:?}",
                what, self.phase
            )));
        }
        Ok(())
    }

    /// Attach a mask raster
    ///
    /// The mask must share the inputs' geometry; the check happens
    /// eagerly. Values satisfying the rule mark participating pixels.
    pub fn set_mask(&mut self, mask: Box<dyn RasterDataset>, rule: MaskRule) -> RasterResult<()> {
        self.require_phase(EnginePhase::Configured, "set_mask")?;
        self.inputs[0]
            .params()
            .check_same_geometry(mask.params(), "mask raster")?;
        self.mask = Some((mask, rule));
        Ok(())
    }

    /// Declare a function/output pair for the next run
    pub fn add_operation(&mut self, function: BlockFunction, spec: OutputSpec) -> RasterResult<()> {
        self.require_phase(EnginePhase::Configured, "add_operation")?;
        if spec.bands == 0 {
            return Err(RasterMathError::Configuration(
                "output band count must be positive".to_string(),
            ));
        }
        self.operations.push(Operation { function, spec });
        Ok(())
    }

    /// Compute the block plan and mask plan
    ///
    /// Entered once per configuration; call `reconfigure` to replan.
    pub fn plan(&mut self) -> RasterResult<()> {
        self.require_phase(EnginePhase::Configured, "plan")?;

        let params = self.inputs[0].params().clone();
        let bytes_per_pixel: usize = self.inputs.iter().map(|d| d.params().bytes_per_pixel()).sum();
        let workers = self.options.resolve_worker_count();

        let (block_w, block_h) = resolve_block_size(
            &self.options,
            params.block_size,
            bytes_per_pixel,
            workers,
            &self.budget,
        );

        self.block_plan = BlockGeometry::tile(params.width, params.height, block_w, block_h)?;
        self.mask_plan = match self.mask.as_mut() {
            Some((dataset, rule)) => {
                MaskIndex::build(dataset.as_mut(), &params, &self.block_plan, &*rule)?
            }
            None => MaskIndex::all_full(self.block_plan.len()),
        };

        self.block_size = (block_w, block_h);
        self.cursor = 0;
        self.phase = EnginePhase::Planned;
        info!(
            "planned {} block(s) of {}x{} with {} worker(s)",
            self.block_plan.len(),
            block_w,
            block_h,
            workers
        );
        self.note(&format!(
            "planned {} blocks of {}x{} over a {}x{} raster",
            self.block_plan.len(),
            block_w,
            block_h,
            params.width,
            params.height
        ));
        Ok(())
    }

    /// Return a planned engine to Configured so it can be replanned
    pub fn reconfigure(&mut self) -> RasterResult<()> {
        self.require_phase(EnginePhase::Planned, "reconfigure")?;
        self.block_plan.clear();
        self.mask_plan.clear();
        self.block_size = (0, 0);
        self.cursor = 0;
        self.phase = EnginePhase::Configured;
        Ok(())
    }

    /// Whether the pull iterator has unmasked blocks left
    pub fn has_next(&self) -> bool {
        self.mask_plan[self.cursor.min(self.mask_plan.len())..]
            .iter()
            .any(|m| !matches!(m, BlockMask::Skip))
    }

    /// Pull the next unmasked block
    ///
    /// Returns the block index, its window, the batch of valid pixel
    /// vectors and their positions within the window; None when the plan
    /// is exhausted, which completes the engine.
    pub fn next_block(
        &mut self,
    ) -> RasterResult<Option<(usize, BlockWindow, PixelBatch, PositionIndex)>> {
        self.require_planned("next_block")?;
        self.phase = EnginePhase::Running;

        let reader = BlockReader::new(self.options.filter_nodata);
        while self.cursor < self.block_plan.len() {
            let block = self.cursor;
            self.cursor += 1;

            if matches!(self.mask_plan[block], BlockMask::Skip) {
                continue;
            }

            let window = self.block_plan[block];
            let entry = self.mask_plan[block].clone();
            let (batch, positions) = reader
                .read(&mut self.inputs, &window, &entry)
                .map_err(|e| e.at_block(block, window))?;
            return Ok(Some((block, window, batch, positions)));
        }

        self.phase = EnginePhase::Completed;
        Ok(None)
    }

    /// Read one block of the plan by index
    pub fn get_block(&mut self, index: usize) -> RasterResult<(PixelBatch, PositionIndex)> {
        self.require_planned("get_block")?;
        if index >= self.block_plan.len() {
            return Err(RasterMathError::Configuration(format!(
                "block index {} out of range ({} blocks planned)",
                index,
                self.block_plan.len()
            )));
        }

        let window = self.block_plan[index];
        let entry = self.mask_plan[index].clone();
        let reader = BlockReader::new(self.options.filter_nodata);
        reader
            .read(&mut self.inputs, &window, &entry)
            .map_err(|e| e.at_block(index, window))
    }

    /// Fetch one uniformly-random unmasked block
    ///
    /// The draw is seeded for reproducibility. Before planning, an
    /// ad-hoc tiling at the default block size is used and windows are
    /// classified on the fly; after planning, the draw is uniform over
    /// the plan's non-skip blocks.
    pub fn get_random_block(&mut self, seed: u64) -> RasterResult<PixelBatch> {
        let mut rng = StdRng::seed_from_u64(seed);
        let reader = BlockReader::new(self.options.filter_nodata);

        let planned = matches!(self.phase, EnginePhase::Planned | EnginePhase::Running);
        let windows: Vec<(BlockWindow, Option<BlockMask>)> = if planned {
            self.block_plan
                .iter()
                .zip(self.mask_plan.iter())
                .filter(|(_, m)| !matches!(m, BlockMask::Skip))
                .map(|(w, m)| (*w, Some(m.clone())))
                .collect()
        } else {
            let params = self.inputs[0].params().clone();
            let edge = DEFAULTS.fallback_block_size;
            BlockGeometry::tile(
                params.width,
                params.height,
                edge.min(params.width),
                edge.min(params.height),
            )?
            .into_iter()
            .map(|w| (w, None))
            .collect()
        };

        if windows.is_empty() {
            return Err(RasterMathError::GenericError(
                "every block is fully masked".to_string(),
            ));
        }

        for _ in 0..RANDOM_BLOCK_ATTEMPTS {
            let (window, entry) = &windows[rng.gen_range(0..windows.len())];
            let entry = match entry {
                Some(e) => e.clone(),
                None => match self.mask.as_mut() {
                    Some((dataset, rule)) => {
                        let values = dataset.read_window(0, window)?;
                        MaskIndex::classify(&values, &*rule)
                    }
                    None => BlockMask::Full,
                },
            };
            if matches!(entry, BlockMask::Skip) {
                continue;
            }

            let (batch, _) = reader.read(&mut self.inputs, window, &entry)?;
            if !batch.is_empty() {
                return Ok(batch);
            }
        }

        Err(RasterMathError::GenericError(format!(
            "no unmasked pixels found in {} random draws",
            RANDOM_BLOCK_ATTEMPTS
        )))
    }

    /// Derive an output spec by sampling the function on a random block
    ///
    /// Band count comes from the function's output shape, the data type
    /// from the smallest type able to hold the output value range. The
    /// returned spec targets memory; repoint it before adding the
    /// operation if a file output is wanted.
    pub fn infer_output_spec(
        &mut self,
        function: &BlockFunction,
        seed: u64,
    ) -> RasterResult<OutputSpec> {
        let sample = self.get_random_block(seed)?;
        let output = function(&sample).map_err(|m| {
            RasterMathError::GenericError(format!("function failed on the sampled block: {}", m))
        })?;

        if output.rows() != sample.rows() {
            return Err(RasterMathError::GenericError(format!(
                "function returned {} rows for {} sampled pixels",
                output.rows(),
                sample.rows()
            )));
        }

        let (min, max) = output.value_range().unwrap_or((0.0, 0.0));
        let dtype = DataType::for_range(min, max);
        info!(
            "inferred output spec: {} band(s), {} (sampled range {} to {})",
            output.bands(),
            dtype.name(),
            min,
            max
        );
        Ok(OutputSpec::in_memory(output.bands(), dtype))
    }

    /// Declare a single operation and run to completion
    pub fn run_with(&mut self, function: BlockFunction, spec: OutputSpec) -> RasterResult<()> {
        self.add_operation(function, spec)?;
        self.run()
    }

    /// Push every block through read, execute and write
    ///
    /// Plans first when still Configured. On success every output is
    /// flushed and the engine completes; on the first error the engine
    /// fails, pending work is abandoned, and already-written blocks stay
    /// on disk.
    pub fn run(&mut self) -> RasterResult<()> {
        if self.phase == EnginePhase::Configured {
            self.plan()?;
        }
        self.require_phase(EnginePhase::Planned, "run")?;
        if self.operations.is_empty() {
            return Err(RasterMathError::Configuration(
                "no operations declared; call add_operation first".to_string(),
            ));
        }

        self.phase = EnginePhase::Running;
        self.create_outputs()?;

        let workers = self.options.resolve_worker_count();
        let executor = BlockExecutor::new(ExecutionMode::from_worker_count(workers))?;
        let reader = BlockReader::new(self.options.filter_nodata);
        let mut writers: Vec<BlockWriter> = (0..self.operations.len())
            .map(|_| BlockWriter::new(self.options.flush_interval))
            .collect();

        let progress = if self.options.show_progress {
            Some(ProgressTracker::new(
                self.block_plan.len() as u64,
                "processing blocks",
            ))
        } else {
            None
        };

        let wave_capacity = executor.worker_count();
        let total = self.block_plan.len();
        let mut index = 0;

        while index < total {
            // Gather the next wave of unmasked blocks
            let mut wave: Vec<(usize, PixelBatch)> = Vec::with_capacity(wave_capacity);
            let mut wave_positions: Vec<PositionIndex> = Vec::with_capacity(wave_capacity);

            while index < total && wave.len() < wave_capacity {
                let block = index;
                index += 1;

                if matches!(self.mask_plan[block], BlockMask::Skip) {
                    if let Some(p) = &progress {
                        p.increment(1);
                    }
                    continue;
                }

                let window = self.block_plan[block];
                let entry = self.mask_plan[block].clone();
                match reader.read(&mut self.inputs, &window, &entry) {
                    Ok((batch, positions)) => {
                        wave.push((block, batch));
                        wave_positions.push(positions);
                    }
                    Err(e) => return self.fail(e.at_block(block, window)),
                }
            }

            if wave.is_empty() {
                continue;
            }

            // Every operation sees the same wave; results come back with
            // their block indices and are written in wave order, stopping
            // at the first error so later blocks stay unwritten.
            for op_index in 0..self.operations.len() {
                let function = self.operations[op_index].function.clone();
                let bands = self.operations[op_index].spec.bands;

                let results = executor.execute_wave(&function, &wave, bands);
                for (slot, (block, result)) in results.into_iter().enumerate() {
                    let window = self.block_plan[block];
                    let output = match result {
                        Ok(output) => output,
                        Err(e) => return self.fail(e.at_block(block, window)),
                    };
                    if let Err(e) = writers[op_index].write(
                        self.outputs[op_index].as_mut(),
                        &window,
                        &wave_positions[slot],
                        &output,
                    ) {
                        return self.fail(e.at_block(block, window));
                    }
                }
            }

            if let Some(p) = &progress {
                p.increment(wave.len() as u64);
            }
        }

        for (writer, output) in writers.iter_mut().zip(self.outputs.iter_mut()) {
            if let Err(e) = writer.finish(output.as_mut()) {
                error!("final flush failed: {}", e);
                self.phase = EnginePhase::Failed;
                return Err(e);
            }
        }

        if let Some(p) = &progress {
            p.finish();
        }
        self.phase = EnginePhase::Completed;

        for operation in &self.operations {
            if let OutputDestination::Path(path) = &operation.spec.destination {
                info!("saved {}", path.display());
                self.note(&format!("saved {}", path.display()));
            }
        }
        info!("run completed: {} block(s)", total);
        self.note(&format!("run completed: {} blocks", total));
        Ok(())
    }

    /// Take ownership of the output datasets
    ///
    /// Available after a completed run, or after a failed one — partial
    /// outputs are the documented contract, not corruption.
    pub fn into_outputs(self) -> RasterResult<Vec<Box<dyn RasterDataset>>> {
        match self.phase {
            EnginePhase::Completed | EnginePhase::Failed => Ok(self.outputs),
            _ => Err(RasterMathError::Configuration(
                "outputs are available once a run has completed or failed".to_string(),
            )),
        }
    }

    /// Materialize the declared outputs before the first write
    fn create_outputs(&mut self) -> RasterResult<()> {
        let params = self.inputs[0].params().clone();
        let mut outputs: Vec<Box<dyn RasterDataset>> = Vec::with_capacity(self.operations.len());

        for operation in &self.operations {
            let out_params = RasterParams {
                width: params.width,
                height: params.height,
                bands: operation.spec.bands,
                dtype: operation.spec.dtype,
                nodata: operation.spec.nodata,
                geotransform: params.geotransform,
                projection: params.projection.clone(),
                block_size: self.block_size,
            };
            let dataset: Box<dyn RasterDataset> = match &operation.spec.destination {
                OutputDestination::Path(path) => Box::new(GridDataset::create(
                    path,
                    out_params,
                    &operation.spec.compression,
                )?),
                OutputDestination::Memory => Box::new(MemoryDataset::new(out_params)),
            };
            outputs.push(dataset);
        }

        self.outputs = outputs;
        Ok(())
    }

    /// Record a terminal failure, leaving partial outputs readable
    fn fail(&mut self, e: RasterMathError) -> RasterResult<()> {
        error!("run failed: {}", e);
        self.note(&format!("run failed: {}", e));
        self.phase = EnginePhase::Failed;
        for output in self.outputs.iter_mut() {
            let _ = output.flush();
        }
        Err(e)
    }
}
