//! Integration tests for the block processing engine

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rastermath::{
    BlockFunction, BlockMask, BlockWindow, DataType, EnginePhase, FixedMemoryProbe, MaskRule,
    MemoryDataset, OutputSpec, PixelBatch, RasterDataset, RasterMath, RasterMathOptions,
    RasterParams, RasterResult,
};

const SIZE: usize = 512;
const NODATA: f64 = -9999.0;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 512x512 single-band input whose value encodes the pixel position
fn input_dataset() -> MemoryDataset {
    let params = RasterParams::new(SIZE, SIZE, 1, DataType::Float64).with_nodata(NODATA);
    let plane: Vec<f64> = (0..SIZE * SIZE).map(|p| (p % 100_000) as f64).collect();
    MemoryDataset::from_bands(params, vec![plane]).unwrap()
}

/// Mask where rows 0..255 are invalid and the rest valid
fn top_half_mask() -> MemoryDataset {
    let params = RasterParams::new(SIZE, SIZE, 1, DataType::UInt8);
    let mut plane = vec![0.0; SIZE * SIZE];
    for p in (SIZE * SIZE / 2)..(SIZE * SIZE) {
        plane[p] = 1.0;
    }
    MemoryDataset::from_bands(params, vec![plane]).unwrap()
}

fn identity() -> BlockFunction {
    Arc::new(|batch: &PixelBatch| Ok(batch.clone()))
}

fn engine_options(workers: usize) -> RasterMathOptions {
    RasterMathOptions {
        block_size: Some((256, 256)),
        worker_count: Some(workers),
        ..Default::default()
    }
}

fn output_band(outputs: &mut [Box<dyn RasterDataset>], index: usize) -> Vec<f64> {
    let window = BlockWindow::new(0, 0, SIZE, SIZE);
    outputs[index].read_window(0, &window).unwrap()
}

#[test]
fn test_identity_run_reproduces_input() {
    init_logging();

    let input = input_dataset();
    let expected = input.band(0).to_vec();

    let mut engine = RasterMath::new(vec![Box::new(input)])
        .unwrap()
        .with_options(engine_options(1));
    engine
        .add_operation(
            identity(),
            OutputSpec::in_memory(1, DataType::Float64).with_nodata(NODATA),
        )
        .unwrap();
    engine.run().unwrap();
    assert_eq!(engine.phase(), EnginePhase::Completed);

    let mut outputs = engine.into_outputs().unwrap();
    assert_eq!(output_band(&mut outputs, 0), expected);
}

#[test]
fn test_masked_run_writes_nodata_in_masked_rows() {
    init_logging();

    let input = input_dataset();
    let expected = input.band(0).to_vec();

    let mut engine = RasterMath::new(vec![Box::new(input)])
        .unwrap()
        .with_options(engine_options(1));
    engine
        .set_mask(Box::new(top_half_mask()), MaskRule::NonZero)
        .unwrap();
    engine
        .add_operation(
            identity(),
            OutputSpec::in_memory(1, DataType::Float64).with_nodata(NODATA),
        )
        .unwrap();
    engine.run().unwrap();

    let mut outputs = engine.into_outputs().unwrap();
    let band = output_band(&mut outputs, 0);

    let half = SIZE * SIZE / 2;
    assert!(band[..half].iter().all(|&v| v == NODATA));
    assert_eq!(&band[half..], &expected[half..]);
}

#[test]
fn test_skip_blocks_classified_and_never_read() {
    init_logging();

    // Wrapper that counts windowed reads on the data raster
    struct CountingDataset {
        inner: MemoryDataset,
        reads: Arc<AtomicUsize>,
    }

    impl RasterDataset for CountingDataset {
        fn params(&self) -> &RasterParams {
            self.inner.params()
        }
        fn read_window(&mut self, band: usize, window: &BlockWindow) -> RasterResult<Vec<f64>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_window(band, window)
        }
        fn write_window(
            &mut self,
            band: usize,
            window: &BlockWindow,
            values: &[f64],
        ) -> RasterResult<()> {
            self.inner.write_window(band, window, values)
        }
        fn flush(&mut self) -> RasterResult<()> {
            self.inner.flush()
        }
    }

    let reads = Arc::new(AtomicUsize::new(0));
    let counting = CountingDataset {
        inner: input_dataset(),
        reads: reads.clone(),
    };

    let mut engine = RasterMath::new(vec![Box::new(counting)])
        .unwrap()
        .with_options(engine_options(1));
    engine
        .set_mask(Box::new(top_half_mask()), MaskRule::NonZero)
        .unwrap();
    engine.plan().unwrap();

    // 2x2 plan: the top two blocks are fully masked
    assert_eq!(engine.blocks().len(), 4);
    assert_eq!(engine.block_masks()[0], BlockMask::Skip);
    assert_eq!(engine.block_masks()[1], BlockMask::Skip);
    assert_eq!(engine.block_masks()[2], BlockMask::Full);
    assert_eq!(engine.block_masks()[3], BlockMask::Full);

    assert!(engine.has_next());
    let mut seen = 0;
    while let Some((_, window, batch, _)) = engine.next_block().unwrap() {
        assert_eq!(batch.rows(), window.pixel_count());
        seen += 1;
    }
    assert_eq!(seen, 2);
    assert!(!engine.has_next());
    // Only the two unmasked blocks were ever read from the data raster
    assert_eq!(reads.load(Ordering::SeqCst), 2);
    assert_eq!(engine.phase(), EnginePhase::Completed);
}

#[test]
fn test_no_mask_means_every_block_full() {
    init_logging();

    let mut engine = RasterMath::new(vec![Box::new(input_dataset())])
        .unwrap()
        .with_options(engine_options(1));
    engine.plan().unwrap();

    assert!(engine
        .block_masks()
        .iter()
        .all(|m| matches!(m, BlockMask::Full)));

    let (batch, positions) = engine.get_block(0).unwrap();
    assert_eq!(batch.rows(), 256 * 256);
    assert_eq!(positions.len(), 256 * 256);
}

#[test]
fn test_failure_keeps_partial_output_and_names_block() {
    init_logging();

    // Poison value sits in the bottom-right block (index 3 of the 2x2 plan)
    let params = RasterParams::new(SIZE, SIZE, 1, DataType::Float64).with_nodata(NODATA);
    let mut plane = vec![1.0; SIZE * SIZE];
    plane[SIZE * SIZE - 1] = 99.0;
    let input = MemoryDataset::from_bands(params, vec![plane]).unwrap();

    let poisoned: BlockFunction = Arc::new(|batch: &PixelBatch| {
        if batch.values().iter().any(|&v| v == 99.0) {
            Err("poison pixel encountered".to_string())
        } else {
            Ok(batch.clone())
        }
    });

    let mut engine = RasterMath::new(vec![Box::new(input)])
        .unwrap()
        .with_options(engine_options(1));
    engine
        .add_operation(
            poisoned,
            OutputSpec::in_memory(1, DataType::Float64).with_nodata(NODATA),
        )
        .unwrap();

    let err = engine.run().unwrap_err();
    assert_eq!(engine.phase(), EnginePhase::Failed);
    assert_eq!(err.block_index(), Some(3));
    assert!(err.to_string().contains("poison"));

    // Blocks 0..=2 completed before the failure; block 3 stayed nodata
    let mut outputs = engine.into_outputs().unwrap();
    let band = output_band(&mut outputs, 0);
    assert_eq!(band[0], 1.0);
    assert_eq!(band[255 * SIZE + 400], 1.0);
    let bottom_right = band[(SIZE - 1) * SIZE + SIZE - 1];
    assert_eq!(bottom_right, NODATA);
}

#[test]
fn test_parallel_matches_sequential() {
    init_logging();

    let mean: BlockFunction = Arc::new(|batch: &PixelBatch| {
        batch
            .map_rows(1, |row| vec![row.iter().sum::<f64>() / row.len() as f64 + 1.0])
            .map_err(|e| e.to_string())
    });

    let mut bands = Vec::new();
    for workers in [1usize, 4] {
        let mut engine = RasterMath::new(vec![Box::new(input_dataset())])
            .unwrap()
            .with_options(engine_options(workers));
        engine
            .add_operation(
                mean.clone(),
                OutputSpec::in_memory(1, DataType::Float64).with_nodata(NODATA),
            )
            .unwrap();
        engine.run().unwrap();

        let mut outputs = engine.into_outputs().unwrap();
        bands.push(output_band(&mut outputs, 0));
    }

    assert_eq!(bands[0], bands[1]);
}

#[test]
fn test_runs_are_idempotent() {
    init_logging();

    let mut bands = Vec::new();
    for _ in 0..2 {
        let mut engine = RasterMath::new(vec![Box::new(input_dataset())])
            .unwrap()
            .with_options(engine_options(2));
        engine
            .add_operation(
                identity(),
                OutputSpec::in_memory(1, DataType::Float64).with_nodata(NODATA),
            )
            .unwrap();
        engine.run().unwrap();
        let mut outputs = engine.into_outputs().unwrap();
        bands.push(output_band(&mut outputs, 0));
    }

    assert_eq!(bands[0], bands[1]);
}

#[test]
fn test_multiple_inputs_stack_bands() {
    init_logging();

    let params = RasterParams::new(64, 64, 1, DataType::Float64).with_nodata(NODATA);
    let first =
        MemoryDataset::from_bands(params.clone(), vec![vec![3.0; 64 * 64]]).unwrap();
    let second = MemoryDataset::from_bands(params, vec![vec![7.0; 64 * 64]]).unwrap();

    let sum: BlockFunction = Arc::new(|batch: &PixelBatch| {
        batch
            .map_rows(1, |row| vec![row.iter().sum()])
            .map_err(|e| e.to_string())
    });

    let mut engine = RasterMath::new(vec![Box::new(first), Box::new(second)])
        .unwrap()
        .with_options(engine_options(1));
    assert_eq!(engine.band_count(), 2);

    engine
        .add_operation(
            sum,
            OutputSpec::in_memory(1, DataType::Float64).with_nodata(NODATA),
        )
        .unwrap();
    engine.run().unwrap();

    let mut outputs = engine.into_outputs().unwrap();
    let window = BlockWindow::new(0, 0, 64, 64);
    let band = outputs[0].read_window(0, &window).unwrap();
    assert!(band.iter().all(|&v| v == 10.0));
}

#[test]
fn test_geometry_mismatch_rejected_eagerly() {
    init_logging();

    let a = MemoryDataset::filled(RasterParams::new(64, 64, 1, DataType::Float64), 0.0);
    let b = MemoryDataset::filled(RasterParams::new(32, 64, 1, DataType::Float64), 0.0);
    assert!(RasterMath::new(vec![Box::new(a), Box::new(b)]).is_err());

    let input = MemoryDataset::filled(RasterParams::new(64, 64, 1, DataType::Float64), 0.0);
    let bad_mask = MemoryDataset::filled(RasterParams::new(64, 32, 1, DataType::UInt8), 1.0);
    let mut engine = RasterMath::new(vec![Box::new(input)]).unwrap();
    assert!(engine.set_mask(Box::new(bad_mask), MaskRule::NonZero).is_err());
}

#[test]
fn test_random_block_is_seeded_and_unmasked() {
    init_logging();

    let mut engine = RasterMath::new(vec![Box::new(input_dataset())])
        .unwrap()
        .with_options(engine_options(1));
    engine
        .set_mask(Box::new(top_half_mask()), MaskRule::NonZero)
        .unwrap();
    engine.plan().unwrap();

    let a = engine.get_random_block(42).unwrap();
    let b = engine.get_random_block(42).unwrap();
    assert_eq!(a, b);
    assert!(!a.is_empty());

    let c = engine.get_random_block(43).unwrap();
    assert!(!c.is_empty());
}

#[test]
fn test_infer_output_spec_from_sample() {
    init_logging();

    let scaled_mean: BlockFunction = Arc::new(|batch: &PixelBatch| {
        batch
            .map_rows(1, |row| {
                vec![row.iter().sum::<f64>() / row.len() as f64 + 0.25]
            })
            .map_err(|e| e.to_string())
    });

    let mut engine = RasterMath::new(vec![Box::new(input_dataset())]).unwrap();
    let spec = engine.infer_output_spec(&scaled_mean, 7).unwrap();
    assert_eq!(spec.bands, 1);
    assert_eq!(spec.dtype, DataType::Float32);
}

#[test]
fn test_phase_misuse_is_a_configuration_error() {
    init_logging();

    let mut engine = RasterMath::new(vec![Box::new(input_dataset())])
        .unwrap()
        .with_options(engine_options(1));

    // Planned-phase calls before planning
    assert!(engine.next_block().is_err());
    assert!(engine.get_block(0).is_err());

    engine.plan().unwrap();
    assert!(engine.plan().is_err());
    assert!(engine
        .add_operation(identity(), OutputSpec::in_memory(1, DataType::Float64))
        .is_err());

    // Returning to Configured allows replanning
    engine.reconfigure().unwrap();
    assert_eq!(engine.phase(), EnginePhase::Configured);
    engine.plan().unwrap();

    // Running without operations fails
    assert!(engine.run().is_err());
}

#[test]
fn test_run_with_options_file() {
    init_logging();

    let dir = tempfile::tempdir().unwrap();
    let options_path = dir.path().join("options.toml");
    std::fs::write(
        &options_path,
        "[run]\nblock_size = 128\nworker_count = 2\nflush_interval = 8\n",
    )
    .unwrap();

    let options = RasterMathOptions::from_file(options_path.to_str().unwrap()).unwrap();
    assert_eq!(options.block_size, Some((128, 128)));
    assert_eq!(options.flush_interval, 8);

    let input = input_dataset();
    let expected = input.band(0).to_vec();

    let mut engine = RasterMath::new(vec![Box::new(input)])
        .unwrap()
        .with_options(options);
    engine
        .run_with(
            identity(),
            OutputSpec::in_memory(1, DataType::Float64).with_nodata(NODATA),
        )
        .unwrap();

    let mut outputs = engine.into_outputs().unwrap();
    assert_eq!(output_band(&mut outputs, 0), expected);
}

#[test]
fn test_log_file_records_milestones() {
    init_logging();

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("run.log");

    let mut engine = RasterMath::new(vec![Box::new(input_dataset())])
        .unwrap()
        .with_options(engine_options(1))
        .with_log_file(&log_path)
        .unwrap();
    engine
        .add_operation(
            identity(),
            OutputSpec::in_memory(1, DataType::Float64).with_nodata(NODATA),
        )
        .unwrap();
    engine.run().unwrap();

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("planned 4 blocks"));
    assert!(log.contains("run completed"));
}

#[test]
fn test_memory_probe_drives_block_size() {
    init_logging();

    // A tiny budget forces the plan down to small squares
    let mut engine = RasterMath::new(vec![Box::new(input_dataset())])
        .unwrap()
        .with_memory_probe(Box::new(FixedMemoryProbe(256 * 1024)))
        .with_options(RasterMathOptions {
            worker_count: Some(4),
            ..Default::default()
        });
    engine.plan().unwrap();

    let first = engine.blocks()[0];
    assert!(first.width < 256);
    assert_eq!(first.width, first.height);
}
