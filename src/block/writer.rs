//! Block writing: scattering results back into output windows
//!
//! The writer rebuilds the full rectangular window from a batch's rows
//! using the saved position index, fills masked-out positions with the
//! output's nodata value, and flushes the destination every N blocks so
//! buffered writes cannot grow without bound.

use log::debug;

use crate::errors::RasterResult;
use crate::plan::BlockWindow;
use crate::raster::RasterDataset;

use super::batch::{PixelBatch, PositionIndex};

/// Writes output batches into a destination raster
pub struct BlockWriter {
    flush_interval: usize,
    written_since_flush: usize,
}

impl BlockWriter {
    /// Create a writer
    ///
    /// # Arguments
    /// * `flush_interval` - Destination is flushed every this many written
    ///   blocks; 0 disables periodic flushing
    pub fn new(flush_interval: usize) -> Self {
        BlockWriter {
            flush_interval,
            written_since_flush: 0,
        }
    }

    /// Scatter one block's output into its window and write it
    ///
    /// Rows land at the offsets recorded in the position index; every
    /// other position receives the nodata value. Values are narrowed to
    /// the destination's declared data type by the dataset itself.
    ///
    /// # Arguments
    /// * `dataset` - Destination raster
    /// * `window` - The block's window
    /// * `positions` - Window offsets of the batch rows
    /// * `output` - The computed batch, one column per output band
    pub fn write(
        &mut self,
        dataset: &mut dyn RasterDataset,
        window: &BlockWindow,
        positions: &PositionIndex,
        output: &PixelBatch,
    ) -> RasterResult<()> {
        let nodata = dataset.params().nodata;
        let pixels = window.pixel_count();

        for band in 0..output.bands() {
            let mut plane = vec![nodata; pixels];
            for (row, &position) in positions.iter().enumerate() {
                plane[position] = output.get(row, band);
            }
            dataset.write_window(band, window, &plane)?;
        }

        self.written_since_flush += 1;
        if self.flush_interval > 0 && self.written_since_flush >= self.flush_interval {
            debug!(
                "flushing output after {} blocks at window x={}, y={}",
                self.written_since_flush, window.x, window.y
            );
            dataset.flush()?;
            self.written_since_flush = 0;
        }
        Ok(())
    }

    /// Final flush at the end of a run
    pub fn finish(&mut self, dataset: &mut dyn RasterDataset) -> RasterResult<()> {
        self.written_since_flush = 0;
        dataset.flush()
    }
}
