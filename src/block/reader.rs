//! Block reading: windowed reads stacked into pixel batches
//!
//! For one window the reader pulls the matching window from every band of
//! every input raster, stacks the bands into consistent column order, and
//! keeps only the rows the mask plan marks as valid. Fully-valid blocks
//! skip the filtering step; fully-masked blocks never reach the reader.

use log::warn;

use crate::errors::RasterResult;
use crate::mask::BlockMask;
use crate::plan::BlockWindow;
use crate::raster::RasterDataset;

use super::batch::{PixelBatch, PositionIndex};

/// Reads blocks from a stack of input rasters
pub struct BlockReader {
    /// Also drop rows whose first-band value equals the input nodata
    filter_nodata: bool,
}

impl BlockReader {
    /// Create a reader
    ///
    /// # Arguments
    /// * `filter_nodata` - When set, rows whose first-band value equals
    ///   the first input's nodata are dropped even in unmasked blocks
    pub fn new(filter_nodata: bool) -> Self {
        BlockReader { filter_nodata }
    }

    /// Read one block into a pixel batch plus its position index
    ///
    /// # Arguments
    /// * `inputs` - Input rasters, bands stacked in list order
    /// * `window` - The block window to read
    /// * `mask` - Mask plan entry for this window
    ///
    /// # Returns
    /// The batch of valid pixel vectors and the window offsets of its rows
    pub fn read(
        &self,
        inputs: &mut [Box<dyn RasterDataset>],
        window: &BlockWindow,
        mask: &BlockMask,
    ) -> RasterResult<(PixelBatch, PositionIndex)> {
        let total_bands: usize = inputs.iter().map(|d| d.params().bands).sum();

        if matches!(mask, BlockMask::Skip) {
            warn!(
                "read requested for a fully-masked window at x={}, y={}",
                window.x, window.y
            );
            return Ok((PixelBatch::new(0, total_bands), Vec::new()));
        }

        // Pull every band window first; column order is input order, then
        // band order within each input.
        let mut planes: Vec<Vec<f64>> = Vec::with_capacity(total_bands);
        for dataset in inputs.iter_mut() {
            for band in 0..dataset.params().bands {
                planes.push(dataset.read_window(band, window)?);
            }
        }

        let pixels = window.pixel_count();
        let nodata = inputs[0].params().nodata;

        let positions: PositionIndex = match mask {
            BlockMask::Full if !self.filter_nodata => (0..pixels).collect(),
            BlockMask::Full => (0..pixels)
                .filter(|&p| planes[0][p] != nodata)
                .collect(),
            BlockMask::Partial(flags) => (0..pixels)
                .filter(|&p| flags[p] && (!self.filter_nodata || planes[0][p] != nodata))
                .collect(),
            BlockMask::Skip => unreachable!(),
        };

        let mut values = Vec::with_capacity(positions.len() * total_bands);
        for &p in &positions {
            for plane in &planes {
                values.push(plane[p]);
            }
        }

        let batch = PixelBatch::from_values(positions.len(), total_bands, values)?;
        Ok((batch, positions))
    }
}
