//! In-memory raster dataset
//!
//! Backs tests and callers that already hold their data. Values are kept
//! as f64 row-major planes, one per band; writes are narrowed to the
//! declared data type so a memory raster behaves like its file-backed
//! counterpart.

use crate::errors::{RasterMathError, RasterResult};
use crate::plan::BlockWindow;

use super::dataset::{check_window, RasterDataset};
use super::params::RasterParams;

/// A raster held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryDataset {
    params: RasterParams,
    bands: Vec<Vec<f64>>,
}

impl MemoryDataset {
    /// Create a dataset with every pixel set to the nodata value
    pub fn new(params: RasterParams) -> Self {
        let fill = params.nodata;
        Self::filled(params, fill)
    }

    /// Create a dataset with every pixel set to `value`
    pub fn filled(params: RasterParams, value: f64) -> Self {
        let plane = vec![value; params.pixel_count()];
        let bands = vec![plane; params.bands];
        MemoryDataset { params, bands }
    }

    /// Create a dataset from existing band planes
    ///
    /// # Arguments
    /// * `params` - Raster metadata; band count must match `bands`
    /// * `bands` - One row-major plane per band, each width*height long
    pub fn from_bands(params: RasterParams, bands: Vec<Vec<f64>>) -> RasterResult<Self> {
        if bands.len() != params.bands {
            return Err(RasterMathError::Configuration(format!(
                "expected {} band planes, got {}",
                params.bands,
                bands.len()
            )));
        }
        for (i, plane) in bands.iter().enumerate() {
            if plane.len() != params.pixel_count() {
                return Err(RasterMathError::Configuration(format!(
                    "band {} holds {} values, expected {}",
                    i,
                    plane.len(),
                    params.pixel_count()
                )));
            }
        }
        Ok(MemoryDataset { params, bands })
    }

    /// Full plane of one band
    pub fn band(&self, band: usize) -> &[f64] {
        &self.bands[band]
    }

    /// Value at one pixel
    pub fn get(&self, band: usize, x: usize, y: usize) -> Option<f64> {
        if band >= self.params.bands || x >= self.params.width || y >= self.params.height {
            return None;
        }
        Some(self.bands[band][y * self.params.width + x])
    }
}

impl RasterDataset for MemoryDataset {
    fn params(&self) -> &RasterParams {
        &self.params
    }

    fn read_window(&mut self, band: usize, window: &BlockWindow) -> RasterResult<Vec<f64>> {
        check_window(&self.params, band, window, None)?;

        let plane = &self.bands[band];
        let mut values = Vec::with_capacity(window.pixel_count());
        for row in 0..window.height {
            let start = (window.y + row) * self.params.width + window.x;
            values.extend_from_slice(&plane[start..start + window.width]);
        }
        Ok(values)
    }

    fn write_window(
        &mut self,
        band: usize,
        window: &BlockWindow,
        values: &[f64],
    ) -> RasterResult<()> {
        check_window(&self.params, band, window, Some(values.len()))?;

        let dtype = self.params.dtype;
        let width = self.params.width;
        let plane = &mut self.bands[band];
        for row in 0..window.height {
            let start = (window.y + row) * width + window.x;
            let src = &values[row * window.width..(row + 1) * window.width];
            for (dst, &value) in plane[start..start + window.width].iter_mut().zip(src) {
                *dst = dtype.narrow(value);
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> RasterResult<()> {
        Ok(())
    }
}
