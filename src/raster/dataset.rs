//! The raster backend seam
//!
//! The engine never touches storage directly; everything goes through
//! this trait. File-backed rasters use the grid container, tests and
//! in-process callers use [`MemoryDataset`](super::memory::MemoryDataset).

use crate::errors::{RasterMathError, RasterResult};
use crate::plan::BlockWindow;

use super::params::RasterParams;

/// An opened raster supporting windowed access
///
/// Handles are owned by the engine for its lifetime and released on
/// teardown. Reads and writes are always window-shaped: `values` buffers
/// are row-major within the window, one band at a time.
pub trait RasterDataset: Send {
    /// Metadata for this raster
    fn params(&self) -> &RasterParams;

    /// Read one band's window into a row-major buffer
    fn read_window(&mut self, band: usize, window: &BlockWindow) -> RasterResult<Vec<f64>>;

    /// Write a row-major buffer into one band's window
    fn write_window(
        &mut self,
        band: usize,
        window: &BlockWindow,
        values: &[f64],
    ) -> RasterResult<()>;

    /// Force buffered writes out to storage
    fn flush(&mut self) -> RasterResult<()>;
}

/// Validate that a window lies inside the raster and the value buffer
/// (when given) matches its pixel count
pub(crate) fn check_window(
    params: &RasterParams,
    band: usize,
    window: &BlockWindow,
    values_len: Option<usize>,
) -> RasterResult<()> {
    if band >= params.bands {
        return Err(RasterMathError::Configuration(format!(
            "band {} out of range for a {}-band raster",
            band, params.bands
        )));
    }
    if window.width == 0 || window.height == 0 {
        return Err(RasterMathError::Configuration(format!(
            "degenerate window {}x{}",
            window.width, window.height
        )));
    }
    if window.end_x() > params.width || window.end_y() > params.height {
        return Err(RasterMathError::Configuration(format!(
            "window x={}, y={}, {}x{} exceeds raster extent {}x{}",
            window.x, window.y, window.width, window.height, params.width, params.height
        )));
    }
    if let Some(len) = values_len {
        if len != window.pixel_count() {
            return Err(RasterMathError::Configuration(format!(
                "buffer holds {} values but the window has {} pixels",
                len,
                window.pixel_count()
            )));
        }
    }
    Ok(())
}
