//! Tile codec trait definition

use crate::errors::RasterResult;

/// Strategy trait for the per-tile compression methods of the grid
/// container
pub trait TileCodec: Send + Sync {
    /// Decompress a tile payload
    fn decompress(&self, data: &[u8]) -> RasterResult<Vec<u8>>;

    /// Compress a tile payload
    fn compress(&self, data: &[u8]) -> RasterResult<Vec<u8>>;

    /// Get the name of this compression method
    fn name(&self) -> &'static str;

    /// Get the compression code stored in the container header
    fn code(&self) -> u8;
}
