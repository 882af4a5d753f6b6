//! Codec for uncompressed tiles

use crate::errors::RasterResult;

use super::codec::TileCodec;

/// Uncompressed tile codec (compression code 1)
pub struct UncompressedCodec;

impl TileCodec for UncompressedCodec {
    fn decompress(&self, data: &[u8]) -> RasterResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn compress(&self, data: &[u8]) -> RasterResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn name(&self) -> &'static str {
        "none"
    }

    fn code(&self) -> u8 {
        1
    }
}
