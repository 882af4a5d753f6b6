//! Codec for zstd-compressed tiles

use log::debug;

use crate::errors::{RasterMathError, RasterResult};

use super::codec::TileCodec;

/// Zstd tile codec (compression code 14)
pub struct ZstdCodec {
    /// Compression level (1-22, default 3)
    compression_level: i32,
}

impl ZstdCodec {
    /// Create a new zstd codec with the default compression level
    pub fn new() -> Self {
        ZstdCodec {
            compression_level: 3,
        }
    }

    /// Create a new zstd codec with the given compression level
    pub fn with_level(level: i32) -> Self {
        ZstdCodec {
            compression_level: level.clamp(1, 22),
        }
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TileCodec for ZstdCodec {
    fn decompress(&self, data: &[u8]) -> RasterResult<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }

        match zstd::decode_all(data) {
            Ok(decompressed) => Ok(decompressed),
            Err(e) => Err(RasterMathError::GenericError(format!(
                "zstd decompression error: {}",
                e
            ))),
        }
    }

    fn compress(&self, data: &[u8]) -> RasterResult<Vec<u8>> {
        debug!(
            "zstd compressing {} bytes at level {}",
            data.len(),
            self.compression_level
        );
        if data.is_empty() {
            return Ok(Vec::new());
        }

        match zstd::encode_all(data, self.compression_level) {
            Ok(compressed) => Ok(compressed),
            Err(e) => Err(RasterMathError::GenericError(format!(
                "zstd compression error: {}",
                e
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "zstd"
    }

    fn code(&self) -> u8 {
        14
    }
}
