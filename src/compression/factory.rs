//! Factory for creating tile codecs

use crate::errors::{RasterMathError, RasterResult};

use super::codec::TileCodec;
use super::deflate::DeflateCodec;
use super::uncompressed::UncompressedCodec;
use super::zstd::ZstdCodec;

/// Factory resolving tile codecs by code or name
pub struct CodecFactory;

impl CodecFactory {
    /// Create a codec for the given compression code
    pub fn create(code: u8) -> RasterResult<Box<dyn TileCodec>> {
        match code {
            1 => Ok(Box::new(UncompressedCodec)),
            8 => Ok(Box::new(DeflateCodec)),
            14 => Ok(Box::new(ZstdCodec::new())),
            other => Err(RasterMathError::UnsupportedCompression(other)),
        }
    }

    /// Get a codec by name
    pub fn by_name(name: &str) -> RasterResult<Box<dyn TileCodec>> {
        match name.to_lowercase().as_str() {
            "uncompressed" | "none" => Ok(Box::new(UncompressedCodec)),
            "deflate" | "zip" => Ok(Box::new(DeflateCodec)),
            "zstd" => Ok(Box::new(ZstdCodec::new())),
            other => Err(RasterMathError::GenericError(format!(
                "Unknown compression name: {}",
                other
            ))),
        }
    }
}
