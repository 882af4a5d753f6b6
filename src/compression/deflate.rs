//! Codec for deflate-compressed tiles

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::errors::{RasterMathError, RasterResult};

use super::codec::TileCodec;

/// Deflate (zlib) tile codec (compression code 8)
pub struct DeflateCodec;

impl TileCodec for DeflateCodec {
    fn decompress(&self, data: &[u8]) -> RasterResult<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        let mut decompressed = Vec::new();
        match decoder.read_to_end(&mut decompressed) {
            Ok(_) => Ok(decompressed),
            Err(e) => Err(RasterMathError::Io(e)),
        }
    }

    fn compress(&self, data: &[u8]) -> RasterResult<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        match encoder.write_all(data) {
            Ok(_) => (),
            Err(e) => return Err(RasterMathError::Io(e)),
        }

        match encoder.finish() {
            Ok(compressed) => Ok(compressed),
            Err(e) => Err(RasterMathError::Io(e)),
        }
    }

    fn name(&self) -> &'static str {
        "deflate"
    }

    fn code(&self) -> u8 {
        8
    }
}
