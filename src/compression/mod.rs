//! Per-tile compression for the grid container
//!
//! This module implements strategies for the compression methods a grid
//! file may use for its tile payloads.

mod codec;
mod deflate;
mod factory;
mod uncompressed;
mod zstd;

pub use codec::TileCodec;
pub use deflate::DeflateCodec;
pub use factory::CodecFactory;
pub use uncompressed::UncompressedCodec;
pub use zstd::ZstdCodec;
