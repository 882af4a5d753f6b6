//! The grid raster container
//!
//! A simple tiled raster file format: fixed header, append-only tile
//! payloads with optional per-tile compression, and a tile table
//! persisted on flush. This is the crate's file-backed implementation of
//! the [`RasterDataset`](crate::raster::RasterDataset) seam.

mod dataset;
mod header;

pub use dataset::GridDataset;
pub use header::{GridHeader, HEADER_LEN, MAGIC, VERSION};
