//! Grid container header parsing and writing
//!
//! The container starts with a fixed-size little-endian header. Tile
//! payloads follow, append-only; the tile table and the projection
//! string live in a tail section whose offset is patched into the header
//! on every flush. A table offset of zero means the file was never
//! flushed and holds no readable tiles.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::{RasterMathError, RasterResult};
use crate::io::SeekableStream;
use crate::raster::{DataType, GeoTransform, RasterParams};

/// Magic bytes opening every grid container
pub const MAGIC: [u8; 4] = *b"RGRD";

/// Current container version
pub const VERSION: u16 = 1;

/// Size of the fixed header region; tile payloads start here
pub const HEADER_LEN: u64 = 128;

/// Byte position of the table offset field, patched on flush
pub const TABLE_OFFSET_POS: u64 = 92;

/// Parsed fixed header of a grid container
#[derive(Debug, Clone)]
pub struct GridHeader {
    /// Storage data type of every band
    pub dtype: DataType,
    /// Tile compression code
    pub compression: u8,
    /// Image width in pixels
    pub width: u64,
    /// Image height in pixels
    pub height: u64,
    /// Number of bands
    pub bands: u32,
    /// Tile width in pixels
    pub tile_width: u32,
    /// Tile height in pixels
    pub tile_height: u32,
    /// Nodata sentinel
    pub nodata: f64,
    /// Geotransform in GDAL coefficient order
    pub geotransform: [f64; 6],
    /// Offset of the tail section, 0 when never flushed
    pub table_offset: u64,
}

impl GridHeader {
    /// Build a header from raster parameters
    pub fn from_params(params: &RasterParams, compression: u8) -> Self {
        GridHeader {
            dtype: params.dtype,
            compression,
            width: params.width as u64,
            height: params.height as u64,
            bands: params.bands as u32,
            tile_width: params.block_size.0 as u32,
            tile_height: params.block_size.1 as u32,
            nodata: params.nodata,
            geotransform: params.geotransform.to_gdal(),
            table_offset: 0,
        }
    }

    /// Reconstruct raster parameters from this header
    pub fn to_params(&self, projection: String) -> RasterParams {
        RasterParams {
            width: self.width as usize,
            height: self.height as usize,
            bands: self.bands as usize,
            dtype: self.dtype,
            nodata: self.nodata,
            geotransform: GeoTransform::from_gdal(self.geotransform),
            projection,
            block_size: (self.tile_width as usize, self.tile_height as usize),
        }
    }

    /// Write the fixed header at the start of the stream
    pub fn write_to(&self, stream: &mut dyn SeekableStream) -> RasterResult<()> {
        stream.seek(SeekFrom::Start(0))?;
        stream.write_all(&MAGIC)?;
        stream.write_u16::<LittleEndian>(VERSION)?;
        stream.write_u8(self.dtype.code())?;
        stream.write_u8(self.compression)?;
        stream.write_u64::<LittleEndian>(self.width)?;
        stream.write_u64::<LittleEndian>(self.height)?;
        stream.write_u32::<LittleEndian>(self.bands)?;
        stream.write_u32::<LittleEndian>(self.tile_width)?;
        stream.write_u32::<LittleEndian>(self.tile_height)?;
        stream.write_f64::<LittleEndian>(self.nodata)?;
        for coeff in self.geotransform {
            stream.write_f64::<LittleEndian>(coeff)?;
        }
        stream.write_u64::<LittleEndian>(self.table_offset)?;

        let padding = HEADER_LEN - (TABLE_OFFSET_POS + 8);
        stream.write_all(&vec![0u8; padding as usize])?;
        Ok(())
    }

    /// Read and validate the fixed header from the start of the stream
    pub fn read_from(stream: &mut dyn SeekableStream) -> RasterResult<Self> {
        stream.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 4];
        stream.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(RasterMathError::InvalidHeader);
        }

        let version = stream.read_u16::<LittleEndian>()?;
        if version != VERSION {
            return Err(RasterMathError::UnsupportedVersion(version));
        }

        let dtype = DataType::from_code(stream.read_u8()?)?;
        let compression = stream.read_u8()?;
        let width = stream.read_u64::<LittleEndian>()?;
        let height = stream.read_u64::<LittleEndian>()?;
        let bands = stream.read_u32::<LittleEndian>()?;
        let tile_width = stream.read_u32::<LittleEndian>()?;
        let tile_height = stream.read_u32::<LittleEndian>()?;
        let nodata = stream.read_f64::<LittleEndian>()?;

        let mut geotransform = [0f64; 6];
        for coeff in geotransform.iter_mut() {
            *coeff = stream.read_f64::<LittleEndian>()?;
        }

        let table_offset = stream.read_u64::<LittleEndian>()?;

        if width == 0 || height == 0 || bands == 0 || tile_width == 0 || tile_height == 0 {
            return Err(RasterMathError::InvalidHeader);
        }

        Ok(GridHeader {
            dtype,
            compression,
            width,
            height,
            bands,
            tile_width,
            tile_height,
            nodata,
            geotransform,
            table_offset,
        })
    }
}
