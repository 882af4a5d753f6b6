//! File-backed tiled raster dataset
//!
//! Data is stored one tile per band at a time, each tile optionally
//! compressed. Reads may cross tile boundaries: every intersecting tile
//! is loaded, decompressed and the overlapping pixels copied out. Writes
//! must be tile-aligned — the engine always writes whole plan blocks, and
//! output containers are created with their tile grid equal to the block
//! plan, so every block write lands on exactly one tile. Tile payloads
//! are append-only; rewriting a tile appends a fresh payload and repoints
//! the table entry, leaving the old bytes behind.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::compression::{CodecFactory, TileCodec};
use crate::errors::{RasterMathError, RasterResult};
use crate::io::SeekableStream;
use crate::plan::BlockWindow;
use crate::raster::{check_window, RasterDataset, RasterParams};

use super::header::{GridHeader, HEADER_LEN, TABLE_OFFSET_POS};

/// Location of one stored tile payload; length 0 means never written
#[derive(Debug, Clone, Copy, Default)]
struct TileEntry {
    offset: u64,
    length: u64,
}

/// A grid container over any seekable stream
///
/// `GridDataset<File>` is the on-disk form; tests run the same code over
/// an in-memory cursor.
pub struct GridDataset<S: SeekableStream> {
    stream: S,
    params: RasterParams,
    codec: Box<dyn TileCodec>,
    tiles: Vec<TileEntry>,
    tiles_across: usize,
    tiles_down: usize,
    append_offset: u64,
}

impl GridDataset<File> {
    /// Create a new container file, truncating any existing one
    ///
    /// # Arguments
    /// * `path` - Destination path
    /// * `params` - Raster metadata; `block_size` becomes the tile grid
    /// * `compression` - Codec name ("none", "deflate", "zstd")
    pub fn create<P: AsRef<Path>>(
        path: P,
        params: RasterParams,
        compression: &str,
    ) -> RasterResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        debug!("creating grid container at {}", path.as_ref().display());
        Self::create_in(file, params, compression)
    }

    /// Open an existing container file for reading and writing
    pub fn open<P: AsRef<Path>>(path: P) -> RasterResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        debug!("opening grid container at {}", path.as_ref().display());
        Self::open_in(file)
    }
}

impl<S: SeekableStream> GridDataset<S> {
    /// Create a new container over a stream
    pub fn create_in(mut stream: S, params: RasterParams, compression: &str) -> RasterResult<Self> {
        if params.width == 0 || params.height == 0 || params.bands == 0 {
            return Err(RasterMathError::Configuration(format!(
                "container needs positive dimensions, got {}x{} with {} bands",
                params.width, params.height, params.bands
            )));
        }

        let codec = CodecFactory::by_name(compression)?;

        let header = GridHeader::from_params(&params, codec.code());
        header.write_to(&mut stream)?;

        let (tiles_across, tiles_down) = tile_grid(&params);
        let tiles = vec![TileEntry::default(); params.bands * tiles_across * tiles_down];

        Ok(GridDataset {
            stream,
            params,
            codec,
            tiles,
            tiles_across,
            tiles_down,
            append_offset: HEADER_LEN,
        })
    }

    /// Open a container over a stream
    pub fn open_in(mut stream: S) -> RasterResult<Self> {
        let header = GridHeader::read_from(&mut stream)?;
        let codec = CodecFactory::create(header.compression)?;

        let (projection, tiles) = if header.table_offset == 0 {
            // Created but never flushed: no readable tiles yet
            let params = header.to_params(String::new());
            let (across, down) = tile_grid(&params);
            (String::new(), vec![TileEntry::default(); params.bands * across * down])
        } else {
            stream.seek(SeekFrom::Start(header.table_offset))?;

            let projection_len = stream.read_u32::<LittleEndian>()? as usize;
            let mut projection_bytes = vec![0u8; projection_len];
            stream.read_exact(&mut projection_bytes)?;
            let projection = String::from_utf8(projection_bytes)
                .map_err(|_| RasterMathError::InvalidHeader)?;

            let count = stream.read_u64::<LittleEndian>()? as usize;
            let mut tiles = Vec::with_capacity(count);
            for _ in 0..count {
                let offset = stream.read_u64::<LittleEndian>()?;
                let length = stream.read_u64::<LittleEndian>()?;
                tiles.push(TileEntry { offset, length });
            }
            (projection, tiles)
        };

        let params = header.to_params(projection);
        let (tiles_across, tiles_down) = tile_grid(&params);
        let expected = params.bands * tiles_across * tiles_down;
        if tiles.len() != expected {
            return Err(RasterMathError::GenericError(format!(
                "tile table holds {} entries, expected {}",
                tiles.len(),
                expected
            )));
        }

        let append_offset = stream.seek(SeekFrom::End(0))?;

        Ok(GridDataset {
            stream,
            params,
            codec,
            tiles,
            tiles_across,
            tiles_down,
            append_offset: append_offset.max(HEADER_LEN),
        })
    }

    /// Name of the codec used for tile payloads
    pub fn compression_name(&self) -> &'static str {
        self.codec.name()
    }

    /// Window covered by the tile at (tx, ty), clipped to the extent
    fn tile_window(&self, tx: usize, ty: usize) -> BlockWindow {
        let (tile_w, tile_h) = self.params.block_size;
        let x = tx * tile_w;
        let y = ty * tile_h;
        BlockWindow::new(
            x,
            y,
            tile_w.min(self.params.width - x),
            tile_h.min(self.params.height - y),
        )
    }

    fn tile_index(&self, band: usize, tx: usize, ty: usize) -> usize {
        band * self.tiles_across * self.tiles_down + ty * self.tiles_across + tx
    }

    /// Load and decode one tile, or None when it was never written
    fn load_tile(&mut self, band: usize, tx: usize, ty: usize) -> RasterResult<Option<Vec<f64>>> {
        let entry = self.tiles[self.tile_index(band, tx, ty)];
        if entry.length == 0 {
            return Ok(None);
        }

        self.stream.seek(SeekFrom::Start(entry.offset))?;
        let mut payload = vec![0u8; entry.length as usize];
        self.stream.read_exact(&mut payload)?;

        let decompressed = self.codec.decompress(&payload)?;
        let values = self.params.dtype.decode(&decompressed)?;

        let tile = self.tile_window(tx, ty);
        if values.len() != tile.pixel_count() {
            return Err(RasterMathError::GenericError(format!(
                "tile ({}, {}) of band {} holds {} values, expected {}",
                tx,
                ty,
                band,
                values.len(),
                tile.pixel_count()
            )));
        }
        Ok(Some(values))
    }
}

/// Tile counts along each axis
fn tile_grid(params: &RasterParams) -> (usize, usize) {
    let (tile_w, tile_h) = params.block_size;
    (
        (params.width + tile_w - 1) / tile_w,
        (params.height + tile_h - 1) / tile_h,
    )
}

impl<S: SeekableStream> RasterDataset for GridDataset<S> {
    fn params(&self) -> &RasterParams {
        &self.params
    }

    fn read_window(&mut self, band: usize, window: &BlockWindow) -> RasterResult<Vec<f64>> {
        check_window(&self.params, band, window, None)?;

        let (tile_w, tile_h) = self.params.block_size;
        let mut values = vec![self.params.nodata; window.pixel_count()];

        let start_tx = window.x / tile_w;
        let start_ty = window.y / tile_h;
        let end_tx = (window.end_x() - 1) / tile_w;
        let end_ty = (window.end_y() - 1) / tile_h;

        for ty in start_ty..=end_ty {
            for tx in start_tx..=end_tx {
                let tile = self.tile_window(tx, ty);
                let tile_values = match self.load_tile(band, tx, ty)? {
                    Some(v) => v,
                    None => continue,
                };

                let overlap = match window.intersect(&tile) {
                    Some(o) => o,
                    None => continue,
                };

                for y in overlap.y..overlap.end_y() {
                    let src_start = (y - tile.y) * tile.width + (overlap.x - tile.x);
                    let dst_start = (y - window.y) * window.width + (overlap.x - window.x);
                    values[dst_start..dst_start + overlap.width]
                        .copy_from_slice(&tile_values[src_start..src_start + overlap.width]);
                }
            }
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

        let (tile_w, tile_h) = self.params.block_size;
        if window.x % tile_w != 0 || window.y % tile_h != 0 {
            return Err(RasterMathError::Configuration(format!(
                "grid writes must be tile-aligned; window starts at x={}, y={} with {}x{} tiles",
                window.x, window.y, tile_w, tile_h
            )));
        }

        let tx = window.x / tile_w;
        let ty = window.y / tile_h;
        let tile = self.tile_window(tx, ty);
        if tile != *window {
            return Err(RasterMathError::Configuration(format!(
                "grid writes must cover whole tiles; window is {}x{}, tile is {}x{}",
                window.width, window.height, tile.width, tile.height
            )));
        }

        let mut encoded = Vec::new();
        self.params.dtype.encode(values, &mut encoded);
        let payload = self.codec.compress(&encoded)?;

        self.stream.seek(SeekFrom::Start(self.append_offset))?;
        self.stream.write_all(&payload)?;

        let index = self.tile_index(band, tx, ty);
        self.tiles[index] = TileEntry {
            offset: self.append_offset,
            length: payload.len() as u64,
        };
        self.append_offset += payload.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> RasterResult<()> {
        // Tail section: projection string, then the tile table. The header
        // always points at the newest tail; stale tails from earlier
        // flushes are left behind in the payload region.
        let table_offset = self.append_offset;
        self.stream.seek(SeekFrom::Start(table_offset))?;

        let projection = self.params.projection.as_bytes();
        self.stream.write_u32::<LittleEndian>(projection.len() as u32)?;
        self.stream.write_all(projection)?;

        self.stream.write_u64::<LittleEndian>(self.tiles.len() as u64)?;
        for entry in &self.tiles {
            self.stream.write_u64::<LittleEndian>(entry.offset)?;
            self.stream.write_u64::<LittleEndian>(entry.length)?;
        }

        self.stream.seek(SeekFrom::Start(TABLE_OFFSET_POS))?;
        self.stream.write_u64::<LittleEndian>(table_offset)?;
        self.stream.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::DataType;
    use std::io::Cursor;

    fn params() -> RasterParams {
        RasterParams::new(6, 4, 1, DataType::Float64)
            .with_nodata(-9999.0)
            .with_block_size(4, 4)
    }

    #[test]
    fn test_unwritten_tiles_read_as_nodata() {
        let stream = Cursor::new(Vec::new());
        let mut grid = GridDataset::create_in(stream, params(), "none").unwrap();

        let window = BlockWindow::new(0, 0, 6, 4);
        let values = grid.read_window(0, &window).unwrap();
        assert!(values.iter().all(|&v| v == -9999.0));
    }

    #[test]
    fn test_write_read_across_tiles() {
        let stream = Cursor::new(Vec::new());
        let mut grid = GridDataset::create_in(stream, params(), "none").unwrap();

        // Two tiles: 4x4 at x=0 and a clipped 2x4 at x=4
        let left: Vec<f64> = (0..16).map(|v| v as f64).collect();
        grid.write_window(0, &BlockWindow::new(0, 0, 4, 4), &left).unwrap();
        let right: Vec<f64> = (100..108).map(|v| v as f64).collect();
        grid.write_window(0, &BlockWindow::new(4, 0, 2, 4), &right).unwrap();

        // A read spanning both tiles stitches them back together
        let window = BlockWindow::new(2, 1, 4, 2);
        let values = grid.read_window(0, &window).unwrap();
        assert_eq!(values, vec![6.0, 7.0, 102.0, 103.0, 10.0, 11.0, 104.0, 105.0]);
    }

    #[test]
    fn test_misaligned_write_rejected() {
        let stream = Cursor::new(Vec::new());
        let mut grid = GridDataset::create_in(stream, params(), "none").unwrap();

        let result = grid.write_window(0, &BlockWindow::new(1, 0, 4, 4), &vec![0.0; 16]);
        assert!(result.is_err());

        let result = grid.write_window(0, &BlockWindow::new(0, 0, 3, 4), &vec![0.0; 12]);
        assert!(result.is_err());
    }

    #[test]
    fn test_flush_then_reopen() {
        let mut params = params();
        params.projection = "EPSG:32633".to_string();

        let mut grid = GridDataset::create_in(Cursor::new(Vec::new()), params, "deflate").unwrap();
        let tile: Vec<f64> = (0..16).map(|v| v as f64).collect();
        grid.write_window(0, &BlockWindow::new(0, 0, 4, 4), &tile).unwrap();
        grid.flush().unwrap();

        let stream = Cursor::new(grid.stream.into_inner());
        let mut reopened = GridDataset::open_in(stream).unwrap();
        assert_eq!(reopened.params().projection, "EPSG:32633");
        assert_eq!(reopened.compression_name(), "deflate");

        let values = reopened
            .read_window(0, &BlockWindow::new(0, 0, 4, 4))
            .unwrap();
        assert_eq!(values, tile);
        // The clipped tile was never written and stays nodata
        let values = reopened
            .read_window(0, &BlockWindow::new(4, 0, 2, 4))
            .unwrap();
        assert!(values.iter().all(|&v| v == -9999.0));
    }

    #[test]
    fn test_rewrite_tile_takes_latest() {
        let mut grid =
            GridDataset::create_in(Cursor::new(Vec::new()), params(), "zstd").unwrap();
        let window = BlockWindow::new(0, 0, 4, 4);

        grid.write_window(0, &window, &vec![1.0; 16]).unwrap();
        grid.write_window(0, &window, &vec![2.0; 16]).unwrap();

        let values = grid.read_window(0, &window).unwrap();
        assert!(values.iter().all(|&v| v == 2.0));
    }
}
