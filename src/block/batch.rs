//! Pixel batches and position indices
//!
//! A pixel batch is the unit handed to user functions: a dense row-major
//! matrix whose rows are the valid pixels of one block and whose columns
//! are the stacked bands of all input rasters. The parallel position
//! index remembers where each row sits inside the block window so results
//! can be scattered back. Both are rebuilt from scratch for every block
//! and never reused.

use crate::errors::{RasterMathError, RasterResult};

/// Row offsets of batch rows within their block window
pub type PositionIndex = Vec<usize>;

/// Dense matrix of valid pixel vectors
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBatch {
    rows: usize,
    bands: usize,
    values: Vec<f64>,
}

impl PixelBatch {
    /// Create a zero-filled batch
    pub fn new(rows: usize, bands: usize) -> Self {
        PixelBatch {
            rows,
            bands,
            values: vec![0.0; rows * bands],
        }
    }

    /// Create a batch from an existing row-major buffer
    ///
    /// # Arguments
    /// * `rows` - Number of pixel rows
    /// * `bands` - Values per row
    /// * `values` - Row-major buffer, rows*bands long
    pub fn from_values(rows: usize, bands: usize, values: Vec<f64>) -> RasterResult<Self> {
        if values.len() != rows * bands {
            return Err(RasterMathError::Configuration(format!(
                "batch buffer holds {} values, expected {}x{}",
                values.len(),
                rows,
                bands
            )));
        }
        Ok(PixelBatch {
            rows,
            bands,
            values,
        })
    }

    /// Number of pixel rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Values per row
    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Whether the batch holds no pixels
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Value at (row, band)
    pub fn get(&self, row: usize, band: usize) -> f64 {
        self.values[row * self.bands + band]
    }

    /// Set the value at (row, band)
    pub fn set(&mut self, row: usize, band: usize, value: f64) {
        self.values[row * self.bands + band] = value;
    }

    /// One pixel row as a slice
    pub fn row(&self, row: usize) -> &[f64] {
        &self.values[row * self.bands..(row + 1) * self.bands]
    }

    /// The full row-major buffer
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Smallest and largest value in the batch, None when empty
    pub fn value_range(&self) -> Option<(f64, f64)> {
        if self.values.is_empty() {
            return None;
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in &self.values {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }
        Some((min, max))
    }

    /// Map every pixel row to a new row, producing a fresh batch
    ///
    /// Convenience for writing user functions: the closure receives each
    /// row and returns the output row, which must be `out_bands` long.
    pub fn map_rows<F>(&self, out_bands: usize, mut f: F) -> RasterResult<PixelBatch>
    where
        F: FnMut(&[f64]) -> Vec<f64>,
    {
        let mut values = Vec::with_capacity(self.rows * out_bands);
        for row in 0..self.rows {
            let out = f(self.row(row));
            if out.len() != out_bands {
                return Err(RasterMathError::Configuration(format!(
                    "row {} produced {} values, expected {}",
                    row,
                    out.len(),
                    out_bands
                )));
            }
            values.extend(out);
        }
        PixelBatch::from_values(self.rows, out_bands, values)
    }
}
