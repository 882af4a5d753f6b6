//! Raster metadata bundle

use crate::config::DEFAULTS;
use crate::errors::{RasterMathError, RasterResult};

use super::datatype::DataType;
use super::geotransform::GeoTransform;

/// Tolerance for geotransform comparisons between datasets
const GEOMETRY_TOLERANCE: f64 = 1e-9;

/// Metadata describing an opened raster
///
/// Collaborators use this to size their own outputs before the first
/// write; the engine uses it to validate that inputs and mask agree.
#[derive(Debug, Clone)]
pub struct RasterParams {
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
    /// Number of bands
    pub bands: usize,
    /// Storage data type
    pub dtype: DataType,
    /// Nodata sentinel value
    pub nodata: f64,
    /// Affine georeferencing transform
    pub geotransform: GeoTransform,
    /// Projection description (WKT or empty)
    pub projection: String,
    /// Native tiling of the storage (width, height)
    pub block_size: (usize, usize),
}

impl RasterParams {
    /// Create parameters with default georeferencing
    ///
    /// Nodata defaults to the engine-wide value, the geotransform to the
    /// identity, and the native tiling to the default block size clipped
    /// to the raster extent.
    pub fn new(width: usize, height: usize, bands: usize, dtype: DataType) -> Self {
        let edge = DEFAULTS.fallback_block_size;
        RasterParams {
            width,
            height,
            bands,
            dtype,
            nodata: DEFAULTS.default_nodata,
            geotransform: GeoTransform::identity(),
            projection: String::new(),
            block_size: (edge.min(width.max(1)), edge.min(height.max(1))),
        }
    }

    /// Set the nodata value
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = nodata;
        self
    }

    /// Set the geotransform
    pub fn with_geotransform(mut self, geotransform: GeoTransform) -> Self {
        self.geotransform = geotransform;
        self
    }

    /// Set the projection description
    pub fn with_projection(mut self, projection: &str) -> Self {
        self.projection = projection.to_string();
        self
    }

    /// Set the native tiling
    pub fn with_block_size(mut self, width: usize, height: usize) -> Self {
        self.block_size = (width, height);
        self
    }

    /// Total pixel count of one band
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Bytes needed to hold one pixel across all bands at storage width
    pub fn bytes_per_pixel(&self) -> usize {
        self.bands * self.dtype.size_bytes()
    }

    /// Whether two rasters cover the same grid
    pub fn same_geometry(&self, other: &RasterParams) -> bool {
        self.width == other.width
            && self.height == other.height
            && self
                .geotransform
                .approx_eq(&other.geotransform, GEOMETRY_TOLERANCE)
    }

    /// Validate that `other` shares this raster's grid
    ///
    /// # Arguments
    /// * `other` - Parameters of the raster being checked
    /// * `what` - Short label for the raster, used in the error message
    pub fn check_same_geometry(&self, other: &RasterParams, what: &str) -> RasterResult<()> {
        if self.same_geometry(other) {
            Ok(())
        } else {
            Err(RasterMathError::GeometryMismatch(format!(
                "{} is {}x{} with transform {:?}, expected {}x{} with transform {:?}",
                what,
                other.width,
                other.height,
                other.geotransform.to_gdal(),
                self.width,
                self.height,
                self.geotransform.to_gdal()
            )))
        }
    }
}
