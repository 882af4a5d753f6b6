//! Affine geotransformation for rasters

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and geographic
/// coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// For north-up images, `row_rotation` and `col_rotation` are 0 and
/// `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation about X axis (usually 0)
    pub row_rotation: f64,
    /// Rotation about Y axis (usually 0)
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        GeoTransform {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Identity transform: one pixel per unit, origin at (0, 0)
    pub fn identity() -> Self {
        GeoTransform::new(0.0, 0.0, 1.0, -1.0)
    }

    /// Create from a GDAL-style array
    /// [origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        GeoTransform {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// Convert to a GDAL-style array
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Convert pixel coordinates to the geographic coordinates of the
    /// pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        let col_f = col as f64 + 0.5;
        let row_f = row as f64 + 0.5;

        let x = self.origin_x + col_f * self.pixel_width + row_f * self.row_rotation;
        let y = self.origin_y + col_f * self.col_rotation + row_f * self.pixel_height;

        (x, y)
    }

    /// Compare transforms within a tolerance
    ///
    /// Geometry checks between datasets go through this rather than exact
    /// float equality so re-serialized transforms still match.
    pub fn approx_eq(&self, other: &GeoTransform, tolerance: f64) -> bool {
        let a = self.to_gdal();
        let b = other.to_gdal();
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tolerance)
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        GeoTransform::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gdal_round_trip() {
        let gt = GeoTransform::from_gdal([100.0, 10.0, 0.0, 200.0, 0.0, -10.0]);
        assert_eq!(gt.origin_x, 100.0);
        assert_eq!(gt.pixel_height, -10.0);
        assert_eq!(gt.to_gdal(), [100.0, 10.0, 0.0, 200.0, 0.0, -10.0]);
    }

    #[test]
    fn test_pixel_to_geo_center() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        let (x, y) = gt.pixel_to_geo(0, 0);
        assert_eq!((x, y), (105.0, 195.0));
    }

    #[test]
    fn test_approx_eq() {
        let a = GeoTransform::new(0.0, 0.0, 1.0, -1.0);
        let mut b = a;
        b.origin_x = 1e-12;
        assert!(a.approx_eq(&b, 1e-9));
        b.origin_x = 0.5;
        assert!(!a.approx_eq(&b, 1e-9));
    }
}
