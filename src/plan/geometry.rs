//! Block plan computation
//!
//! Tiles an image extent into rectangular windows. The tiling covers the
//! full extent with no gaps and no overlaps; the final row and column of
//! blocks are clipped to the remaining width and height.

use log::debug;

use crate::config::{RasterMathOptions, DEFAULTS};
use crate::errors::{RasterMathError, RasterResult};

use super::memory_budget::MemoryBudget;
use super::window::{BlockPlan, BlockWindow};

/// Computes block tilings for raster extents
pub struct BlockGeometry;

impl BlockGeometry {
    /// Tile an image extent into a row-major block plan
    ///
    /// # Arguments
    /// * `width` - Image width in pixels
    /// * `height` - Image height in pixels
    /// * `block_width` - Requested block width
    /// * `block_height` - Requested block height
    ///
    /// # Returns
    /// The ordered block plan, or a Configuration error when any
    /// dimension is zero
    pub fn tile(
        width: usize,
        height: usize,
        block_width: usize,
        block_height: usize,
    ) -> RasterResult<BlockPlan> {
        if width == 0 || height == 0 {
            return Err(RasterMathError::Configuration(format!(
                "raster dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        if block_width == 0 || block_height == 0 {
            return Err(RasterMathError::Configuration(format!(
                "block size must be positive, got {}x{}",
                block_width, block_height
            )));
        }

        let mut plan = Vec::with_capacity(
            Self::blocks_along(width, block_width) * Self::blocks_along(height, block_height),
        );
        for y in (0..height).step_by(block_height) {
            let rows = block_height.min(height - y);
            for x in (0..width).step_by(block_width) {
                let cols = block_width.min(width - x);
                plan.push(BlockWindow::new(x, y, cols, rows));
            }
        }

        debug!(
            "tiled {}x{} into {} blocks of {}x{}",
            width,
            height,
            plan.len(),
            block_width,
            block_height
        );
        Ok(plan)
    }

    /// Number of blocks along one axis (ceiling division)
    pub fn blocks_along(extent: usize, block_edge: usize) -> usize {
        (extent + block_edge - 1) / block_edge
    }
}

/// Resolve the block size for a run
///
/// Precedence: an explicit size from the options wins outright; the
/// `force_native_tiling` override takes the dataset's native tiling as-is;
/// otherwise the candidate is the native tiling when it is larger than the
/// default square, the default square when not, and the memory budget may
/// then shrink the candidate to a square that fits the per-worker
/// footprint. Memory safety wins the native-versus-budget conflict unless
/// the caller forces native tiling.
pub fn resolve_block_size(
    options: &RasterMathOptions,
    native: (usize, usize),
    bytes_per_pixel: usize,
    worker_count: usize,
    budget: &MemoryBudget,
) -> (usize, usize) {
    if let Some(size) = options.block_size {
        return size;
    }
    if options.force_native_tiling {
        return native;
    }

    let default_edge = DEFAULTS.fallback_block_size;
    let candidate = if native.0 * native.1 > default_edge * default_edge {
        native
    } else {
        (default_edge, default_edge)
    };

    let cap_edge = budget.choose_block_size(
        bytes_per_pixel,
        worker_count,
        candidate.0.max(candidate.1).max(default_edge),
    );

    if candidate.0 * candidate.1 > cap_edge * cap_edge {
        debug!(
            "memory budget caps block size at {0}x{0} (candidate was {1}x{2})",
            cap_edge, candidate.0, candidate.1
        );
        (cap_edge, cap_edge)
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::memory_budget::FixedMemoryProbe;

    #[test]
    fn test_exact_tiling() {
        let plan = BlockGeometry::tile(512, 512, 256, 256).unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[0], BlockWindow::new(0, 0, 256, 256));
        assert_eq!(plan[3], BlockWindow::new(256, 256, 256, 256));
    }

    #[test]
    fn test_clipped_edges() {
        let plan = BlockGeometry::tile(500, 300, 256, 256).unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[1], BlockWindow::new(256, 0, 244, 256));
        assert_eq!(plan[2], BlockWindow::new(0, 256, 256, 44));
        assert_eq!(plan[3], BlockWindow::new(256, 256, 244, 44));
    }

    #[test]
    fn test_full_coverage_no_overlap() {
        let (width, height) = (100, 73);
        let plan = BlockGeometry::tile(width, height, 32, 16).unwrap();

        let mut covered = vec![0u8; width * height];
        for window in &plan {
            for y in window.y..window.end_y() {
                for x in window.x..window.end_x() {
                    covered[y * width + x] += 1;
                }
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_degenerate_dimensions_rejected() {
        assert!(BlockGeometry::tile(0, 100, 32, 32).is_err());
        assert!(BlockGeometry::tile(100, 0, 32, 32).is_err());
        assert!(BlockGeometry::tile(100, 100, 0, 32).is_err());
    }

    #[test]
    fn test_resolution_precedence() {
        let budget = MemoryBudget::new(Box::new(FixedMemoryProbe(1 << 30)));

        let explicit = RasterMathOptions {
            block_size: Some((64, 48)),
            ..Default::default()
        };
        assert_eq!(
            resolve_block_size(&explicit, (512, 512), 8, 4, &budget),
            (64, 48)
        );

        let forced = RasterMathOptions {
            force_native_tiling: true,
            ..Default::default()
        };
        assert_eq!(
            resolve_block_size(&forced, (512, 512), 8, 4, &budget),
            (512, 512)
        );

        // Plenty of memory: a native tiling larger than the default wins
        let auto = RasterMathOptions::default();
        assert_eq!(
            resolve_block_size(&auto, (512, 512), 8, 4, &budget),
            (512, 512)
        );
        // Native tiling smaller than the default square loses to it
        assert_eq!(resolve_block_size(&auto, (16, 16), 8, 4, &budget), (256, 256));
    }

    #[test]
    fn test_memory_caps_native_tiling() {
        // 1 MiB available, 8 B/px, 4 workers: far below a 512x512 block
        let budget = MemoryBudget::new(Box::new(FixedMemoryProbe(1 << 20)));
        let auto = RasterMathOptions::default();
        let (w, h) = resolve_block_size(&auto, (512, 512), 8, 4, &budget);
        assert_eq!(w, h);
        assert!(w < 512);

        // The override restores the native tiling regardless of memory
        let forced = RasterMathOptions {
            force_native_tiling: true,
            ..Default::default()
        };
        assert_eq!(
            resolve_block_size(&forced, (512, 512), 8, 4, &budget),
            (512, 512)
        );
    }
}
