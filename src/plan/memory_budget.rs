//! Memory-derived block sizing
//!
//! Block size trades I/O overhead against peak memory: every worker holds
//! a copy of its block, so the planner scales the block edge down as the
//! worker count or the per-pixel byte cost grows. Memory is queried
//! through an injected probe so tests stay deterministic.

use log::debug;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use crate::config::DEFAULTS;

/// Source of the available-memory figure
pub trait MemoryProbe: Send + Sync {
    /// Available bytes, or None when the figure cannot be determined
    fn available_bytes(&self) -> Option<u64>;
}

/// Probe backed by the operating system
pub struct SystemMemoryProbe;

impl MemoryProbe for SystemMemoryProbe {
    fn available_bytes(&self) -> Option<u64> {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        let available = system.available_memory();
        if available == 0 {
            None
        } else {
            Some(available)
        }
    }
}

/// Probe returning a fixed figure, for deterministic sizing and tests
pub struct FixedMemoryProbe(pub u64);

impl MemoryProbe for FixedMemoryProbe {
    fn available_bytes(&self) -> Option<u64> {
        Some(self.0)
    }
}

/// Derives safe block sizes from the available memory
pub struct MemoryBudget {
    probe: Box<dyn MemoryProbe>,
    safety_margin: f64,
    min_edge: usize,
}

impl MemoryBudget {
    /// Create a budget with the engine-default margin and floor
    pub fn new(probe: Box<dyn MemoryProbe>) -> Self {
        MemoryBudget {
            probe,
            safety_margin: DEFAULTS.safety_margin,
            min_edge: DEFAULTS.min_block_size,
        }
    }

    /// Create a budget with an explicit safety margin
    pub fn with_margin(probe: Box<dyn MemoryProbe>, safety_margin: f64) -> Self {
        MemoryBudget {
            probe,
            safety_margin: safety_margin.clamp(0.05, 1.0),
            min_edge: DEFAULTS.min_block_size,
        }
    }

    /// Choose the largest safe square block edge
    ///
    /// The footprint of a candidate edge is edge² × bytes_per_pixel ×
    /// worker_count; the chosen edge keeps that within the probed memory
    /// scaled by the safety margin. The result never exceeds
    /// `fallback_edge` and never drops below the hard minimum. When the
    /// probe cannot determine the available memory, `fallback_edge` is
    /// returned unchanged.
    ///
    /// # Arguments
    /// * `bytes_per_pixel` - Storage bytes for one pixel across all bands
    /// * `worker_count` - Workers that each hold a block copy
    /// * `fallback_edge` - Upper bound, also the no-probe answer
    ///
    /// # Returns
    /// Block edge in pixels
    pub fn choose_block_size(
        &self,
        bytes_per_pixel: usize,
        worker_count: usize,
        fallback_edge: usize,
    ) -> usize {
        let available = match self.probe.available_bytes() {
            Some(bytes) => bytes,
            None => {
                debug!("memory probe unavailable, keeping fallback edge {}", fallback_edge);
                return fallback_edge;
            }
        };

        let per_pixel = (bytes_per_pixel.max(1) * worker_count.max(1)) as u64;
        let budget = (available as f64 * self.safety_margin) as u64;
        let edge = ((budget / per_pixel) as f64).sqrt() as usize;

        let chosen = edge.clamp(self.min_edge, fallback_edge.max(self.min_edge));
        debug!(
            "memory budget: {} B available, {} B/px x {} workers -> edge {}",
            available, bytes_per_pixel, worker_count, chosen
        );
        chosen
    }
}
