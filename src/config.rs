//! Engine defaults and per-run options
//!
//! Built-in defaults live in `rastermath_defaults.toml`, which is compiled
//! into the library and parsed once at startup. Callers tune individual runs
//! through [`RasterMathOptions`], either in code or from a TOML file with
//! the same layout.

use std::fs;
use std::thread;

use lazy_static::lazy_static;

use crate::errors::{RasterMathError, RasterResult};

lazy_static! {
    /// Engine defaults, parsed from the embedded TOML at startup
    pub static ref DEFAULTS: EngineDefaults = {
        let content = include_str!("../rastermath_defaults.toml");
        EngineDefaults::from_str(content).unwrap_or_else(|e| {
            eprintln!("Warning: failed to parse embedded engine defaults: {}", e);
            EngineDefaults::built_in()
        })
    };
}

/// Container for the engine-wide default values
#[derive(Debug, Clone)]
pub struct EngineDefaults {
    /// Square block edge used when nothing else pins a size
    pub fallback_block_size: usize,
    /// Hard floor for memory-derived block sizes
    pub min_block_size: usize,
    /// Output flush cadence, in written blocks
    pub flush_interval: usize,
    /// Fraction of available memory the planner may claim
    pub safety_margin: f64,
    /// Cores held back from the default worker pool
    pub worker_reserve: usize,
    /// Nodata used when an input declares none
    pub default_nodata: f64,
}

impl EngineDefaults {
    /// Hard-coded fallback used if the embedded TOML fails to parse
    fn built_in() -> Self {
        EngineDefaults {
            fallback_block_size: 256,
            min_block_size: 32,
            flush_interval: 16,
            safety_margin: 0.5,
            worker_reserve: 1,
            default_nodata: -9999.0,
        }
    }

    /// Parse defaults from a TOML string
    pub fn from_str(content: &str) -> RasterResult<Self> {
        let value: toml::Value = content
            .parse()
            .map_err(|e| RasterMathError::Configuration(format!("bad defaults TOML: {}", e)))?;

        let mut defaults = EngineDefaults::built_in();

        if let Some(blocks) = value.get("blocks") {
            if let Some(v) = blocks.get("fallback_size").and_then(|v| v.as_integer()) {
                defaults.fallback_block_size = v.max(1) as usize;
            }
            if let Some(v) = blocks.get("min_size").and_then(|v| v.as_integer()) {
                defaults.min_block_size = v.max(1) as usize;
            }
            if let Some(v) = blocks.get("flush_interval").and_then(|v| v.as_integer()) {
                defaults.flush_interval = v.max(0) as usize;
            }
        }

        if let Some(memory) = value.get("memory") {
            if let Some(v) = memory.get("safety_margin").and_then(|v| v.as_float()) {
                if v > 0.0 && v <= 1.0 {
                    defaults.safety_margin = v;
                }
            }
        }

        if let Some(workers) = value.get("workers") {
            if let Some(v) = workers.get("reserve").and_then(|v| v.as_integer()) {
                defaults.worker_reserve = v.max(0) as usize;
            }
        }

        if let Some(nodata) = value.get("nodata") {
            if let Some(v) = nodata.get("default").and_then(|v| v.as_float()) {
                defaults.default_nodata = v;
            }
        }

        Ok(defaults)
    }
}

/// Per-run options for the engine
///
/// All fields start from the embedded defaults; construct with
/// `RasterMathOptions::default()` and adjust what the run needs.
#[derive(Debug, Clone)]
pub struct RasterMathOptions {
    /// Explicit block size (width, height); None lets the planner decide
    pub block_size: Option<(usize, usize)>,
    /// Force the input's native tiling even when the memory budget is smaller
    pub force_native_tiling: bool,
    /// Worker count for parallel execution; None derives it from the cores
    pub worker_count: Option<usize>,
    /// Output flush cadence, in written blocks (0 disables periodic flushes)
    pub flush_interval: usize,
    /// Also drop pixels whose first-band value equals the input nodata
    pub filter_nodata: bool,
    /// Show a progress bar during `run`
    pub show_progress: bool,
}

impl Default for RasterMathOptions {
    fn default() -> Self {
        RasterMathOptions {
            block_size: None,
            force_native_tiling: false,
            worker_count: None,
            flush_interval: DEFAULTS.flush_interval,
            filter_nodata: false,
            show_progress: false,
        }
    }
}

impl RasterMathOptions {
    /// Load options from a user TOML file
    ///
    /// Recognized keys mirror the embedded defaults plus a `[run]` table
    /// with `block_size`, `force_native_tiling`, `worker_count`,
    /// `filter_nodata` and `show_progress`.
    pub fn from_file(path: &str) -> RasterResult<Self> {
        let content = fs::read_to_string(path)?;
        let value: toml::Value = content.parse().map_err(|e| {
            RasterMathError::Configuration(format!("bad options file {}: {}", path, e))
        })?;

        let mut options = RasterMathOptions::default();

        if let Some(run) = value.get("run") {
            if let Some(v) = run.get("block_size").and_then(|v| v.as_integer()) {
                if v <= 0 {
                    return Err(RasterMathError::Configuration(format!(
                        "block_size must be positive, got {}",
                        v
                    )));
                }
                options.block_size = Some((v as usize, v as usize));
            }
            if let Some(v) = run.get("force_native_tiling").and_then(|v| v.as_bool()) {
                options.force_native_tiling = v;
            }
            if let Some(v) = run.get("worker_count").and_then(|v| v.as_integer()) {
                options.worker_count = Some(v.max(1) as usize);
            }
            if let Some(v) = run.get("flush_interval").and_then(|v| v.as_integer()) {
                options.flush_interval = v.max(0) as usize;
            }
            if let Some(v) = run.get("filter_nodata").and_then(|v| v.as_bool()) {
                options.filter_nodata = v;
            }
            if let Some(v) = run.get("show_progress").and_then(|v| v.as_bool()) {
                options.show_progress = v;
            }
        }

        Ok(options)
    }

    /// Worker count for this run
    ///
    /// Defaults to the available cores minus the configured reserve, and
    /// never below one. A count of one means no parallelism is attempted.
    pub fn resolve_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.max(1),
            None => thread::available_parallelism()
                .map(|n| n.get().saturating_sub(DEFAULTS.worker_reserve))
                .unwrap_or(1)
                .max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_parse() {
        let defaults = EngineDefaults::from_str(include_str!("../rastermath_defaults.toml"));
        assert!(defaults.is_ok());

        let defaults = defaults.unwrap();
        assert_eq!(defaults.fallback_block_size, 256);
        assert_eq!(defaults.min_block_size, 32);
        assert_eq!(defaults.default_nodata, -9999.0);
        assert!(defaults.safety_margin > 0.0 && defaults.safety_margin <= 1.0);
    }

    #[test]
    fn test_malformed_defaults_fall_back() {
        let defaults = EngineDefaults::from_str("not [valid toml");
        assert!(defaults.is_err());
    }

    #[test]
    fn test_worker_count_floor() {
        let options = RasterMathOptions {
            worker_count: Some(0),
            ..Default::default()
        };
        assert_eq!(options.resolve_worker_count(), 1);
    }
}
