//! Custom error types for the block processing engine

use std::fmt;
use std::io;

use crate::plan::BlockWindow;

/// Engine-level error types
#[derive(Debug)]
pub enum RasterMathError {
    /// Invalid configuration (block size, dimensions, phase misuse)
    Configuration(String),
    /// Inputs or mask do not share the same geometry
    GeometryMismatch(String),
    /// I/O error
    Io(io::Error),
    /// User function failed or returned a malformed result
    Compute {
        /// Index of the block being processed when the failure occurred
        block: usize,
        /// Description of the failure
        message: String,
    },
    /// A block failed during a run; wraps the underlying error with its origin
    BlockFailed {
        /// Index of the failing block in the block plan
        block: usize,
        /// Window of the failing block
        window: BlockWindow,
        /// Underlying error
        source: Box<RasterMathError>,
    },
    /// Invalid grid container header
    InvalidHeader,
    /// Unsupported grid container version
    UnsupportedVersion(u16),
    /// Unknown data type code
    UnsupportedDataType(u8),
    /// Unsupported compression method
    UnsupportedCompression(u8),
    /// Generic error with message
    GenericError(String),
}

impl fmt::Display for RasterMathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RasterMathError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            RasterMathError::GeometryMismatch(msg) => write!(f, "Geometry mismatch: {}", msg),
            RasterMathError::Io(e) => write!(f, "I/O error: {}", e),
            RasterMathError::Compute { block, message } => {
                write!(f, "Compute error in block {}: {}", block, message)
            }
            RasterMathError::BlockFailed { block, window, source } => {
                write!(
                    f,
                    "Block {} (window x={}, y={}, {}x{}) failed: {}",
                    block, window.x, window.y, window.width, window.height, source
                )
            }
            RasterMathError::InvalidHeader => write!(f, "Invalid grid container header"),
            RasterMathError::UnsupportedVersion(v) => {
                write!(f, "Unsupported grid container version: {}", v)
            }
            RasterMathError::UnsupportedDataType(c) => {
                write!(f, "Unsupported data type code: {}", c)
            }
            RasterMathError::UnsupportedCompression(c) => {
                write!(f, "Unsupported compression method: {}", c)
            }
            RasterMathError::GenericError(msg) => write!(f, "Engine error: {}", msg),
        }
    }
}

impl std::error::Error for RasterMathError {}

impl From<io::Error> for RasterMathError {
    fn from(error: io::Error) -> Self {
        RasterMathError::Io(error)
    }
}

impl From<String> for RasterMathError {
    fn from(msg: String) -> Self {
        RasterMathError::GenericError(msg)
    }
}

impl RasterMathError {
    /// Wrap an error with the block index and window it originated from
    ///
    /// Compute errors already carry their block index and are passed
    /// through unchanged.
    pub fn at_block(self, block: usize, window: BlockWindow) -> Self {
        match self {
            RasterMathError::Compute { .. } => self,
            other => RasterMathError::BlockFailed {
                block,
                window,
                source: Box::new(other),
            },
        }
    }

    /// The block index this error originated from, if any
    pub fn block_index(&self) -> Option<usize> {
        match self {
            RasterMathError::Compute { block, .. } => Some(*block),
            RasterMathError::BlockFailed { block, .. } => Some(*block),
            _ => None,
        }
    }
}

/// Result type for engine operations
pub type RasterResult<T> = Result<T, RasterMathError>;
