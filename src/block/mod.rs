//! Per-block pipeline: read, execute, write

mod batch;
mod executor;
mod reader;
mod writer;

pub use batch::{PixelBatch, PositionIndex};
pub use executor::{BlockExecutor, BlockFunction, ExecutionMode};
pub use reader::BlockReader;
pub use writer::BlockWriter;
