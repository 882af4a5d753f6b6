//! I/O utilities
//!
//! Traits shared by the stream-backed parts of the engine.

pub mod seekable;

pub use seekable::SeekableStream;
