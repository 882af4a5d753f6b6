//! Seekable stream trait
//!
//! A unified trait for streams that support reading, writing and
//! seeking, used by the grid container so datasets can live in files or
//! in memory buffers alike. The container updates files in place
//! (appending tile payloads, patching the header on flush), so it needs
//! the full combination.

use std::io::{Read, Seek, Write};

/// Trait for streams that can read, write and seek
pub trait SeekableStream: Read + Write + Seek + Send {}

// Blanket implementation for any type that implements the required traits
impl<T: Read + Write + Seek + Send> SeekableStream for T {}
