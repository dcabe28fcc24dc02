//! Utility functions and helpers
//!
//! File-level building blocks used by both stores: atomic rewrites and the
//! backward line scanner.

pub mod atomic;
pub mod reverse_scanner;

pub use atomic::{atomic_write, atomic_write_with, cleanup_temp_files};
pub use reverse_scanner::{Lines, ReadAt, ReverseScanner, DEFAULT_CHUNK_SIZE};
