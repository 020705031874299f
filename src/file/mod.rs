//! On-disk storage for relayed files.
//!
//! Each code owns one directory holding exactly one file, under its
//! original (sanitized) name.

mod storage;

pub use storage::{sanitize_filename, FileStorage, StoredFile};

/// Name used when an upload carries no usable filename.
pub const FALLBACK_FILENAME: &str = "upload.bin";

/// Maximum length for a stored filename (in characters).
pub const MAX_FILENAME_LENGTH: usize = 200;
