//! Overlook Core - foundational types for the virtual filesystem overlay
//!
//! This crate provides the opaque vocabulary the journal and the filesystem
//! layers exchange:
//! - Content hashes for checkout positions (BLAKE3)
//! - Interned repository-relative paths

pub mod hash;
pub mod path;

// Re-export main types for convenience
pub use hash::{digest, CommitHash, ZERO_HASH};
pub use path::{RelativePath, RelativePathPiece};

/// Common result type used throughout overlook-core
pub type Result<T> = anyhow::Result<T>;
