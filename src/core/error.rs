//! Error types for the engine
//!
//! `BudgetOverflow`, an empty build input, and a zero-triangle BVH build are
//! deliberately *not* variants here: they are ordinary control-flow outcomes
//! (schedule eviction, produce an empty tree, leave `bvh_built = false`), not
//! failures. Nothing in this crate's core returns `Err` for them.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("node file missing: {0}")]
    MissingFile(PathBuf),

    #[error("format error: {0}")]
    Format(String),
}
