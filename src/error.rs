//! Error types for the sampler.
//!
//! Configuration mistakes and chain-output I/O failures are fatal and
//! surface as [`McmcError`]. Checkpoint problems are deliberately *not*
//! represented here: a missing or corrupt resume file degrades to a fresh
//! start inside [`crate::checkpoint::CheckpointStore`] and is only logged.

use thiserror::Error;

/// Fatal errors raised during configuration or a run.
#[derive(Debug, Error)]
pub enum McmcError {
    /// Invalid configuration: bad index, improper prior, bad block
    /// partition, unconfigured parameter, or a starting point with zero
    /// prior density / non-finite likelihood.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The chain file or paramnames sidecar could not be written.
    #[error("chain output failed: {0}")]
    Io(#[from] std::io::Error),

    /// A chain file being read back does not parse as chain rows.
    #[error("malformed chain file: {0}")]
    ChainFormat(String),
}
