//! Error kinds: ingest/alto/hacoo/mttkrp each get a `thiserror` enum; the
//! CLI boundary wraps these in `anyhow`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AltoError {
    #[error("total packed width {total} exceeds 64 bits (dims produced per-mode widths {bits:?})")]
    WidthOverflow { total: u32, bits: Vec<u32> },

    #[error("tensor has zero modes")]
    NoModes,
}

#[derive(Debug, Error)]
pub enum HacooError {
    #[error("alto packing failed: {0}")]
    Alto(#[from] AltoError),

    #[error("coordinate has {got} components, tensor has {expected} modes")]
    RankMismatch { got: usize, expected: usize },

    #[error("coordinate {coord:?} out of bounds for dims {dims:?}")]
    OutOfBounds { coord: Vec<u32>, dims: Vec<u32> },

    #[error("allocation failure while growing table to {requested} buckets")]
    Allocation { requested: usize },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("line {line}: coordinate {mode} is 0 but base-1 indexing was requested")]
    ZeroUnderBaseOne { line: usize, mode: usize },

    #[error("line {line}: coordinate out of range after base adjustment: {coord:?}")]
    OutOfRange { line: usize, coord: Vec<i64> },

    #[error(transparent)]
    Hacoo(#[from] HacooError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MttkrpError {
    #[error("mode {mode} is out of range for a {ndims}-mode tensor")]
    ModeOutOfRange { mode: usize, ndims: usize },

    #[error("factor matrix for mode {mode} has {rows} rows, tensor dim is {dim}")]
    DimMismatch { mode: usize, rows: usize, dim: usize },

    #[error("factor matrices have inconsistent rank: mode {mode} has {got}, expected {expected}")]
    RankMismatch {
        mode: usize,
        got: usize,
        expected: usize,
    },
}

#[derive(Debug, Error)]
pub enum CpdError {
    #[error(transparent)]
    Mttkrp(#[from] MttkrpError),

    #[error("rank must be at least 1")]
    InvalidRank,
}
