//! HaCOO: hash-indexed sparse tensor storage with ALTO bit-interleaved
//! linear indexing, a parallel MTTKRP kernel, and a CPD-ALS driver.
//!
//! Data flow: [`ingest`] reads a `.tns` file into a [`table::Tensor`] (which
//! packs coordinates through [`alto`] on every `set`), [`mttkrp`] contracts
//! the tensor against factor matrices ([`matrix`]), and [`cpd`] drives the
//! ALS loop that calls both repeatedly.

pub mod alto;
pub mod bits;
pub mod bucket;
pub mod cpd;
pub mod error;
pub mod ingest;
pub mod matrix;
pub mod mttkrp;
pub mod runtime;
pub mod table;

pub use error::{CpdError, HacooError, IngestError};
pub use matrix::Matrix;
pub use table::Tensor;
