//! CPD-ALS driver — alternating least squares for the Canonical Polyadic
//! Decomposition of a sparse tensor.
//!
//! Per mode `n`: MTTKRP against the other factors, Hadamard the Gram
//! matrices of every other factor, invert, solve by GEMM, then normalize
//! the resulting columns (L2 on the first iteration, max-norm afterward)
//! and fold the norms into `lambda`.

use log::{debug, info};
use rand::Rng;
use smallvec::SmallVec;

use crate::error::CpdError;
use crate::matrix::Matrix;
use crate::mttkrp::{mttkrp_parallel, mttkrp_serial};
use crate::table::Tensor;

/// Ridge term added to the Gram-Hadamard product's diagonal before
/// inversion, guarding against rank-deficient Gram products.
pub const RIDGE_EPSILON: f64 = 1e-10;

/// Result of a CPD-ALS run: one factor matrix per mode plus a shared
/// lambda (column-weight) vector.
#[derive(Debug, Clone)]
pub struct CpdResult {
    pub factors: Vec<Matrix>,
    pub lambda: Vec<f64>,
    pub iterations_run: usize,
    pub final_fit: f64,
}

/// Which MTTKRP implementation the ALS loop dispatches to per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Serial,
    Parallel { num_threads: usize },
}

fn run_mttkrp(tensor: &Tensor, factors: &[Matrix], mode: usize, algo: Algorithm) -> Result<Matrix, CpdError> {
    match algo {
        Algorithm::Serial => Ok(mttkrp_serial(tensor, factors, mode)?),
        Algorithm::Parallel { num_threads } => Ok(mttkrp_parallel(tensor, factors, mode, num_threads)?),
    }
}

/// Hadamard product of the Gram matrices (`U_k^T . U_k`) of every mode
/// except `skip`.
fn gram_hadamard(factors: &[Matrix], skip: usize) -> Matrix {
    let rank = factors[0].cols();
    let mut acc = Matrix::zeros(rank, rank);
    acc.fill_identity();
    // start from the first non-skipped Gram, then Hadamard the rest in.
    let mut started = false;
    for (k, f) in factors.iter().enumerate() {
        if k == skip {
            continue;
        }
        let gram = f.gemm_transpose_lhs(f);
        if !started {
            acc = gram;
            started = true;
        } else {
            acc = acc.hadamard(&gram);
        }
    }
    acc
}

fn init_random_factors(dims: &[u32], rank: usize) -> Vec<Matrix> {
    let mut rng = rand::thread_rng();
    dims.iter()
        .map(|&d| {
            let values: Vec<f64> = (0..(d as usize * rank)).map(|_| rng.gen_range(0.0..1.0)).collect();
            Matrix::from_rows(d as usize, rank, &values)
        })
        .collect()
}

/// Runs CPD-ALS to convergence or `max_iter`, whichever comes first.
/// `tol` is the minimum relative fit improvement between iterations below
/// which the loop stops early.
pub fn cpd_als(
    tensor: &Tensor,
    rank: usize,
    max_iter: usize,
    tol: f64,
    algo: Algorithm,
) -> Result<CpdResult, CpdError> {
    cpd_als_with_progress(tensor, rank, max_iter, tol, algo, |_, _| {})
}

/// As [`cpd_als`], but invokes `on_iteration(iter, fit)` after every ALS
/// sweep — the CLI driver uses this to drive an `indicatif` progress bar.
pub fn cpd_als_with_progress(
    tensor: &Tensor,
    rank: usize,
    max_iter: usize,
    tol: f64,
    algo: Algorithm,
    mut on_iteration: impl FnMut(usize, f64),
) -> Result<CpdResult, CpdError> {
    if rank == 0 {
        return Err(CpdError::InvalidRank);
    }

    let ndims = tensor.ndims();
    let mut factors = init_random_factors(tensor.dims(), rank);
    let mut lambda = vec![1.0f64; rank];
    let norm_t = tensor.frobenius_norm();

    let mut prev_fit = f64::NEG_INFINITY;
    let mut iterations_run = 0;
    let mut final_fit = 0.0;

    for iter in 0..max_iter {
        for mode in 0..ndims {
            let mttkrp_result = run_mttkrp(tensor, &factors, mode, algo)?;
            let mut gram = gram_hadamard(&factors, mode);
            gram.add_diagonal(RIDGE_EPSILON);

            let inv = gram.inverse().unwrap_or_else(|| Matrix::identity(rank));
            let mut updated = mttkrp_result.gemm(&inv);

            for col in 0..rank {
                lambda[col] = updated.normalize_column(col, iter);
            }
            factors[mode] = updated;
        }

        let fit = estimate_fit(tensor, &factors, &lambda, norm_t);
        iterations_run = iter + 1;
        final_fit = fit;
        debug!("cpd-als iteration {iter}: fit={fit:.6}");
        on_iteration(iterations_run, fit);

        if (fit - prev_fit).abs() < tol {
            info!("cpd-als converged after {iterations_run} iterations (fit={fit:.6})");
            break;
        }
        prev_fit = fit;
    }

    Ok(CpdResult {
        factors,
        lambda,
        iterations_run,
        final_fit,
    })
}

/// Approximates the relative fit `1 - ||T - reconstruction|| / ||T||`
/// using the inner-product identity, avoiding materializing the dense
/// reconstruction.
fn estimate_fit(tensor: &Tensor, factors: &[Matrix], lambda: &[f64], norm_t: f64) -> f64 {
    if norm_t == 0.0 {
        return 1.0;
    }
    let rank = lambda.len();
    let mut inner = 0.0;
    let mut coord: SmallVec<[u32; 8]> = smallvec::smallvec![0u32; factors.len()];
    tensor.iterate(|packed, value| {
        crate::alto::unpack_index(packed, tensor.mode_masks(), &mut coord);
        for f in 0..rank {
            let mut prod = lambda[f] * value;
            for (k, &idx) in coord.iter().enumerate() {
                prod *= factors[k].get(idx as usize, f);
            }
            inner += prod;
        }
    });

    let mut gram = Matrix::zeros(rank, rank);
    gram.fill_identity();
    let mut started = false;
    for f in factors {
        let g = f.gemm_transpose_lhs(f);
        if !started {
            gram = g;
            started = true;
        } else {
            gram = gram.hadamard(&g);
        }
    }
    let mut norm_approx_sq = 0.0;
    for i in 0..rank {
        for j in 0..rank {
            norm_approx_sq += lambda[i] * lambda[j] * gram.get(i, j);
        }
    }
    let norm_approx = norm_approx_sq.max(0.0).sqrt();
    let residual_sq = (norm_t * norm_t + norm_approx * norm_approx - 2.0 * inner).max(0.0);
    1.0 - residual_sq.sqrt() / norm_t
}
