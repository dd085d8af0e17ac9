//! MTTKRP — the dominant arithmetic primitive in CPD-ALS.
//!
//! `M[i, f] = sum over nonzeros (c, v) with c[n] == i of v * prod_{k!=n} U[k][c[k], f]`
//!
//! The parallel path partitions the tensor's bucket slots into contiguous
//! chunks per worker, accumulates into thread-private output matrices (no
//! output contention), then merges partials with a parallel reduction
//! partitioned along the output's row dimension.

use ndarray::Axis;
use ndarray::parallel::prelude::*;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::alto::ModeMasks;
use crate::bucket::Bucket;
use crate::error::MttkrpError;
use crate::matrix::Matrix;
use crate::table::Tensor;

fn validate(tensor: &Tensor, factors: &[Matrix], mode: usize) -> Result<usize, MttkrpError> {
    let ndims = tensor.ndims();
    if mode >= ndims {
        return Err(MttkrpError::ModeOutOfRange { mode, ndims });
    }
    if factors.len() != ndims {
        return Err(MttkrpError::DimMismatch {
            mode,
            rows: factors.len(),
            dim: ndims,
        });
    }
    let rank = factors[0].cols();
    for (k, (&dim, f)) in tensor.dims().iter().zip(factors.iter()).enumerate() {
        if f.rows() != dim as usize {
            return Err(MttkrpError::DimMismatch {
                mode: k,
                rows: f.rows(),
                dim: dim as usize,
            });
        }
        if f.cols() != rank {
            return Err(MttkrpError::RankMismatch {
                mode: k,
                got: f.cols(),
                expected: rank,
            });
        }
    }
    Ok(rank)
}

/// Accumulates one chunk of buckets' nonzeros into a freshly zeroed
/// `d_n x rank` output matrix.
fn accumulate_chunk(
    chunk: &[Bucket],
    masks: &ModeMasks,
    ndims: usize,
    factors: &[Matrix],
    mode: usize,
    dim_n: usize,
    rank: usize,
) -> Matrix {
    let mut local = Matrix::zeros(dim_n, rank);
    let mut coord: SmallVec<[u32; 8]> = smallvec::smallvec![0u32; ndims];
    let mut rank_vec = vec![0.0f64; rank];

    for bucket in chunk {
        for &(packed, value) in bucket.iter() {
            crate::alto::unpack_index(packed, masks, &mut coord);

            rank_vec.iter_mut().for_each(|x| *x = value);
            for (k, &idx) in coord.iter().enumerate() {
                if k == mode {
                    continue;
                }
                let u = &factors[k];
                for f in 0..rank {
                    rank_vec[f] *= u.get(idx as usize, f);
                }
            }

            let out_row = coord[mode] as usize;
            for f in 0..rank {
                let updated = local.get(out_row, f) + rank_vec[f];
                local.set(out_row, f, updated);
            }
        }
    }
    local
}

fn merge_partials(partials: Vec<Matrix>, dim_n: usize, rank: usize) -> Matrix {
    let mut result = Matrix::zeros(dim_n, rank);
    if partials.is_empty() || dim_n == 0 {
        return result;
    }
    result
        .as_array_mut()
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(row, mut row_view)| {
            for partial in &partials {
                let prow = partial.as_array().row(row);
                for f in 0..rank {
                    row_view[f] += prow[f];
                }
            }
        });
    result
}

/// Serial reference implementation. Visitation order is slot-then-append,
/// matching `Tensor::iterate`.
pub fn mttkrp_serial(tensor: &Tensor, factors: &[Matrix], mode: usize) -> Result<Matrix, MttkrpError> {
    let rank = validate(tensor, factors, mode)?;
    let dim_n = tensor.dims()[mode] as usize;
    if dim_n == 0 {
        return Ok(Matrix::zeros(0, rank));
    }
    Ok(accumulate_chunk(
        tensor.buckets(),
        tensor.mode_masks(),
        tensor.ndims(),
        factors,
        mode,
        dim_n,
        rank,
    ))
}

/// Parallel MTTKRP: `num_threads` contiguous bucket-slot chunks, each
/// reduced into a thread-private output, merged by an output-row-
/// partitioned reduction. With `num_threads == 1` this produces identical
/// results to [`mttkrp_serial`].
pub fn mttkrp_parallel(
    tensor: &Tensor,
    factors: &[Matrix],
    mode: usize,
    num_threads: usize,
) -> Result<Matrix, MttkrpError> {
    let rank = validate(tensor, factors, mode)?;
    let dim_n = tensor.dims()[mode] as usize;
    if dim_n == 0 {
        return Ok(Matrix::zeros(0, rank));
    }

    let buckets = tensor.buckets();
    let num_threads = num_threads.max(1);
    let chunk_size = buckets.len().div_ceil(num_threads).max(1);

    let partials: Vec<Matrix> = buckets
        .par_chunks(chunk_size)
        .map(|chunk| {
            accumulate_chunk(
                chunk,
                tensor.mode_masks(),
                tensor.ndims(),
                factors,
                mode,
                dim_n,
                rank,
            )
        })
        .collect();

    Ok(merge_partials(partials, dim_n, rank))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alto::{ModeOrder, PackOrder};

    fn build_2x3x2_tensor() -> Tensor {
        let mut t = Tensor::new(vec![2, 3, 2], PackOrder::LsbFirst, ModeOrder::ShortFirst, 70).unwrap();
        t.set(&[0, 0, 0], 1.0).unwrap();
        t.set(&[1, 2, 1], 4.0).unwrap();
        t
    }

    fn build_2x3x2_factors() -> Vec<Matrix> {
        vec![
            Matrix::from_rows(2, 2, &[1.0, 3.0, 2.0, 4.0]),
            Matrix::from_rows(3, 2, &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]),
            Matrix::from_rows(2, 2, &[1.0, 3.0, 2.0, 4.0]),
        ]
    }

    #[test]
    fn mttkrp_mode0_matches_hand_computation() {
        let t = build_2x3x2_tensor();
        let factors = build_2x3x2_factors();
        let m = mttkrp_serial(&t, &factors, 0).unwrap();

        assert!((m.get(0, 0) - 1.0).abs() < 1e-12);
        assert!((m.get(0, 1) - 12.0).abs() < 1e-12);
        assert!((m.get(1, 0) - 24.0).abs() < 1e-12);
        assert!((m.get(1, 1) - 96.0).abs() < 1e-12);
    }

    #[test]
    fn serial_and_parallel_agree_for_all_modes() {
        let t = build_2x3x2_tensor();
        let factors = build_2x3x2_factors();
        for mode in 0..3 {
            let serial = mttkrp_serial(&t, &factors, mode).unwrap();
            let parallel = mttkrp_parallel(&t, &factors, mode, 4).unwrap();
            assert_eq!(serial.rows(), parallel.rows());
            assert_eq!(serial.cols(), parallel.cols());
            for r in 0..serial.rows() {
                for c in 0..serial.cols() {
                    assert!((serial.get(r, c) - parallel.get(r, c)).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn single_thread_parallel_matches_serial_bit_for_bit() {
        let t = build_2x3x2_tensor();
        let factors = build_2x3x2_factors();
        let serial = mttkrp_serial(&t, &factors, 1).unwrap();
        let parallel = mttkrp_parallel(&t, &factors, 1, 1).unwrap();
        for r in 0..serial.rows() {
            for c in 0..serial.cols() {
                assert_eq!(serial.get(r, c), parallel.get(r, c));
            }
        }
    }

    #[test]
    fn empty_tensor_yields_zero_matrix() {
        let t = Tensor::with_defaults(vec![3, 3]).unwrap();
        let factors = vec![Matrix::zeros(3, 2), Matrix::zeros(3, 2)];
        let m = mttkrp_serial(&t, &factors, 0).unwrap();
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 2);
        for r in 0..3 {
            for c in 0..2 {
                assert_eq!(m.get(r, c), 0.0);
            }
        }
    }

    #[test]
    fn mode_out_of_range_is_rejected() {
        let t = build_2x3x2_tensor();
        let factors = build_2x3x2_factors();
        assert!(mttkrp_serial(&t, &factors, 3).is_err());
    }

    #[test]
    fn dim_mismatch_is_rejected() {
        let t = build_2x3x2_tensor();
        let mut factors = build_2x3x2_factors();
        factors[1] = Matrix::zeros(5, 2); // wrong row count for mode 1
        assert!(mttkrp_serial(&t, &factors, 0).is_err());
    }

    #[test]
    fn mttkrp_is_linear_in_the_tensor() {
        let mut t1 = Tensor::new(vec![2, 2, 2], PackOrder::LsbFirst, ModeOrder::ShortFirst, 70).unwrap();
        t1.set(&[0, 0, 0], 2.0).unwrap();
        t1.set(&[1, 1, 1], 3.0).unwrap();

        let mut t2 = Tensor::new(vec![2, 2, 2], PackOrder::LsbFirst, ModeOrder::ShortFirst, 70).unwrap();
        t2.set(&[0, 1, 0], 1.5).unwrap();
        t2.set(&[1, 0, 1], -2.0).unwrap();

        let mut t_sum = Tensor::new(vec![2, 2, 2], PackOrder::LsbFirst, ModeOrder::ShortFirst, 70).unwrap();
        t_sum.set(&[0, 0, 0], 2.0).unwrap();
        t_sum.set(&[1, 1, 1], 3.0).unwrap();
        t_sum.set(&[0, 1, 0], 1.5).unwrap();
        t_sum.set(&[1, 0, 1], -2.0).unwrap();

        let factors = vec![Matrix::from_rows(2, 2, &[1.0, 2.0, 3.0, 4.0]); 3];

        for mode in 0..3 {
            let m1 = mttkrp_serial(&t1, &factors, mode).unwrap();
            let m2 = mttkrp_serial(&t2, &factors, mode).unwrap();
            let sum = mttkrp_serial(&t_sum, &factors, mode).unwrap();
            for r in 0..sum.rows() {
                for c in 0..sum.cols() {
                    assert!((sum.get(r, c) - (m1.get(r, c) + m2.get(r, c))).abs() < 1e-9);
                }
            }
        }
    }
}
