//! HaCOO table — a hash table of bucket vectors over ALTO-packed indices,
//! with incremental insertion and load-triggered rehash.

use smallvec::SmallVec;

use crate::alto::{self, ModeMasks, ModeOrder, PackOrder};
use crate::bucket::Bucket;
use crate::error::HacooError;

/// Small-vector coordinate buffer: most tensors stay well under 8 modes,
/// so this avoids a heap allocation per unpack in the common case.
type Coord = SmallVec<[u32; 8]>;

/// Minimum bucket count a table is ever allocated or rehashed to.
pub const MIN_BUCKETS: usize = 128;

/// Default load percentage threshold that triggers a rehash.
pub const DEFAULT_LOAD_PCT: u32 = 70;

/// `sx = ceil(log2(nbuckets)/8) - 1`, `sy = max(1, 4*sx - 1)`,
/// `sz = ceil(log2(nbuckets)/2)`.
fn hash_params(nbuckets: usize) -> (u32, u32, u32) {
    debug_assert!(nbuckets.is_power_of_two());
    let bits = nbuckets.trailing_zeros() as i64;
    let ceil_div = |a: i64, b: i64| (a + b - 1) / b;
    let sx = (ceil_div(bits, 8) - 1).max(0);
    let sy = (4 * sx - 1).max(1);
    let sz = ceil_div(bits, 2);
    (sx as u32, sy as u32, sz as u32)
}

#[inline]
fn hash_slot(packed: u64, sx: u32, sy: u32, sz: u32, nbuckets: usize) -> usize {
    let mut h = packed;
    h = h.wrapping_add(h.wrapping_shl(sx));
    h ^= h.wrapping_shr(sy);
    h = h.wrapping_add(h.wrapping_shl(sz));
    (h % nbuckets as u64) as usize
}

/// A sparse N-mode tensor stored as a HaCOO hash table over ALTO-packed
/// keys.
#[derive(Debug, Clone)]
pub struct Tensor {
    dims: Vec<u32>,
    masks: ModeMasks,
    buckets: Vec<Bucket>,
    nnz: usize,
    load_pct: u32,
    sx: u32,
    sy: u32,
    sz: u32,
}

impl Tensor {
    /// Builds an empty tensor over `dims` using the given ALTO pack/mode
    /// order, with `nbuckets` rounded up to a power of two no smaller than
    /// [`MIN_BUCKETS`].
    pub fn new(
        dims: Vec<u32>,
        pack_order: PackOrder,
        mode_order: ModeOrder,
        load_pct: u32,
    ) -> Result<Tensor, HacooError> {
        let masks = alto::build_masks(&dims, pack_order, mode_order)?;
        let nbuckets = MIN_BUCKETS;
        let (sx, sy, sz) = hash_params(nbuckets);
        Ok(Tensor {
            dims,
            masks,
            buckets: vec![Bucket::new(); nbuckets],
            nnz: 0,
            load_pct,
            sx,
            sy,
            sz,
        })
    }

    /// Convenience constructor matching the original library's defaults
    /// (LSB-first packing, shortest-mode-first ordering, 70% load).
    pub fn with_defaults(dims: Vec<u32>) -> Result<Tensor, HacooError> {
        Tensor::new(dims, PackOrder::LsbFirst, ModeOrder::ShortFirst, DEFAULT_LOAD_PCT)
    }

    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[u32] {
        &self.dims
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    pub fn nbuckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn mode_masks(&self) -> &ModeMasks {
        &self.masks
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    fn check_coord(&self, coord: &[u32]) -> Result<(), HacooError> {
        if coord.len() != self.dims.len() {
            return Err(HacooError::RankMismatch {
                got: coord.len(),
                expected: self.dims.len(),
            });
        }
        for (&c, &d) in coord.iter().zip(self.dims.iter()) {
            if c >= d {
                return Err(HacooError::OutOfBounds {
                    coord: coord.to_vec(),
                    dims: self.dims.clone(),
                });
            }
        }
        Ok(())
    }

    /// Packs `coord`, finds-or-appends in the target bucket, then rehashes
    /// if the load ratio now exceeds `load_pct`.
    pub fn set(&mut self, coord: &[u32], value: f64) -> Result<(), HacooError> {
        self.check_coord(coord)?;
        let packed = alto::pack_index(coord, &self.masks);
        let slot = hash_slot(packed, self.sx, self.sy, self.sz, self.buckets.len());

        let bucket = &mut self.buckets[slot];
        match bucket.find(packed) {
            Some(idx) => bucket.set_value(idx, value),
            None => {
                bucket.push(packed, value);
                self.nnz += 1;
            }
        }

        if self.exceeds_load() {
            self.rehash()?;
        }
        Ok(())
    }

    /// Returns 0.0 for any coordinate never assigned.
    pub fn get(&self, coord: &[u32]) -> Result<f64, HacooError> {
        self.check_coord(coord)?;
        let packed = alto::pack_index(coord, &self.masks);
        let slot = hash_slot(packed, self.sx, self.sy, self.sz, self.buckets.len());
        Ok(self
            .buckets[slot]
            .find(packed)
            .map(|idx| self.buckets[slot].get(idx).1)
            .unwrap_or(0.0))
    }

    /// Whether `nnz*100/nbuckets > load_pct` holds, checked by cross-
    /// multiplication (`nnz*100 > load_pct*nbuckets`) rather than integer
    /// division, so the truncated quotient can't mask a load just over the
    /// threshold (e.g. 90/128 = 70.3% truncates to 70, which would compare
    /// equal-not-greater against `load_pct=70` under naive integer
    /// division).
    fn exceeds_load(&self) -> bool {
        self.nnz as u64 * 100 > self.load_pct as u64 * self.buckets.len() as u64
    }

    /// Transactional rehash to 2x buckets: the new bucket array is built
    /// completely before it replaces the old one, so a failure to grow
    /// leaves the table in its pre-call state. Masks never change — only
    /// packed keys are re-hashed, not re-derived from coordinates.
    pub fn rehash(&mut self) -> Result<(), HacooError> {
        let new_nbuckets = self
            .buckets
            .len()
            .checked_mul(2)
            .ok_or(HacooError::Allocation {
                requested: usize::MAX,
            })?;
        let (sx, sy, sz) = hash_params(new_nbuckets);

        let mut new_buckets = vec![Bucket::new(); new_nbuckets];
        for bucket in &self.buckets {
            for &(packed, value) in bucket.iter() {
                let slot = hash_slot(packed, sx, sy, sz, new_nbuckets);
                new_buckets[slot].push(packed, value);
            }
        }

        // Swap in only after the new table is fully built (transactional).
        self.buckets = new_buckets;
        self.sx = sx;
        self.sy = sy;
        self.sz = sz;
        Ok(())
    }

    /// Visits every (packed_index, value) pair exactly once, in
    /// unspecified order.
    pub fn iterate(&self, mut f: impl FnMut(u64, f64)) {
        for bucket in &self.buckets {
            for &(packed, value) in bucket.iter() {
                f(packed, value);
            }
        }
    }

    /// Unpacks every stored entry's coordinate alongside its value.
    pub fn iterate_coords(&self, mut f: impl FnMut(Vec<u32>, f64)) {
        let mut coord: Coord = smallvec::smallvec![0u32; self.dims.len()];
        for bucket in &self.buckets {
            for &(packed, value) in bucket.iter() {
                alto::unpack_index(packed, &self.masks, &mut coord);
                f(coord.to_vec(), value);
            }
        }
    }

    /// Frobenius norm of the tensor's nonzeros (`hacoo.cpp::frobenius_norm`).
    pub fn frobenius_norm(&self) -> f64 {
        let mut sum = 0.0;
        self.iterate(|_, v| sum += v * v);
        sum.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_round_trip() {
        let mut t = Tensor::with_defaults(vec![4, 4, 4]).unwrap();
        t.set(&[0, 0, 0], 1.0).unwrap();
        t.set(&[3, 3, 3], 2.5).unwrap();
        t.set(&[1, 2, 3], -1.0).unwrap();

        assert_eq!(t.get(&[0, 0, 0]).unwrap(), 1.0);
        assert_eq!(t.get(&[3, 3, 3]).unwrap(), 2.5);
        assert_eq!(t.get(&[1, 2, 3]).unwrap(), -1.0);
        assert_eq!(t.get(&[2, 2, 2]).unwrap(), 0.0);
        assert_eq!(t.nnz(), 3);
    }

    #[test]
    fn overwrite_does_not_change_nnz() {
        let mut t = Tensor::with_defaults(vec![8, 8]).unwrap();
        t.set(&[1, 1], 1.0).unwrap();
        t.set(&[1, 1], 2.0).unwrap();
        assert_eq!(t.nnz(), 1);
        assert_eq!(t.get(&[1, 1]).unwrap(), 2.0);
    }

    #[test]
    fn rehash_trigger_preserves_entries() {
        let mut t = Tensor::new(vec![16, 16, 16], PackOrder::LsbFirst, ModeOrder::ShortFirst, 70).unwrap();
        assert_eq!(t.nbuckets(), 128);

        let mut coords = Vec::new();
        let mut v = 0;
        'outer: for i in 0..16u32 {
            for j in 0..16u32 {
                for k in 0..16u32 {
                    if coords.len() == 90 {
                        break 'outer;
                    }
                    coords.push([i, j, k]);
                    v += 1;
                }
            }
        }
        assert_eq!(v, 90);

        for (idx, c) in coords.iter().enumerate() {
            t.set(c, idx as f64 + 1.0).unwrap();
        }

        assert_eq!(t.nbuckets(), 256);
        assert_eq!(t.nnz(), 90);
        for (idx, c) in coords.iter().enumerate() {
            assert_eq!(t.get(c).unwrap(), idx as f64 + 1.0);
        }
    }

    #[test]
    fn rank_mismatch_is_rejected() {
        let mut t = Tensor::with_defaults(vec![2, 2]).unwrap();
        assert!(t.set(&[0, 0, 0], 1.0).is_err());
        assert!(t.get(&[0]).is_err());
    }

    #[test]
    fn out_of_bounds_coord_is_rejected() {
        let mut t = Tensor::with_defaults(vec![2, 2]).unwrap();
        assert!(t.set(&[2, 0], 1.0).is_err());
    }

    #[test]
    fn frobenius_norm_matches_manual_sum() {
        let mut t = Tensor::with_defaults(vec![4, 4]).unwrap();
        t.set(&[0, 0], 3.0).unwrap();
        t.set(&[1, 1], 4.0).unwrap();
        assert!((t.frobenius_norm() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn iterate_visits_every_entry_once() {
        let mut t = Tensor::with_defaults(vec![5, 5]).unwrap();
        for i in 0..5u32 {
            t.set(&[i, i], i as f64).unwrap();
        }
        let mut seen = 0;
        let mut sum = 0.0;
        t.iterate(|_, v| {
            seen += 1;
            sum += v;
        });
        assert_eq!(seen, 5);
        assert_eq!(sum, 0.0 + 1.0 + 2.0 + 3.0 + 4.0);
    }
}
