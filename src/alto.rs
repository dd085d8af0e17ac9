//! ALTO packer — mask construction by dilation & shifting, plus
//! pack/unpack over the masks it produces.

use crate::bits::{deposit, extract};
use crate::error::AltoError;

/// Bit order within the packed word: low bits first or high bits first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackOrder {
    LsbFirst,
    MsbFirst,
}

/// Mode visitation order within each dilation "level".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeOrder {
    ShortFirst,
    LongFirst,
    Natural,
}

/// The per-mode bit masks for a tensor's dims, plus their union.
#[derive(Debug, Clone)]
pub struct ModeMasks {
    pub masks: Vec<u64>,
    pub alto_mask: u64,
    pub total_bits: u32,
}

/// `b_k = ceil(log2(max(2, dim_k)))`, matching `alto.cpp`'s
/// `clz`-based bit-width computation.
fn mode_bit_width(dim: u32) -> u32 {
    let m = dim.max(2) - 1;
    (u32::BITS - m.leading_zeros()).max(1)
}

/// Builds the mode mask set for `dims` under the given pack/mode order.
/// Returns [`AltoError::WidthOverflow`] if the total bit width required
/// exceeds 64.
pub fn build_masks(dims: &[u32], pack_order: PackOrder, mode_order: ModeOrder) -> Result<ModeMasks, AltoError> {
    let nmode = dims.len();
    if nmode == 0 {
        return Err(AltoError::NoModes);
    }

    let mut mode_bits: Vec<(usize, u32)> = dims
        .iter()
        .enumerate()
        .map(|(mode, &d)| (mode, mode_bit_width(d)))
        .collect();

    let total_bits: u32 = mode_bits.iter().map(|&(_, b)| b).sum();
    if total_bits > 64 {
        return Err(AltoError::WidthOverflow {
            total: total_bits,
            bits: mode_bits.iter().map(|&(_, b)| b).collect(),
        });
    }

    match mode_order {
        ModeOrder::ShortFirst => mode_bits.sort_by_key(|&(_, b)| b),
        ModeOrder::LongFirst => mode_bits.sort_by_key(|&(_, b)| std::cmp::Reverse(b)),
        ModeOrder::Natural => {}
    }

    let max_bits = mode_bits.iter().map(|&(_, b)| b).max().unwrap_or(0);

    let mut masks = vec![0u64; nmode];
    let mut position: i64 = match pack_order {
        PackOrder::LsbFirst => 0,
        PackOrder::MsbFirst => total_bits as i64 - 1,
    };
    let step: i64 = match pack_order {
        PackOrder::LsbFirst => 1,
        PackOrder::MsbFirst => -1,
    };

    let mut level = 0u32;
    loop {
        let mut wrote_any = false;
        for &(mode, bits) in &mode_bits {
            if level < bits {
                masks[mode] |= 1u64 << position;
                position += step;
                wrote_any = true;
            }
        }
        level += 1;
        if !wrote_any {
            break;
        }
    }

    debug_assert_eq!(level, max_bits + 1);
    match pack_order {
        PackOrder::LsbFirst => debug_assert_eq!(position, total_bits as i64),
        PackOrder::MsbFirst => debug_assert_eq!(position, -1),
    }

    let alto_mask = masks.iter().fold(0u64, |acc, &m| acc | m);
    Ok(ModeMasks {
        masks,
        alto_mask,
        total_bits,
    })
}

/// `pack(coord, masks) = union_k deposit(coord[k], masks[k])`.
#[inline]
pub fn pack_index(coord: &[u32], masks: &ModeMasks) -> u64 {
    let mut packed = 0u64;
    for (k, &c) in coord.iter().enumerate() {
        packed |= deposit(c as u64, masks.masks[k]);
    }
    packed
}

/// `unpack(packed, masks)[k] = extract(packed, masks[k])`.
#[inline]
pub fn unpack_index(packed: u64, masks: &ModeMasks, out: &mut [u32]) {
    for (k, slot) in out.iter_mut().enumerate() {
        *slot = extract(packed, masks.masks[k]) as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips_three_mode() {
        let masks = build_masks(&[3, 3, 3], PackOrder::LsbFirst, ModeOrder::ShortFirst).unwrap();
        assert_eq!(masks.alto_mask.count_ones(), 6);
        for &m in &masks.masks {
            assert_eq!(m.count_ones(), 2);
        }

        let coord = [2u32, 1, 0];
        let packed = pack_index(&coord, &masks);
        let mut out = [0u32; 3];
        unpack_index(packed, &masks, &mut out);
        assert_eq!(out, coord);
    }

    #[test]
    fn masks_are_pairwise_disjoint() {
        let masks = build_masks(&[5, 17, 2, 9], PackOrder::LsbFirst, ModeOrder::ShortFirst).unwrap();
        for i in 0..masks.masks.len() {
            for j in (i + 1)..masks.masks.len() {
                assert_eq!(masks.masks[i] & masks.masks[j], 0);
            }
        }
        let union: u64 = masks.masks.iter().fold(0, |a, &m| a | m);
        assert_eq!(union, masks.alto_mask);
    }

    #[test]
    fn round_trip_holds_for_all_valid_coords_small() {
        let dims = [4u32, 3, 5];
        let masks = build_masks(&dims, PackOrder::LsbFirst, ModeOrder::ShortFirst).unwrap();
        for i in 0..dims[0] {
            for j in 0..dims[1] {
                for k in 0..dims[2] {
                    let coord = [i, j, k];
                    let packed = pack_index(&coord, &masks);
                    let mut out = [0u32; 3];
                    unpack_index(packed, &masks, &mut out);
                    assert_eq!(out, coord);
                }
            }
        }
    }

    #[test]
    fn msb_first_and_long_first_also_round_trip() {
        let dims = [6u32, 2, 10, 3];
        let masks = build_masks(&dims, PackOrder::MsbFirst, ModeOrder::LongFirst).unwrap();
        let coord = [5u32, 1, 7, 2];
        let packed = pack_index(&coord, &masks);
        let mut out = [0u32; 4];
        unpack_index(packed, &masks, &mut out);
        assert_eq!(out, coord);
    }

    #[test]
    fn width_overflow_is_reported_not_panicked() {
        let dims = vec![1u32 << 20; 4]; // ~20 bits/mode * 4 = 80 > 64
        let err = build_masks(&dims, PackOrder::LsbFirst, ModeOrder::ShortFirst).unwrap_err();
        assert!(matches!(err, AltoError::WidthOverflow { .. }));
    }

    #[test]
    fn dim_one_mode_gets_minimum_one_bit() {
        // dim_k=1 (degenerate mode) still gets >=1 bit per the bit-width formula.
        let masks = build_masks(&[1, 4], PackOrder::LsbFirst, ModeOrder::ShortFirst).unwrap();
        assert_eq!(masks.masks[0].count_ones(), 1);
    }
}
