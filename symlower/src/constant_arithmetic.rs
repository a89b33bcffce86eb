// SPDX-License-Identifier: Apache-2.0

//! Magic constants for strength-reducing multiplication and division by
//! values known at lowering time.
//!
//! Division follows Granlund and Montgomery, "Division by Invariant Integers
//! using Multiplication" (PLDI 1994), figures 4.1 and 5.1, specialized to
//! 32-bit operands.

/// Splits `x` into `(add, sub)` such that `add - sub == x` (mod 2^64), where
/// every run of ones in `x` costs at most one bit in each of `add` and `sub`.
pub fn compute_mult_constants64(x: u64) -> (u64, u64) {
    let mut add = 0u64;
    let mut sub = 0u64;
    let mut x = x;
    while x != 0 {
        // Isolate the lowest run of ones, bits [low, high).
        let low = x.trailing_zeros();
        let lowbit = 1u64 << low;
        let p = x.wrapping_add(lowbit);
        let q = p & p.wrapping_neg();
        let high = if q == 0 { 64 } else { q.trailing_zeros() };

        if high == low + 1 {
            add |= lowbit;
        } else {
            // A lone bit just below this run turns +2^(low-1) - 2^low into
            // -2^(low-1).
            if low > 0 && add & (lowbit >> 1) != 0 {
                add ^= lowbit >> 1;
                sub ^= lowbit >> 1;
            } else {
                sub |= lowbit;
            }
            if high != 64 {
                add |= 1u64 << high;
            }
        }
        x = p ^ q;
    }
    debug_assert_eq!(add & sub, 0);
    (add, sub)
}

/// `ceil(log2(d))` for `d >= 1`.
fn ceil_log2(d: u32) -> u32 {
    debug_assert!(d != 0);
    32 - (d - 1).leading_zeros()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UDivConstants {
    pub mprime: u32,
    pub shift1: u32,
    pub shift2: u32,
}

/// Constants for `n / d` as
/// `t1 = mulhi(mprime, n); q = (((n - t1) >> shift1) + t1) >> shift2`.
pub fn compute_udiv_constants32(d: u32) -> UDivConstants {
    assert!(d != 0, "no reciprocal for a zero divisor");
    let l = ceil_log2(d);
    let numerator = (1u128 << 32) * ((1u128 << l) - d as u128);
    let mprime = numerator / d as u128 + 1;
    debug_assert!(mprime <= u32::MAX as u128);
    UDivConstants {
        mprime: mprime as u32,
        shift1: l.min(1),
        shift2: l.saturating_sub(1),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SDivConstants {
    pub mprime: i32,
    /// `-1` for a negative divisor, else `0`.
    pub dsign: i32,
    pub shift_post: u32,
}

/// Constants for truncating signed `n / d` as
/// `q0 = n + mulhs(mprime, n); q0 = (q0 >>s shift_post) - xsign(n);
/// q = (q0 ^ dsign) - dsign`.
pub fn compute_sdiv_constants32(d: i32) -> SDivConstants {
    assert!(d != 0, "no reciprocal for a zero divisor");
    let abs_d = d.unsigned_abs();
    let l = ceil_log2(abs_d).max(1);
    let m = 1 + (1u64 << (32 + l - 1)) / abs_d as u64;
    let mprime = (m as i64 - (1i64 << 32)) as i32;
    SDivConstants {
        mprime,
        dsign: if d < 0 { -1 } else { 0 },
        shift_post: l - 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;
    use test_case::test_case;

    fn udiv_via(n: u32, c: &UDivConstants) -> u32 {
        let t1 = ((n as u64 * c.mprime as u64) >> 32) as u32;
        ((n.wrapping_sub(t1) >> c.shift1).wrapping_add(t1)) >> c.shift2
    }

    fn sdiv_via(n: i32, c: &SDivConstants) -> i32 {
        let mulsh = ((n as i64 * c.mprime as i64) >> 32) as i32;
        let q0 = n.wrapping_add(mulsh);
        let q0 = (q0 >> c.shift_post).wrapping_sub(n >> 31);
        (q0 ^ c.dsign).wrapping_sub(c.dsign)
    }

    fn sample_dividends() -> Vec<u32> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x5eed);
        let mut values: Vec<u32> = vec![
            0,
            1,
            2,
            3,
            99,
            100,
            101,
            0x7fff_ffff,
            0x8000_0000,
            0x8000_0001,
            0xffff_fffe,
            0xffff_ffff,
        ];
        values.extend((0..2000).map(|_| rng.gen::<u32>()));
        values
    }

    #[test_case(0, 0, 0)]
    #[test_case(1, 1, 0)]
    #[test_case(0b0111, 0b1000, 0b0001)]
    #[test_case(0b1011, 0b1100, 0b0001)]
    #[test_case(u64::MAX, 0, 1)]
    fn test_mult_constants_examples(x: u64, add: u64, sub: u64) {
        assert_eq!(compute_mult_constants64(x), (add, sub));
    }

    #[test]
    fn test_mult_constants_reconstruct_value() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let specials = [3u64, 7, 10, 100, 0x5555_5555_5555_5555, 1 << 63, 0xffff_0000_ffff];
        for x in specials.into_iter().chain((0..5000).map(|_| rng.gen::<u64>())) {
            let (add, sub) = compute_mult_constants64(x);
            assert_eq!(add.wrapping_sub(sub), x, "x = {:#x}", x);
            assert_eq!(add & sub, 0);
        }
    }

    #[test]
    fn test_mult_constants_are_sparse_for_runs() {
        let (add, sub) = compute_mult_constants64(0x00ff_ff00);
        assert_eq!(add.count_ones() + sub.count_ones(), 2);
    }

    #[test_case(1)]
    #[test_case(2)]
    #[test_case(3)]
    #[test_case(7)]
    #[test_case(10)]
    #[test_case(16)]
    #[test_case(100)]
    #[test_case(641)]
    #[test_case(0x8000_0000)]
    #[test_case(0x8000_0001)]
    #[test_case(0xffff_ffff)]
    fn test_udiv_constants_match_native(d: u32) {
        let c = compute_udiv_constants32(d);
        for n in sample_dividends() {
            assert_eq!(udiv_via(n, &c), n / d, "n = {}, d = {}", n, d);
        }
    }

    #[test_case(1)]
    #[test_case(2)]
    #[test_case(3)]
    #[test_case(7)]
    #[test_case(16)]
    #[test_case(100)]
    #[test_case(-1)]
    #[test_case(-3)]
    #[test_case(-16)]
    #[test_case(i32::MAX)]
    #[test_case(i32::MIN)]
    fn test_sdiv_constants_match_native(d: i32) {
        let c = compute_sdiv_constants32(d);
        for n in sample_dividends() {
            let n = n as i32;
            assert_eq!(sdiv_via(n, &c), n.wrapping_div(d), "n = {}, d = {}", n, d);
        }
    }

    #[test]
    fn test_udiv_constants_for_power_of_two() {
        assert_eq!(
            compute_udiv_constants32(0x8000_0000),
            UDivConstants {
                mprime: 1,
                shift1: 1,
                shift2: 30
            }
        );
    }

    #[test]
    #[should_panic(expected = "zero divisor")]
    fn test_udiv_constants_reject_zero() {
        compute_udiv_constants32(0);
    }
}
