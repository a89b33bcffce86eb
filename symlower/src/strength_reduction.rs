// SPDX-License-Identifier: Apache-2.0

//! Rewrites of shifts, multiplies and divides by known amounts into cheaper
//! bit-vector operations.

use crate::constant_arithmetic::{
    compute_mult_constants64, compute_sdiv_constants32, compute_udiv_constants32,
};
use crate::term_algebra::{BvBinaryOp, BvCompareOp, SortedTerm, TermAlgebra};

pub fn shl_by_constant<S: TermAlgebra>(
    backend: &mut S,
    value: &SortedTerm<S::Term>,
    shift: u64,
) -> SortedTerm<S::Term> {
    let width = value.bitvec_width();
    if shift == 0 {
        return value.clone();
    }
    if shift >= width as u64 {
        return backend.bv_zero(width);
    }
    let shift = shift as usize;
    let kept = backend.extract(value, width - 1 - shift, 0);
    let fill = backend.bv_zero(shift);
    backend.concat(&kept, &fill)
}

pub fn lshr_by_constant<S: TermAlgebra>(
    backend: &mut S,
    value: &SortedTerm<S::Term>,
    shift: u64,
) -> SortedTerm<S::Term> {
    let width = value.bitvec_width();
    if shift == 0 {
        return value.clone();
    }
    if shift >= width as u64 {
        return backend.bv_zero(width);
    }
    let shift = shift as usize;
    let fill = backend.bv_zero(shift);
    let kept = backend.extract(value, width - 1, shift);
    backend.concat(&fill, &kept)
}

/// Arithmetic right shift; shifting by the full width or more yields zero.
pub fn ashr_by_constant<S: TermAlgebra>(
    backend: &mut S,
    value: &SortedTerm<S::Term>,
    shift: u64,
) -> SortedTerm<S::Term> {
    let width = value.bitvec_width();
    if shift == 0 {
        return value.clone();
    }
    if shift >= width as u64 {
        return backend.bv_zero(width);
    }
    let negative = crate::coercion::bool_extract(backend, value, width - 1);
    let ones = backend.bv_all_ones(shift as usize);
    let kept = backend.extract(value, width - 1, shift as usize);
    let sign_filled = backend.concat(&ones, &kept);
    let zero_filled = lshr_by_constant(backend, value, shift);
    backend.ite(&negative, &sign_filled, &zero_filled)
}

/// Native shift by a symbolic amount, forced to zero when the amount is not
/// less than the width.
pub fn shift_by_variable<S: TermAlgebra>(
    backend: &mut S,
    op: BvBinaryOp,
    value: &SortedTerm<S::Term>,
    shift: &SortedTerm<S::Term>,
) -> SortedTerm<S::Term> {
    debug_assert!(matches!(
        op,
        BvBinaryOp::Shl | BvBinaryOp::LShr | BvBinaryOp::AShr
    ));
    let width = value.bitvec_width();
    let shifted = backend.bv_binary(op, value, shift);
    let limit = backend.bv_u64(width, width as u64);
    let in_range = backend.bv_compare(BvCompareOp::Ult, shift, &limit);
    let zero = backend.bv_zero(width);
    backend.ite(&in_range, &shifted, &zero)
}

/// `value * multiplier` as a sum and difference of shifted copies of
/// `value`.
pub fn mul_by_constant<S: TermAlgebra>(
    backend: &mut S,
    value: &SortedTerm<S::Term>,
    multiplier: u64,
) -> SortedTerm<S::Term> {
    let width = value.bitvec_width();
    if multiplier == 0 {
        return backend.bv_zero(width);
    }
    if multiplier == 1 {
        return value.clone();
    }
    let (mut add, mut sub) = compute_mult_constants64(multiplier);
    if width < 64 {
        let mask = (1u64 << width) - 1;
        add &= mask;
        sub &= mask;
    }

    let mut result: Option<SortedTerm<S::Term>> = None;
    for bit in (0..64).rev() {
        let adds = (add >> bit) & 1 == 1;
        let subs = (sub >> bit) & 1 == 1;
        if !adds && !subs {
            continue;
        }
        assert!(!(adds && subs), "invalid multiplication constants");
        let shifted = shl_by_constant(backend, value, bit);
        result = Some(match (result, adds) {
            (Some(acc), true) => backend.bv_add(&acc, &shifted),
            (Some(acc), false) => backend.bv_sub(&acc, &shifted),
            (None, true) => shifted,
            (None, false) => {
                let zero = backend.bv_zero(width);
                backend.bv_sub(&zero, &shifted)
            }
        });
    }
    match result {
        Some(result) => result,
        None => backend.bv_zero(width),
    }
}

/// Unsigned 32-bit `dividend / divisor` without a division operator.
pub fn udiv_by_constant<S: TermAlgebra>(
    backend: &mut S,
    dividend: &SortedTerm<S::Term>,
    divisor: u32,
) -> SortedTerm<S::Term> {
    assert_eq!(
        dividend.bitvec_width(),
        32,
        "reciprocal division only handles 32-bit dividends"
    );
    let constants = compute_udiv_constants32(divisor);

    let wide = backend.zero_extend(dividend, 32);
    let product = mul_by_constant(backend, &wide, constants.mprime as u64);
    let t1 = backend.extract(&product, 63, 32);

    let difference = backend.bv_sub(dividend, &t1);
    let halved = lshr_by_constant(backend, &difference, constants.shift1 as u64);
    let sum = backend.bv_add(&halved, &t1);
    lshr_by_constant(backend, &sum, constants.shift2 as u64)
}

/// Signed, truncating 32-bit `dividend / divisor` without a division
/// operator.
pub fn sdiv_by_constant<S: TermAlgebra>(
    backend: &mut S,
    dividend: &SortedTerm<S::Term>,
    divisor: i32,
) -> SortedTerm<S::Term> {
    assert_eq!(
        dividend.bitvec_width(),
        32,
        "reciprocal division only handles 32-bit dividends"
    );
    let constants = compute_sdiv_constants32(divisor);

    let wide = backend.sign_extend(dividend, 32);
    let product = mul_by_constant(backend, &wide, constants.mprime as i64 as u64);
    let mulsh = backend.extract(&product, 63, 32);
    let q0 = backend.bv_add(dividend, &mulsh);
    let q0 = ashr_by_constant(backend, &q0, constants.shift_post as u64);

    let negative = crate::coercion::bool_extract(backend, dividend, 31);
    let minus_one = backend.bv_all_ones(32);
    let zero = backend.bv_zero(32);
    let xsign = backend.ite(&negative, &minus_one, &zero);
    let q0 = backend.bv_sub(&q0, &xsign);

    let dsign = backend.bv_u64(32, constants.dsign as u32 as u64);
    let flipped = backend.bv_binary(BvBinaryOp::Xor, &q0, &dsign);
    backend.bv_sub(&flipped, &dsign)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::eval::{evaluate, Model};
    use crate::backend::term_graph::{TermGraph, TermGraphOptions, TermId};
    use crate::term_algebra::Sort;
    use pretty_assertions::assert_eq;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;
    use test_case::test_case;

    struct Harness {
        graph: TermGraph,
        input: SortedTerm<TermId>,
        name: String,
    }

    impl Harness {
        fn new(width: usize) -> Self {
            let mut graph = TermGraph::new(TermGraphOptions::z3_like());
            let input = graph.declare_fresh("n", Sort::BitVec(width)).unwrap();
            let name = graph.symbol_name(input.rep).unwrap().to_string();
            Harness { graph, input, name }
        }

        fn eval(&self, term: &SortedTerm<TermId>, value: u64) -> u64 {
            let mut model = Model::new();
            model.set_bv(&self.name, self.input.bitvec_width(), value);
            evaluate(&self.graph, &model, term.rep)
                .unwrap()
                .as_u64()
                .unwrap()
        }
    }

    fn samples() -> Vec<u32> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let mut values = vec![0, 1, 2, 9, 10, 11, 0x7fff_ffff, 0x8000_0000, 0xffff_ffff];
        values.extend((0..200).map(|_| rng.gen::<u32>()));
        values
    }

    #[test_case(0)]
    #[test_case(1)]
    #[test_case(3)]
    #[test_case(7)]
    #[test_case(10)]
    #[test_case(0xffff_ffff)]
    #[test_case(0x8000_0001)]
    fn test_mul_by_constant(multiplier: u64) {
        let mut h = Harness::new(32);
        let input = h.input.clone();
        let product = mul_by_constant(&mut h.graph, &input, multiplier);
        for n in samples() {
            assert_eq!(
                h.eval(&product, n as u64),
                (n as u64).wrapping_mul(multiplier) & 0xffff_ffff
            );
        }
    }

    #[test_case(1)]
    #[test_case(3)]
    #[test_case(7)]
    #[test_case(10)]
    #[test_case(100)]
    #[test_case(0x8000_0000)]
    fn test_udiv_by_constant(divisor: u32) {
        let mut h = Harness::new(32);
        let input = h.input.clone();
        let quotient = udiv_by_constant(&mut h.graph, &input, divisor);
        for n in samples() {
            assert_eq!(h.eval(&quotient, n as u64), (n / divisor) as u64);
        }
    }

    #[test_case(2)]
    #[test_case(3)]
    #[test_case(7)]
    #[test_case(100)]
    #[test_case(-3)]
    #[test_case(-16)]
    #[test_case(i32::MIN)]
    fn test_sdiv_by_constant(divisor: i32) {
        let mut h = Harness::new(32);
        let input = h.input.clone();
        let quotient = sdiv_by_constant(&mut h.graph, &input, divisor);
        for n in samples() {
            let expected = (n as i32).wrapping_div(divisor) as u32 as u64;
            assert_eq!(h.eval(&quotient, n as u64), expected, "n = {}", n as i32);
        }
    }

    #[test_case(0)]
    #[test_case(1)]
    #[test_case(5)]
    #[test_case(7)]
    #[test_case(8)]
    #[test_case(200)]
    fn test_constant_shifts(shift: u64) {
        let mut h = Harness::new(8);
        let input = h.input.clone();
        let shl = shl_by_constant(&mut h.graph, &input, shift);
        let lshr = lshr_by_constant(&mut h.graph, &input, shift);
        let ashr = ashr_by_constant(&mut h.graph, &input, shift);
        for n in [0u64, 1, 0x5a, 0x80, 0xff] {
            let (shl_expected, lshr_expected, ashr_expected) = if shift >= 8 {
                (0, 0, 0)
            } else {
                (
                    (n << shift) & 0xff,
                    n >> shift,
                    ((n as u8 as i8) >> shift) as u8 as u64,
                )
            };
            assert_eq!(h.eval(&shl, n), shl_expected);
            assert_eq!(h.eval(&lshr, n), lshr_expected);
            assert_eq!(h.eval(&ashr, n), ashr_expected);
        }
    }

    #[test]
    fn test_variable_shift_overshift_is_zero() {
        let mut h = Harness::new(8);
        let input = h.input.clone();
        let amount = h.graph.bv_u64(8, 9);
        let shifted = shift_by_variable(&mut h.graph, BvBinaryOp::AShr, &input, &amount);
        assert_eq!(h.eval(&shifted, 0x80), 0);
        let amount = h.graph.bv_u64(8, 3);
        let shifted = shift_by_variable(&mut h.graph, BvBinaryOp::AShr, &input, &amount);
        assert_eq!(h.eval(&shifted, 0x80), 0xf0);
    }
}
