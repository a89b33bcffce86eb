// SPDX-License-Identifier: Apache-2.0

//! Conversions between predicates, bit-vectors and floats.
//!
//! The IR is untyped bits: a 32-bit expression may be lowered to a bit-vector
//! term or to a float term depending on which operator produced it. Every
//! operator that consumes an operand asks for the sort it needs through this
//! module, which is the only place that knows how each backend bridges sorts.

use std::hash::Hash;
use std::io;

use ahash::AHashMap;

use crate::expr::FloatFormat;
use crate::term_algebra::{FpClass, Sort, SortedTerm, TermAlgebra};

/// Predicates that must hold for lowered terms to mean what the IR means.
///
/// They accumulate across lowering calls; only the owner clears them. The
/// list also remembers every float/bit-vector conversion made so far, since
/// a conversion is only meaningful while the constraints it pushed are kept.
/// Clearing or taking the list forgets the conversions with it.
#[derive(Debug, Clone)]
pub struct SideConstraints<Term> {
    constraints: Vec<SortedTerm<Term>>,
    float_bits: AHashMap<Term, SortedTerm<Term>>,
    bits_float: AHashMap<Term, SortedTerm<Term>>,
}

impl<Term: Clone + Eq + Hash> SideConstraints<Term> {
    pub fn new() -> Self {
        SideConstraints {
            constraints: Vec::new(),
            float_bits: AHashMap::new(),
            bits_float: AHashMap::new(),
        }
    }

    pub fn push(&mut self, predicate: SortedTerm<Term>) {
        self.constraints.push(predicate);
    }

    pub fn iter(&self) -> impl Iterator<Item = &SortedTerm<Term>> {
        self.constraints.iter()
    }

    pub fn as_slice(&self) -> &[SortedTerm<Term>] {
        &self.constraints
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Number of float terms whose bit-vector form is remembered.
    pub fn converted_float_count(&self) -> usize {
        self.float_bits.len()
    }

    pub fn clear(&mut self) {
        self.constraints.clear();
        self.forget_conversions();
    }

    pub fn take(&mut self) -> Vec<SortedTerm<Term>> {
        self.forget_conversions();
        std::mem::take(&mut self.constraints)
    }

    fn forget_conversions(&mut self) {
        self.float_bits.clear();
        self.bits_float.clear();
    }
}

impl<Term: Clone + Eq + Hash> Default for SideConstraints<Term> {
    fn default() -> Self {
        Self::new()
    }
}

/// The sort the backend uses for predicates.
pub fn predicate_sort<S: TermAlgebra>(backend: &S) -> Sort {
    if backend.capabilities().boolean_sort {
        Sort::Bool
    } else {
        Sort::BitVec(1)
    }
}

pub fn to_predicate<S: TermAlgebra>(
    backend: &mut S,
    term: &SortedTerm<S::Term>,
) -> SortedTerm<S::Term> {
    match term.sort {
        Sort::Bool => term.clone(),
        Sort::BitVec(1) => {
            if backend.capabilities().boolean_sort {
                let one = backend.bv_one(1);
                backend.eq(term, &one)
            } else {
                term.clone()
            }
        }
        other => panic!("cannot use a term of sort {:?} as a predicate", other),
    }
}

/// Converts a predicate, bit-vector or float to a bit-vector holding the
/// same IR bits.
pub fn to_bitvector<S: TermAlgebra>(
    backend: &mut S,
    side: &mut SideConstraints<S::Term>,
    term: &SortedTerm<S::Term>,
) -> io::Result<SortedTerm<S::Term>> {
    match term.sort {
        Sort::BitVec(_) => Ok(term.clone()),
        Sort::Bool => {
            let one = backend.bv_one(1);
            let zero = backend.bv_zero(1);
            Ok(backend.ite(term, &one, &zero))
        }
        Sort::Float(_) => float_to_bits(backend, side, term),
        other => panic!("cannot convert a term of sort {:?} to a bit-vector", other),
    }
}

/// Reinterprets `width` bits as a float of the format that width denotes.
pub fn to_float<S: TermAlgebra>(
    backend: &mut S,
    side: &mut SideConstraints<S::Term>,
    term: &SortedTerm<S::Term>,
    width: usize,
) -> io::Result<SortedTerm<S::Term>> {
    let format = FloatFormat::for_width(width);
    if let Sort::Float(existing) = term.sort {
        assert_eq!(
            existing, format,
            "float of format {:?} used where a {}-bit float was expected",
            existing, width
        );
        return Ok(term.clone());
    }
    assert!(
        backend.capabilities().float_sort,
        "backend has no floating-point sort"
    );
    let bits = to_bitvector(backend, side, term)?;
    assert_eq!(
        bits.bitvec_width(),
        width,
        "{}-bit term reinterpreted as a {}-bit float",
        bits.bitvec_width(),
        width
    );
    if format == FloatFormat::X87_EXTENDED {
        if let Some(value) = side.bits_float.get(&bits.rep) {
            return Ok(value.clone());
        }
        let value = x87_bits_to_float(backend, side, &bits);
        side.bits_float.insert(bits.rep.clone(), value.clone());
        return Ok(value);
    }
    Ok(backend.fp_from_ieee_bits(&bits, format))
}

/// Bit `bit` of `bv` as a predicate.
pub fn bool_extract<S: TermAlgebra>(
    backend: &mut S,
    bv: &SortedTerm<S::Term>,
    bit: usize,
) -> SortedTerm<S::Term> {
    let single = backend.extract(bv, bit, bit);
    to_predicate(backend, &single)
}

/// Brings two operands of an equality or of the arms of an `ite` to a
/// common sort.
pub fn unify_for_equality<S: TermAlgebra>(
    backend: &mut S,
    side: &mut SideConstraints<S::Term>,
    lhs: &SortedTerm<S::Term>,
    rhs: &SortedTerm<S::Term>,
) -> io::Result<(SortedTerm<S::Term>, SortedTerm<S::Term>)> {
    if lhs.sort == rhs.sort {
        return Ok((lhs.clone(), rhs.clone()));
    }
    match (lhs.sort, rhs.sort) {
        (Sort::Bool, Sort::BitVec(1)) | (Sort::BitVec(1), Sort::Bool) => Ok((
            to_predicate(backend, lhs),
            to_predicate(backend, rhs),
        )),
        (Sort::Float(_), Sort::BitVec(_)) | (Sort::BitVec(_), Sort::Float(_)) => Ok((
            to_bitvector(backend, side, lhs)?,
            to_bitvector(backend, side, rhs)?,
        )),
        (a, b) => panic!("cannot unify sorts {:?} and {:?}", a, b),
    }
}

fn float_to_bits<S: TermAlgebra>(
    backend: &mut S,
    side: &mut SideConstraints<S::Term>,
    value: &SortedTerm<S::Term>,
) -> io::Result<SortedTerm<S::Term>> {
    if let Some(bits) = side.float_bits.get(&value.rep) {
        return Ok(bits.clone());
    }
    let bits = convert_float_to_bits(backend, side, value)?;
    side.float_bits.insert(value.rep.clone(), bits.clone());
    Ok(bits)
}

fn convert_float_to_bits<S: TermAlgebra>(
    backend: &mut S,
    side: &mut SideConstraints<S::Term>,
    value: &SortedTerm<S::Term>,
) -> io::Result<SortedTerm<S::Term>> {
    let format = value.float_format();
    let (sign, exponent, fraction) = if backend.capabilities().float_to_ieee_bits {
        let ieee = backend.fp_to_ieee_bits(value);
        if format != FloatFormat::X87_EXTENDED {
            return Ok(ieee);
        }
        let top = format.ieee_width() - 1;
        let fraction_bits = format.fraction_bits();
        (
            backend.extract(&ieee, top, top),
            backend.extract(&ieee, top - 1, fraction_bits),
            backend.extract(&ieee, fraction_bits - 1, 0),
        )
    } else {
        let sign = backend.declare_fresh("fp_sign", Sort::BitVec(1))?;
        let exponent = backend.declare_fresh("fp_exponent", Sort::BitVec(format.exponent_bits))?;
        let fraction = backend.declare_fresh("fp_fraction", Sort::BitVec(format.fraction_bits()))?;
        let rebuilt = backend.fp_from_parts(&sign, &exponent, &fraction);
        let defining = backend.eq(value, &rebuilt);
        side.push(defining);
        (sign, exponent, fraction)
    };

    let sign_exponent = backend.concat(&sign, &exponent);
    if format == FloatFormat::X87_EXTENDED {
        let integer_bit = backend.declare_fresh("x87_integer_bit", Sort::BitVec(1))?;
        let expected = explicit_integer_bit(backend, value);
        let defining = backend.eq(&integer_bit, &expected);
        side.push(defining);
        let low = backend.concat(&integer_bit, &fraction);
        return Ok(backend.concat(&sign_exponent, &low));
    }
    Ok(backend.concat(&sign_exponent, &fraction))
}

/// The x87 explicit integer bit implied by the class of `value`: clear for
/// zeros and subnormals, set otherwise.
fn explicit_integer_bit<S: TermAlgebra>(
    backend: &mut S,
    value: &SortedTerm<S::Term>,
) -> SortedTerm<S::Term> {
    let subnormal = backend.fp_classify(FpClass::Subnormal, value);
    let zero = backend.fp_classify(FpClass::Zero, value);
    let clear = backend.or(&subnormal, &zero);
    let bit_clear = backend.bv_zero(1);
    let bit_set = backend.bv_one(1);
    backend.ite(&clear, &bit_clear, &bit_set)
}

fn x87_bits_to_float<S: TermAlgebra>(
    backend: &mut S,
    side: &mut SideConstraints<S::Term>,
    bits: &SortedTerm<S::Term>,
) -> SortedTerm<S::Term> {
    let sign = backend.extract(bits, 79, 79);
    let exponent = backend.extract(bits, 78, 64);
    let integer_bit = backend.extract(bits, 63, 63);
    let fraction = backend.extract(bits, 62, 0);
    let value = backend.fp_from_parts(&sign, &exponent, &fraction);
    let expected = explicit_integer_bit(backend, &value);
    let consistent = backend.eq(&integer_bit, &expected);
    side.push(consistent);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::eval::{evaluate, Model};
    use crate::backend::term_graph::{TermGraph, TermGraphOptions, TermId};
    use crate::test_utils::init_logger;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn input(graph: &mut TermGraph, width: usize) -> (SortedTerm<TermId>, String) {
        let term = graph
            .declare_fresh("input", Sort::BitVec(width))
            .unwrap();
        let name = graph.symbol_name(term.rep).unwrap().to_string();
        (term, name)
    }

    /// Assigns `value` to the input, completes the fresh constants and
    /// returns the value of `result` plus whether every side constraint
    /// holds.
    fn run(
        graph: &TermGraph,
        side: &SideConstraints<TermId>,
        name: &str,
        width: usize,
        value: u128,
        result: &SortedTerm<TermId>,
    ) -> (u128, bool) {
        let mut model = Model::new();
        model.set_bv(name, width, value);
        model.define_from(graph, side.as_slice()).unwrap();
        let out = evaluate(graph, &model, result.rep).unwrap().as_u128().unwrap();
        let holds = side
            .iter()
            .all(|c| evaluate(graph, &model, c.rep).unwrap().is_true());
        (out, holds)
    }

    #[test]
    fn test_predicates_without_boolean_sort_are_bv1() {
        let mut graph = TermGraph::new(TermGraphOptions::boolector_like());
        let (bit, _) = input(&mut graph, 1);
        let p = to_predicate(&mut graph, &bit);
        assert_eq!(p, bit);
        let mut side = SideConstraints::new();
        assert_eq!(to_bitvector(&mut graph, &mut side, &p).unwrap(), bit);
        assert!(side.is_empty());
    }

    #[test]
    fn test_predicates_with_boolean_sort() {
        let mut graph = TermGraph::new(TermGraphOptions::z3_like());
        let (bit, name) = input(&mut graph, 1);
        let p = to_predicate(&mut graph, &bit);
        assert_eq!(p.sort, Sort::Bool);
        let mut side = SideConstraints::new();
        let back = to_bitvector(&mut graph, &mut side, &p).unwrap();
        assert_eq!(back.sort, Sort::BitVec(1));
        for v in [0u128, 1] {
            assert_eq!(run(&graph, &side, &name, 1, v, &back), (v, true));
        }
    }

    #[test]
    fn test_bool_extract_reads_one_bit() {
        let mut graph = TermGraph::new(TermGraphOptions::z3_like());
        let (byte, name) = input(&mut graph, 8);
        let p = bool_extract(&mut graph, &byte, 3);
        let mut model = Model::new();
        model.set_bv(&name, 8, 0b0000_1000u64);
        assert!(evaluate(&graph, &model, p.rep).unwrap().is_true());
        model.set_bv(&name, 8, 0b1111_0111u64);
        assert!(!evaluate(&graph, &model, p.rep).unwrap().is_true());
    }

    #[test_case(TermGraphOptions::z3_like(), 32, 0x3fc0_0000; "f32 native")]
    #[test_case(TermGraphOptions::bitwuzla_like(), 32, 0x3fc0_0000; "f32 fresh parts")]
    #[test_case(TermGraphOptions::bitwuzla_like(), 16, 0x8001; "f16 subnormal")]
    #[test_case(TermGraphOptions::z3_like(), 64, 0xc00c_0000_0000_0000; "f64 native")]
    #[test_case(TermGraphOptions::bitwuzla_like(), 64, 0x7ff0_0000_0000_0000; "f64 infinity")]
    #[test_case(TermGraphOptions::bitwuzla_like(), 128, 0x3fff_8000_0000_0000_0000_0000_0000_0001; "f128")]
    fn test_ieee_round_trip(options: TermGraphOptions, width: usize, value: u128) {
        init_logger();
        let mut graph = TermGraph::new(options);
        let mut side = SideConstraints::new();
        let (bits, name) = input(&mut graph, width);
        let f = to_float(&mut graph, &mut side, &bits, width).unwrap();
        assert_eq!(f.sort, Sort::Float(FloatFormat::for_width(width)));
        let back = to_bitvector(&mut graph, &mut side, &f).unwrap();
        assert_eq!(back.sort, Sort::BitVec(width));
        assert_eq!(run(&graph, &side, &name, width, value, &back), (value, true));
    }

    const X87_ONE: u128 = 0x3fff_8000_0000_0000_0000;
    const X87_MIN_SUBNORMAL: u128 = 0x0000_0000_0000_0000_0001;
    const X87_NEG_ZERO: u128 = 0x8000_0000_0000_0000_0000;
    const X87_INFINITY: u128 = 0x7fff_8000_0000_0000_0000;
    const X87_PSEUDO_DENORMAL: u128 = 0x0000_8000_0000_0000_0001;

    #[test_case(TermGraphOptions::z3_like(), X87_ONE, true)]
    #[test_case(TermGraphOptions::bitwuzla_like(), X87_ONE, true)]
    #[test_case(TermGraphOptions::bitwuzla_like(), X87_MIN_SUBNORMAL, true)]
    #[test_case(TermGraphOptions::z3_like(), X87_NEG_ZERO, true)]
    #[test_case(TermGraphOptions::bitwuzla_like(), X87_INFINITY, true)]
    #[test_case(TermGraphOptions::z3_like(), X87_PSEUDO_DENORMAL, false)]
    fn test_x87_round_trip(options: TermGraphOptions, value: u128, consistent: bool) {
        init_logger();
        let mut graph = TermGraph::new(options);
        let mut side = SideConstraints::new();
        let (bits, name) = input(&mut graph, 80);
        let f = to_float(&mut graph, &mut side, &bits, 80).unwrap();
        assert_eq!(f.sort, Sort::Float(FloatFormat::X87_EXTENDED));
        let back = to_bitvector(&mut graph, &mut side, &f).unwrap();
        assert_eq!(back.sort, Sort::BitVec(80));
        let (out, holds) = run(&graph, &side, &name, 80, value, &back);
        assert_eq!(holds, consistent);
        if consistent {
            assert_eq!(out, value);
        }
    }

    #[test]
    fn test_unify_float_with_bits_compares_bits() {
        let mut graph = TermGraph::new(TermGraphOptions::z3_like());
        let mut side = SideConstraints::new();
        let (a, _) = input(&mut graph, 32);
        let (b, _) = input(&mut graph, 32);
        let f = to_float(&mut graph, &mut side, &a, 32).unwrap();
        let (l, r) = unify_for_equality(&mut graph, &mut side, &f, &b).unwrap();
        assert_eq!(l.sort, Sort::BitVec(32));
        assert_eq!(r, b);
    }

    #[test_case(TermGraphOptions::z3_like(), 80; "x87 native")]
    #[test_case(TermGraphOptions::bitwuzla_like(), 32; "f32 fresh parts")]
    #[test_case(TermGraphOptions::bitwuzla_like(), 80; "x87 fresh parts")]
    fn test_float_to_bits_is_converted_once(options: TermGraphOptions, width: usize) {
        let mut graph = TermGraph::new(options);
        let mut side = SideConstraints::new();
        let (bits, _) = input(&mut graph, width);
        let f = to_float(&mut graph, &mut side, &bits, width).unwrap();
        let again = to_float(&mut graph, &mut side, &bits, width).unwrap();
        assert_eq!(f, again);
        let first = to_bitvector(&mut graph, &mut side, &f).unwrap();
        let constraints = side.len();
        let calls = graph.primitive_calls();
        let second = to_bitvector(&mut graph, &mut side, &f).unwrap();
        assert_eq!(first, second);
        assert_eq!(side.len(), constraints);
        assert_eq!(graph.primitive_calls(), calls);
        assert_eq!(side.converted_float_count(), 1);
    }

    #[test]
    fn test_take_forgets_conversions() {
        let mut graph = TermGraph::new(TermGraphOptions::bitwuzla_like());
        let mut side = SideConstraints::new();
        let (bits, _) = input(&mut graph, 32);
        let f = to_float(&mut graph, &mut side, &bits, 32).unwrap();
        let first = to_bitvector(&mut graph, &mut side, &f).unwrap();
        assert_eq!(side.take().len(), 1);
        assert_eq!(side.converted_float_count(), 0);
        let second = to_bitvector(&mut graph, &mut side, &f).unwrap();
        assert_ne!(first, second);
        assert_eq!(side.len(), 1);
    }

    #[test]
    #[should_panic(expected = "no floating-point sort")]
    fn test_float_without_float_sort_is_fatal() {
        let mut graph = TermGraph::new(TermGraphOptions::stp_like());
        let mut side = SideConstraints::new();
        let (a, _) = input(&mut graph, 32);
        let _ = to_float(&mut graph, &mut side, &a, 32);
    }
}
