// SPDX-License-Identifier: Apache-2.0

//! The primitive term constructors a solver backend must provide.
//!
//! Backends hand back opaque `Term` handles; the builder keeps each one
//! paired with its `Sort` in a `SortedTerm` so sort and width can always be
//! queried without asking the backend.

use std::hash::Hash;
use std::io;

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use crate::expr::{FloatFormat, RoundingMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sort {
    Bool,
    BitVec(usize),
    Float(FloatFormat),
    Array { domain: usize, range: usize },
    RoundingMode,
}

impl Sort {
    pub fn is_bool(&self) -> bool {
        matches!(self, Sort::Bool)
    }

    pub fn is_bitvec(&self) -> bool {
        matches!(self, Sort::BitVec(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Sort::Float(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortedTerm<Term> {
    pub sort: Sort,
    pub rep: Term,
}

impl<Term> SortedTerm<Term> {
    pub fn new(sort: Sort, rep: Term) -> Self {
        SortedTerm { sort, rep }
    }

    pub fn bitvec_width(&self) -> usize {
        match self.sort {
            Sort::BitVec(width) => width,
            other => panic!("expected a bit-vector term, got {:?}", other),
        }
    }

    pub fn float_format(&self) -> FloatFormat {
        match self.sort {
            Sort::Float(format) => format,
            other => panic!("expected a floating-point term, got {:?}", other),
        }
    }
}

/// Sort-level features that differ between solvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Predicates have their own sort instead of being 1-bit vectors.
    pub boolean_sort: bool,
    /// IEEE floating point is a first-class sort.
    pub float_sort: bool,
    /// Floats can be converted to their bit pattern directly.
    pub float_to_ieee_bits: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BvBinaryOp {
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    Shl,
    LShr,
    AShr,
}

impl BvBinaryOp {
    pub fn smtlib_name(&self) -> &'static str {
        match self {
            BvBinaryOp::And => "bvand",
            BvBinaryOp::Or => "bvor",
            BvBinaryOp::Xor => "bvxor",
            BvBinaryOp::Add => "bvadd",
            BvBinaryOp::Sub => "bvsub",
            BvBinaryOp::Mul => "bvmul",
            BvBinaryOp::UDiv => "bvudiv",
            BvBinaryOp::SDiv => "bvsdiv",
            BvBinaryOp::URem => "bvurem",
            BvBinaryOp::SRem => "bvsrem",
            BvBinaryOp::Shl => "bvshl",
            BvBinaryOp::LShr => "bvlshr",
            BvBinaryOp::AShr => "bvashr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BvCompareOp {
    Ult,
    Ule,
    Slt,
    Sle,
}

impl BvCompareOp {
    pub fn smtlib_name(&self) -> &'static str {
        match self {
            BvCompareOp::Ult => "bvult",
            BvCompareOp::Ule => "bvule",
            BvCompareOp::Slt => "bvslt",
            BvCompareOp::Sle => "bvsle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Min,
    Max,
}

impl FpArithOp {
    pub fn takes_rounding_mode(&self) -> bool {
        matches!(
            self,
            FpArithOp::Add | FpArithOp::Sub | FpArithOp::Mul | FpArithOp::Div
        )
    }

    pub fn smtlib_name(&self) -> &'static str {
        match self {
            FpArithOp::Add => "fp.add",
            FpArithOp::Sub => "fp.sub",
            FpArithOp::Mul => "fp.mul",
            FpArithOp::Div => "fp.div",
            FpArithOp::Rem => "fp.rem",
            FpArithOp::Min => "fp.min",
            FpArithOp::Max => "fp.max",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpUnaryOp {
    Sqrt,
    RoundToIntegral,
    Abs,
    Neg,
}

impl FpUnaryOp {
    pub fn takes_rounding_mode(&self) -> bool {
        matches!(self, FpUnaryOp::Sqrt | FpUnaryOp::RoundToIntegral)
    }

    pub fn smtlib_name(&self) -> &'static str {
        match self {
            FpUnaryOp::Sqrt => "fp.sqrt",
            FpUnaryOp::RoundToIntegral => "fp.roundToIntegral",
            FpUnaryOp::Abs => "fp.abs",
            FpUnaryOp::Neg => "fp.neg",
        }
    }
}

/// Ordered float comparisons; all of them are false when either side is NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpCompareOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FpCompareOp {
    pub fn smtlib_name(&self) -> &'static str {
        match self {
            FpCompareOp::Eq => "fp.eq",
            FpCompareOp::Lt => "fp.lt",
            FpCompareOp::Le => "fp.leq",
            FpCompareOp::Gt => "fp.gt",
            FpCompareOp::Ge => "fp.geq",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpClass {
    NaN,
    Infinite,
    Normal,
    Subnormal,
    Zero,
}

impl FpClass {
    pub fn smtlib_name(&self) -> &'static str {
        match self {
            FpClass::NaN => "fp.isNaN",
            FpClass::Infinite => "fp.isInfinite",
            FpClass::Normal => "fp.isNormal",
            FpClass::Subnormal => "fp.isSubnormal",
            FpClass::Zero => "fp.isZero",
        }
    }
}

/// Primitive term constructors.
///
/// Predicates (results of `not`, `eq`, comparisons, classifications) have
/// sort `Bool` when `capabilities().boolean_sort` is set and `BitVec(1)`
/// otherwise; every predicate argument accepts the same sort back.
///
/// Sort errors are programming errors and implementations panic on them.
/// Only operations that can run out of backend resources return `io::Result`.
pub trait TermAlgebra: Sized {
    type Term: Clone + Eq + Hash;

    fn capabilities(&self) -> Capabilities;

    fn declare_array(
        &mut self,
        name: &str,
        domain: usize,
        range: usize,
    ) -> io::Result<SortedTerm<Self::Term>>;
    /// Declares a new constant whose name starts with `prefix` and does not
    /// clash with any earlier declaration.
    fn declare_fresh(&mut self, prefix: &str, sort: Sort) -> io::Result<SortedTerm<Self::Term>>;

    fn bool_const(&mut self, value: bool) -> SortedTerm<Self::Term>;
    fn bv_literal(&mut self, bits: &BitSlice<u64, Lsb0>) -> SortedTerm<Self::Term>;
    fn bv_u64(&mut self, width: usize, value: u64) -> SortedTerm<Self::Term> {
        let mut bits: BitVec<u64, Lsb0> = BitVec::repeat(false, width);
        for i in 0..width.min(64) {
            bits.set(i, (value >> i) & 1 == 1);
        }
        self.bv_literal(&bits)
    }
    fn bv_zero(&mut self, width: usize) -> SortedTerm<Self::Term> {
        self.bv_u64(width, 0)
    }
    fn bv_one(&mut self, width: usize) -> SortedTerm<Self::Term> {
        self.bv_u64(width, 1)
    }
    fn bv_all_ones(&mut self, width: usize) -> SortedTerm<Self::Term> {
        let bits: BitVec<u64, Lsb0> = BitVec::repeat(true, width);
        self.bv_literal(&bits)
    }
    fn rounding_mode(&mut self, rm: RoundingMode) -> SortedTerm<Self::Term>;

    fn not(&mut self, p: &SortedTerm<Self::Term>) -> SortedTerm<Self::Term>;
    fn and(
        &mut self,
        lhs: &SortedTerm<Self::Term>,
        rhs: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;
    fn or(
        &mut self,
        lhs: &SortedTerm<Self::Term>,
        rhs: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;
    fn iff(
        &mut self,
        lhs: &SortedTerm<Self::Term>,
        rhs: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;
    fn ite(
        &mut self,
        cond: &SortedTerm<Self::Term>,
        then: &SortedTerm<Self::Term>,
        otherwise: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;
    /// Equality of two terms of the same sort.
    fn eq(
        &mut self,
        lhs: &SortedTerm<Self::Term>,
        rhs: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;

    fn bv_not(&mut self, bv: &SortedTerm<Self::Term>) -> SortedTerm<Self::Term>;
    fn bv_neg(&mut self, bv: &SortedTerm<Self::Term>) -> SortedTerm<Self::Term>;
    fn bv_binary(
        &mut self,
        op: BvBinaryOp,
        lhs: &SortedTerm<Self::Term>,
        rhs: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;
    fn bv_add(
        &mut self,
        lhs: &SortedTerm<Self::Term>,
        rhs: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term> {
        self.bv_binary(BvBinaryOp::Add, lhs, rhs)
    }
    fn bv_sub(
        &mut self,
        lhs: &SortedTerm<Self::Term>,
        rhs: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term> {
        self.bv_binary(BvBinaryOp::Sub, lhs, rhs)
    }
    fn bv_compare(
        &mut self,
        op: BvCompareOp,
        lhs: &SortedTerm<Self::Term>,
        rhs: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;
    fn concat(
        &mut self,
        msb: &SortedTerm<Self::Term>,
        lsb: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;
    fn extract(
        &mut self,
        bv: &SortedTerm<Self::Term>,
        high: usize,
        low: usize,
    ) -> SortedTerm<Self::Term>;
    fn zero_extend(&mut self, bv: &SortedTerm<Self::Term>, by: usize) -> SortedTerm<Self::Term>;
    fn sign_extend(&mut self, bv: &SortedTerm<Self::Term>, by: usize) -> SortedTerm<Self::Term>;

    /// An array mapping every index of the domain to `value`.
    fn const_array(
        &mut self,
        domain: usize,
        value: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;
    fn select(
        &mut self,
        array: &SortedTerm<Self::Term>,
        index: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;
    fn store(
        &mut self,
        array: &SortedTerm<Self::Term>,
        index: &SortedTerm<Self::Term>,
        value: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;

    /// Builds a float from its sign, biased exponent and stored fraction.
    fn fp_from_parts(
        &mut self,
        sign: &SortedTerm<Self::Term>,
        exponent: &SortedTerm<Self::Term>,
        fraction: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;
    fn fp_from_ieee_bits(
        &mut self,
        bits: &SortedTerm<Self::Term>,
        format: FloatFormat,
    ) -> SortedTerm<Self::Term>;
    /// Only called when `capabilities().float_to_ieee_bits` is set.
    fn fp_to_ieee_bits(&mut self, value: &SortedTerm<Self::Term>) -> SortedTerm<Self::Term> {
        let _ = value;
        panic!("backend cannot convert floats to bit-vectors directly")
    }
    fn fp_to_fp(
        &mut self,
        rm: &SortedTerm<Self::Term>,
        value: &SortedTerm<Self::Term>,
        format: FloatFormat,
    ) -> SortedTerm<Self::Term>;
    fn fp_from_unsigned(
        &mut self,
        rm: &SortedTerm<Self::Term>,
        bv: &SortedTerm<Self::Term>,
        format: FloatFormat,
    ) -> SortedTerm<Self::Term>;
    fn fp_from_signed(
        &mut self,
        rm: &SortedTerm<Self::Term>,
        bv: &SortedTerm<Self::Term>,
        format: FloatFormat,
    ) -> SortedTerm<Self::Term>;
    fn fp_to_unsigned(
        &mut self,
        rm: &SortedTerm<Self::Term>,
        value: &SortedTerm<Self::Term>,
        width: usize,
    ) -> SortedTerm<Self::Term>;
    fn fp_to_signed(
        &mut self,
        rm: &SortedTerm<Self::Term>,
        value: &SortedTerm<Self::Term>,
        width: usize,
    ) -> SortedTerm<Self::Term>;
    fn fp_arith(
        &mut self,
        op: FpArithOp,
        rm: Option<&SortedTerm<Self::Term>>,
        lhs: &SortedTerm<Self::Term>,
        rhs: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;
    fn fp_unary(
        &mut self,
        op: FpUnaryOp,
        rm: Option<&SortedTerm<Self::Term>>,
        value: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;
    fn fp_compare(
        &mut self,
        op: FpCompareOp,
        lhs: &SortedTerm<Self::Term>,
        rhs: &SortedTerm<Self::Term>,
    ) -> SortedTerm<Self::Term>;
    fn fp_classify(&mut self, class: FpClass, value: &SortedTerm<Self::Term>)
        -> SortedTerm<Self::Term>;
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Response {
    Sat,
    Unsat,
    Unknown,
}

/// A backend that can also decide the queries built on it.
pub trait Solver: TermAlgebra {
    fn assert(&mut self, predicate: &SortedTerm<Self::Term>) -> io::Result<()>;
    fn push(&mut self) -> io::Result<()>;
    fn pop(&mut self) -> io::Result<()>;
    fn check(&mut self) -> io::Result<Response>;
}
