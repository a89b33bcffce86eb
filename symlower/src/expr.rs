// SPDX-License-Identifier: Apache-2.0

//! The symbolic expression IR consumed by the term builder.
//!
//! Expressions form an immutable DAG of reference-counted nodes. Node identity
//! (the `Rc` allocation) is what the caches key on, so structurally equal but
//! separately allocated nodes are lowered independently.
//!
//! ```
//! use symlower::expr::{Array, BinaryOp, Expr, UpdateList};
//!
//! let input = Array::symbolic("input", 32, 8);
//! let byte = Expr::read(UpdateList::new(input), Expr::bv(32, 0));
//! let widened = Expr::zext(byte, 32);
//! let sum = Expr::binary(BinaryOp::Add, widened, Expr::bv(32, 1));
//! assert_eq!(sum.width(), 32);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use bitvec::prelude::*;

pub use crate::term_algebra::{FpArithOp, FpClass, FpCompareOp, FpUnaryOp};

pub type Bits = BitVec<u64, Lsb0>;
pub type ExprRef = Rc<Expr>;
pub type ArrayRef = Rc<Array>;
pub type UpdateNodeRef = Rc<UpdateNode>;

/// IEEE 754 rounding modes carried by the float operations that round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundingMode {
    NearestTiesToEven,
    NearestTiesToAway,
    TowardPositive,
    TowardNegative,
    TowardZero,
}

impl RoundingMode {
    pub fn smtlib_name(&self) -> &'static str {
        match self {
            RoundingMode::NearestTiesToEven => "RNE",
            RoundingMode::NearestTiesToAway => "RNA",
            RoundingMode::TowardPositive => "RTP",
            RoundingMode::TowardNegative => "RTN",
            RoundingMode::TowardZero => "RTZ",
        }
    }
}

/// Exponent and significand widths of a floating-point sort. The significand
/// width counts the hidden bit, as in SMT-LIB `(_ FloatingPoint eb sb)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatFormat {
    pub exponent_bits: usize,
    pub significand_bits: usize,
}

impl FloatFormat {
    pub const HALF: FloatFormat = FloatFormat::new(5, 11);
    pub const SINGLE: FloatFormat = FloatFormat::new(8, 24);
    pub const DOUBLE: FloatFormat = FloatFormat::new(11, 53);
    pub const X87_EXTENDED: FloatFormat = FloatFormat::new(15, 64);
    pub const QUAD: FloatFormat = FloatFormat::new(15, 113);

    pub const fn new(exponent_bits: usize, significand_bits: usize) -> Self {
        FloatFormat {
            exponent_bits,
            significand_bits,
        }
    }

    /// Format of a float-valued expression of the given IR width.
    pub fn for_width(width: usize) -> FloatFormat {
        match width {
            16 => FloatFormat::HALF,
            32 => FloatFormat::SINGLE,
            64 => FloatFormat::DOUBLE,
            80 => FloatFormat::X87_EXTENDED,
            128 => FloatFormat::QUAD,
            _ => panic!("no floating-point format for width {}", width),
        }
    }

    /// Width of the IEEE interchange encoding. For the x87 format this is 79
    /// since the interchange encoding has no explicit integer bit.
    pub fn ieee_width(&self) -> usize {
        self.exponent_bits + self.significand_bits
    }

    /// Stored fraction bits, i.e. the significand without its hidden bit.
    pub fn fraction_bits(&self) -> usize {
        self.significand_bits - 1
    }
}

/// A literal bit pattern, optionally tagged as holding a float encoding.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Constant {
    bits: Bits,
    is_float: bool,
}

impl Constant {
    pub fn from_bits(bits: Bits) -> Self {
        assert!(!bits.is_empty(), "constants must be at least one bit wide");
        Constant {
            bits,
            is_float: false,
        }
    }

    pub fn from_u64(width: usize, value: u64) -> Self {
        Self::from_words(width, &[value])
    }

    /// Builds a `width`-bit constant from little-endian 64-bit words,
    /// truncating or zero-extending as needed.
    pub fn from_words(width: usize, words: &[u64]) -> Self {
        let mut bits = Bits::repeat(false, width);
        for i in 0..width.min(words.len() * 64) {
            bits.set(i, (words[i / 64] >> (i % 64)) & 1 == 1);
        }
        Self::from_bits(bits)
    }

    pub fn from_bool(value: bool) -> Self {
        Self::from_u64(1, value as u64)
    }

    /// Tags the bit pattern as an IEEE (or x87 for width 80) float encoding.
    pub fn into_float(mut self) -> Self {
        FloatFormat::for_width(self.width());
        self.is_float = true;
        self
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    pub fn bits(&self) -> &BitSlice<u64, Lsb0> {
        &self.bits
    }

    pub fn is_float(&self) -> bool {
        self.is_float
    }

    pub fn is_true(&self) -> bool {
        assert_eq!(self.width(), 1, "only 1-bit constants have a truth value");
        self.bits[0]
    }

    /// Returns the zero-extended value if it fits in 64 bits.
    pub fn as_u64(&self) -> Option<u64> {
        if self.bits.iter_ones().any(|i| i >= 64) {
            return None;
        }
        Some(
            self.bits
                .iter_ones()
                .fold(0u64, |acc, i| acc | (1u64 << i)),
        )
    }
}

impl fmt::Debug for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'b", self.width())?;
        for bit in self.bits.iter().rev() {
            write!(f, "{}", if *bit { '1' } else { '0' })?;
        }
        if self.is_float {
            write!(f, " (float)")?;
        }
        Ok(())
    }
}

/// Two-operand integer and bitwise operators.
///
/// `Ne`, `Ugt`, `Uge`, `Sgt` and `Sge` exist in the IR but are rewritten away
/// by canonicalization before an expression reaches the term builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Ult
                | BinaryOp::Ule
                | BinaryOp::Ugt
                | BinaryOp::Uge
                | BinaryOp::Slt
                | BinaryOp::Sle
                | BinaryOp::Sgt
                | BinaryOp::Sge
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::UDiv => "udiv",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::URem => "urem",
            BinaryOp::SRem => "srem",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::LShr => "lshr",
            BinaryOp::AShr => "ashr",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Ult => "ult",
            BinaryOp::Ule => "ule",
            BinaryOp::Ugt => "ugt",
            BinaryOp::Uge => "uge",
            BinaryOp::Slt => "slt",
            BinaryOp::Sle => "sle",
            BinaryOp::Sgt => "sgt",
            BinaryOp::Sge => "sge",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug)]
pub enum ExprKind {
    Constant(Constant),
    /// Optimization barrier; lowers exactly like its source.
    NotOptimized(ExprRef),
    Read {
        updates: UpdateList,
        index: ExprRef,
    },
    Select {
        cond: ExprRef,
        then: ExprRef,
        otherwise: ExprRef,
    },
    /// Most significant operand first.
    Concat(ExprRef, ExprRef),
    Extract {
        expr: ExprRef,
        offset: usize,
    },
    ZExt(ExprRef),
    SExt(ExprRef),
    Not(ExprRef),
    Binary(BinaryOp, ExprRef, ExprRef),
    FpExt(ExprRef),
    FpTrunc(RoundingMode, ExprRef),
    FpToUi(RoundingMode, ExprRef),
    FpToSi(RoundingMode, ExprRef),
    UiToFp(RoundingMode, ExprRef),
    SiToFp(RoundingMode, ExprRef),
    FpArith(FpArithOp, Option<RoundingMode>, ExprRef, ExprRef),
    FpUnary(FpUnaryOp, Option<RoundingMode>, ExprRef),
    FpCompare(FpCompareOp, ExprRef, ExprRef),
    FpClassify(FpClass, ExprRef),
}

impl ExprKind {
    /// Direct expression operands. Update-chain entries of a `Read` are not
    /// included; they belong to the array side of the lowering.
    pub fn operands(&self) -> Vec<&ExprRef> {
        match self {
            ExprKind::Constant(_) => vec![],
            ExprKind::NotOptimized(e)
            | ExprKind::ZExt(e)
            | ExprKind::SExt(e)
            | ExprKind::Not(e)
            | ExprKind::FpExt(e)
            | ExprKind::FpTrunc(_, e)
            | ExprKind::FpToUi(_, e)
            | ExprKind::FpToSi(_, e)
            | ExprKind::UiToFp(_, e)
            | ExprKind::SiToFp(_, e)
            | ExprKind::FpUnary(_, _, e)
            | ExprKind::FpClassify(_, e) => vec![e],
            ExprKind::Extract { expr, .. } => vec![expr],
            ExprKind::Read { index, .. } => vec![index],
            ExprKind::Select {
                cond,
                then,
                otherwise,
            } => vec![cond, then, otherwise],
            ExprKind::Concat(a, b)
            | ExprKind::Binary(_, a, b)
            | ExprKind::FpArith(_, _, a, b)
            | ExprKind::FpCompare(_, a, b) => vec![a, b],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Constant(_) => "constant",
            ExprKind::NotOptimized(_) => "not_optimized",
            ExprKind::Read { .. } => "read",
            ExprKind::Select { .. } => "select",
            ExprKind::Concat(..) => "concat",
            ExprKind::Extract { .. } => "extract",
            ExprKind::ZExt(_) => "zext",
            ExprKind::SExt(_) => "sext",
            ExprKind::Not(_) => "not",
            ExprKind::Binary(..) => "binary",
            ExprKind::FpExt(_) => "fpext",
            ExprKind::FpTrunc(..) => "fptrunc",
            ExprKind::FpToUi(..) => "fptoui",
            ExprKind::FpToSi(..) => "fptosi",
            ExprKind::UiToFp(..) => "uitofp",
            ExprKind::SiToFp(..) => "sitofp",
            ExprKind::FpArith(..) => "fp_arith",
            ExprKind::FpUnary(..) => "fp_unary",
            ExprKind::FpCompare(..) => "fp_compare",
            ExprKind::FpClassify(..) => "fp_classify",
        }
    }

    fn take_operands(&mut self) -> Vec<ExprRef> {
        let empty = ExprKind::Constant(Constant {
            bits: Bits::new(),
            is_float: false,
        });
        match std::mem::replace(self, empty) {
            ExprKind::Constant(_) => vec![],
            ExprKind::NotOptimized(e)
            | ExprKind::ZExt(e)
            | ExprKind::SExt(e)
            | ExprKind::Not(e)
            | ExprKind::FpExt(e)
            | ExprKind::FpTrunc(_, e)
            | ExprKind::FpToUi(_, e)
            | ExprKind::FpToSi(_, e)
            | ExprKind::UiToFp(_, e)
            | ExprKind::SiToFp(_, e)
            | ExprKind::FpUnary(_, _, e)
            | ExprKind::FpClassify(_, e)
            | ExprKind::Extract { expr: e, .. } => vec![e],
            ExprKind::Read { index, .. } => vec![index],
            ExprKind::Select {
                cond,
                then,
                otherwise,
            } => vec![cond, then, otherwise],
            ExprKind::Concat(a, b)
            | ExprKind::Binary(_, a, b)
            | ExprKind::FpArith(_, _, a, b)
            | ExprKind::FpCompare(_, a, b) => vec![a, b],
        }
    }
}

#[derive(Debug)]
pub struct Expr {
    kind: ExprKind,
    width: usize,
}

// Long operand chains would otherwise be freed recursively.
impl Drop for Expr {
    fn drop(&mut self) {
        let mut pending = self.kind.take_operands();
        while let Some(expr) = pending.pop() {
            if let Ok(mut inner) = Rc::try_unwrap(expr) {
                pending.extend(inner.kind.take_operands());
            }
        }
    }
}

fn check_float_width(width: usize) {
    FloatFormat::for_width(width);
}

impl Expr {
    fn make(kind: ExprKind, width: usize) -> ExprRef {
        assert!(width > 0, "{} expression with zero width", kind.name());
        Rc::new(Expr { kind, width })
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(_))
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match &self.kind {
            ExprKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn constant(value: Constant) -> ExprRef {
        let width = value.width();
        Self::make(ExprKind::Constant(value), width)
    }

    pub fn bool(value: bool) -> ExprRef {
        Self::constant(Constant::from_bool(value))
    }

    pub fn bv(width: usize, value: u64) -> ExprRef {
        Self::constant(Constant::from_u64(width, value))
    }

    pub fn f32(value: f32) -> ExprRef {
        Self::constant(Constant::from_u64(32, value.to_bits() as u64).into_float())
    }

    pub fn f64(value: f64) -> ExprRef {
        Self::constant(Constant::from_u64(64, value.to_bits()).into_float())
    }

    pub fn not_optimized(src: ExprRef) -> ExprRef {
        let width = src.width();
        Self::make(ExprKind::NotOptimized(src), width)
    }

    pub fn read(updates: UpdateList, index: ExprRef) -> ExprRef {
        assert_eq!(
            index.width(),
            updates.root().domain(),
            "read index width must match the domain of array {}",
            updates.root().name()
        );
        let width = updates.root().range();
        Self::make(ExprKind::Read { updates, index }, width)
    }

    pub fn select(cond: ExprRef, then: ExprRef, otherwise: ExprRef) -> ExprRef {
        assert_eq!(cond.width(), 1, "select condition must be boolean");
        assert_eq!(
            then.width(),
            otherwise.width(),
            "select arms must have the same width"
        );
        let width = then.width();
        Self::make(
            ExprKind::Select {
                cond,
                then,
                otherwise,
            },
            width,
        )
    }

    pub fn concat(msb: ExprRef, lsb: ExprRef) -> ExprRef {
        let width = msb.width() + lsb.width();
        Self::make(ExprKind::Concat(msb, lsb), width)
    }

    pub fn extract(expr: ExprRef, offset: usize, width: usize) -> ExprRef {
        assert!(
            offset + width <= expr.width(),
            "extract of bits [{}, {}) from a {}-bit expression",
            offset,
            offset + width,
            expr.width()
        );
        Self::make(ExprKind::Extract { expr, offset }, width)
    }

    pub fn zext(src: ExprRef, width: usize) -> ExprRef {
        assert!(width > src.width(), "zext must widen its operand");
        Self::make(ExprKind::ZExt(src), width)
    }

    pub fn sext(src: ExprRef, width: usize) -> ExprRef {
        assert!(width > src.width(), "sext must widen its operand");
        Self::make(ExprKind::SExt(src), width)
    }

    pub fn not(src: ExprRef) -> ExprRef {
        let width = src.width();
        Self::make(ExprKind::Not(src), width)
    }

    pub fn binary(op: BinaryOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        assert_eq!(
            lhs.width(),
            rhs.width(),
            "{} operands must have the same width",
            op
        );
        let width = if op.is_comparison() { 1 } else { lhs.width() };
        Self::make(ExprKind::Binary(op, lhs, rhs), width)
    }

    pub fn eq(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Self::binary(BinaryOp::Eq, lhs, rhs)
    }

    pub fn fp_ext(src: ExprRef, width: usize) -> ExprRef {
        check_float_width(src.width());
        check_float_width(width);
        assert!(width > src.width(), "fpext must widen its operand");
        Self::make(ExprKind::FpExt(src), width)
    }

    pub fn fp_trunc(rm: RoundingMode, src: ExprRef, width: usize) -> ExprRef {
        check_float_width(src.width());
        check_float_width(width);
        assert!(width < src.width(), "fptrunc must narrow its operand");
        Self::make(ExprKind::FpTrunc(rm, src), width)
    }

    pub fn fp_to_ui(rm: RoundingMode, src: ExprRef, width: usize) -> ExprRef {
        check_float_width(src.width());
        Self::make(ExprKind::FpToUi(rm, src), width)
    }

    pub fn fp_to_si(rm: RoundingMode, src: ExprRef, width: usize) -> ExprRef {
        check_float_width(src.width());
        Self::make(ExprKind::FpToSi(rm, src), width)
    }

    pub fn ui_to_fp(rm: RoundingMode, src: ExprRef, width: usize) -> ExprRef {
        check_float_width(width);
        Self::make(ExprKind::UiToFp(rm, src), width)
    }

    pub fn si_to_fp(rm: RoundingMode, src: ExprRef, width: usize) -> ExprRef {
        check_float_width(width);
        Self::make(ExprKind::SiToFp(rm, src), width)
    }

    pub fn fp_arith(
        op: FpArithOp,
        rm: Option<RoundingMode>,
        lhs: ExprRef,
        rhs: ExprRef,
    ) -> ExprRef {
        assert_eq!(
            op.takes_rounding_mode(),
            rm.is_some(),
            "rounding mode mismatch for {:?}",
            op
        );
        assert_eq!(lhs.width(), rhs.width(), "{:?} operand widths differ", op);
        check_float_width(lhs.width());
        let width = lhs.width();
        Self::make(ExprKind::FpArith(op, rm, lhs, rhs), width)
    }

    pub fn fp_unary(op: FpUnaryOp, rm: Option<RoundingMode>, src: ExprRef) -> ExprRef {
        assert_eq!(
            op.takes_rounding_mode(),
            rm.is_some(),
            "rounding mode mismatch for {:?}",
            op
        );
        check_float_width(src.width());
        let width = src.width();
        Self::make(ExprKind::FpUnary(op, rm, src), width)
    }

    pub fn fp_compare(op: FpCompareOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        assert_eq!(lhs.width(), rhs.width(), "{:?} operand widths differ", op);
        check_float_width(lhs.width());
        Self::make(ExprKind::FpCompare(op, lhs, rhs), 1)
    }

    pub fn fp_classify(class: FpClass, src: ExprRef) -> ExprRef {
        check_float_width(src.width());
        Self::make(ExprKind::FpClassify(class, src), 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArraySize {
    Fixed(u64),
    Symbolic,
}

/// Known contents of a constant array: explicit entries over an optional
/// default for every other index.
#[derive(Debug, Clone, Default)]
pub struct ConstantStore {
    default: Option<Constant>,
    values: BTreeMap<u64, Constant>,
}

impl ConstantStore {
    pub fn new(default: Option<Constant>, values: BTreeMap<u64, Constant>) -> Self {
        ConstantStore { default, values }
    }

    pub fn default_value(&self) -> Option<&Constant> {
        self.default.as_ref()
    }

    pub fn values(&self) -> &BTreeMap<u64, Constant> {
        &self.values
    }

    pub fn value_at(&self, index: u64) -> Option<&Constant> {
        self.values.get(&index).or(self.default.as_ref())
    }
}

#[derive(Debug, Clone)]
pub enum ArraySource {
    Symbolic,
    Constant(ConstantStore),
}

/// A named memory region. Arrays are compared by identity, never by name.
#[derive(Debug)]
pub struct Array {
    name: String,
    domain: usize,
    range: usize,
    size: ArraySize,
    source: ArraySource,
}

impl Array {
    pub fn new(
        name: &str,
        domain: usize,
        range: usize,
        size: ArraySize,
        source: ArraySource,
    ) -> ArrayRef {
        assert!(domain > 0 && range > 0, "array {} has a zero-width sort", name);
        if let ArraySource::Constant(store) = &source {
            for value in store.default.iter().chain(store.values.values()) {
                assert_eq!(
                    value.width(),
                    range,
                    "constant array {} holds a value of the wrong width",
                    name
                );
            }
            if size == ArraySize::Symbolic {
                assert!(
                    store.default.is_some(),
                    "constant array {} of symbolic size needs a default value",
                    name
                );
            }
        }
        Rc::new(Array {
            name: name.to_string(),
            domain,
            range,
            size,
            source,
        })
    }

    pub fn symbolic(name: &str, domain: usize, range: usize) -> ArrayRef {
        Self::new(name, domain, range, ArraySize::Symbolic, ArraySource::Symbolic)
    }

    /// A fixed-size array whose every element is known.
    pub fn constant(name: &str, domain: usize, range: usize, values: Vec<Constant>) -> ArrayRef {
        let size = ArraySize::Fixed(values.len() as u64);
        let values = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i as u64, v))
            .collect();
        Self::new(
            name,
            domain,
            range,
            size,
            ArraySource::Constant(ConstantStore::new(None, values)),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> usize {
        self.domain
    }

    pub fn range(&self) -> usize {
        self.range
    }

    pub fn size(&self) -> ArraySize {
        self.size
    }

    pub fn source(&self) -> &ArraySource {
        &self.source
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.source, ArraySource::Constant(_))
    }
}

/// One write in an update chain. Chains are newest first and immutable.
#[derive(Debug)]
pub struct UpdateNode {
    index: ExprRef,
    value: ExprRef,
    next: Option<UpdateNodeRef>,
}

impl UpdateNode {
    pub fn index(&self) -> &ExprRef {
        &self.index
    }

    pub fn value(&self) -> &ExprRef {
        &self.value
    }

    pub fn next(&self) -> Option<&UpdateNodeRef> {
        self.next.as_ref()
    }
}

impl Drop for UpdateNode {
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(node) = next {
            match Rc::try_unwrap(node) {
                Ok(mut node) => next = node.next.take(),
                Err(_) => break,
            }
        }
    }
}

/// An array plus the writes layered on top of it.
#[derive(Debug, Clone)]
pub struct UpdateList {
    root: ArrayRef,
    head: Option<UpdateNodeRef>,
}

impl UpdateList {
    pub fn new(root: ArrayRef) -> Self {
        UpdateList { root, head: None }
    }

    pub fn root(&self) -> &ArrayRef {
        &self.root
    }

    pub fn head(&self) -> Option<&UpdateNodeRef> {
        self.head.as_ref()
    }

    /// Records a write; previous clones of this list keep seeing the old
    /// chain.
    pub fn extend(&mut self, index: ExprRef, value: ExprRef) {
        assert_eq!(index.width(), self.root.domain(), "write index width");
        assert_eq!(value.width(), self.root.range(), "write value width");
        let next = self.head.take();
        self.head = Some(Rc::new(UpdateNode { index, value, next }));
    }

    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.head.as_ref();
        while let Some(node) = cursor {
            count += 1;
            cursor = node.next.as_ref();
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}
