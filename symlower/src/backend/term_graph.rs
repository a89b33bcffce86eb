// SPDX-License-Identifier: Apache-2.0

//! An in-process, hash-consed term arena.
//!
//! `TermGraph` implements the full term algebra without an external solver.
//! Structurally identical terms share one `TermId`, which makes it a
//! convenient oracle for caching behavior, and `backend::eval` can evaluate
//! any term under a concrete model. Capabilities are configurable so every
//! coercion path can be exercised against one backend.

use std::fmt::Write;
use std::io;

use ahash::AHashMap;
use bitvec::prelude::*;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::expr::{FloatFormat, RoundingMode};
use crate::term_algebra::{
    BvBinaryOp, BvCompareOp, Capabilities, FpArithOp, FpClass, FpCompareOp, FpUnaryOp, Sort,
    SortedTerm, TermAlgebra,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(u32);

impl TermId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermOp {
    /// A declared constant or array.
    Symbol(String),
    BoolConst(bool),
    BvLiteral(BigUint),
    RoundingMode(RoundingMode),
    Not,
    And,
    Or,
    Iff,
    Ite,
    Eq,
    BvNot,
    BvNeg,
    BvBinary(BvBinaryOp),
    BvCompare(BvCompareOp),
    Concat,
    Extract { high: usize, low: usize },
    ZeroExtend(usize),
    SignExtend(usize),
    ConstArray,
    Select,
    Store,
    FpFromParts,
    FpFromIeeeBits,
    FpToIeeeBits,
    FpToFp,
    FpFromUnsigned,
    FpFromSigned,
    FpToUnsigned,
    FpToSigned,
    FpArith(FpArithOp),
    FpUnary(FpUnaryOp),
    FpCompare(FpCompareOp),
    FpClassify(FpClass),
}

/// One interned term. Operations that take a rounding mode carry it as their
/// first argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TermNode {
    pub op: TermOp,
    pub args: Vec<TermId>,
    pub sort: Sort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermGraphOptions {
    pub capabilities: Capabilities,
}

impl TermGraphOptions {
    /// Boolean sort, floats and a native float-to-bits conversion.
    pub fn z3_like() -> Self {
        Self::with(true, true, true)
    }

    /// Floats without a float-to-bits conversion.
    pub fn bitwuzla_like() -> Self {
        Self::with(true, true, false)
    }

    /// Bit-vectors and arrays only.
    pub fn stp_like() -> Self {
        Self::with(true, false, false)
    }

    /// Bit-vectors and arrays only, with predicates as 1-bit vectors.
    pub fn boolector_like() -> Self {
        Self::with(false, false, false)
    }

    fn with(boolean_sort: bool, float_sort: bool, float_to_ieee_bits: bool) -> Self {
        TermGraphOptions {
            capabilities: Capabilities {
                boolean_sort,
                float_sort,
                float_to_ieee_bits,
            },
        }
    }
}

pub struct TermGraph {
    capabilities: Capabilities,
    nodes: Vec<TermNode>,
    interned: AHashMap<TermNode, TermId>,
    symbols: AHashMap<String, TermId>,
    next_fresh: usize,
    primitive_calls: usize,
}

impl TermGraph {
    pub fn new(options: TermGraphOptions) -> Self {
        TermGraph {
            capabilities: options.capabilities,
            nodes: Vec::new(),
            interned: AHashMap::new(),
            symbols: AHashMap::new(),
            next_fresh: 0,
            primitive_calls: 0,
        }
    }

    /// Number of term constructors called so far, including ones answered
    /// from the intern table.
    pub fn primitive_calls(&self) -> usize {
        self.primitive_calls
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: TermId) -> &TermNode {
        &self.nodes[id.index()]
    }

    pub fn symbol_name(&self, id: TermId) -> Option<&str> {
        match &self.node(id).op {
            TermOp::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn lookup_symbol(&self, name: &str) -> Option<TermId> {
        self.symbols.get(name).copied()
    }

    fn predicate_sort(&self) -> Sort {
        if self.capabilities.boolean_sort {
            Sort::Bool
        } else {
            Sort::BitVec(1)
        }
    }

    fn check_predicate(&self, term: &SortedTerm<TermId>) {
        assert_eq!(
            term.sort,
            self.predicate_sort(),
            "expected a predicate, got {:?}",
            term.sort
        );
    }

    fn check_floats(&self) {
        assert!(
            self.capabilities.float_sort,
            "backend has no floating-point sort"
        );
    }

    fn intern(&mut self, op: TermOp, args: Vec<TermId>, sort: Sort) -> SortedTerm<TermId> {
        self.primitive_calls += 1;
        let node = TermNode { op, args, sort };
        if let Some(id) = self.interned.get(&node) {
            return SortedTerm::new(sort, *id);
        }
        let id = TermId(self.nodes.len() as u32);
        self.nodes.push(node.clone());
        self.interned.insert(node, id);
        SortedTerm::new(sort, id)
    }

    fn declare(&mut self, name: String, sort: Sort) -> io::Result<SortedTerm<TermId>> {
        if self.symbols.contains_key(&name) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("symbol {} is already declared", name),
            ));
        }
        let term = self.intern(TermOp::Symbol(name.clone()), vec![], sort);
        self.symbols.insert(name, term.rep);
        Ok(term)
    }

    fn name_of(&self, id: TermId) -> String {
        match &self.node(id).op {
            TermOp::Symbol(name) => name.clone(),
            _ => format!("t{}", id.0),
        }
    }

    /// Every term reachable from `roots`, in creation order.
    pub fn reachable(&self, roots: &[TermId]) -> Vec<TermId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack: Vec<TermId> = roots.to_vec();
        let mut out = Vec::new();
        while let Some(id) = stack.pop() {
            if seen[id.index()] {
                continue;
            }
            seen[id.index()] = true;
            out.push(id);
            stack.extend(self.node(id).args.iter().copied());
        }
        out.sort();
        out
    }

    /// Renders `assertions` as a self-contained SMT-LIB2 script.
    pub fn to_smtlib(&self, assertions: &[SortedTerm<TermId>]) -> String {
        let roots: Vec<TermId> = assertions.iter().map(|a| a.rep).collect();
        let mut out = String::from("(set-logic ALL)\n");
        for id in self.reachable(&roots) {
            let node = self.node(id);
            let sort = render_sort(&node.sort);
            // Writing to a String cannot fail.
            let _ = match &node.op {
                TermOp::Symbol(name) => writeln!(out, "(declare-const {} {})", name, sort),
                _ => writeln!(
                    out,
                    "(define-fun t{} () {} {})",
                    id.0,
                    sort,
                    self.render_node(node)
                ),
            };
        }
        for assertion in assertions {
            let name = self.name_of(assertion.rep);
            let _ = if assertion.sort == Sort::Bool {
                writeln!(out, "(assert {})", name)
            } else {
                writeln!(out, "(assert (= {} #b1))", name)
            };
        }
        out.push_str("(check-sat)\n");
        out
    }

    fn render_node(&self, node: &TermNode) -> String {
        let args: Vec<String> = node.args.iter().map(|a| self.name_of(*a)).collect();
        let bv1_predicates = !self.capabilities.boolean_sort;
        // A native SMT-LIB Bool lifted to the bv1 predicate sort.
        let lift = |body: String| {
            if bv1_predicates {
                format!("(ite {} #b1 #b0)", body)
            } else {
                body
            }
        };
        let call = |name: &str, args: &[String]| format!("({} {})", name, args.join(" "));
        match &node.op {
            TermOp::Symbol(name) => name.clone(),
            TermOp::BoolConst(value) => match (bv1_predicates, value) {
                (true, true) => "#b1".to_string(),
                (true, false) => "#b0".to_string(),
                (false, value) => value.to_string(),
            },
            TermOp::BvLiteral(value) => {
                let width = match node.sort {
                    Sort::BitVec(width) => width,
                    _ => unreachable!("literal of sort {:?}", node.sort),
                };
                format!("#b{:0>width$}", value.to_str_radix(2), width = width)
            }
            TermOp::RoundingMode(rm) => rm.smtlib_name().to_string(),
            TermOp::Not if bv1_predicates => call("bvnot", &args),
            TermOp::And if bv1_predicates => call("bvand", &args),
            TermOp::Or if bv1_predicates => call("bvor", &args),
            TermOp::Not => call("not", &args),
            TermOp::And => call("and", &args),
            TermOp::Or => call("or", &args),
            TermOp::Iff | TermOp::Eq => lift(call("=", &args)),
            TermOp::Ite if bv1_predicates => format!(
                "(ite (= {} #b1) {} {})",
                args[0], args[1], args[2]
            ),
            TermOp::Ite => call("ite", &args),
            TermOp::BvNot => call("bvnot", &args),
            TermOp::BvNeg => call("bvneg", &args),
            TermOp::BvBinary(op) => call(op.smtlib_name(), &args),
            TermOp::BvCompare(op) => lift(call(op.smtlib_name(), &args)),
            TermOp::Concat => call("concat", &args),
            TermOp::Extract { high, low } => {
                call(&format!("(_ extract {} {})", high, low), &args)
            }
            TermOp::ZeroExtend(by) => call(&format!("(_ zero_extend {})", by), &args),
            TermOp::SignExtend(by) => call(&format!("(_ sign_extend {})", by), &args),
            TermOp::ConstArray => {
                call(&format!("(as const {})", render_sort(&node.sort)), &args)
            }
            TermOp::Select => call("select", &args),
            TermOp::Store => call("store", &args),
            TermOp::FpFromParts => call("fp", &args),
            TermOp::FpFromIeeeBits | TermOp::FpToFp | TermOp::FpFromSigned => {
                let format = float_format_of(&node.sort);
                call(
                    &format!(
                        "(_ to_fp {} {})",
                        format.exponent_bits, format.significand_bits
                    ),
                    &args,
                )
            }
            TermOp::FpFromUnsigned => {
                let format = float_format_of(&node.sort);
                call(
                    &format!(
                        "(_ to_fp_unsigned {} {})",
                        format.exponent_bits, format.significand_bits
                    ),
                    &args,
                )
            }
            TermOp::FpToIeeeBits => call("fp.to_ieee_bv", &args),
            TermOp::FpToUnsigned | TermOp::FpToSigned => {
                let width = match node.sort {
                    Sort::BitVec(width) => width,
                    _ => unreachable!("float conversion to sort {:?}", node.sort),
                };
                let name = if node.op == TermOp::FpToUnsigned {
                    "fp.to_ubv"
                } else {
                    "fp.to_sbv"
                };
                call(&format!("(_ {} {})", name, width), &args)
            }
            TermOp::FpArith(op) => call(op.smtlib_name(), &args),
            TermOp::FpUnary(op) => call(op.smtlib_name(), &args),
            TermOp::FpCompare(op) => lift(call(op.smtlib_name(), &args)),
            TermOp::FpClassify(class) => lift(call(class.smtlib_name(), &args)),
        }
    }
}

fn float_format_of(sort: &Sort) -> FloatFormat {
    match sort {
        Sort::Float(format) => *format,
        other => unreachable!("expected a float sort, got {:?}", other),
    }
}

pub fn render_sort(sort: &Sort) -> String {
    match sort {
        Sort::Bool => "Bool".to_string(),
        Sort::BitVec(width) => format!("(_ BitVec {})", width),
        Sort::Float(format) => format!(
            "(_ FloatingPoint {} {})",
            format.exponent_bits, format.significand_bits
        ),
        Sort::Array { domain, range } => {
            format!("(Array (_ BitVec {}) (_ BitVec {}))", domain, range)
        }
        Sort::RoundingMode => "RoundingMode".to_string(),
    }
}

fn same_bitvec(lhs: &SortedTerm<TermId>, rhs: &SortedTerm<TermId>) -> usize {
    let width = lhs.bitvec_width();
    assert_eq!(
        width,
        rhs.bitvec_width(),
        "bit-vector width mismatch: {} vs {}",
        width,
        rhs.bitvec_width()
    );
    width
}

fn same_float(lhs: &SortedTerm<TermId>, rhs: &SortedTerm<TermId>) -> FloatFormat {
    let format = lhs.float_format();
    assert_eq!(format, rhs.float_format(), "float format mismatch");
    format
}

impl TermAlgebra for TermGraph {
    type Term = TermId;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn declare_array(
        &mut self,
        name: &str,
        domain: usize,
        range: usize,
    ) -> io::Result<SortedTerm<TermId>> {
        self.declare(name.to_string(), Sort::Array { domain, range })
    }

    fn declare_fresh(&mut self, prefix: &str, sort: Sort) -> io::Result<SortedTerm<TermId>> {
        loop {
            let name = format!("{}!{}", prefix, self.next_fresh);
            self.next_fresh += 1;
            if !self.symbols.contains_key(&name) {
                return self.declare(name, sort);
            }
        }
    }

    fn bool_const(&mut self, value: bool) -> SortedTerm<TermId> {
        let sort = self.predicate_sort();
        self.intern(TermOp::BoolConst(value), vec![], sort)
    }

    fn bv_literal(&mut self, bits: &BitSlice<u64, Lsb0>) -> SortedTerm<TermId> {
        assert!(!bits.is_empty(), "zero-width literal");
        let mut value = BigUint::default();
        for i in bits.iter_ones() {
            value.set_bit(i as u64, true);
        }
        self.intern(TermOp::BvLiteral(value), vec![], Sort::BitVec(bits.len()))
    }

    fn rounding_mode(&mut self, rm: RoundingMode) -> SortedTerm<TermId> {
        self.intern(TermOp::RoundingMode(rm), vec![], Sort::RoundingMode)
    }

    fn not(&mut self, p: &SortedTerm<TermId>) -> SortedTerm<TermId> {
        self.check_predicate(p);
        self.intern(TermOp::Not, vec![p.rep], p.sort)
    }

    fn and(&mut self, lhs: &SortedTerm<TermId>, rhs: &SortedTerm<TermId>) -> SortedTerm<TermId> {
        self.check_predicate(lhs);
        self.check_predicate(rhs);
        self.intern(TermOp::And, vec![lhs.rep, rhs.rep], lhs.sort)
    }

    fn or(&mut self, lhs: &SortedTerm<TermId>, rhs: &SortedTerm<TermId>) -> SortedTerm<TermId> {
        self.check_predicate(lhs);
        self.check_predicate(rhs);
        self.intern(TermOp::Or, vec![lhs.rep, rhs.rep], lhs.sort)
    }

    fn iff(&mut self, lhs: &SortedTerm<TermId>, rhs: &SortedTerm<TermId>) -> SortedTerm<TermId> {
        self.check_predicate(lhs);
        self.check_predicate(rhs);
        self.intern(TermOp::Iff, vec![lhs.rep, rhs.rep], lhs.sort)
    }

    fn ite(
        &mut self,
        cond: &SortedTerm<TermId>,
        then: &SortedTerm<TermId>,
        otherwise: &SortedTerm<TermId>,
    ) -> SortedTerm<TermId> {
        self.check_predicate(cond);
        assert_eq!(then.sort, otherwise.sort, "ite arms have different sorts");
        self.intern(
            TermOp::Ite,
            vec![cond.rep, then.rep, otherwise.rep],
            then.sort,
        )
    }

    fn eq(&mut self, lhs: &SortedTerm<TermId>, rhs: &SortedTerm<TermId>) -> SortedTerm<TermId> {
        assert_eq!(lhs.sort, rhs.sort, "equality between different sorts");
        let sort = self.predicate_sort();
        self.intern(TermOp::Eq, vec![lhs.rep, rhs.rep], sort)
    }

    fn bv_not(&mut self, bv: &SortedTerm<TermId>) -> SortedTerm<TermId> {
        let width = bv.bitvec_width();
        self.intern(TermOp::BvNot, vec![bv.rep], Sort::BitVec(width))
    }

    fn bv_neg(&mut self, bv: &SortedTerm<TermId>) -> SortedTerm<TermId> {
        let width = bv.bitvec_width();
        self.intern(TermOp::BvNeg, vec![bv.rep], Sort::BitVec(width))
    }

    fn bv_binary(
        &mut self,
        op: BvBinaryOp,
        lhs: &SortedTerm<TermId>,
        rhs: &SortedTerm<TermId>,
    ) -> SortedTerm<TermId> {
        let width = same_bitvec(lhs, rhs);
        self.intern(
            TermOp::BvBinary(op),
            vec![lhs.rep, rhs.rep],
            Sort::BitVec(width),
        )
    }

    fn bv_compare(
        &mut self,
        op: BvCompareOp,
        lhs: &SortedTerm<TermId>,
        rhs: &SortedTerm<TermId>,
    ) -> SortedTerm<TermId> {
        same_bitvec(lhs, rhs);
        let sort = self.predicate_sort();
        self.intern(TermOp::BvCompare(op), vec![lhs.rep, rhs.rep], sort)
    }

    fn concat(&mut self, msb: &SortedTerm<TermId>, lsb: &SortedTerm<TermId>) -> SortedTerm<TermId> {
        let width = msb.bitvec_width() + lsb.bitvec_width();
        self.intern(TermOp::Concat, vec![msb.rep, lsb.rep], Sort::BitVec(width))
    }

    fn extract(&mut self, bv: &SortedTerm<TermId>, high: usize, low: usize) -> SortedTerm<TermId> {
        let width = bv.bitvec_width();
        assert!(
            low <= high && high < width,
            "invalid extract [{}:{}] of a {}-bit vector",
            high,
            low,
            width
        );
        self.intern(
            TermOp::Extract { high, low },
            vec![bv.rep],
            Sort::BitVec(high - low + 1),
        )
    }

    fn zero_extend(&mut self, bv: &SortedTerm<TermId>, by: usize) -> SortedTerm<TermId> {
        let width = bv.bitvec_width();
        self.intern(TermOp::ZeroExtend(by), vec![bv.rep], Sort::BitVec(width + by))
    }

    fn sign_extend(&mut self, bv: &SortedTerm<TermId>, by: usize) -> SortedTerm<TermId> {
        let width = bv.bitvec_width();
        self.intern(TermOp::SignExtend(by), vec![bv.rep], Sort::BitVec(width + by))
    }

    fn const_array(&mut self, domain: usize, value: &SortedTerm<TermId>) -> SortedTerm<TermId> {
        let range = value.bitvec_width();
        self.intern(
            TermOp::ConstArray,
            vec![value.rep],
            Sort::Array { domain, range },
        )
    }

    fn select(
        &mut self,
        array: &SortedTerm<TermId>,
        index: &SortedTerm<TermId>,
    ) -> SortedTerm<TermId> {
        let (domain, range) = match array.sort {
            Sort::Array { domain, range } => (domain, range),
            other => panic!("select from a term of sort {:?}", other),
        };
        assert_eq!(index.bitvec_width(), domain, "select index width");
        self.intern(TermOp::Select, vec![array.rep, index.rep], Sort::BitVec(range))
    }

    fn store(
        &mut self,
        array: &SortedTerm<TermId>,
        index: &SortedTerm<TermId>,
        value: &SortedTerm<TermId>,
    ) -> SortedTerm<TermId> {
        let (domain, range) = match array.sort {
            Sort::Array { domain, range } => (domain, range),
            other => panic!("store into a term of sort {:?}", other),
        };
        assert_eq!(index.bitvec_width(), domain, "store index width");
        assert_eq!(value.bitvec_width(), range, "store value width");
        self.intern(
            TermOp::Store,
            vec![array.rep, index.rep, value.rep],
            array.sort,
        )
    }

    fn fp_from_parts(
        &mut self,
        sign: &SortedTerm<TermId>,
        exponent: &SortedTerm<TermId>,
        fraction: &SortedTerm<TermId>,
    ) -> SortedTerm<TermId> {
        self.check_floats();
        assert_eq!(sign.bitvec_width(), 1, "float sign must be one bit");
        let format = FloatFormat::new(exponent.bitvec_width(), fraction.bitvec_width() + 1);
        self.intern(
            TermOp::FpFromParts,
            vec![sign.rep, exponent.rep, fraction.rep],
            Sort::Float(format),
        )
    }

    fn fp_from_ieee_bits(
        &mut self,
        bits: &SortedTerm<TermId>,
        format: FloatFormat,
    ) -> SortedTerm<TermId> {
        self.check_floats();
        assert_eq!(
            bits.bitvec_width(),
            format.ieee_width(),
            "IEEE encoding width for {:?}",
            format
        );
        self.intern(TermOp::FpFromIeeeBits, vec![bits.rep], Sort::Float(format))
    }

    fn fp_to_ieee_bits(&mut self, value: &SortedTerm<TermId>) -> SortedTerm<TermId> {
        assert!(
            self.capabilities.float_to_ieee_bits,
            "backend cannot convert floats to bit-vectors directly"
        );
        let format = value.float_format();
        self.intern(
            TermOp::FpToIeeeBits,
            vec![value.rep],
            Sort::BitVec(format.ieee_width()),
        )
    }

    fn fp_to_fp(
        &mut self,
        rm: &SortedTerm<TermId>,
        value: &SortedTerm<TermId>,
        format: FloatFormat,
    ) -> SortedTerm<TermId> {
        self.check_floats();
        assert_eq!(rm.sort, Sort::RoundingMode);
        value.float_format();
        self.intern(TermOp::FpToFp, vec![rm.rep, value.rep], Sort::Float(format))
    }

    fn fp_from_unsigned(
        &mut self,
        rm: &SortedTerm<TermId>,
        bv: &SortedTerm<TermId>,
        format: FloatFormat,
    ) -> SortedTerm<TermId> {
        self.check_floats();
        assert_eq!(rm.sort, Sort::RoundingMode);
        bv.bitvec_width();
        self.intern(TermOp::FpFromUnsigned, vec![rm.rep, bv.rep], Sort::Float(format))
    }

    fn fp_from_signed(
        &mut self,
        rm: &SortedTerm<TermId>,
        bv: &SortedTerm<TermId>,
        format: FloatFormat,
    ) -> SortedTerm<TermId> {
        self.check_floats();
        assert_eq!(rm.sort, Sort::RoundingMode);
        bv.bitvec_width();
        self.intern(TermOp::FpFromSigned, vec![rm.rep, bv.rep], Sort::Float(format))
    }

    fn fp_to_unsigned(
        &mut self,
        rm: &SortedTerm<TermId>,
        value: &SortedTerm<TermId>,
        width: usize,
    ) -> SortedTerm<TermId> {
        self.check_floats();
        assert_eq!(rm.sort, Sort::RoundingMode);
        value.float_format();
        self.intern(TermOp::FpToUnsigned, vec![rm.rep, value.rep], Sort::BitVec(width))
    }

    fn fp_to_signed(
        &mut self,
        rm: &SortedTerm<TermId>,
        value: &SortedTerm<TermId>,
        width: usize,
    ) -> SortedTerm<TermId> {
        self.check_floats();
        assert_eq!(rm.sort, Sort::RoundingMode);
        value.float_format();
        self.intern(TermOp::FpToSigned, vec![rm.rep, value.rep], Sort::BitVec(width))
    }

    fn fp_arith(
        &mut self,
        op: FpArithOp,
        rm: Option<&SortedTerm<TermId>>,
        lhs: &SortedTerm<TermId>,
        rhs: &SortedTerm<TermId>,
    ) -> SortedTerm<TermId> {
        self.check_floats();
        assert_eq!(
            op.takes_rounding_mode(),
            rm.is_some(),
            "rounding mode mismatch for {:?}",
            op
        );
        let format = same_float(lhs, rhs);
        let mut args: Vec<TermId> = rm.iter().map(|rm| rm.rep).collect();
        args.push(lhs.rep);
        args.push(rhs.rep);
        self.intern(TermOp::FpArith(op), args, Sort::Float(format))
    }

    fn fp_unary(
        &mut self,
        op: FpUnaryOp,
        rm: Option<&SortedTerm<TermId>>,
        value: &SortedTerm<TermId>,
    ) -> SortedTerm<TermId> {
        self.check_floats();
        assert_eq!(
            op.takes_rounding_mode(),
            rm.is_some(),
            "rounding mode mismatch for {:?}",
            op
        );
        let format = value.float_format();
        let mut args: Vec<TermId> = rm.iter().map(|rm| rm.rep).collect();
        args.push(value.rep);
        self.intern(TermOp::FpUnary(op), args, Sort::Float(format))
    }

    fn fp_compare(
        &mut self,
        op: FpCompareOp,
        lhs: &SortedTerm<TermId>,
        rhs: &SortedTerm<TermId>,
    ) -> SortedTerm<TermId> {
        self.check_floats();
        same_float(lhs, rhs);
        let sort = self.predicate_sort();
        self.intern(TermOp::FpCompare(op), vec![lhs.rep, rhs.rep], sort)
    }

    fn fp_classify(&mut self, class: FpClass, value: &SortedTerm<TermId>) -> SortedTerm<TermId> {
        self.check_floats();
        value.float_format();
        let sort = self.predicate_sort();
        self.intern(TermOp::FpClassify(class), vec![value.rep], sort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_structural_sharing() {
        let mut g = TermGraph::new(TermGraphOptions::z3_like());
        let x = g.declare_fresh("x", Sort::BitVec(8)).unwrap();
        let one = g.bv_one(8);
        let a = g.bv_add(&x, &one);
        let b = g.bv_add(&x, &one);
        assert_eq!(a, b);
        assert_eq!(g.len(), 3);
        assert_eq!(g.primitive_calls(), 4);
    }

    #[test]
    fn test_duplicate_declaration_is_an_error() {
        let mut g = TermGraph::new(TermGraphOptions::z3_like());
        g.declare_array("mem", 32, 8).unwrap();
        let err = g.declare_array("mem", 32, 8).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_fresh_names_skip_taken_symbols() {
        let mut g = TermGraph::new(TermGraphOptions::z3_like());
        g.declare_array("v!0", 8, 8).unwrap();
        let fresh = g.declare_fresh("v", Sort::BitVec(4)).unwrap();
        assert_eq!(g.symbol_name(fresh.rep), Some("v!1"));
    }

    #[test]
    fn test_predicate_sort_follows_capabilities() {
        let mut g = TermGraph::new(TermGraphOptions::boolector_like());
        let t = g.bool_const(true);
        assert_eq!(t.sort, Sort::BitVec(1));
        let mut g = TermGraph::new(TermGraphOptions::stp_like());
        let t = g.bool_const(true);
        assert_eq!(t.sort, Sort::Bool);
    }

    #[test]
    #[should_panic(expected = "bit-vector width mismatch")]
    fn test_width_mismatch_panics() {
        let mut g = TermGraph::new(TermGraphOptions::z3_like());
        let a = g.bv_zero(8);
        let b = g.bv_zero(16);
        g.bv_add(&a, &b);
    }

    #[test]
    fn test_smtlib_rendering() {
        let mut g = TermGraph::new(TermGraphOptions::z3_like());
        let mem = g.declare_array("mem", 32, 8).unwrap();
        let index = g.bv_u64(32, 3);
        let byte = g.select(&mem, &index);
        let limit = g.bv_u64(8, 10);
        let lt = g.bv_compare(BvCompareOp::Ult, &byte, &limit);
        let script = g.to_smtlib(&[lt]);
        assert_eq!(
            script,
            "(set-logic ALL)\n\
             (declare-const mem (Array (_ BitVec 32) (_ BitVec 8)))\n\
             (define-fun t1 () (_ BitVec 32) #b00000000000000000000000000000011)\n\
             (define-fun t2 () (_ BitVec 8) (select mem t1))\n\
             (define-fun t3 () (_ BitVec 8) #b00001010)\n\
             (define-fun t4 () Bool (bvult t2 t3))\n\
             (assert t4)\n\
             (check-sat)\n"
        );
    }

    #[test]
    fn test_smtlib_rendering_with_bv1_predicates() {
        let mut g = TermGraph::new(TermGraphOptions::boolector_like());
        let x = g.declare_fresh("x", Sort::BitVec(4)).unwrap();
        let zero = g.bv_zero(4);
        let is_zero = g.eq(&x, &zero);
        let negated = g.not(&is_zero);
        let script = g.to_smtlib(&[negated]);
        assert!(script.contains("(define-fun t2 () (_ BitVec 1) (ite (= x!0 t1) #b1 #b0))"));
        assert!(script.contains("(define-fun t3 () (_ BitVec 1) (bvnot t2))"));
        assert!(script.contains("(assert (= t3 #b1))"));
    }

    #[test]
    fn test_options_load_from_json() {
        let text = r#"{"capabilities": {"boolean_sort": false, "float_sort": false, "float_to_ieee_bits": false}}"#;
        let options: TermGraphOptions = serde_json::from_str(text).unwrap();
        assert_eq!(options, TermGraphOptions::boolector_like());
        let g = TermGraph::new(options);
        assert!(!g.capabilities().boolean_sort);
    }
}
