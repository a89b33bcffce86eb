// SPDX-License-Identifier: Apache-2.0

#![cfg(feature = "has-easy-smt")]

use std::{
    collections::{HashMap, HashSet},
    io,
    path::PathBuf,
};

use bitvec::prelude::*;
use easy_smt::{Context, ContextBuilder, SExpr};
use num_bigint::BigUint;

use crate::expr::{FloatFormat, RoundingMode};
use crate::term_algebra::{
    BvBinaryOp, BvCompareOp, Capabilities, FpArithOp, FpClass, FpCompareOp, FpUnaryOp, Response,
    Solver, Sort, SortedTerm, TermAlgebra,
};

#[derive(Debug, Clone)]
pub struct SolverFn {
    pub push_fn: fn(&mut Context) -> io::Result<()>,
    pub pop_fn: fn(&mut Context) -> io::Result<()>,
    pub check_fn: fn(&mut Context) -> io::Result<easy_smt::Response>,
    pub assert_fn: fn(&mut Context, SExpr) -> io::Result<()>,
}

impl SolverFn {
    pub fn default() -> Self {
        Self {
            push_fn: Context::push,
            pop_fn: Context::pop,
            check_fn: Context::check,
            assert_fn: Context::assert,
        }
    }
}

/// Configuration for an SMT-LIB2 solver executable driven through
/// `easy-smt`.
///
/// The solver runs as a child process and every term is sent over its stdin,
/// so any solver speaking SMT-LIB2 works without FFI. `capabilities` tells
/// the term builder which sorts the solver should be given.
#[derive(Clone)]
pub struct EasySmtConfig {
    pub solver_path: PathBuf,
    pub solver_args: Vec<String>,
    pub replay_file: Option<PathBuf>,
    pub solver_fn: SolverFn,
    pub capabilities: Capabilities,
}

impl EasySmtConfig {
    pub fn bitwuzla() -> Self {
        Self {
            solver_path: PathBuf::from("bitwuzla"),
            solver_args: ["--produce-models"].iter().map(|s| s.to_string()).collect(),
            replay_file: None,
            solver_fn: SolverFn {
                push_fn: |ctx| ctx.push_many(1),
                pop_fn: |ctx| ctx.pop_many(1),
                ..SolverFn::default()
            },
            capabilities: Capabilities {
                boolean_sort: true,
                float_sort: true,
                float_to_ieee_bits: false,
            },
        }
    }

    pub fn boolector() -> Self {
        Self {
            solver_path: PathBuf::from("boolector"),
            solver_args: [
                "--smt2",               // Use SMT2
                "-m",                   // Produce models
                "--output-format=smt2", // Output in SMT2 format
                "--no-exit-codes",      // Don't exit with error code on failure
                "--incremental",        // Use incremental solving
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            replay_file: None,
            solver_fn: SolverFn {
                push_fn: |ctx| ctx.push_many(1),
                pop_fn: |ctx| ctx.pop_many(1),
                ..SolverFn::default()
            },
            capabilities: Capabilities {
                boolean_sort: false,
                float_sort: false,
                float_to_ieee_bits: false,
            },
        }
    }

    pub fn z3() -> Self {
        Self {
            solver_path: PathBuf::from("z3"),
            solver_args: [
                "-nw",   // No warnings
                "-smt2", // Use SMT2
                "-in",   // Read from stdin
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            replay_file: None,
            solver_fn: SolverFn::default(),
            capabilities: Capabilities {
                boolean_sort: true,
                float_sort: true,
                float_to_ieee_bits: true,
            },
        }
    }
}

/// A `TermAlgebra` and `Solver` over a live solver process.
///
/// Every compound term is bound to a `t{n}` constant with `define-fun` the
/// first time it is built, so shared subterms are sent once and structurally
/// equal terms come back as the same atom.
pub struct EasySmtSolver {
    context: Context,
    solver_fn: SolverFn,
    capabilities: Capabilities,
    next_name_index: usize,
    next_fresh_index: usize,
    declared: HashSet<String>,
    term_cache: HashMap<String, SExpr>,
    reverse_cache: HashMap<SExpr, String>,
    /// First failure of a `define-fun` issued while building a term; reported
    /// by the next operation that returns `io::Result`.
    pending_error: Option<io::Error>,
}

impl EasySmtSolver {
    pub fn new(config: &EasySmtConfig) -> io::Result<EasySmtSolver> {
        let mut builder = ContextBuilder::new();
        if let Some(ref replay_file) = config.replay_file {
            builder.replay_file(Some(std::fs::File::create(replay_file)?));
        }
        builder.solver(&config.solver_path);
        builder.solver_args(&config.solver_args);
        let context = builder.build()?;
        log::debug!(
            "started solver {} with capabilities {:?}",
            config.solver_path.display(),
            config.capabilities
        );
        Ok(EasySmtSolver {
            context,
            solver_fn: config.solver_fn.clone(),
            capabilities: config.capabilities,
            next_name_index: 0,
            next_fresh_index: 0,
            declared: HashSet::new(),
            term_cache: HashMap::new(),
            reverse_cache: HashMap::new(),
            pending_error: None,
        })
    }

    fn get_next_available_name(&mut self) -> String {
        let mut name = format!("t{}", self.next_name_index);
        while self.term_cache.contains_key(&name) || self.declared.contains(&name) {
            self.next_name_index += 1;
            name = format!("t{}", self.next_name_index);
        }
        name
    }

    fn cache_term(&mut self, sort: Sort, rep: SExpr) -> SortedTerm<SExpr> {
        if rep.is_atom() {
            return SortedTerm::new(sort, rep);
        }
        if let Some(name) = self.reverse_cache.get(&rep) {
            return SortedTerm::new(sort, self.context.atom(name));
        }
        let name = self.get_next_available_name();
        let sort_expr = self.sort_expr(sort);
        match self.context.define_const(name.clone(), sort_expr, rep) {
            Ok(new_expr) => {
                self.term_cache.insert(name.clone(), rep);
                self.reverse_cache.insert(rep, name.clone());
                self.reverse_cache.insert(new_expr, name);
                SortedTerm::new(sort, new_expr)
            }
            Err(e) => {
                log::warn!("failed to define {}: {}", name, e);
                if self.pending_error.is_none() {
                    self.pending_error = Some(e);
                }
                SortedTerm::new(sort, rep)
            }
        }
    }

    fn take_pending_error(&mut self) -> io::Result<()> {
        match self.pending_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn sort_expr(&self, sort: Sort) -> SExpr {
        let ctx = &self.context;
        match sort {
            Sort::Bool => ctx.atom("Bool"),
            Sort::BitVec(width) => ctx.bit_vec_sort(ctx.numeral(width)),
            Sort::Float(format) => ctx.list(vec![
                ctx.atoms().und,
                ctx.atom("FloatingPoint"),
                ctx.numeral(format.exponent_bits),
                ctx.numeral(format.significand_bits),
            ]),
            Sort::Array { domain, range } => ctx.list(vec![
                ctx.atom("Array"),
                ctx.bit_vec_sort(ctx.numeral(domain)),
                ctx.bit_vec_sort(ctx.numeral(range)),
            ]),
            Sort::RoundingMode => ctx.atom("RoundingMode"),
        }
    }

    fn predicate_sort(&self) -> Sort {
        if self.capabilities.boolean_sort {
            Sort::Bool
        } else {
            Sort::BitVec(1)
        }
    }

    fn app(&self, name: &str, args: &[SExpr]) -> SExpr {
        let mut list = vec![self.context.atom(name)];
        list.extend_from_slice(args);
        self.context.list(list)
    }

    /// `((_ name i...) args...)`
    fn indexed_app(&self, name: &str, indices: &[usize], args: &[SExpr]) -> SExpr {
        let mut head = vec![self.context.atoms().und, self.context.atom(name)];
        head.extend(indices.iter().map(|i| self.context.numeral(*i)));
        let mut list = vec![self.context.list(head)];
        list.extend_from_slice(args);
        self.context.list(list)
    }

    /// Wraps a native SMT-LIB Bool in the predicate sort.
    fn predicate(&mut self, native: SExpr) -> SortedTerm<SExpr> {
        let sort = self.predicate_sort();
        if self.capabilities.boolean_sort {
            return self.cache_term(sort, native);
        }
        let one = self.context.atom("#b1");
        let zero = self.context.atom("#b0");
        let lifted = self.context.ite(native, one, zero);
        self.cache_term(sort, lifted)
    }

    /// The native SMT-LIB Bool a predicate stands for.
    fn native_bool(&self, p: &SortedTerm<SExpr>) -> SExpr {
        assert_eq!(p.sort, self.predicate_sort(), "expected a predicate");
        if self.capabilities.boolean_sort {
            p.rep
        } else {
            self.context.eq(p.rep, self.context.atom("#b1"))
        }
    }

    fn float_format_app(
        &mut self,
        name: &str,
        format: FloatFormat,
        args: &[SExpr],
    ) -> SortedTerm<SExpr> {
        assert!(
            self.capabilities.float_sort,
            "backend has no floating-point sort"
        );
        let rep = self.indexed_app(
            name,
            &[format.exponent_bits, format.significand_bits],
            args,
        );
        self.cache_term(Sort::Float(format), rep)
    }

    /// Reads the model value of a bit-vector term after a `Sat` check.
    pub fn get_bits(&mut self, term: &SortedTerm<SExpr>) -> io::Result<BigUint> {
        self.take_pending_error()?;
        let value = self.context.get_value(vec![term.rep])?[0].1;
        let atom = self.context.get_atom(value).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "model value must be an atom")
        })?;
        let parsed = if let Some(rest) = atom.strip_prefix("#b") {
            BigUint::parse_bytes(rest.as_bytes(), 2)
        } else if let Some(rest) = atom.strip_prefix("#x") {
            BigUint::parse_bytes(rest.as_bytes(), 16)
        } else {
            None
        };
        parsed.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid bit-vector atom: {}", atom),
            )
        })
    }

    /// Renders `term` as a `let` expression over the cached definitions it
    /// depends on.
    pub fn render(&self, term: &SortedTerm<SExpr>) -> String {
        let context = &self.context;
        let final_name = match context.get_atom(term.rep) {
            Some(name) if self.term_cache.contains_key(name) => name.to_string(),
            _ => return context.display(term.rep).to_string(),
        };

        fn gather_names(
            expr: SExpr,
            ctx: &Context,
            term_cache: &HashMap<String, SExpr>,
            out: &mut Vec<String>,
        ) {
            if expr.is_atom() {
                if let Some(atom) = ctx.get_atom(expr) {
                    if term_cache.contains_key(atom) {
                        out.push(atom.to_string());
                    }
                }
            } else if let Some(children) = ctx.get_list(expr) {
                for &child in children {
                    gather_names(child, ctx, term_cache, out);
                }
            }
        }

        // Post-order over definitions, iteratively so deep terms cannot
        // overflow the stack.
        let mut visited: HashSet<String> = HashSet::new();
        let mut order: Vec<String> = Vec::new();
        let mut stack: Vec<(String, bool)> = vec![(final_name.clone(), false)];
        while let Some((name, processed)) = stack.pop() {
            if processed {
                order.push(name);
                continue;
            }
            if !visited.insert(name.clone()) {
                continue;
            }
            stack.push((name.clone(), true));
            if let Some(&expr) = self.term_cache.get(&name) {
                let mut deps = Vec::new();
                gather_names(expr, context, &self.term_cache, &mut deps);
                for dep in deps {
                    if !visited.contains(&dep) {
                        stack.push((dep, false));
                    }
                }
            }
        }

        let mut result = String::from("(let\n");
        for (i, name) in order.iter().enumerate() {
            if let Some(expr) = self.term_cache.get(name) {
                result.push_str(if i == 0 { "  ((" } else { "   (" });
                result.push_str(name);
                result.push(' ');
                result.push_str(&context.display(*expr).to_string());
                result.push_str(")\n");
            }
        }
        result.push_str("  )\n  ");
        result.push_str(&final_name);
        result.push_str("\n)");
        result
    }
}

fn check_same_width(lhs: &SortedTerm<SExpr>, rhs: &SortedTerm<SExpr>) -> usize {
    let width = lhs.bitvec_width();
    assert_eq!(width, rhs.bitvec_width(), "bit-vector width mismatch");
    width
}

impl TermAlgebra for EasySmtSolver {
    type Term = SExpr;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn declare_array(
        &mut self,
        name: &str,
        domain: usize,
        range: usize,
    ) -> io::Result<SortedTerm<SExpr>> {
        self.take_pending_error()?;
        if !self.declared.insert(name.to_string()) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("symbol {} is already declared", name),
            ));
        }
        let sort = Sort::Array { domain, range };
        let sort_expr = self.sort_expr(sort);
        let rep = self.context.declare_const(name, sort_expr)?;
        Ok(SortedTerm::new(sort, rep))
    }

    fn declare_fresh(&mut self, prefix: &str, sort: Sort) -> io::Result<SortedTerm<SExpr>> {
        self.take_pending_error()?;
        let name = loop {
            let name = format!("{}!{}", prefix, self.next_fresh_index);
            self.next_fresh_index += 1;
            if !self.declared.contains(&name) && !self.term_cache.contains_key(&name) {
                break name;
            }
        };
        self.declared.insert(name.clone());
        let sort_expr = self.sort_expr(sort);
        let rep = self.context.declare_const(name, sort_expr)?;
        Ok(SortedTerm::new(sort, rep))
    }

    fn bool_const(&mut self, value: bool) -> SortedTerm<SExpr> {
        let rep = match (self.capabilities.boolean_sort, value) {
            (true, true) => self.context.true_(),
            (true, false) => self.context.false_(),
            (false, true) => self.context.atom("#b1"),
            (false, false) => self.context.atom("#b0"),
        };
        SortedTerm::new(self.predicate_sort(), rep)
    }

    fn bv_literal(&mut self, bits: &BitSlice<u64, Lsb0>) -> SortedTerm<SExpr> {
        assert!(!bits.is_empty(), "zero-width literal");
        let digits: String = bits
            .iter()
            .rev()
            .map(|b| if *b { '1' } else { '0' })
            .collect();
        let rep = self.context.atom(format!("#b{}", digits));
        SortedTerm::new(Sort::BitVec(bits.len()), rep)
    }

    fn rounding_mode(&mut self, rm: RoundingMode) -> SortedTerm<SExpr> {
        SortedTerm::new(Sort::RoundingMode, self.context.atom(rm.smtlib_name()))
    }

    fn not(&mut self, p: &SortedTerm<SExpr>) -> SortedTerm<SExpr> {
        assert_eq!(p.sort, self.predicate_sort(), "expected a predicate");
        let rep = if self.capabilities.boolean_sort {
            self.context.not(p.rep)
        } else {
            self.context.bvnot(p.rep)
        };
        self.cache_term(p.sort, rep)
    }

    fn and(&mut self, lhs: &SortedTerm<SExpr>, rhs: &SortedTerm<SExpr>) -> SortedTerm<SExpr> {
        let (l, r) = (self.native_bool(lhs), self.native_bool(rhs));
        if self.capabilities.boolean_sort {
            let rep = self.context.and(l, r);
            self.cache_term(Sort::Bool, rep)
        } else {
            let rep = self.context.bvand(lhs.rep, rhs.rep);
            self.cache_term(Sort::BitVec(1), rep)
        }
    }

    fn or(&mut self, lhs: &SortedTerm<SExpr>, rhs: &SortedTerm<SExpr>) -> SortedTerm<SExpr> {
        let (l, r) = (self.native_bool(lhs), self.native_bool(rhs));
        if self.capabilities.boolean_sort {
            let rep = self.context.or(l, r);
            self.cache_term(Sort::Bool, rep)
        } else {
            let rep = self.context.bvor(lhs.rep, rhs.rep);
            self.cache_term(Sort::BitVec(1), rep)
        }
    }

    fn iff(&mut self, lhs: &SortedTerm<SExpr>, rhs: &SortedTerm<SExpr>) -> SortedTerm<SExpr> {
        assert_eq!(lhs.sort, self.predicate_sort(), "expected a predicate");
        assert_eq!(rhs.sort, self.predicate_sort(), "expected a predicate");
        let native = self.context.eq(lhs.rep, rhs.rep);
        self.predicate(native)
    }

    fn ite(
        &mut self,
        cond: &SortedTerm<SExpr>,
        then: &SortedTerm<SExpr>,
        otherwise: &SortedTerm<SExpr>,
    ) -> SortedTerm<SExpr> {
        assert_eq!(then.sort, otherwise.sort, "ite arms have different sorts");
        let c = self.native_bool(cond);
        let rep = self.context.ite(c, then.rep, otherwise.rep);
        self.cache_term(then.sort, rep)
    }

    fn eq(&mut self, lhs: &SortedTerm<SExpr>, rhs: &SortedTerm<SExpr>) -> SortedTerm<SExpr> {
        assert_eq!(lhs.sort, rhs.sort, "equality between different sorts");
        let native = self.context.eq(lhs.rep, rhs.rep);
        self.predicate(native)
    }

    fn bv_not(&mut self, bv: &SortedTerm<SExpr>) -> SortedTerm<SExpr> {
        let width = bv.bitvec_width();
        let rep = self.context.bvnot(bv.rep);
        self.cache_term(Sort::BitVec(width), rep)
    }

    fn bv_neg(&mut self, bv: &SortedTerm<SExpr>) -> SortedTerm<SExpr> {
        let width = bv.bitvec_width();
        let rep = self.context.bvneg(bv.rep);
        self.cache_term(Sort::BitVec(width), rep)
    }

    fn bv_binary(
        &mut self,
        op: BvBinaryOp,
        lhs: &SortedTerm<SExpr>,
        rhs: &SortedTerm<SExpr>,
    ) -> SortedTerm<SExpr> {
        let width = check_same_width(lhs, rhs);
        let rep = self.app(op.smtlib_name(), &[lhs.rep, rhs.rep]);
        self.cache_term(Sort::BitVec(width), rep)
    }

    fn bv_compare(
        &mut self,
        op: BvCompareOp,
        lhs: &SortedTerm<SExpr>,
        rhs: &SortedTerm<SExpr>,
    ) -> SortedTerm<SExpr> {
        check_same_width(lhs, rhs);
        let native = self.app(op.smtlib_name(), &[lhs.rep, rhs.rep]);
        self.predicate(native)
    }

    fn concat(&mut self, msb: &SortedTerm<SExpr>, lsb: &SortedTerm<SExpr>) -> SortedTerm<SExpr> {
        let width = msb.bitvec_width() + lsb.bitvec_width();
        let rep = self.context.concat(msb.rep, lsb.rep);
        self.cache_term(Sort::BitVec(width), rep)
    }

    fn extract(&mut self, bv: &SortedTerm<SExpr>, high: usize, low: usize) -> SortedTerm<SExpr> {
        let width = bv.bitvec_width();
        assert!(
            low <= high && high < width,
            "Invalid bit slice: high = {}, low = {}, width = {}",
            high,
            low,
            width
        );
        let rep = self.context.extract(high as i32, low as i32, bv.rep);
        self.cache_term(Sort::BitVec(high - low + 1), rep)
    }

    fn zero_extend(&mut self, bv: &SortedTerm<SExpr>, by: usize) -> SortedTerm<SExpr> {
        let width = bv.bitvec_width();
        let rep = self.indexed_app("zero_extend", &[by], &[bv.rep]);
        self.cache_term(Sort::BitVec(width + by), rep)
    }

    fn sign_extend(&mut self, bv: &SortedTerm<SExpr>, by: usize) -> SortedTerm<SExpr> {
        let width = bv.bitvec_width();
        let rep = self.indexed_app("sign_extend", &[by], &[bv.rep]);
        self.cache_term(Sort::BitVec(width + by), rep)
    }

    fn const_array(&mut self, domain: usize, value: &SortedTerm<SExpr>) -> SortedTerm<SExpr> {
        let sort = Sort::Array {
            domain,
            range: value.bitvec_width(),
        };
        let as_const = self.context.list(vec![
            self.context.atom("as"),
            self.context.atom("const"),
            self.sort_expr(sort),
        ]);
        let rep = self.context.list(vec![as_const, value.rep]);
        self.cache_term(sort, rep)
    }

    fn select(&mut self, array: &SortedTerm<SExpr>, index: &SortedTerm<SExpr>) -> SortedTerm<SExpr> {
        let range = match array.sort {
            Sort::Array { range, .. } => range,
            other => panic!("select from a term of sort {:?}", other),
        };
        let rep = self.app("select", &[array.rep, index.rep]);
        self.cache_term(Sort::BitVec(range), rep)
    }

    fn store(
        &mut self,
        array: &SortedTerm<SExpr>,
        index: &SortedTerm<SExpr>,
        value: &SortedTerm<SExpr>,
    ) -> SortedTerm<SExpr> {
        assert!(
            matches!(array.sort, Sort::Array { .. }),
            "store into a term of sort {:?}",
            array.sort
        );
        let rep = self.app("store", &[array.rep, index.rep, value.rep]);
        self.cache_term(array.sort, rep)
    }

    fn fp_from_parts(
        &mut self,
        sign: &SortedTerm<SExpr>,
        exponent: &SortedTerm<SExpr>,
        fraction: &SortedTerm<SExpr>,
    ) -> SortedTerm<SExpr> {
        assert!(
            self.capabilities.float_sort,
            "backend has no floating-point sort"
        );
        let format = FloatFormat::new(exponent.bitvec_width(), fraction.bitvec_width() + 1);
        let rep = self.app("fp", &[sign.rep, exponent.rep, fraction.rep]);
        self.cache_term(Sort::Float(format), rep)
    }

    fn fp_from_ieee_bits(
        &mut self,
        bits: &SortedTerm<SExpr>,
        format: FloatFormat,
    ) -> SortedTerm<SExpr> {
        assert_eq!(bits.bitvec_width(), format.ieee_width());
        self.float_format_app("to_fp", format, &[bits.rep])
    }

    fn fp_to_ieee_bits(&mut self, value: &SortedTerm<SExpr>) -> SortedTerm<SExpr> {
        assert!(
            self.capabilities.float_to_ieee_bits,
            "backend cannot convert floats to bit-vectors directly"
        );
        let width = value.float_format().ieee_width();
        let rep = self.app("fp.to_ieee_bv", &[value.rep]);
        self.cache_term(Sort::BitVec(width), rep)
    }

    fn fp_to_fp(
        &mut self,
        rm: &SortedTerm<SExpr>,
        value: &SortedTerm<SExpr>,
        format: FloatFormat,
    ) -> SortedTerm<SExpr> {
        self.float_format_app("to_fp", format, &[rm.rep, value.rep])
    }

    fn fp_from_unsigned(
        &mut self,
        rm: &SortedTerm<SExpr>,
        bv: &SortedTerm<SExpr>,
        format: FloatFormat,
    ) -> SortedTerm<SExpr> {
        self.float_format_app("to_fp_unsigned", format, &[rm.rep, bv.rep])
    }

    fn fp_from_signed(
        &mut self,
        rm: &SortedTerm<SExpr>,
        bv: &SortedTerm<SExpr>,
        format: FloatFormat,
    ) -> SortedTerm<SExpr> {
        self.float_format_app("to_fp", format, &[rm.rep, bv.rep])
    }

    fn fp_to_unsigned(
        &mut self,
        rm: &SortedTerm<SExpr>,
        value: &SortedTerm<SExpr>,
        width: usize,
    ) -> SortedTerm<SExpr> {
        value.float_format();
        let rep = self.indexed_app("fp.to_ubv", &[width], &[rm.rep, value.rep]);
        self.cache_term(Sort::BitVec(width), rep)
    }

    fn fp_to_signed(
        &mut self,
        rm: &SortedTerm<SExpr>,
        value: &SortedTerm<SExpr>,
        width: usize,
    ) -> SortedTerm<SExpr> {
        value.float_format();
        let rep = self.indexed_app("fp.to_sbv", &[width], &[rm.rep, value.rep]);
        self.cache_term(Sort::BitVec(width), rep)
    }

    fn fp_arith(
        &mut self,
        op: FpArithOp,
        rm: Option<&SortedTerm<SExpr>>,
        lhs: &SortedTerm<SExpr>,
        rhs: &SortedTerm<SExpr>,
    ) -> SortedTerm<SExpr> {
        assert_eq!(op.takes_rounding_mode(), rm.is_some());
        let format = lhs.float_format();
        assert_eq!(format, rhs.float_format(), "float format mismatch");
        let mut args: Vec<SExpr> = rm.iter().map(|rm| rm.rep).collect();
        args.push(lhs.rep);
        args.push(rhs.rep);
        let rep = self.app(op.smtlib_name(), &args);
        self.cache_term(Sort::Float(format), rep)
    }

    fn fp_unary(
        &mut self,
        op: FpUnaryOp,
        rm: Option<&SortedTerm<SExpr>>,
        value: &SortedTerm<SExpr>,
    ) -> SortedTerm<SExpr> {
        assert_eq!(op.takes_rounding_mode(), rm.is_some());
        let format = value.float_format();
        let mut args: Vec<SExpr> = rm.iter().map(|rm| rm.rep).collect();
        args.push(value.rep);
        let rep = self.app(op.smtlib_name(), &args);
        self.cache_term(Sort::Float(format), rep)
    }

    fn fp_compare(
        &mut self,
        op: FpCompareOp,
        lhs: &SortedTerm<SExpr>,
        rhs: &SortedTerm<SExpr>,
    ) -> SortedTerm<SExpr> {
        assert_eq!(lhs.float_format(), rhs.float_format(), "float format mismatch");
        let native = self.app(op.smtlib_name(), &[lhs.rep, rhs.rep]);
        self.predicate(native)
    }

    fn fp_classify(&mut self, class: FpClass, value: &SortedTerm<SExpr>) -> SortedTerm<SExpr> {
        value.float_format();
        let native = self.app(class.smtlib_name(), &[value.rep]);
        self.predicate(native)
    }
}

impl Solver for EasySmtSolver {
    fn assert(&mut self, predicate: &SortedTerm<SExpr>) -> io::Result<()> {
        self.take_pending_error()?;
        let native = self.native_bool(predicate);
        (self.solver_fn.assert_fn)(&mut self.context, native)
    }

    fn push(&mut self) -> io::Result<()> {
        self.take_pending_error()?;
        (self.solver_fn.push_fn)(&mut self.context)
    }

    fn pop(&mut self) -> io::Result<()> {
        self.take_pending_error()?;
        (self.solver_fn.pop_fn)(&mut self.context)
    }

    fn check(&mut self) -> io::Result<Response> {
        self.take_pending_error()?;
        match (self.solver_fn.check_fn)(&mut self.context) {
            Ok(easy_smt::Response::Sat) => Ok(Response::Sat),
            Ok(easy_smt::Response::Unsat) => Ok(Response::Unsat),
            Ok(easy_smt::Response::Unknown) => Ok(Response::Unknown),
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }
}

#[cfg(test)]
#[cfg(any(
    feature = "with-bitwuzla-binary-test",
    feature = "with-boolector-binary-test",
    feature = "with-z3-binary-test"
))]
mod binary_tests {
    use super::*;
    use crate::expr::{Array, BinaryOp, Expr, ExprRef, FpArithOp, UpdateList};
    use crate::options::TermBuilderOptions;
    use crate::term_builder::TermBuilder;
    use crate::test_utils::init_logger;

    fn builder(config: &EasySmtConfig) -> TermBuilder<EasySmtSolver> {
        init_logger();
        let solver = EasySmtSolver::new(config).unwrap();
        TermBuilder::new(solver, TermBuilderOptions::opt())
    }

    fn word(name: &str) -> ExprRef {
        Expr::read(UpdateList::new(Array::symbolic(name, 32, 32)), Expr::bv(32, 0))
    }

    fn assert_valid(config: &EasySmtConfig, constraints: &[ExprRef], query: &ExprRef) {
        let mut b = builder(config);
        let lowered = b.lower_query(constraints, query).unwrap();
        let solver = b.backend_mut();
        lowered.assert_into(solver).unwrap();
        assert_eq!(solver.check().unwrap(), Response::Unsat);
    }

    fn check_read_after_write(config: &EasySmtConfig) {
        let i = word("i");
        let mut updates = UpdateList::new(Array::symbolic("mem", 32, 8));
        updates.extend(i.clone(), Expr::bv(8, 0x5a));
        let read = Expr::read(updates, i);
        assert_valid(config, &[], &Expr::eq(read, Expr::bv(8, 0x5a)));
    }

    fn check_times_ten_divided_by_ten(config: &EasySmtConfig) {
        let x = word("x");
        let bound = Expr::binary(BinaryOp::Ult, x.clone(), Expr::bv(32, 400_000_000));
        let scaled = Expr::binary(BinaryOp::Mul, Expr::bv(32, 10), x.clone());
        let back = Expr::binary(BinaryOp::UDiv, scaled, Expr::bv(32, 10));
        assert_valid(config, &[bound], &Expr::eq(back, x));
    }

    #[cfg(any(
        feature = "with-bitwuzla-binary-test",
        feature = "with-z3-binary-test"
    ))]
    fn check_stored_float_reads_back(config: &EasySmtConfig) {
        let sum = Expr::fp_arith(
            FpArithOp::Add,
            Some(crate::expr::RoundingMode::NearestTiesToEven),
            word("a"),
            word("b"),
        );
        let mut updates = UpdateList::new(Array::symbolic("mem", 32, 32));
        updates.extend(Expr::bv(32, 2), sum.clone());
        let read = Expr::read(updates, Expr::bv(32, 2));
        assert_valid(config, &[], &Expr::eq(read, sum));
    }

    #[cfg(feature = "with-bitwuzla-binary-test")]
    #[test]
    fn test_read_after_write_bitwuzla_binary() {
        check_read_after_write(&EasySmtConfig::bitwuzla());
    }

    #[cfg(feature = "with-bitwuzla-binary-test")]
    #[test]
    fn test_times_ten_divided_by_ten_bitwuzla_binary() {
        check_times_ten_divided_by_ten(&EasySmtConfig::bitwuzla());
    }

    #[cfg(feature = "with-bitwuzla-binary-test")]
    #[test]
    fn test_stored_float_reads_back_bitwuzla_binary() {
        check_stored_float_reads_back(&EasySmtConfig::bitwuzla());
    }

    #[cfg(feature = "with-boolector-binary-test")]
    #[test]
    fn test_read_after_write_boolector_binary() {
        check_read_after_write(&EasySmtConfig::boolector());
    }

    #[cfg(feature = "with-boolector-binary-test")]
    #[test]
    fn test_times_ten_divided_by_ten_boolector_binary() {
        check_times_ten_divided_by_ten(&EasySmtConfig::boolector());
    }

    #[cfg(feature = "with-z3-binary-test")]
    #[test]
    fn test_read_after_write_z3_binary() {
        check_read_after_write(&EasySmtConfig::z3());
    }

    #[cfg(feature = "with-z3-binary-test")]
    #[test]
    fn test_times_ten_divided_by_ten_z3_binary() {
        check_times_ten_divided_by_ten(&EasySmtConfig::z3());
    }

    #[cfg(feature = "with-z3-binary-test")]
    #[test]
    fn test_stored_float_reads_back_z3_binary() {
        check_stored_float_reads_back(&EasySmtConfig::z3());
    }

    #[cfg(feature = "with-z3-binary-test")]
    #[test]
    fn test_shared_subterms_are_defined_once() {
        let mut solver = EasySmtSolver::new(&EasySmtConfig::z3()).unwrap();
        let x = solver.declare_fresh("x", Sort::BitVec(8)).unwrap();
        let one = solver.bv_one(8);
        let a = solver.bv_add(&x, &one);
        let b = solver.bv_add(&x, &one);
        assert_eq!(a, b);
        let rendered = solver.render(&a);
        assert!(rendered.contains("(bvadd x!0 #b00000001)"), "{}", rendered);
    }

    #[cfg(feature = "with-z3-binary-test")]
    #[test]
    fn test_model_values() {
        let mut solver = EasySmtSolver::new(&EasySmtConfig::z3()).unwrap();
        let x = solver.declare_fresh("x", Sort::BitVec(16)).unwrap();
        let target = solver.bv_u64(16, 0xbeef);
        let is_target = solver.eq(&x, &target);
        solver.assert(&is_target).unwrap();
        assert_eq!(solver.check().unwrap(), Response::Sat);
        assert_eq!(solver.get_bits(&x).unwrap(), BigUint::from(0xbeefu32));
    }
}
