// SPDX-License-Identifier: Apache-2.0

//! Lowers expression DAGs into backend terms.
//!
//! ```
//! use symlower::backend::term_graph::{TermGraph, TermGraphOptions};
//! use symlower::expr::{Array, BinaryOp, Expr, UpdateList};
//! use symlower::options::TermBuilderOptions;
//! use symlower::term_builder::TermBuilder;
//!
//! let graph = TermGraph::new(TermGraphOptions::z3_like());
//! let mut builder = TermBuilder::new(graph, TermBuilderOptions::opt());
//! let input = Array::symbolic("input", 32, 8);
//! let byte = Expr::read(UpdateList::new(input), Expr::bv(32, 0));
//! let doubled = Expr::binary(BinaryOp::Mul, Expr::bv(8, 2), byte);
//! let lowered = builder.construct(&doubled).unwrap();
//! assert_eq!(lowered.width, 8);
//! ```
//!
//! Lowering is driven by an explicit work stack rather than native
//! recursion, so expression depth is bounded only by memory.

use std::io;

use ahash::AHashMap;

use crate::coercion::{self, SideConstraints};
use crate::expr::{
    ArrayRef, ArraySize, ArraySource, BinaryOp, Constant, ExprKind, ExprRef, FloatFormat,
    RoundingMode, UpdateList, UpdateNodeRef,
};
use crate::expr_cache::{identity, ArrayTermCache, Lowered, NodeCache};
use crate::options::TermBuilderOptions;
use crate::strength_reduction;
use crate::term_algebra::{BvBinaryOp, BvCompareOp, Solver, Sort, SortedTerm, TermAlgebra};

/// Equalities pinning every element of a fixed-size constant array.
#[derive(Debug, Clone)]
pub struct ConstantArrayAssertions<Term> {
    pub array: ArrayRef,
    pub assertions: Vec<SortedTerm<Term>>,
}

/// A validity query ready to hand to a solver: the query is valid iff the
/// conjunction of all parts is unsatisfiable.
#[derive(Debug, Clone)]
pub struct LoweredQuery<Term> {
    pub constraints: Vec<SortedTerm<Term>>,
    pub negated_query: SortedTerm<Term>,
    pub constant_array_assertions: Vec<SortedTerm<Term>>,
    pub side_constraints: Vec<SortedTerm<Term>>,
}

impl<Term: Clone> LoweredQuery<Term> {
    /// All predicates in the order they are asserted.
    pub fn assertions(&self) -> impl Iterator<Item = &SortedTerm<Term>> {
        self.constraints
            .iter()
            .chain(std::iter::once(&self.negated_query))
            .chain(self.constant_array_assertions.iter())
            .chain(self.side_constraints.iter())
    }

    pub fn assert_into<S: Solver<Term = Term>>(&self, solver: &mut S) -> io::Result<()> {
        for predicate in self.assertions() {
            solver.assert(predicate)?;
        }
        Ok(())
    }
}

enum Task {
    Visit(ExprRef),
    Finish(ExprRef),
}

/// Results produced during one top-level call, keyed like the node cache.
/// The call's roots keep every key alive.
type Walk<Term> = AHashMap<usize, Lowered<Term>>;

pub struct TermBuilder<S: TermAlgebra> {
    backend: S,
    options: TermBuilderOptions,
    node_cache: NodeCache<S::Term>,
    array_cache: ArrayTermCache<S::Term>,
    side_constraints: SideConstraints<S::Term>,
    constant_array_assertions: Vec<ConstantArrayAssertions<S::Term>>,
    next_array_id: u64,
}

impl<S: TermAlgebra> TermBuilder<S> {
    pub fn new(backend: S, options: TermBuilderOptions) -> Self {
        log::debug!(
            "TermBuilder::new; options: {:?}; capabilities: {:?}",
            options,
            backend.capabilities()
        );
        TermBuilder {
            backend,
            options,
            node_cache: NodeCache::new(),
            array_cache: ArrayTermCache::new(),
            side_constraints: SideConstraints::new(),
            constant_array_assertions: Vec::new(),
            next_array_id: 0,
        }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }

    pub fn into_backend(self) -> S {
        self.backend
    }

    pub fn options(&self) -> &TermBuilderOptions {
        &self.options
    }

    pub fn cached_node_count(&self) -> usize {
        self.node_cache.len()
    }

    /// Lowers one expression. Width-1 expressions come back as predicates.
    pub fn construct(&mut self, expr: &ExprRef) -> io::Result<Lowered<S::Term>> {
        let mut walk = Walk::default();
        self.run(vec![expr.clone()], &mut walk)?;
        let lowered = self.operand(expr, &walk)?;
        self.end_of_call();
        Ok(lowered)
    }

    /// Lowers several expressions, sharing work between them.
    pub fn construct_all(&mut self, exprs: &[ExprRef]) -> io::Result<Vec<Lowered<S::Term>>> {
        let mut walk = Walk::default();
        self.run(exprs.to_vec(), &mut walk)?;
        let lowered = exprs
            .iter()
            .map(|e| self.operand(e, &walk))
            .collect::<io::Result<Vec<_>>>()?;
        self.end_of_call();
        Ok(lowered)
    }

    /// Lowers a validity query: `constraints` imply `query`.
    pub fn lower_query(
        &mut self,
        constraints: &[ExprRef],
        query: &ExprRef,
    ) -> io::Result<LoweredQuery<S::Term>> {
        for c in constraints.iter().chain(std::iter::once(query)) {
            assert_eq!(c.width(), 1, "query parts must be boolean expressions");
        }
        let mut roots = constraints.to_vec();
        roots.push(query.clone());
        let mut walk = Walk::default();
        self.run(roots, &mut walk)?;

        let mut lowered_constraints = Vec::with_capacity(constraints.len());
        for c in constraints {
            lowered_constraints.push(self.predicate(c, &walk)?);
        }
        let query = self.predicate(query, &walk)?;
        let negated_query = self.backend.not(&query);
        let constant_array_assertions = self
            .constant_array_assertions
            .iter()
            .flat_map(|entry| entry.assertions.iter().cloned())
            .collect();
        let side_constraints = self.side_constraints.as_slice().to_vec();
        self.end_of_call();
        Ok(LoweredQuery {
            constraints: lowered_constraints,
            negated_query,
            constant_array_assertions,
            side_constraints,
        })
    }

    /// The term for `array` before any writes, declaring it on first use.
    pub fn get_initial_array(&mut self, array: &ArrayRef) -> io::Result<SortedTerm<S::Term>> {
        if let Some(term) = self.array_cache.lookup_array(array) {
            return Ok(term.clone());
        }
        let name = format!("{}_{}", array.name(), self.next_array_id);
        self.next_array_id += 1;
        let domain = array.domain();
        let range = array.range();

        let term = match (array.source(), array.size()) {
            (ArraySource::Symbolic, _) => self.backend.declare_array(&name, domain, range)?,
            (ArraySource::Constant(store), ArraySize::Symbolic) => {
                let default = match store.default_value() {
                    Some(default) => self.backend.bv_literal(default.bits()),
                    None => unreachable!("constant array of symbolic size without a default"),
                };
                let mut term = self.backend.const_array(domain, &default);
                for (index, value) in store.values() {
                    let index = self.backend.bv_u64(domain, *index);
                    let value = self.backend.bv_literal(value.bits());
                    term = self.backend.store(&term, &index, &value);
                }
                term
            }
            (ArraySource::Constant(store), ArraySize::Fixed(size)) => {
                let term = self.backend.declare_array(&name, domain, range)?;
                let mut assertions = Vec::new();
                for i in 0..size {
                    if let Some(value) = store.value_at(i) {
                        let index = self.backend.bv_u64(domain, i);
                        let element = self.backend.select(&term, &index);
                        let value = self.backend.bv_literal(value.bits());
                        assertions.push(self.backend.eq(&element, &value));
                    }
                }
                log::debug!(
                    "get_initial_array; {} pinned by {} element equalities",
                    name,
                    assertions.len()
                );
                self.constant_array_assertions.push(ConstantArrayAssertions {
                    array: array.clone(),
                    assertions,
                });
                term
            }
        };
        log::debug!("get_initial_array; declared {} ({} -> {})", name, domain, range);
        self.array_cache.insert_array(array, term.clone());
        Ok(term)
    }

    /// The term for the array state after every write in `updates`.
    pub fn get_array_for_update(&mut self, updates: &UpdateList) -> io::Result<SortedTerm<S::Term>> {
        let mut walk = Walk::default();
        let mut roots = Vec::new();
        self.push_uncached_writes(updates.head(), &mut roots);
        self.run(roots, &mut walk)?;
        let term = self.array_for_update(updates.root(), updates.head(), &walk)?;
        self.end_of_call();
        Ok(term)
    }

    /// `array[index]` for a concrete index, ignoring any writes.
    pub fn get_initial_read(
        &mut self,
        array: &ArrayRef,
        index: u64,
    ) -> io::Result<SortedTerm<S::Term>> {
        let initial = self.get_initial_array(array)?;
        let index = self.backend.bv_u64(array.domain(), index);
        Ok(self.backend.select(&initial, &index))
    }

    pub fn clear_construct_cache(&mut self) {
        self.node_cache.clear();
    }

    pub fn clear_array_update_cache(&mut self) {
        self.array_cache.clear_updates();
    }

    /// Advances whenever either cache is cleared.
    pub fn generation(&self) -> u64 {
        self.node_cache.generation() + self.array_cache.generation()
    }

    pub fn side_constraints(&self) -> &SideConstraints<S::Term> {
        &self.side_constraints
    }

    /// Drains the side constraints and starts a new cache generation, so a
    /// node lowered again later re-emits the constraints it depends on.
    pub fn take_side_constraints(&mut self) -> Vec<SortedTerm<S::Term>> {
        self.node_cache.clear();
        self.array_cache.clear_updates();
        self.side_constraints.take()
    }

    /// Forgets everything lowered so far, initial arrays included. Arrays
    /// declared afterwards still get fresh names.
    pub fn clear_all(&mut self) {
        self.node_cache.clear();
        self.array_cache.clear();
        self.side_constraints.clear();
        self.constant_array_assertions.clear();
    }

    pub fn constant_array_assertions(&self) -> &[ConstantArrayAssertions<S::Term>] {
        &self.constant_array_assertions
    }

    fn end_of_call(&mut self) {
        if self.options.auto_clear_construct_cache {
            self.node_cache.clear();
        }
    }

    fn is_done(&self, expr: &ExprRef, walk: &Walk<S::Term>) -> bool {
        expr.is_constant()
            || walk.contains_key(&identity(expr))
            || self.node_cache.get(expr).is_some()
    }

    /// Queues the index and value of every write not yet folded into an
    /// array term.
    fn push_uncached_writes(&self, head: Option<&UpdateNodeRef>, out: &mut Vec<ExprRef>) {
        let mut cursor = head;
        while let Some(node) = cursor {
            if self.array_cache.lookup_update(node).is_some() {
                break;
            }
            out.push(node.index().clone());
            out.push(node.value().clone());
            cursor = node.next();
        }
    }

    fn run(&mut self, roots: Vec<ExprRef>, walk: &mut Walk<S::Term>) -> io::Result<()> {
        let mut stack: Vec<Task> = roots.into_iter().rev().map(Task::Visit).collect();
        while let Some(task) = stack.pop() {
            match task {
                Task::Visit(expr) => {
                    if self.is_done(&expr, walk) {
                        continue;
                    }
                    let mut deps = Vec::new();
                    if let ExprKind::Read { updates, .. } = expr.kind() {
                        self.push_uncached_writes(updates.head(), &mut deps);
                    }
                    deps.extend(expr.kind().operands().into_iter().cloned());
                    stack.push(Task::Finish(expr));
                    for dep in deps.into_iter().rev() {
                        if !self.is_done(&dep, walk) {
                            stack.push(Task::Visit(dep));
                        }
                    }
                }
                Task::Finish(expr) => {
                    if self.is_done(&expr, walk) {
                        continue;
                    }
                    let lowered = self.construct_actual(&expr, walk)?;
                    log::trace!(
                        "construct; {} of width {} -> {:?}",
                        expr.kind().name(),
                        expr.width(),
                        lowered.term.sort
                    );
                    if self.options.use_construct_hash {
                        self.node_cache.insert(&expr, lowered.clone());
                    }
                    walk.insert(identity(&expr), lowered);
                }
            }
        }
        Ok(())
    }

    fn lower_constant(&mut self, constant: &Constant) -> io::Result<Lowered<S::Term>> {
        let width = constant.width();
        let term = if constant.is_float() {
            let bits = self.backend.bv_literal(constant.bits());
            coercion::to_float(&mut self.backend, &mut self.side_constraints, &bits, width)?
        } else if width == 1 {
            self.backend.bool_const(constant.is_true())
        } else {
            self.backend.bv_literal(constant.bits())
        };
        Ok(Lowered { term, width })
    }

    fn operand(&mut self, expr: &ExprRef, walk: &Walk<S::Term>) -> io::Result<Lowered<S::Term>> {
        if let Some(constant) = expr.as_constant() {
            return self.lower_constant(constant);
        }
        if let Some(lowered) = walk.get(&identity(expr)) {
            return Ok(lowered.clone());
        }
        match self.node_cache.get(expr) {
            Some(lowered) => Ok(lowered.clone()),
            None => panic!(
                "{} operand used before it was lowered",
                expr.kind().name()
            ),
        }
    }

    fn bits(&mut self, expr: &ExprRef, walk: &Walk<S::Term>) -> io::Result<SortedTerm<S::Term>> {
        let lowered = self.operand(expr, walk)?;
        coercion::to_bitvector(&mut self.backend, &mut self.side_constraints, &lowered.term)
    }

    fn predicate(
        &mut self,
        expr: &ExprRef,
        walk: &Walk<S::Term>,
    ) -> io::Result<SortedTerm<S::Term>> {
        let lowered = self.operand(expr, walk)?;
        Ok(coercion::to_predicate(&mut self.backend, &lowered.term))
    }

    fn float(&mut self, expr: &ExprRef, walk: &Walk<S::Term>) -> io::Result<SortedTerm<S::Term>> {
        let lowered = self.operand(expr, walk)?;
        coercion::to_float(
            &mut self.backend,
            &mut self.side_constraints,
            &lowered.term,
            expr.width(),
        )
    }

    fn array_for_update(
        &mut self,
        root: &ArrayRef,
        head: Option<&UpdateNodeRef>,
        walk: &Walk<S::Term>,
    ) -> io::Result<SortedTerm<S::Term>> {
        let mut pending: Vec<UpdateNodeRef> = Vec::new();
        let mut base = None;
        let mut cursor = head;
        while let Some(node) = cursor {
            if let Some(term) = self.array_cache.lookup_update(node) {
                base = Some(term.clone());
                break;
            }
            pending.push(node.clone());
            cursor = node.next();
        }
        let mut term = match base {
            Some(term) => term,
            None => self.get_initial_array(root)?,
        };
        // Oldest write first so the newest ends up outermost.
        for node in pending.iter().rev() {
            let index = self.bits(node.index(), walk)?;
            let value = self.bits(node.value(), walk)?;
            term = self.backend.store(&term, &index, &value);
            self.array_cache.insert_update(node, term.clone());
        }
        Ok(term)
    }

    fn rounding_mode(&mut self, rm: RoundingMode) -> SortedTerm<S::Term> {
        self.backend.rounding_mode(rm)
    }

    fn construct_actual(
        &mut self,
        expr: &ExprRef,
        walk: &Walk<S::Term>,
    ) -> io::Result<Lowered<S::Term>> {
        let width = expr.width();
        let term = match expr.kind() {
            ExprKind::Constant(constant) => return self.lower_constant(constant),
            ExprKind::NotOptimized(src) => return self.operand(src, walk),
            ExprKind::Read { updates, index } => {
                let array = self.array_for_update(updates.root(), updates.head(), walk)?;
                let index = self.bits(index, walk)?;
                self.backend.select(&array, &index)
            }
            ExprKind::Select {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.predicate(cond, walk)?;
                let then = self.operand(then, walk)?.term;
                let otherwise = self.operand(otherwise, walk)?.term;
                let (then, otherwise) = coercion::unify_for_equality(
                    &mut self.backend,
                    &mut self.side_constraints,
                    &then,
                    &otherwise,
                )?;
                self.backend.ite(&cond, &then, &otherwise)
            }
            ExprKind::Concat(msb, lsb) => {
                let msb = self.bits(msb, walk)?;
                let lsb = self.bits(lsb, walk)?;
                self.backend.concat(&msb, &lsb)
            }
            ExprKind::Extract { expr: src, offset } => {
                let src = self.bits(src, walk)?;
                if width == 1 {
                    coercion::bool_extract(&mut self.backend, &src, *offset)
                } else {
                    self.backend.extract(&src, offset + width - 1, *offset)
                }
            }
            ExprKind::ZExt(src) | ExprKind::SExt(src) if src.width() == 1 => {
                let cond = self.predicate(src, walk)?;
                let set = if matches!(expr.kind(), ExprKind::ZExt(_)) {
                    self.backend.bv_one(width)
                } else {
                    self.backend.bv_all_ones(width)
                };
                let clear = self.backend.bv_zero(width);
                self.backend.ite(&cond, &set, &clear)
            }
            ExprKind::ZExt(src) => {
                let by = width - src.width();
                let src = self.bits(src, walk)?;
                self.backend.zero_extend(&src, by)
            }
            ExprKind::SExt(src) => {
                let by = width - src.width();
                let src = self.bits(src, walk)?;
                self.backend.sign_extend(&src, by)
            }
            ExprKind::Not(src) => {
                if width == 1 {
                    let p = self.predicate(src, walk)?;
                    self.backend.not(&p)
                } else {
                    let bv = self.bits(src, walk)?;
                    self.backend.bv_not(&bv)
                }
            }
            ExprKind::Binary(op, lhs, rhs) => self.construct_binary(*op, lhs, rhs, walk)?,
            ExprKind::FpExt(src) => {
                let value = self.float(src, walk)?;
                let rm = self.rounding_mode(RoundingMode::NearestTiesToEven);
                self.backend
                    .fp_to_fp(&rm, &value, FloatFormat::for_width(width))
            }
            ExprKind::FpTrunc(rm, src) => {
                let value = self.float(src, walk)?;
                let rm = self.rounding_mode(*rm);
                self.backend
                    .fp_to_fp(&rm, &value, FloatFormat::for_width(width))
            }
            ExprKind::FpToUi(rm, src) => {
                let value = self.float(src, walk)?;
                let rm = self.rounding_mode(*rm);
                self.backend.fp_to_unsigned(&rm, &value, width)
            }
            ExprKind::FpToSi(rm, src) => {
                let value = self.float(src, walk)?;
                let rm = self.rounding_mode(*rm);
                self.backend.fp_to_signed(&rm, &value, width)
            }
            ExprKind::UiToFp(rm, src) => {
                let bv = self.bits(src, walk)?;
                let rm = self.rounding_mode(*rm);
                self.backend
                    .fp_from_unsigned(&rm, &bv, FloatFormat::for_width(width))
            }
            ExprKind::SiToFp(rm, src) => {
                let bv = self.bits(src, walk)?;
                let rm = self.rounding_mode(*rm);
                self.backend
                    .fp_from_signed(&rm, &bv, FloatFormat::for_width(width))
            }
            ExprKind::FpArith(op, rm, lhs, rhs) => {
                let lhs = self.float(lhs, walk)?;
                let rhs = self.float(rhs, walk)?;
                let rm = rm.map(|rm| self.rounding_mode(rm));
                self.backend.fp_arith(*op, rm.as_ref(), &lhs, &rhs)
            }
            ExprKind::FpUnary(op, rm, src) => {
                let value = self.float(src, walk)?;
                let rm = rm.map(|rm| self.rounding_mode(rm));
                self.backend.fp_unary(*op, rm.as_ref(), &value)
            }
            ExprKind::FpCompare(op, lhs, rhs) => {
                let lhs = self.float(lhs, walk)?;
                let rhs = self.float(rhs, walk)?;
                self.backend.fp_compare(*op, &lhs, &rhs)
            }
            ExprKind::FpClassify(class, src) => {
                let value = self.float(src, walk)?;
                self.backend.fp_classify(*class, &value)
            }
        };
        let term = if width == 1 && term.sort == Sort::BitVec(1) {
            coercion::to_predicate(&mut self.backend, &term)
        } else {
            term
        };
        Ok(Lowered { term, width })
    }

    fn construct_binary(
        &mut self,
        op: BinaryOp,
        lhs: &ExprRef,
        rhs: &ExprRef,
        walk: &Walk<S::Term>,
    ) -> io::Result<SortedTerm<S::Term>> {
        let width = lhs.width();
        match op {
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::UDiv
            | BinaryOp::SDiv
            | BinaryOp::URem
            | BinaryOp::SRem => {
                assert_ne!(width, 1, "uncanonicalized {} of width 1", op);
                self.construct_arithmetic(op, lhs, rhs, walk)
            }
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor if width == 1 => {
                let l = self.predicate(lhs, walk)?;
                let r = self.predicate(rhs, walk)?;
                Ok(match op {
                    BinaryOp::And => self.backend.and(&l, &r),
                    BinaryOp::Or => self.backend.or(&l, &r),
                    _ => {
                        let not_r = self.backend.not(&r);
                        self.backend.ite(&l, &not_r, &r)
                    }
                })
            }
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
                let bv_op = match op {
                    BinaryOp::And => BvBinaryOp::And,
                    BinaryOp::Or => BvBinaryOp::Or,
                    _ => BvBinaryOp::Xor,
                };
                let l = self.bits(lhs, walk)?;
                let r = self.bits(rhs, walk)?;
                Ok(self.backend.bv_binary(bv_op, &l, &r))
            }
            BinaryOp::Shl | BinaryOp::LShr | BinaryOp::AShr => {
                let value = self.bits(lhs, walk)?;
                let backend = &mut self.backend;
                if let Some(amount) = rhs.as_constant() {
                    // Amounts that do not fit in 64 bits overshift.
                    let amount = amount.as_u64().unwrap_or(u64::MAX);
                    return Ok(match op {
                        BinaryOp::Shl => strength_reduction::shl_by_constant(backend, &value, amount),
                        BinaryOp::LShr => {
                            strength_reduction::lshr_by_constant(backend, &value, amount)
                        }
                        _ => strength_reduction::ashr_by_constant(backend, &value, amount),
                    });
                }
                let amount = self.bits(rhs, walk)?;
                let bv_op = match op {
                    BinaryOp::Shl => BvBinaryOp::Shl,
                    BinaryOp::LShr => BvBinaryOp::LShr,
                    _ => BvBinaryOp::AShr,
                };
                Ok(strength_reduction::shift_by_variable(
                    &mut self.backend,
                    bv_op,
                    &value,
                    &amount,
                ))
            }
            BinaryOp::Eq => {
                if width == 1 {
                    let r = self.predicate(rhs, walk)?;
                    if let Some(constant) = lhs.as_constant() {
                        return Ok(if constant.is_true() {
                            r
                        } else {
                            self.backend.not(&r)
                        });
                    }
                    let l = self.predicate(lhs, walk)?;
                    return Ok(self.backend.iff(&l, &r));
                }
                let l = self.bits(lhs, walk)?;
                let r = self.bits(rhs, walk)?;
                Ok(self.backend.eq(&l, &r))
            }
            BinaryOp::Ult | BinaryOp::Ule | BinaryOp::Slt | BinaryOp::Sle => {
                assert_ne!(width, 1, "uncanonicalized {} of width 1", op);
                let cmp = match op {
                    BinaryOp::Ult => BvCompareOp::Ult,
                    BinaryOp::Ule => BvCompareOp::Ule,
                    BinaryOp::Slt => BvCompareOp::Slt,
                    _ => BvCompareOp::Sle,
                };
                let l = self.bits(lhs, walk)?;
                let r = self.bits(rhs, walk)?;
                Ok(self.backend.bv_compare(cmp, &l, &r))
            }
            BinaryOp::Ne | BinaryOp::Ugt | BinaryOp::Uge | BinaryOp::Sgt | BinaryOp::Sge => {
                panic!("unhandled expression kind: {} is rewritten away by canonicalization", op)
            }
        }
    }

    fn construct_arithmetic(
        &mut self,
        op: BinaryOp,
        lhs: &ExprRef,
        rhs: &ExprRef,
        walk: &Walk<S::Term>,
    ) -> io::Result<SortedTerm<S::Term>> {
        let width = lhs.width();
        let lhs_constant = lhs
            .as_constant()
            .filter(|c| c.width() <= 64)
            .and_then(Constant::as_u64);
        let divisor = rhs
            .as_constant()
            .filter(|c| c.width() <= 64)
            .and_then(Constant::as_u64);

        match op {
            BinaryOp::Mul if self.options.optimize_multiplies && lhs_constant.is_some() => {
                let r = self.bits(rhs, walk)?;
                let multiplier = lhs_constant.unwrap_or_default();
                return Ok(strength_reduction::mul_by_constant(&mut self.backend, &r, multiplier));
            }
            BinaryOp::UDiv | BinaryOp::URem if divisor.is_some_and(u64::is_power_of_two) => {
                let l = self.bits(lhs, walk)?;
                let shift = divisor.unwrap_or(1).trailing_zeros() as usize;
                if op == BinaryOp::UDiv {
                    return Ok(strength_reduction::lshr_by_constant(
                        &mut self.backend,
                        &l,
                        shift as u64,
                    ));
                }
                if shift == 0 {
                    return Ok(self.backend.bv_zero(width));
                }
                let low = self.backend.extract(&l, shift - 1, 0);
                return Ok(self.backend.zero_extend(&low, width - shift));
            }
            BinaryOp::UDiv | BinaryOp::URem
                if self.options.optimize_divides && width == 32 && divisor.is_some_and(|d| d != 0) =>
            {
                let l = self.bits(lhs, walk)?;
                let d = divisor.unwrap_or(1) as u32;
                let quotient = strength_reduction::udiv_by_constant(&mut self.backend, &l, d);
                if op == BinaryOp::UDiv {
                    return Ok(quotient);
                }
                let product = strength_reduction::mul_by_constant(&mut self.backend, &quotient, d as u64);
                return Ok(self.backend.bv_sub(&l, &product));
            }
            BinaryOp::SDiv | BinaryOp::SRem
                if self.options.optimize_divides
                    && width == 32
                    && divisor.is_some_and(|d| !matches!(d as u32 as i32, 0 | 1 | -1)) =>
            {
                let l = self.bits(lhs, walk)?;
                let d = divisor.unwrap_or(2) as u32 as i32;
                let quotient = strength_reduction::sdiv_by_constant(&mut self.backend, &l, d);
                if op == BinaryOp::SDiv {
                    return Ok(quotient);
                }
                let product =
                    strength_reduction::mul_by_constant(&mut self.backend, &quotient, d as u32 as u64);
                return Ok(self.backend.bv_sub(&l, &product));
            }
            _ => {}
        }

        let bv_op = match op {
            BinaryOp::Add => BvBinaryOp::Add,
            BinaryOp::Sub => BvBinaryOp::Sub,
            BinaryOp::Mul => BvBinaryOp::Mul,
            BinaryOp::UDiv => BvBinaryOp::UDiv,
            BinaryOp::SDiv => BvBinaryOp::SDiv,
            BinaryOp::URem => BvBinaryOp::URem,
            BinaryOp::SRem => BvBinaryOp::SRem,
            other => unreachable!("{} is not an arithmetic operator", other),
        };
        let l = self.bits(lhs, walk)?;
        let r = self.bits(rhs, walk)?;
        Ok(self.backend.bv_binary(bv_op, &l, &r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::eval::{evaluate, Model};
    use crate::backend::term_graph::{TermGraph, TermGraphOptions, TermId};
    use crate::expr::{Array, Expr, FpArithOp, FpClass};
    use crate::test_utils::init_logger;
    use pretty_assertions::assert_eq;
    use std::rc::Rc;
    use test_case::test_case;

    fn builder(options: TermBuilderOptions) -> TermBuilder<TermGraph> {
        init_logger();
        TermBuilder::new(TermGraph::new(TermGraphOptions::z3_like()), options)
    }

    fn byte_of(array: &ArrayRef, index: u64) -> ExprRef {
        Expr::read(UpdateList::new(array.clone()), Expr::bv(32, index))
    }

    #[test]
    fn test_construct_is_idempotent_with_caching() {
        let mut b = builder(TermBuilderOptions::opt());
        let input = Array::symbolic("input", 32, 8);
        let x = Expr::zext(byte_of(&input, 0), 32);
        let e = Expr::binary(BinaryOp::Mul, x.clone(), x);

        let first = b.construct(&e).unwrap();
        let calls = b.backend().primitive_calls();
        let second = b.construct(&e).unwrap();
        assert_eq!(first, second);
        assert_eq!(b.backend().primitive_calls(), calls);
    }

    #[test]
    fn test_no_cache_rebuilds_to_the_same_term() {
        let mut b = builder(TermBuilderOptions::no_opt());
        let input = Array::symbolic("input", 32, 8);
        let e = Expr::binary(BinaryOp::Add, byte_of(&input, 0), byte_of(&input, 1));

        let first = b.construct(&e).unwrap();
        let calls = b.backend().primitive_calls();
        let second = b.construct(&e).unwrap();
        assert_eq!(first, second);
        assert!(b.backend().primitive_calls() > calls);
        assert_eq!(b.cached_node_count(), 0);
    }

    #[test]
    fn test_auto_clear_empties_node_cache_after_each_call() {
        let mut b = builder(TermBuilderOptions {
            auto_clear_construct_cache: true,
            ..TermBuilderOptions::opt()
        });
        let input = Array::symbolic("input", 32, 8);
        let generation = b.generation();
        b.construct(&byte_of(&input, 0)).unwrap();
        assert_eq!(b.cached_node_count(), 0);
        assert!(b.generation() > generation);
    }

    #[test]
    fn test_array_names_are_unique_across_clears() {
        let mut b = builder(TermBuilderOptions::opt());
        let first = b.get_initial_array(&Array::symbolic("mem", 32, 8)).unwrap();
        b.clear_construct_cache();
        b.clear_array_update_cache();
        let second = b.get_initial_array(&Array::symbolic("mem", 32, 8)).unwrap();
        assert_ne!(first, second);
        assert_eq!(b.backend().symbol_name(first.rep), Some("mem_0"));
        assert_eq!(b.backend().symbol_name(second.rep), Some("mem_1"));
    }

    #[test]
    fn test_initial_array_is_cached_by_identity() {
        let mut b = builder(TermBuilderOptions::opt());
        let array = Array::symbolic("mem", 32, 8);
        let first = b.get_initial_array(&array).unwrap();
        let calls = b.backend().primitive_calls();
        assert_eq!(b.get_initial_array(&array).unwrap(), first);
        assert_eq!(b.backend().primitive_calls(), calls);
    }

    #[test]
    fn test_fixed_constant_array_records_element_equalities() {
        let mut b = builder(TermBuilderOptions::opt());
        let table = Array::constant(
            "table",
            32,
            8,
            vec![Constant::from_u64(8, 7), Constant::from_u64(8, 9)],
        );
        let read = b.get_initial_read(&table, 1).unwrap();
        assert_eq!(read.sort, Sort::BitVec(8));
        let recorded = b.constant_array_assertions();
        assert_eq!(recorded.len(), 1);
        assert!(Rc::ptr_eq(&recorded[0].array, &table));
        assert_eq!(recorded[0].assertions.len(), 2);
    }

    #[test]
    fn test_symbolic_size_constant_array_uses_default() {
        let mut b = builder(TermBuilderOptions::opt());
        let mut values = std::collections::BTreeMap::new();
        values.insert(3, Constant::from_u64(8, 0x33));
        let store = crate::expr::ConstantStore::new(Some(Constant::from_u64(8, 0xaa)), values);
        let array = Array::new("filled", 32, 8, ArraySize::Symbolic, ArraySource::Constant(store));
        let at3 = b.get_initial_read(&array, 3).unwrap();
        let at4 = b.get_initial_read(&array, 4).unwrap();
        assert!(b.constant_array_assertions().is_empty());
        let model = Model::new();
        let graph = b.backend();
        assert_eq!(evaluate(graph, &model, at3.rep).unwrap().as_u64(), Some(0x33));
        assert_eq!(evaluate(graph, &model, at4.rep).unwrap().as_u64(), Some(0xaa));
    }

    #[test]
    fn test_update_chain_states_are_cached_per_node() {
        let mut b = builder(TermBuilderOptions::opt());
        let array = Array::symbolic("mem", 32, 8);
        let mut updates = UpdateList::new(array);
        updates.extend(Expr::bv(32, 0), Expr::bv(8, 1));
        let older = updates.clone();
        updates.extend(Expr::bv(32, 1), Expr::bv(8, 2));

        let newest = b.get_array_for_update(&updates).unwrap();
        let calls = b.backend().primitive_calls();
        let previous = b.get_array_for_update(&older).unwrap();
        assert_eq!(b.backend().primitive_calls(), calls);
        assert_ne!(newest, previous);
    }

    #[test]
    fn test_width_one_results_are_predicates() {
        let mut b = builder(TermBuilderOptions::opt());
        let flags = Array::symbolic("flags", 32, 1);
        let flag = Expr::read(UpdateList::new(flags), Expr::bv(32, 0));
        let lowered = b.construct(&flag).unwrap();
        assert_eq!(lowered.width, 1);
        assert_eq!(lowered.term.sort, Sort::Bool);
    }

    #[test_case(true)]
    #[test_case(false)]
    fn test_eq_with_constant_bool_folds(value: bool) {
        let mut b = builder(TermBuilderOptions::opt());
        let input = Array::symbolic("input", 32, 8);
        let p = Expr::binary(BinaryOp::Ult, byte_of(&input, 0), Expr::bv(8, 5));
        let lowered_p = b.construct(&p).unwrap().term;
        let e = Expr::eq(Expr::bool(value), p);
        let lowered = b.construct(&e).unwrap().term;
        if value {
            assert_eq!(lowered, lowered_p);
        } else {
            let negated = b.backend_mut().not(&lowered_p);
            assert_eq!(lowered, negated);
        }
    }

    #[test_case(BinaryOp::Ne)]
    #[test_case(BinaryOp::Ugt)]
    #[test_case(BinaryOp::Sge)]
    #[should_panic(expected = "unhandled expression kind")]
    fn test_non_canonical_comparisons_are_fatal(op: BinaryOp) {
        let mut b = builder(TermBuilderOptions::opt());
        let input = Array::symbolic("input", 32, 8);
        let e = Expr::binary(op, byte_of(&input, 0), Expr::bv(8, 1));
        let _ = b.construct(&e);
    }

    #[test]
    #[should_panic(expected = "uncanonicalized")]
    fn test_width_one_arithmetic_is_fatal() {
        let mut b = builder(TermBuilderOptions::opt());
        let flags = Array::symbolic("flags", 32, 1);
        let flag = Expr::read(UpdateList::new(flags), Expr::bv(32, 0));
        let e = Expr::binary(BinaryOp::Add, flag, Expr::bool(true));
        let _ = b.construct(&e);
    }

    fn eval_u64(b: &TermBuilder<TermGraph>, model: &Model, term: &SortedTerm<TermId>) -> u64 {
        evaluate(b.backend(), model, term.rep).unwrap().as_u64().unwrap()
    }

    #[test_case(BinaryOp::UDiv, 16)]
    #[test_case(BinaryOp::URem, 16)]
    #[test_case(BinaryOp::URem, 1)]
    #[test_case(BinaryOp::UDiv, 3)]
    #[test_case(BinaryOp::URem, 3)]
    #[test_case(BinaryOp::UDiv, 7)]
    #[test_case(BinaryOp::URem, 7)]
    #[test_case(BinaryOp::UDiv, 100)]
    #[test_case(BinaryOp::URem, 100)]
    #[test_case(BinaryOp::UDiv, 0x8000_0000)]
    #[test_case(BinaryOp::URem, 0x8000_0000)]
    #[test_case(BinaryOp::SDiv, 3)]
    #[test_case(BinaryOp::SRem, 3)]
    #[test_case(BinaryOp::SDiv, 7)]
    #[test_case(BinaryOp::SDiv, 100)]
    #[test_case(BinaryOp::SRem, 100)]
    #[test_case(BinaryOp::SDiv, 0x8000_0000)]
    #[test_case(BinaryOp::SRem, 0x8000_0000)]
    #[test_case(BinaryOp::SRem, 0xffff_fff9)]
    #[test_case(BinaryOp::SDiv, 0xffff_ffff)]
    #[test_case(BinaryOp::UDiv, 0)]
    fn test_division_by_constant_matches_native(op: BinaryOp, divisor: u64) {
        let array = Array::symbolic("n", 32, 32);
        let n = Expr::read(UpdateList::new(array.clone()), Expr::bv(32, 0));
        let e = Expr::binary(op, n, Expr::bv(32, divisor));

        let mut fast = builder(TermBuilderOptions::opt());
        let fast_term = fast.construct(&e).unwrap().term;
        let fast_array = fast.get_initial_array(&array).unwrap();
        let mut slow = builder(TermBuilderOptions::no_opt());
        let slow_term = slow.construct(&e).unwrap().term;
        let slow_array = slow.get_initial_array(&array).unwrap();

        for value in [
            0u64,
            1,
            2,
            6,
            7,
            99,
            100,
            0x7fff_ffff,
            0x8000_0000,
            0x8000_0001,
            0xffff_fff0,
            0xffff_ffff,
        ] {
            let mut fast_model = Model::new();
            fast_model.set_array_elements(
                fast.backend().symbol_name(fast_array.rep).unwrap(),
                32,
                32,
                0,
                &[(0, value)],
            );
            let mut slow_model = Model::new();
            slow_model.set_array_elements(
                slow.backend().symbol_name(slow_array.rep).unwrap(),
                32,
                32,
                0,
                &[(0, value)],
            );
            assert_eq!(
                eval_u64(&fast, &fast_model, &fast_term),
                eval_u64(&slow, &slow_model, &slow_term),
                "{} {} by {}",
                op,
                value,
                divisor
            );
        }
    }

    #[test]
    fn test_lower_query_orders_parts() {
        let mut b = builder(TermBuilderOptions::opt());
        let table = Array::constant("table", 32, 8, vec![Constant::from_u64(8, 1)]);
        let t0 = Expr::read(UpdateList::new(table), Expr::bv(32, 0));
        let x87 = Array::symbolic("x87", 32, 80);
        let f = Expr::read(UpdateList::new(x87), Expr::bv(32, 0));
        let is_nan = Expr::fp_classify(crate::expr::FpClass::NaN, f);
        let constraint = Expr::binary(BinaryOp::Ult, t0, Expr::bv(8, 4));

        let query = b.lower_query(&[constraint], &is_nan).unwrap();
        assert_eq!(query.constraints.len(), 1);
        assert_eq!(query.constant_array_assertions.len(), 1);
        assert_eq!(query.side_constraints.len(), 1);
        assert_eq!(query.assertions().count(), 4);
        assert_eq!(b.side_constraints().len(), 1);
        assert_eq!(b.take_side_constraints().len(), 1);
        assert!(b.side_constraints().is_empty());
    }

    fn x87_sum() -> ExprRef {
        let regs = Array::symbolic("regs", 32, 80);
        Expr::fp_arith(
            FpArithOp::Add,
            Some(RoundingMode::NearestTiesToEven),
            byte_of(&regs, 0),
            byte_of(&regs, 1),
        )
    }

    #[test]
    fn test_taking_side_constraints_starts_new_generation() {
        let mut b = builder(TermBuilderOptions::opt());
        let sum = x87_sum();
        let first = b
            .lower_query(&[], &Expr::fp_classify(FpClass::Normal, sum.clone()))
            .unwrap();
        assert_eq!(first.side_constraints.len(), 2);

        let generation = b.generation();
        assert_eq!(b.take_side_constraints().len(), 2);
        assert!(b.generation() > generation);
        assert_eq!(b.cached_node_count(), 0);

        let second = b
            .lower_query(&[], &Expr::fp_classify(FpClass::Zero, sum))
            .unwrap();
        assert_eq!(second.side_constraints.len(), 2);
    }

    #[test]
    fn test_stored_float_is_converted_to_bits_once() {
        init_logger();
        let mut b = TermBuilder::new(
            TermGraph::new(TermGraphOptions::bitwuzla_like()),
            TermBuilderOptions::opt(),
        );
        let sum = x87_sum();
        let mem = Array::symbolic("mem", 32, 80);
        let mut updates = UpdateList::new(mem);
        updates.extend(Expr::bv(32, 0), sum.clone());
        updates.extend(Expr::bv(32, 1), sum.clone());
        let read = Expr::read(updates, Expr::bv(32, 0));
        b.construct_all(&[read, Expr::eq(sum.clone(), sum)]).unwrap();

        // Two reads tie their integer bits, one conversion back to bits
        // pins the fresh parts and the fresh integer bit.
        assert_eq!(b.side_constraints().len(), 4);
        assert_eq!(b.side_constraints().converted_float_count(), 1);
    }

    #[test]
    fn test_clear_all_redeclares_arrays_and_forgets_assertions() {
        let mut b = builder(TermBuilderOptions::opt());
        let table = Array::constant("table", 32, 8, vec![Constant::from_u64(8, 1)]);
        let first = b.get_initial_read(&table, 0).unwrap();
        let x87 = Array::symbolic("x87", 32, 80);
        let is_nan = Expr::fp_classify(FpClass::NaN, byte_of(&x87, 0));
        b.lower_query(&[], &is_nan).unwrap();
        assert_eq!(b.constant_array_assertions().len(), 1);
        assert_eq!(b.side_constraints().len(), 1);

        b.clear_all();
        assert!(b.constant_array_assertions().is_empty());
        assert!(b.side_constraints().is_empty());
        assert_eq!(b.cached_node_count(), 0);

        let second = b.get_initial_read(&table, 0).unwrap();
        assert_ne!(first, second);
        assert_eq!(b.constant_array_assertions().len(), 1);
    }
}
