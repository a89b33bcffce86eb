// SPDX-License-Identifier: Apache-2.0

//! End-to-end lowering scenarios checked by evaluating the produced terms
//! under concrete models.

use num_bigint::BigUint;
use pretty_assertions::assert_eq;
use symlower::backend::eval::{evaluate, ArrayValue, Model, Value};
use symlower::backend::term_graph::{TermGraph, TermGraphOptions, TermId};
use symlower::expr::{
    Array, ArrayRef, BinaryOp, Expr, ExprRef, FpArithOp, FpClass, RoundingMode, UpdateList,
};
use symlower::options::TermBuilderOptions;
use symlower::term_algebra::SortedTerm;
use symlower::term_builder::TermBuilder;
use test_case::test_case;

fn builder(options: TermBuilderOptions, graph: TermGraphOptions) -> TermBuilder<TermGraph> {
    let _ = env_logger::builder().is_test(true).try_init();
    TermBuilder::new(TermGraph::new(graph), options)
}

fn read(array: &ArrayRef, index: u64) -> ExprRef {
    Expr::read(UpdateList::new(array.clone()), Expr::bv(32, index))
}

fn array_name(b: &mut TermBuilder<TermGraph>, array: &ArrayRef) -> String {
    let term = b.get_initial_array(array).unwrap();
    b.backend().symbol_name(term.rep).unwrap().to_string()
}

fn eval(b: &TermBuilder<TermGraph>, model: &Model, term: &SortedTerm<TermId>) -> Value {
    evaluate(b.backend(), model, term.rep).unwrap()
}

#[test]
fn test_extract_of_concat_recovers_operands() {
    let mut b = builder(TermBuilderOptions::opt(), TermGraphOptions::z3_like());
    let input = Array::symbolic("input", 32, 8);
    let (hi, lo) = (read(&input, 0), read(&input, 1));
    let both = Expr::concat(hi, lo);
    let top = b.construct(&Expr::extract(both.clone(), 8, 8)).unwrap();
    let bottom = b.construct(&Expr::extract(both, 0, 8)).unwrap();

    let name = array_name(&mut b, &input);
    for (a, c) in [(0u64, 0u64), (0xab, 0xcd), (0xff, 0x01)] {
        let mut model = Model::new();
        model.set_array_elements(&name, 32, 8, 0, &[(0, a), (1, c)]);
        assert_eq!(eval(&b, &model, &top.term).as_u64(), Some(a));
        assert_eq!(eval(&b, &model, &bottom.term).as_u64(), Some(c));
    }
}

#[test_case(TermBuilderOptions::opt(); "opt")]
#[test_case(TermBuilderOptions::no_opt(); "no_opt")]
fn test_newest_write_wins_and_other_cells_keep_their_values(options: TermBuilderOptions) {
    let mut b = builder(options, TermGraphOptions::z3_like());
    let mem = Array::symbolic("mem", 32, 8);
    let idx = Array::symbolic("idx", 32, 8);
    let index = Expr::zext(read(&idx, 0), 32);

    let mut updates = UpdateList::new(mem.clone());
    updates.extend(index.clone(), Expr::bv(8, 0x11));
    updates.extend(index.clone(), Expr::bv(8, 0x22));
    let at_index = b
        .construct(&Expr::read(updates.clone(), index))
        .unwrap();
    let at_five = b.construct(&Expr::read(updates, Expr::bv(32, 5))).unwrap();

    let mem_name = array_name(&mut b, &mem);
    let idx_name = array_name(&mut b, &idx);
    for written in [5u64, 6] {
        let mut model = Model::new();
        model.set_array_elements(&mem_name, 32, 8, 0x77, &[]);
        model.set_array_elements(&idx_name, 32, 8, 0, &[(0, written)]);
        assert_eq!(eval(&b, &model, &at_index.term).as_u64(), Some(0x22));
        let expected = if written == 5 { 0x22 } else { 0x77 };
        assert_eq!(eval(&b, &model, &at_five.term).as_u64(), Some(expected));
    }
}

#[test_case(TermBuilderOptions::opt(); "opt")]
#[test_case(TermBuilderOptions::no_opt(); "no_opt")]
fn test_times_ten_divided_by_ten_is_identity_below_bound(options: TermBuilderOptions) {
    let mut b = builder(options, TermGraphOptions::z3_like());
    let xs = Array::symbolic("x", 32, 32);
    let x = read(&xs, 0);
    let bounded = Expr::binary(BinaryOp::Ult, x.clone(), Expr::bv(32, 400_000_000));
    let scaled = Expr::binary(BinaryOp::Mul, Expr::bv(32, 10), x.clone());
    let back = Expr::binary(BinaryOp::UDiv, scaled, Expr::bv(32, 10));
    let query = b.lower_query(&[bounded], &Expr::eq(back, x)).unwrap();
    assert!(query.side_constraints.is_empty());

    let name = array_name(&mut b, &xs);
    for value in [0u64, 1, 9, 10, 123_456_789, 399_999_999] {
        let mut model = Model::new();
        model.set_array_elements(&name, 32, 32, 0, &[(0, value)]);
        assert!(eval(&b, &model, &query.constraints[0]).is_true());
        assert!(
            !eval(&b, &model, &query.negated_query).is_true(),
            "(x * 10) / 10 != x for x = {}",
            value
        );
    }
}

#[test_case(TermGraphOptions::z3_like(); "native float to bits")]
#[test_case(TermGraphOptions::bitwuzla_like(); "fresh float parts")]
fn test_float_sum_round_trips_through_memory(graph: TermGraphOptions) {
    let mut b = builder(TermBuilderOptions::opt(), graph);
    let floats = Array::symbolic("floats", 32, 32);
    let sum = Expr::fp_arith(
        FpArithOp::Add,
        Some(RoundingMode::NearestTiesToEven),
        read(&floats, 0),
        read(&floats, 1),
    );
    let mut updates = UpdateList::new(floats.clone());
    updates.extend(Expr::bv(32, 2), sum);
    let stored = b.construct(&Expr::read(updates, Expr::bv(32, 2))).unwrap();

    let name = array_name(&mut b, &floats);
    let mut model = Model::new();
    model.set_array_elements(
        &name,
        32,
        32,
        0,
        &[
            (0, 1.5f32.to_bits() as u64),
            (1, 2.25f32.to_bits() as u64),
        ],
    );
    let side = b.take_side_constraints();
    model.define_from(b.backend(), &side).unwrap();
    for constraint in &side {
        assert!(eval(&b, &model, constraint).is_true());
    }
    assert_eq!(
        eval(&b, &model, &stored.term).as_u64(),
        Some(3.75f32.to_bits() as u64)
    );
}

const X87_ONE: u128 = 0x3fff_8000_0000_0000_0000;
const X87_UNNORMAL_ONE: u128 = 0x3fff_0000_0000_0000_0000;

#[test_case(X87_ONE, true; "canonical one")]
#[test_case(X87_UNNORMAL_ONE, false; "integer bit clear")]
fn test_x87_read_is_normal_only_when_encoding_is_canonical(value: u128, consistent: bool) {
    let mut b = builder(TermBuilderOptions::opt(), TermGraphOptions::z3_like());
    let regs = Array::symbolic("regs", 32, 80);
    let is_normal = Expr::fp_classify(FpClass::Normal, read(&regs, 0));
    let query = b.lower_query(&[], &is_normal).unwrap();
    assert_eq!(query.side_constraints.len(), 1);

    let name = array_name(&mut b, &regs);
    let mut contents = ArrayValue::constant(32, 80, BigUint::from(0u8));
    contents.set(BigUint::from(0u8), BigUint::from(value));
    let mut model = Model::new();
    model.set(&name, Value::Array(contents));

    assert!(!eval(&b, &model, &query.negated_query).is_true());
    assert_eq!(
        eval(&b, &model, &query.side_constraints[0]).is_true(),
        consistent
    );
}

#[test]
fn test_deep_chain_lowers_without_recursion() {
    const DEPTH: u64 = 100_000;
    let mut b = builder(TermBuilderOptions::opt(), TermGraphOptions::z3_like());
    let xs = Array::symbolic("x", 32, 32);
    let mut e = read(&xs, 0);
    for _ in 0..DEPTH {
        e = Expr::binary(BinaryOp::Add, e, Expr::bv(32, 1));
    }
    let lowered = b.construct(&e).unwrap();
    drop(e);

    let name = array_name(&mut b, &xs);
    let mut model = Model::new();
    model.set_array_elements(&name, 32, 32, 0, &[(0, 0xffff_0000)]);
    assert_eq!(
        eval(&b, &model, &lowered.term).as_u64(),
        Some((0xffff_0000 + DEPTH) & 0xffff_ffff)
    );
}

#[test]
fn test_construct_all_shares_common_subterms() {
    let input = Array::symbolic("input", 32, 8);
    let shared = Expr::binary(BinaryOp::Mul, read(&input, 0), read(&input, 1));
    let roots = vec![
        Expr::binary(BinaryOp::Add, shared.clone(), Expr::bv(8, 1)),
        Expr::binary(BinaryOp::Sub, shared.clone(), Expr::bv(8, 1)),
    ];

    let mut together = builder(TermBuilderOptions::no_opt(), TermGraphOptions::z3_like());
    together.construct_all(&roots).unwrap();
    let mut separately = builder(TermBuilderOptions::no_opt(), TermGraphOptions::z3_like());
    for root in &roots {
        separately.construct(root).unwrap();
    }
    assert!(together.backend().primitive_calls() < separately.backend().primitive_calls());
    assert_eq!(together.backend().len(), separately.backend().len());
}

#[test]
fn test_options_from_toml_drive_lowering() {
    let options = TermBuilderOptions::from_toml_str(
        "use_construct_hash = true\noptimize_divides = false\n",
    )
    .unwrap();
    assert!(options.optimize_multiplies);
    assert!(!options.optimize_divides);

    let mut b = builder(options, TermGraphOptions::boolector_like());
    let xs = Array::symbolic("x", 32, 32);
    let e = Expr::binary(BinaryOp::UDiv, read(&xs, 0), Expr::bv(32, 7));
    let lowered = b.construct(&e).unwrap();
    let name = array_name(&mut b, &xs);
    let mut model = Model::new();
    model.set_array_elements(&name, 32, 32, 0, &[(0, 700)]);
    assert_eq!(eval(&b, &model, &lowered.term).as_u64(), Some(100));

    let script = b.backend().to_smtlib(&[]);
    assert!(script.starts_with("(set-logic ALL)"));
}
