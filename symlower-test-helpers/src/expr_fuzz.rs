// SPDX-License-Identifier: Apache-2.0

use arbitrary::Arbitrary;
use symlower::expr::{Array, ArrayRef, BinaryOp, Expr, ExprRef, UpdateList};

/// Number of leading bytes of the input array that fuzz expressions read.
pub const INPUT_BYTES: u64 = 4;

#[derive(Debug, Arbitrary, Clone, Copy)]
pub enum FuzzBinop {
    // arithmetic
    Add,
    Sub,
    Mul,

    // division / remainder
    UDiv,
    SDiv,
    URem,
    SRem,

    // bitwise
    And,
    Or,
    Xor,

    // shifts
    Shl,
    LShr,
    AShr,

    // comparisons (canonical forms only)
    Eq,
    Ult,
    Ule,
    Slt,
    Sle,
}

impl FuzzBinop {
    pub fn to_binary_op(self) -> BinaryOp {
        match self {
            FuzzBinop::Add => BinaryOp::Add,
            FuzzBinop::Sub => BinaryOp::Sub,
            FuzzBinop::Mul => BinaryOp::Mul,
            FuzzBinop::UDiv => BinaryOp::UDiv,
            FuzzBinop::SDiv => BinaryOp::SDiv,
            FuzzBinop::URem => BinaryOp::URem,
            FuzzBinop::SRem => BinaryOp::SRem,
            FuzzBinop::And => BinaryOp::And,
            FuzzBinop::Or => BinaryOp::Or,
            FuzzBinop::Xor => BinaryOp::Xor,
            FuzzBinop::Shl => BinaryOp::Shl,
            FuzzBinop::LShr => BinaryOp::LShr,
            FuzzBinop::AShr => BinaryOp::AShr,
            FuzzBinop::Eq => BinaryOp::Eq,
            FuzzBinop::Ult => BinaryOp::Ult,
            FuzzBinop::Ule => BinaryOp::Ule,
            FuzzBinop::Slt => BinaryOp::Slt,
            FuzzBinop::Sle => BinaryOp::Sle,
        }
    }

    /// Operators the IR only allows on 1-bit operands in their boolean
    /// form.
    fn accepts_width_one(self) -> bool {
        matches!(
            self,
            FuzzBinop::And | FuzzBinop::Or | FuzzBinop::Xor | FuzzBinop::Eq
        )
    }
}

#[derive(Debug, Arbitrary, Clone, Copy)]
pub enum FuzzWidth {
    W1,
    W8,
    W16,
    W32,
    W64,
}

impl FuzzWidth {
    pub fn bits(self) -> usize {
        match self {
            FuzzWidth::W1 => 1,
            FuzzWidth::W8 => 8,
            FuzzWidth::W16 => 16,
            FuzzWidth::W32 => 32,
            FuzzWidth::W64 => 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Arbitrary)]
pub struct FuzzOperand {
    index: u8,
}

#[derive(Debug, Arbitrary, Clone)]
pub enum FuzzOp {
    Literal {
        width: FuzzWidth,
        value: u64,
    },
    Read {
        index: u8,
    },
    ReadAfterWrite {
        write_index: FuzzOperand,
        value: FuzzOperand,
        read_index: FuzzOperand,
    },
    Binop(FuzzBinop, FuzzOperand, FuzzOperand),
    BinopWithConstant {
        op: FuzzBinop,
        operand: FuzzOperand,
        constant: u64,
        constant_first: bool,
    },
    Not(FuzzOperand),
    Extract {
        operand: FuzzOperand,
        offset: u8,
        width: u8,
    },
    ZeroExt {
        operand: FuzzOperand,
        width: FuzzWidth,
    },
    SignExt {
        operand: FuzzOperand,
        width: FuzzWidth,
    },
    Concat(FuzzOperand, FuzzOperand),
    Select {
        cond: FuzzOperand,
        then: FuzzOperand,
        otherwise: FuzzOperand,
    },
}

/// The expressions built from a sequence of fuzz ops, all over one symbolic
/// byte array.
pub struct FuzzDag {
    pub input: ArrayRef,
    pub nodes: Vec<ExprRef>,
}

/// Zero-extends or truncates `expr` to `width` bits.
pub fn fit(expr: &ExprRef, width: usize) -> ExprRef {
    use std::cmp::Ordering;
    match expr.width().cmp(&width) {
        Ordering::Equal => expr.clone(),
        Ordering::Less => Expr::zext(expr.clone(), width),
        Ordering::Greater => Expr::extract(expr.clone(), 0, width),
    }
}

fn mask(width: usize) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn binop(op: FuzzBinop, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
    let mut width = lhs.width().max(rhs.width());
    if width == 1 && !op.accepts_width_one() {
        width = 8;
    }
    Expr::binary(op.to_binary_op(), fit(lhs, width), fit(rhs, width))
}

pub fn build_expr_dag(ops: &[FuzzOp]) -> FuzzDag {
    let input = Array::symbolic("input", 32, 8);
    let read = |updates: UpdateList, index: ExprRef| Expr::read(updates, index);

    let mut nodes: Vec<ExprRef> = (0..INPUT_BYTES)
        .map(|i| read(UpdateList::new(input.clone()), Expr::bv(32, i)))
        .collect();

    for op in ops {
        let pick = |operand: &FuzzOperand, nodes: &[ExprRef]| {
            nodes[(operand.index as usize) % nodes.len()].clone()
        };
        let node = match op {
            FuzzOp::Literal { width, value } => {
                Expr::bv(width.bits(), *value & mask(width.bits()))
            }
            FuzzOp::Read { index } => read(
                UpdateList::new(input.clone()),
                Expr::bv(32, *index as u64 % INPUT_BYTES),
            ),
            FuzzOp::ReadAfterWrite {
                write_index,
                value,
                read_index,
            } => {
                // Keep indices inside the input so reads and writes collide.
                let low_bits = Expr::bv(32, INPUT_BYTES - 1);
                let write_index = Expr::binary(
                    BinaryOp::And,
                    fit(&pick(write_index, &nodes), 32),
                    low_bits.clone(),
                );
                let read_index =
                    Expr::binary(BinaryOp::And, fit(&pick(read_index, &nodes), 32), low_bits);
                let mut updates = UpdateList::new(input.clone());
                updates.extend(write_index, fit(&pick(value, &nodes), 8));
                read(updates, read_index)
            }
            FuzzOp::Binop(op, lhs, rhs) => binop(*op, &pick(lhs, &nodes), &pick(rhs, &nodes)),
            FuzzOp::BinopWithConstant {
                op,
                operand,
                constant,
                constant_first,
            } => {
                let operand = pick(operand, &nodes);
                let width = if operand.width() == 1 && !op.accepts_width_one() {
                    8
                } else {
                    operand.width()
                };
                let constant = Expr::bv(width, *constant & mask(width));
                if *constant_first {
                    binop(*op, &constant, &operand)
                } else {
                    binop(*op, &operand, &constant)
                }
            }
            FuzzOp::Not(operand) => Expr::not(pick(operand, &nodes)),
            FuzzOp::Extract {
                operand,
                offset,
                width,
            } => {
                let operand = pick(operand, &nodes);
                let offset = *offset as usize % operand.width();
                let width = 1 + *width as usize % (operand.width() - offset);
                Expr::extract(operand, offset, width)
            }
            FuzzOp::ZeroExt { operand, width } | FuzzOp::SignExt { operand, width } => {
                let operand = pick(operand, &nodes);
                let width = width.bits();
                if width <= operand.width() {
                    fit(&operand, width)
                } else if matches!(op, FuzzOp::ZeroExt { .. }) {
                    Expr::zext(operand, width)
                } else {
                    Expr::sext(operand, width)
                }
            }
            FuzzOp::Concat(msb, lsb) => {
                let msb = pick(msb, &nodes);
                let lsb = pick(lsb, &nodes);
                Expr::concat(fit(&msb, msb.width().min(32)), fit(&lsb, lsb.width().min(32)))
            }
            FuzzOp::Select {
                cond,
                then,
                otherwise,
            } => {
                let cond = pick(cond, &nodes);
                let cond = if cond.width() == 1 {
                    cond
                } else {
                    Expr::extract(cond, 0, 1)
                };
                let then = pick(then, &nodes);
                let otherwise = fit(&pick(otherwise, &nodes), then.width());
                Expr::select(cond, then, otherwise)
            }
        };
        log::trace!("build_expr_dag; {:?} -> width {}", op, node.width());
        nodes.push(node);
    }
    FuzzDag { input, nodes }
}
