// SPDX-License-Identifier: Apache-2.0

//! Concrete evaluation of integer expressions, used as the reference side of
//! differential tests against lowered terms.

use std::collections::HashMap;
use std::rc::Rc;

use symlower::expr::{Array, ArraySource, BinaryOp, Expr, ExprKind, ExprRef};

fn mask(width: usize) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn to_signed(value: u64, width: usize) -> i128 {
    let value = value as i128;
    if width < 128 && (value >> (width - 1)) & 1 == 1 {
        value - (1i128 << width)
    } else {
        value
    }
}

/// Division by zero follows the SMT-LIB bit-vector conventions; shifts by
/// the width or more produce zero, arithmetic shifts included.
pub fn eval_binary(op: BinaryOp, width: usize, lhs: u64, rhs: u64) -> u64 {
    let m = mask(width);
    let (sl, sr) = (to_signed(lhs, width), to_signed(rhs, width));
    let result = match op {
        BinaryOp::Add => lhs.wrapping_add(rhs),
        BinaryOp::Sub => lhs.wrapping_sub(rhs),
        BinaryOp::Mul => lhs.wrapping_mul(rhs),
        BinaryOp::UDiv => {
            if rhs == 0 {
                m
            } else {
                lhs / rhs
            }
        }
        BinaryOp::URem => {
            if rhs == 0 {
                lhs
            } else {
                lhs % rhs
            }
        }
        BinaryOp::SDiv => {
            if sr == 0 {
                if sl < 0 {
                    1
                } else {
                    m
                }
            } else {
                (sl / sr) as u64
            }
        }
        BinaryOp::SRem => {
            if sr == 0 {
                lhs
            } else {
                (sl % sr) as u64
            }
        }
        BinaryOp::And => lhs & rhs,
        BinaryOp::Or => lhs | rhs,
        BinaryOp::Xor => lhs ^ rhs,
        BinaryOp::Shl | BinaryOp::LShr | BinaryOp::AShr if rhs >= width as u64 => 0,
        BinaryOp::Shl => lhs << rhs,
        BinaryOp::LShr => lhs >> rhs,
        BinaryOp::AShr => (sl >> rhs) as u64,
        BinaryOp::Eq => (lhs == rhs) as u64,
        BinaryOp::Ne => (lhs != rhs) as u64,
        BinaryOp::Ult => (lhs < rhs) as u64,
        BinaryOp::Ule => (lhs <= rhs) as u64,
        BinaryOp::Ugt => (lhs > rhs) as u64,
        BinaryOp::Uge => (lhs >= rhs) as u64,
        BinaryOp::Slt => (sl < sr) as u64,
        BinaryOp::Sle => (sl <= sr) as u64,
        BinaryOp::Sgt => (sl > sr) as u64,
        BinaryOp::Sge => (sl >= sr) as u64,
    };
    if op.is_comparison() {
        result
    } else {
        result & m
    }
}

/// Evaluates expressions of at most 64 bits given the initial contents of
/// every symbolic array.
pub struct Interpreter<'a> {
    initial: &'a dyn Fn(&Array, u64) -> u64,
    memo: HashMap<*const Expr, u64>,
}

impl<'a> Interpreter<'a> {
    pub fn new(initial: &'a dyn Fn(&Array, u64) -> u64) -> Self {
        Interpreter {
            initial,
            memo: HashMap::new(),
        }
    }

    pub fn eval(&mut self, expr: &ExprRef) -> u64 {
        let key = Rc::as_ptr(expr);
        if let Some(value) = self.memo.get(&key) {
            return *value;
        }
        let value = self.eval_uncached(expr);
        self.memo.insert(key, value);
        value
    }

    fn eval_uncached(&mut self, expr: &ExprRef) -> u64 {
        let width = expr.width();
        assert!(width <= 64, "interpreter only handles widths up to 64");
        match expr.kind() {
            ExprKind::Constant(constant) => constant
                .as_u64()
                .unwrap_or_else(|| panic!("constant {:?} wider than 64 bits", constant)),
            ExprKind::NotOptimized(src) => self.eval(src),
            ExprKind::Read { updates, index } => {
                let index = self.eval(index);
                let mut cursor = updates.head().cloned();
                while let Some(node) = cursor {
                    if self.eval(node.index()) == index {
                        return self.eval(node.value());
                    }
                    cursor = node.next().cloned();
                }
                let root = updates.root();
                match root.source() {
                    ArraySource::Symbolic => (self.initial)(root, index),
                    ArraySource::Constant(store) => store
                        .value_at(index)
                        .or(store.default_value())
                        .and_then(|c| c.as_u64())
                        .unwrap_or(0),
                }
            }
            ExprKind::Select {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond) != 0 {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            ExprKind::Concat(msb, lsb) => (self.eval(msb) << lsb.width()) | self.eval(lsb),
            ExprKind::Extract { expr: src, offset } => (self.eval(src) >> offset) & mask(width),
            ExprKind::ZExt(src) => self.eval(src),
            ExprKind::SExt(src) => {
                let value = self.eval(src);
                (to_signed(value, src.width()) as u64) & mask(width)
            }
            ExprKind::Not(src) => !self.eval(src) & mask(width),
            ExprKind::Binary(op, lhs, rhs) => {
                let (l, r) = (self.eval(lhs), self.eval(rhs));
                eval_binary(*op, lhs.width(), l, r)
            }
            other => panic!("interpreter does not handle {}", other.name()),
        }
    }
}
