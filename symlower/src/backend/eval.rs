// SPDX-License-Identifier: Apache-2.0

//! Concrete evaluation of `TermGraph` terms.
//!
//! Bit-vector and array operations follow SMT-LIB semantics exactly,
//! including division by zero. Floats are carried as their IEEE interchange
//! bits; classification, comparison, sign operations and bit conversions work
//! for every format, while rounding arithmetic is evaluated natively and so
//! is limited to half, single and double precision.

use std::collections::BTreeMap;
use std::fmt;

use ahash::AHashMap;
use half::f16;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{Float, FromPrimitive, One, ToPrimitive, Zero};

use crate::backend::term_graph::{TermGraph, TermId, TermNode, TermOp};
use crate::expr::{FloatFormat, RoundingMode};
use crate::term_algebra::{
    BvBinaryOp, BvCompareOp, FpArithOp, FpClass, FpCompareOp, FpUnaryOp, Sort, SortedTerm,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayValue {
    pub domain: usize,
    pub range: usize,
    pub default: BigUint,
    /// Entries that differ from `default`.
    pub entries: BTreeMap<BigUint, BigUint>,
}

impl ArrayValue {
    pub fn constant(domain: usize, range: usize, default: BigUint) -> Self {
        ArrayValue {
            domain,
            range,
            default,
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, index: &BigUint) -> &BigUint {
        self.entries.get(index).unwrap_or(&self.default)
    }

    pub fn set(&mut self, index: BigUint, value: BigUint) {
        if value == self.default {
            self.entries.remove(&index);
        } else {
            self.entries.insert(index, value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Bits { width: usize, value: BigUint },
    /// IEEE interchange encoding: sign, biased exponent, stored fraction.
    Float { format: FloatFormat, bits: BigUint },
    Array(ArrayValue),
    RoundingMode(RoundingMode),
}

impl Value {
    /// A `width`-bit value, truncated to the width.
    pub fn bits(width: usize, value: impl Into<BigUint>) -> Value {
        Value::Bits {
            width,
            value: value.into() & mask(width),
        }
    }

    /// The truth value of a predicate, whether it is a `Bool` or a 1-bit
    /// vector.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Bits { width: 1, value } => Some(!value.is_zero()),
            _ => None,
        }
    }

    /// Panics when the value is not a predicate.
    pub fn is_true(&self) -> bool {
        match self.as_bool() {
            Some(b) => b,
            None => panic!("{:?} is not a predicate", self),
        }
    }

    pub fn as_biguint(&self) -> Option<&BigUint> {
        match self {
            Value::Bits { value, .. } => Some(value),
            Value::Float { bits, .. } => Some(bits),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_biguint()?.to_u64()
    }

    pub fn as_u128(&self) -> Option<u128> {
        self.as_biguint()?.to_u128()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    UnassignedSymbol(String),
    Unsupported(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::UnassignedSymbol(name) => write!(f, "symbol {} has no value", name),
            EvalError::Unsupported(what) => write!(f, "cannot evaluate {}", what),
        }
    }
}

impl std::error::Error for EvalError {}

fn unsupported<T>(what: impl Into<String>) -> Result<T, EvalError> {
    Err(EvalError::Unsupported(what.into()))
}

/// An assignment of values to declared symbols.
#[derive(Debug, Clone, Default)]
pub struct Model {
    values: AHashMap<String, Value>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.set(name, Value::Bool(value));
    }

    pub fn set_bv(&mut self, name: &str, width: usize, value: impl Into<BigUint>) {
        self.set(name, Value::bits(width, value));
    }

    pub fn set_array_elements(
        &mut self,
        name: &str,
        domain: usize,
        range: usize,
        default: u64,
        entries: &[(u64, u64)],
    ) {
        let mut array = ArrayValue::constant(domain, range, BigUint::from(default) & mask(range));
        for (index, value) in entries {
            array.set(BigUint::from(*index), BigUint::from(*value) & mask(range));
        }
        self.set(name, Value::Array(array));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Assigns the unassigned symbols that `constraints` define.
    ///
    /// Handles `(= sym e)` and `(= e (fp s x f))` where the right-hand parts
    /// are symbols, in either operand order, repeating until nothing new can
    /// be assigned. Returns how many symbols were assigned.
    pub fn define_from(
        &mut self,
        graph: &TermGraph,
        constraints: &[SortedTerm<TermId>],
    ) -> Result<usize, EvalError> {
        let mut defined = 0;
        loop {
            let mut progress = false;
            for constraint in constraints {
                let node = graph.node(constraint.rep);
                if node.op != TermOp::Eq {
                    continue;
                }
                let (lhs, rhs) = (node.args[0], node.args[1]);
                for (target, source) in [(lhs, rhs), (rhs, lhs)] {
                    let count = self.define_target(graph, target, source)?;
                    if count > 0 {
                        defined += count;
                        progress = true;
                        break;
                    }
                }
            }
            if !progress {
                log::trace!("model completion assigned {} symbols", defined);
                return Ok(defined);
            }
        }
    }

    fn is_unassigned(&self, graph: &TermGraph, id: TermId) -> bool {
        match &graph.node(id).op {
            TermOp::Symbol(name) => !self.values.contains_key(name),
            _ => false,
        }
    }

    fn try_evaluate(&self, graph: &TermGraph, id: TermId) -> Result<Option<Value>, EvalError> {
        match evaluate(graph, self, id) {
            Ok(value) => Ok(Some(value)),
            Err(EvalError::UnassignedSymbol(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn define_target(
        &mut self,
        graph: &TermGraph,
        target: TermId,
        source: TermId,
    ) -> Result<usize, EvalError> {
        let node = graph.node(target);
        match &node.op {
            TermOp::Symbol(name) if self.is_unassigned(graph, target) => {
                match self.try_evaluate(graph, source)? {
                    Some(value) => {
                        self.values.insert(name.clone(), value);
                        Ok(1)
                    }
                    None => Ok(0),
                }
            }
            TermOp::FpFromParts => {
                if !node.args.iter().any(|a| self.is_unassigned(graph, *a)) {
                    return Ok(0);
                }
                let (format, bits) = match self.try_evaluate(graph, source)? {
                    Some(Value::Float { format, bits }) => (format, bits),
                    _ => return Ok(0),
                };
                let (sign, exponent, fraction) = split_float(format, &bits);
                let parts = [
                    (node.args[0], 1, BigUint::from(sign as u8)),
                    (node.args[1], format.exponent_bits, exponent),
                    (node.args[2], format.fraction_bits(), fraction),
                ];
                let mut count = 0;
                for (part, width, value) in parts {
                    if !self.is_unassigned(graph, part) {
                        continue;
                    }
                    if let TermOp::Symbol(name) = &graph.node(part).op {
                        self.values.insert(name.clone(), Value::bits(width, value));
                        count += 1;
                    }
                }
                Ok(count)
            }
            _ => Ok(0),
        }
    }
}

/// Evaluates `root` under `model`.
pub fn evaluate(graph: &TermGraph, model: &Model, root: TermId) -> Result<Value, EvalError> {
    let order = graph.reachable(&[root]);
    let mut values: AHashMap<TermId, Value> = AHashMap::with_capacity(order.len());
    for id in order {
        let node = graph.node(id);
        let value = {
            let args: Vec<&Value> = node.args.iter().map(|a| &values[a]).collect();
            eval_node(node, &args, model)?
        };
        values.insert(id, value);
    }
    values
        .remove(&root)
        .ok_or_else(|| EvalError::Unsupported(format!("term {:?}", root)))
}

fn modulus(width: usize) -> BigUint {
    BigUint::one() << width
}

fn mask(width: usize) -> BigUint {
    modulus(width) - 1u8
}

fn is_negative(width: usize, value: &BigUint) -> bool {
    value.bit(width as u64 - 1)
}

fn to_signed(width: usize, value: &BigUint) -> BigInt {
    let unsigned = BigInt::from_biguint(Sign::Plus, value.clone());
    if is_negative(width, value) {
        unsigned - BigInt::from_biguint(Sign::Plus, modulus(width))
    } else {
        unsigned
    }
}

fn from_signed(width: usize, value: &BigInt) -> BigUint {
    let m = BigInt::from_biguint(Sign::Plus, modulus(width));
    let wrapped = ((value % &m) + &m) % &m;
    wrapped.into_parts().1
}

fn negate(width: usize, value: &BigUint) -> BigUint {
    (modulus(width) - value) & mask(width)
}

fn predicate(sort: Sort, value: bool) -> Value {
    match sort {
        Sort::Bool => Value::Bool(value),
        _ => Value::bits(1, value as u8),
    }
}

fn truth(value: &Value) -> Result<bool, EvalError> {
    match value.as_bool() {
        Some(b) => Ok(b),
        None => unsupported(format!("{:?} as a predicate", value)),
    }
}

fn bits_of(value: &Value) -> Result<(usize, &BigUint), EvalError> {
    match value {
        Value::Bits { width, value } => Ok((*width, value)),
        other => unsupported(format!("{:?} as a bit-vector", other)),
    }
}

fn float_of(value: &Value) -> Result<(FloatFormat, &BigUint), EvalError> {
    match value {
        Value::Float { format, bits } => Ok((*format, bits)),
        other => unsupported(format!("{:?} as a float", other)),
    }
}

fn array_of(value: &Value) -> Result<&ArrayValue, EvalError> {
    match value {
        Value::Array(array) => Ok(array),
        other => unsupported(format!("{:?} as an array", other)),
    }
}

fn rounding_of(value: &Value) -> Result<RoundingMode, EvalError> {
    match value {
        Value::RoundingMode(rm) => Ok(*rm),
        other => unsupported(format!("{:?} as a rounding mode", other)),
    }
}

fn sort_width(sort: Sort) -> usize {
    match sort {
        Sort::BitVec(width) => width,
        _ => 1,
    }
}

fn sort_format(sort: Sort) -> Result<FloatFormat, EvalError> {
    match sort {
        Sort::Float(format) => Ok(format),
        other => unsupported(format!("a float of sort {:?}", other)),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Float { format: fl, bits: l }, Value::Float { format: fr, bits: r }) => {
            fl == fr
                && (l == r
                    || (classify(*fl, l) == FpClass::NaN && classify(*fr, r) == FpClass::NaN))
        }
        (Value::Bool(l), r) | (r, Value::Bool(l)) => r.as_bool() == Some(*l),
        _ => lhs == rhs,
    }
}

fn eval_node(node: &TermNode, args: &[&Value], model: &Model) -> Result<Value, EvalError> {
    Ok(match &node.op {
        TermOp::Symbol(name) => match model.get(name) {
            Some(value) => value.clone(),
            None => return Err(EvalError::UnassignedSymbol(name.clone())),
        },
        TermOp::BoolConst(b) => predicate(node.sort, *b),
        TermOp::BvLiteral(value) => Value::bits(sort_width(node.sort), value.clone()),
        TermOp::RoundingMode(rm) => Value::RoundingMode(*rm),
        TermOp::Not => predicate(node.sort, !truth(args[0])?),
        TermOp::And => predicate(node.sort, truth(args[0])? && truth(args[1])?),
        TermOp::Or => predicate(node.sort, truth(args[0])? || truth(args[1])?),
        TermOp::Iff => predicate(node.sort, truth(args[0])? == truth(args[1])?),
        TermOp::Ite => {
            if truth(args[0])? {
                args[1].clone()
            } else {
                args[2].clone()
            }
        }
        TermOp::Eq => predicate(node.sort, values_equal(args[0], args[1])),
        TermOp::BvNot => {
            let (width, a) = bits_of(args[0])?;
            Value::bits(width, a ^ mask(width))
        }
        TermOp::BvNeg => {
            let (width, a) = bits_of(args[0])?;
            Value::bits(width, negate(width, a))
        }
        TermOp::BvBinary(op) => {
            let (width, a) = bits_of(args[0])?;
            let (_, b) = bits_of(args[1])?;
            Value::bits(width, bv_binary(*op, width, a, b))
        }
        TermOp::BvCompare(op) => {
            let (width, a) = bits_of(args[0])?;
            let (_, b) = bits_of(args[1])?;
            let holds = match op {
                BvCompareOp::Ult => a < b,
                BvCompareOp::Ule => a <= b,
                BvCompareOp::Slt => to_signed(width, a) < to_signed(width, b),
                BvCompareOp::Sle => to_signed(width, a) <= to_signed(width, b),
            };
            predicate(node.sort, holds)
        }
        TermOp::Concat => {
            let (wa, a) = bits_of(args[0])?;
            let (wb, b) = bits_of(args[1])?;
            Value::bits(wa + wb, (a << wb) | b)
        }
        TermOp::Extract { high, low } => {
            let (_, a) = bits_of(args[0])?;
            Value::bits(high - low + 1, a >> *low)
        }
        TermOp::ZeroExtend(by) => {
            let (width, a) = bits_of(args[0])?;
            Value::bits(width + by, a.clone())
        }
        TermOp::SignExtend(by) => {
            let (width, a) = bits_of(args[0])?;
            Value::bits(width + by, from_signed(width + by, &to_signed(width, a)))
        }
        TermOp::ConstArray => {
            let (range, value) = bits_of(args[0])?;
            let domain = match node.sort {
                Sort::Array { domain, .. } => domain,
                other => return unsupported(format!("a constant array of sort {:?}", other)),
            };
            Value::Array(ArrayValue::constant(domain, range, value.clone()))
        }
        TermOp::Select => {
            let array = array_of(args[0])?;
            let (_, index) = bits_of(args[1])?;
            Value::bits(array.range, array.get(index).clone())
        }
        TermOp::Store => {
            let mut array = array_of(args[0])?.clone();
            let (_, index) = bits_of(args[1])?;
            let (_, value) = bits_of(args[2])?;
            array.set(index.clone(), value.clone());
            Value::Array(array)
        }
        TermOp::FpFromParts => {
            let format = sort_format(node.sort)?;
            let (_, sign) = bits_of(args[0])?;
            let (_, exponent) = bits_of(args[1])?;
            let (_, fraction) = bits_of(args[2])?;
            let fraction_bits = format.fraction_bits();
            let bits = (sign << (format.exponent_bits + fraction_bits))
                | (exponent << fraction_bits)
                | fraction;
            Value::Float { format, bits }
        }
        TermOp::FpFromIeeeBits => {
            let (_, bits) = bits_of(args[0])?;
            Value::Float {
                format: sort_format(node.sort)?,
                bits: bits.clone(),
            }
        }
        TermOp::FpToIeeeBits => {
            let (format, bits) = float_of(args[0])?;
            Value::bits(format.ieee_width(), bits.clone())
        }
        TermOp::FpToFp => {
            let rm = rounding_of(args[0])?;
            let (format, bits) = float_of(args[1])?;
            convert_float(rm, format, bits, sort_format(node.sort)?)?
        }
        TermOp::FpFromUnsigned | TermOp::FpFromSigned => {
            let rm = rounding_of(args[0])?;
            let (width, bits) = bits_of(args[1])?;
            let integer = if node.op == TermOp::FpFromSigned {
                to_signed(width, bits)
            } else {
                BigInt::from_biguint(Sign::Plus, bits.clone())
            };
            integer_to_float(rm, &integer, sort_format(node.sort)?)?
        }
        TermOp::FpToUnsigned | TermOp::FpToSigned => {
            let rm = rounding_of(args[0])?;
            let (format, bits) = float_of(args[1])?;
            let width = sort_width(node.sort);
            float_to_integer(rm, format, bits, width, node.op == TermOp::FpToSigned)?
        }
        TermOp::FpArith(op) => {
            let (rm, lhs, rhs) = match args {
                [rm, lhs, rhs] => (rounding_of(rm)?, *lhs, *rhs),
                [lhs, rhs] => (RoundingMode::NearestTiesToEven, *lhs, *rhs),
                _ => return unsupported(format!("{:?} with {} arguments", op, args.len())),
            };
            fp_arith(*op, rm, lhs, rhs)?
        }
        TermOp::FpUnary(op) => {
            let (rm, value) = match args {
                [rm, value] => (rounding_of(rm)?, *value),
                [value] => (RoundingMode::NearestTiesToEven, *value),
                _ => return unsupported(format!("{:?} with {} arguments", op, args.len())),
            };
            fp_unary(*op, rm, value)?
        }
        TermOp::FpCompare(op) => {
            let (format, l) = float_of(args[0])?;
            let (_, r) = float_of(args[1])?;
            let holds = match (order_key(format, l), order_key(format, r)) {
                (Some(l), Some(r)) => match op {
                    FpCompareOp::Eq => l == r,
                    FpCompareOp::Lt => l < r,
                    FpCompareOp::Le => l <= r,
                    FpCompareOp::Gt => l > r,
                    FpCompareOp::Ge => l >= r,
                },
                _ => false,
            };
            predicate(node.sort, holds)
        }
        TermOp::FpClassify(class) => {
            let (format, bits) = float_of(args[0])?;
            predicate(node.sort, classify(format, bits) == *class)
        }
    })
}

fn bv_binary(op: BvBinaryOp, width: usize, a: &BigUint, b: &BigUint) -> BigUint {
    let m = modulus(width);
    let udiv = |a: &BigUint, b: &BigUint| {
        if b.is_zero() {
            mask(width)
        } else {
            a / b
        }
    };
    let urem = |a: &BigUint, b: &BigUint| {
        if b.is_zero() {
            a.clone()
        } else {
            a % b
        }
    };
    let magnitude = |v: &BigUint| {
        if is_negative(width, v) {
            negate(width, v)
        } else {
            v.clone()
        }
    };
    // None when the shift amount is at least the width.
    let amount = if b < &BigUint::from(width) {
        b.to_usize()
    } else {
        None
    };
    match op {
        BvBinaryOp::And => a & b,
        BvBinaryOp::Or => a | b,
        BvBinaryOp::Xor => a ^ b,
        BvBinaryOp::Add => (a + b) % &m,
        BvBinaryOp::Sub => (a + &m - b) % &m,
        BvBinaryOp::Mul => (a * b) % &m,
        BvBinaryOp::UDiv => udiv(a, b),
        BvBinaryOp::URem => urem(a, b),
        BvBinaryOp::SDiv => {
            let q = udiv(&magnitude(a), &magnitude(b));
            if is_negative(width, a) != is_negative(width, b) {
                negate(width, &q)
            } else {
                q
            }
        }
        BvBinaryOp::SRem => {
            let r = urem(&magnitude(a), &magnitude(b));
            if is_negative(width, a) {
                negate(width, &r)
            } else {
                r
            }
        }
        BvBinaryOp::Shl => match amount {
            Some(s) => (a << s) % &m,
            None => BigUint::zero(),
        },
        BvBinaryOp::LShr => match amount {
            Some(s) => a >> s,
            None => BigUint::zero(),
        },
        BvBinaryOp::AShr => {
            let negative = is_negative(width, a);
            match amount {
                Some(s) if negative => (a >> s) | (mask(width) ^ (mask(width) >> s)),
                Some(s) => a >> s,
                None if negative => mask(width),
                None => BigUint::zero(),
            }
        }
    }
}

fn split_float(format: FloatFormat, bits: &BigUint) -> (bool, BigUint, BigUint) {
    let fraction_bits = format.fraction_bits();
    let sign = bits.bit((format.ieee_width() - 1) as u64);
    let exponent = (bits >> fraction_bits) & mask(format.exponent_bits);
    let fraction = bits & mask(fraction_bits);
    (sign, exponent, fraction)
}

fn classify(format: FloatFormat, bits: &BigUint) -> FpClass {
    let (_, exponent, fraction) = split_float(format, bits);
    if exponent == mask(format.exponent_bits) {
        if fraction.is_zero() {
            FpClass::Infinite
        } else {
            FpClass::NaN
        }
    } else if exponent.is_zero() {
        if fraction.is_zero() {
            FpClass::Zero
        } else {
            FpClass::Subnormal
        }
    } else {
        FpClass::Normal
    }
}

/// A key whose integer order is the IEEE order of non-NaN floats, with both
/// zeros equal.
fn order_key(format: FloatFormat, bits: &BigUint) -> Option<BigInt> {
    match classify(format, bits) {
        FpClass::NaN => None,
        FpClass::Zero => Some(BigInt::zero()),
        _ => {
            let (sign, _, _) = split_float(format, bits);
            let magnitude = bits & mask(format.ieee_width() - 1);
            let sign = if sign { Sign::Minus } else { Sign::Plus };
            Some(BigInt::from_biguint(sign, magnitude))
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Native {
    Half(f16),
    Single(f32),
    Double(f64),
}

impl Native {
    fn decode(format: FloatFormat, bits: &BigUint) -> Result<Native, EvalError> {
        let raw = match bits.to_u64() {
            Some(raw) => raw,
            None => return unsupported(format!("{:?} arithmetic", format)),
        };
        match format {
            FloatFormat::HALF => Ok(Native::Half(f16::from_bits(raw as u16))),
            FloatFormat::SINGLE => Ok(Native::Single(f32::from_bits(raw as u32))),
            FloatFormat::DOUBLE => Ok(Native::Double(f64::from_bits(raw))),
            other => unsupported(format!("{:?} arithmetic", other)),
        }
    }

    /// Rounds `value` to the nearest value of `format`, ties to even.
    fn round_from_f64(format: FloatFormat, value: f64) -> Result<Native, EvalError> {
        match format {
            FloatFormat::HALF => Ok(Native::Half(f16::from_f64(value))),
            FloatFormat::SINGLE => Ok(Native::Single(value as f32)),
            FloatFormat::DOUBLE => Ok(Native::Double(value)),
            other => unsupported(format!("{:?} arithmetic", other)),
        }
    }

    fn to_f64(self) -> f64 {
        match self {
            Native::Half(v) => v.to_f64(),
            Native::Single(v) => v as f64,
            Native::Double(v) => v,
        }
    }

    fn encode(self) -> Value {
        match self {
            Native::Half(v) => Value::Float {
                format: FloatFormat::HALF,
                bits: BigUint::from(v.to_bits()),
            },
            Native::Single(v) => Value::Float {
                format: FloatFormat::SINGLE,
                bits: BigUint::from(v.to_bits()),
            },
            Native::Double(v) => Value::Float {
                format: FloatFormat::DOUBLE,
                bits: BigUint::from(v.to_bits()),
            },
        }
    }
}

fn require_nearest_even(rm: RoundingMode, what: &str) -> Result<(), EvalError> {
    if rm == RoundingMode::NearestTiesToEven {
        Ok(())
    } else {
        unsupported(format!("{} under {}", what, rm.smtlib_name()))
    }
}

fn apply_arith<F: Float>(op: FpArithOp, x: F, y: F) -> Result<F, EvalError> {
    Ok(match op {
        FpArithOp::Add => x + y,
        FpArithOp::Sub => x - y,
        FpArithOp::Mul => x * y,
        FpArithOp::Div => x / y,
        FpArithOp::Min => x.min(y),
        FpArithOp::Max => x.max(y),
        FpArithOp::Rem => return unsupported("fp.rem"),
    })
}

fn round_to_integral<F: Float>(rm: RoundingMode, x: F) -> F {
    let rounded = match rm {
        RoundingMode::NearestTiesToAway => x.round(),
        RoundingMode::TowardPositive => x.ceil(),
        RoundingMode::TowardNegative => x.floor(),
        RoundingMode::TowardZero => x.trunc(),
        RoundingMode::NearestTiesToEven => {
            let two = F::one() + F::one();
            let r = x.round();
            if (r - x).abs() == F::one() / two && (r / two).fract() != F::zero() {
                r - x.signum()
            } else {
                r
            }
        }
    };
    if x.is_nan() {
        x
    } else {
        rounded.copysign(x)
    }
}

fn fp_arith(op: FpArithOp, rm: RoundingMode, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    require_nearest_even(rm, op.smtlib_name())?;
    let (lf, l) = float_of(lhs)?;
    let (_, r) = float_of(rhs)?;
    let result = match (Native::decode(lf, l)?, Native::decode(lf, r)?) {
        // Single precision carries enough guard bits for a correctly rounded
        // half-precision result.
        (Native::Half(x), Native::Half(y)) => {
            Native::Half(f16::from_f32(apply_arith(op, x.to_f32(), y.to_f32())?))
        }
        (Native::Single(x), Native::Single(y)) => Native::Single(apply_arith(op, x, y)?),
        (Native::Double(x), Native::Double(y)) => Native::Double(apply_arith(op, x, y)?),
        _ => return unsupported("mixed float formats"),
    };
    Ok(result.encode())
}

fn fp_unary(op: FpUnaryOp, rm: RoundingMode, value: &Value) -> Result<Value, EvalError> {
    let (format, bits) = float_of(value)?;
    let sign_bit = (format.ieee_width() - 1) as u64;
    match op {
        FpUnaryOp::Abs => {
            let mut bits = bits.clone();
            bits.set_bit(sign_bit, false);
            Ok(Value::Float { format, bits })
        }
        FpUnaryOp::Neg => {
            let mut bits = bits.clone();
            bits.set_bit(sign_bit, !bits.bit(sign_bit));
            Ok(Value::Float { format, bits })
        }
        FpUnaryOp::Sqrt => {
            require_nearest_even(rm, "fp.sqrt")?;
            let result = match Native::decode(format, bits)? {
                Native::Half(x) => Native::Half(f16::from_f32(x.to_f32().sqrt())),
                Native::Single(x) => Native::Single(x.sqrt()),
                Native::Double(x) => Native::Double(x.sqrt()),
            };
            Ok(result.encode())
        }
        FpUnaryOp::RoundToIntegral => {
            let result = match Native::decode(format, bits)? {
                Native::Half(x) => Native::Half(f16::from_f32(round_to_integral(rm, x.to_f32()))),
                Native::Single(x) => Native::Single(round_to_integral(rm, x)),
                Native::Double(x) => Native::Double(round_to_integral(rm, x)),
            };
            Ok(result.encode())
        }
    }
}

fn convert_float(
    rm: RoundingMode,
    from: FloatFormat,
    bits: &BigUint,
    to: FloatFormat,
) -> Result<Value, EvalError> {
    if from == to {
        return Ok(Value::Float {
            format: to,
            bits: bits.clone(),
        });
    }
    if to.significand_bits < from.significand_bits {
        require_nearest_even(rm, "narrowing to_fp")?;
    }
    let value = Native::decode(from, bits)?.to_f64();
    Ok(Native::round_from_f64(to, value)?.encode())
}

fn integer_to_float(
    rm: RoundingMode,
    integer: &BigInt,
    format: FloatFormat,
) -> Result<Value, EvalError> {
    require_nearest_even(rm, "integer to_fp")?;
    let native = match (format, integer.to_i64(), integer.to_u64()) {
        (FloatFormat::SINGLE, Some(v), _) => Native::Single(v as f32),
        (FloatFormat::SINGLE, None, Some(v)) => Native::Single(v as f32),
        // Integers past 2^53 overflow half precision whatever the rounding.
        (_, Some(v), _) => Native::round_from_f64(format, v as f64)?,
        (_, None, Some(v)) => Native::round_from_f64(format, v as f64)?,
        _ => return unsupported(format!("conversion of {} to {:?}", integer, format)),
    };
    Ok(native.encode())
}

fn float_to_integer(
    rm: RoundingMode,
    format: FloatFormat,
    bits: &BigUint,
    width: usize,
    signed: bool,
) -> Result<Value, EvalError> {
    let value = round_to_integral(rm, Native::decode(format, bits)?.to_f64());
    let integer = match BigInt::from_f64(value) {
        Some(integer) if value.is_finite() => integer,
        _ => return unsupported(format!("conversion of {} to an integer", value)),
    };
    let (low, high) = if signed {
        let bound = BigInt::one() << (width - 1);
        (-bound.clone(), bound)
    } else {
        (BigInt::zero(), BigInt::one() << width)
    };
    if integer < low || integer >= high {
        return unsupported(format!("{} out of range for {} bits", value, width));
    }
    Ok(Value::bits(width, from_signed(width, &integer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::term_graph::TermGraphOptions;
    use crate::term_algebra::TermAlgebra;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn binary(op: BvBinaryOp, width: usize, a: u64, b: u64) -> u64 {
        bv_binary(op, width, &BigUint::from(a), &BigUint::from(b))
            .to_u64()
            .unwrap()
    }

    #[test_case(BvBinaryOp::UDiv, 0x12, 0, 0xff; "udiv by zero is all ones")]
    #[test_case(BvBinaryOp::URem, 0x12, 0, 0x12; "urem by zero is the dividend")]
    #[test_case(BvBinaryOp::SDiv, 0xf9, 0x02, 0xfd; "sdiv truncates toward zero")]
    #[test_case(BvBinaryOp::SDiv, 0xf9, 0, 0x01; "negative sdiv by zero is one")]
    #[test_case(BvBinaryOp::SRem, 0xf9, 0x02, 0xff; "srem takes the dividend sign")]
    #[test_case(BvBinaryOp::SRem, 0x07, 0xfe, 0x01; "srem ignores the divisor sign")]
    #[test_case(BvBinaryOp::Sub, 0x01, 0x02, 0xff; "sub wraps")]
    #[test_case(BvBinaryOp::Shl, 0x81, 0x01, 0x02; "shl drops the top bit")]
    #[test_case(BvBinaryOp::AShr, 0x80, 0x03, 0xf0; "ashr fills with the sign")]
    #[test_case(BvBinaryOp::AShr, 0x80, 0x09, 0xff; "ashr past the width")]
    #[test_case(BvBinaryOp::LShr, 0x80, 0x08, 0x00; "lshr past the width")]
    fn test_bv_semantics(op: BvBinaryOp, a: u64, b: u64, expected: u64) {
        assert_eq!(binary(op, 8, a, b), expected);
    }

    #[test]
    fn test_float_comparison_and_classes() {
        let mut g = TermGraph::new(TermGraphOptions::z3_like());
        let neg_zero = g.bv_u64(32, 0x8000_0000);
        let pos_zero = g.bv_zero(32);
        let nan = g.bv_u64(32, 0x7fc0_0000);
        let neg_zero = g.fp_from_ieee_bits(&neg_zero, FloatFormat::SINGLE);
        let pos_zero = g.fp_from_ieee_bits(&pos_zero, FloatFormat::SINGLE);
        let nan = g.fp_from_ieee_bits(&nan, FloatFormat::SINGLE);

        let model = Model::new();
        let check = |g: &TermGraph, t: &SortedTerm<TermId>| evaluate(g, &model, t.rep).unwrap().is_true();

        let fp_eq = g.fp_compare(FpCompareOp::Eq, &neg_zero, &pos_zero);
        assert!(check(&g, &fp_eq));
        let smt_eq = g.eq(&neg_zero, &pos_zero);
        assert!(!check(&g, &smt_eq));
        let nan_eq = g.fp_compare(FpCompareOp::Eq, &nan, &nan);
        assert!(!check(&g, &nan_eq));
        let nan_same = g.eq(&nan, &nan);
        assert!(check(&g, &nan_same));
        let is_zero = g.fp_classify(FpClass::Zero, &neg_zero);
        assert!(check(&g, &is_zero));
    }

    #[test]
    fn test_native_float_arithmetic() {
        let mut g = TermGraph::new(TermGraphOptions::z3_like());
        let a = g.bv_u64(64, 1.5f64.to_bits());
        let b = g.bv_u64(64, 2.25f64.to_bits());
        let a = g.fp_from_ieee_bits(&a, FloatFormat::DOUBLE);
        let b = g.fp_from_ieee_bits(&b, FloatFormat::DOUBLE);
        let rne = g.rounding_mode(RoundingMode::NearestTiesToEven);
        let product = g.fp_arith(FpArithOp::Mul, Some(&rne), &a, &b);
        let narrowed = g.fp_to_fp(&rne, &product, FloatFormat::SINGLE);
        let bits = g.fp_to_ieee_bits(&narrowed);
        let value = evaluate(&g, &Model::new(), bits.rep).unwrap();
        assert_eq!(value.as_u64(), Some(3.375f32.to_bits() as u64));
    }

    #[test_case(RoundingMode::NearestTiesToEven, 2.5, 2.0)]
    #[test_case(RoundingMode::NearestTiesToEven, -0.5, -0.0)]
    #[test_case(RoundingMode::NearestTiesToEven, 3.5, 4.0)]
    #[test_case(RoundingMode::NearestTiesToAway, 2.5, 3.0)]
    #[test_case(RoundingMode::TowardNegative, -1.25, -2.0)]
    #[test_case(RoundingMode::TowardZero, -1.75, -1.0)]
    fn test_round_to_integral(rm: RoundingMode, x: f64, expected: f64) {
        assert_eq!(round_to_integral(rm, x).to_bits(), expected.to_bits());
    }

    #[test]
    fn test_unassigned_symbol() {
        let mut g = TermGraph::new(TermGraphOptions::z3_like());
        let x = g
            .declare_fresh("x", crate::term_algebra::Sort::BitVec(8))
            .unwrap();
        let err = evaluate(&g, &Model::new(), x.rep).unwrap_err();
        assert_eq!(err, EvalError::UnassignedSymbol("x!0".to_string()));
    }

    #[test]
    fn test_define_from_chains_definitions() {
        let mut g = TermGraph::new(TermGraphOptions::z3_like());
        let sort = crate::term_algebra::Sort::BitVec(8);
        let x = g.declare_fresh("x", sort).unwrap();
        let y = g.declare_fresh("y", sort).unwrap();
        let z = g.declare_fresh("z", sort).unwrap();
        let one = g.bv_one(8);
        let y_plus_one = g.bv_add(&y, &one);
        // z is defined through y, which is listed later.
        let z_def = g.eq(&z, &y_plus_one);
        let y_def = g.eq(&x, &y);
        let mut model = Model::new();
        model.set_bv("x!0", 8, 41u64);
        assert_eq!(model.define_from(&g, &[z_def, y_def]).unwrap(), 2);
        assert_eq!(evaluate(&g, &model, z.rep).unwrap().as_u64(), Some(42));
    }
}
