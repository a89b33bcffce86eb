// SPDX-License-Identifier: Apache-2.0

//! Lowering of symbolic-execution expressions into SMT solver terms.

pub mod backend;
pub mod coercion;
pub mod constant_arithmetic;
pub mod expr;
pub mod expr_cache;
pub mod options;
pub mod strength_reduction;
pub mod term_algebra;
pub mod term_builder;

#[cfg(test)]
pub(crate) mod test_utils;
