// SPDX-License-Identifier: Apache-2.0

pub mod easy_smt_backend;
pub mod eval;
pub mod term_graph;
