// SPDX-License-Identifier: Apache-2.0

//! Identity-keyed memo tables for lowered expressions and arrays.
//!
//! Keys are allocation addresses. Every entry keeps a clone of the `Rc` it was
//! keyed on, so an address cannot be freed and reused by an unrelated node
//! while its entry is live.

use std::rc::Rc;

use ahash::AHashMap;

use crate::expr::{ArrayRef, ExprRef, UpdateNodeRef};
use crate::term_algebra::SortedTerm;

/// A lowered expression: the backend term plus the IR width it stands for.
/// Width 1 means the term is a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lowered<Term> {
    pub term: SortedTerm<Term>,
    pub width: usize,
}

pub(crate) fn identity<T>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as usize
}

pub struct NodeCache<Term> {
    entries: AHashMap<usize, (ExprRef, Lowered<Term>)>,
    generation: u64,
}

impl<Term: Clone> NodeCache<Term> {
    pub fn new() -> Self {
        NodeCache {
            entries: AHashMap::new(),
            generation: 0,
        }
    }

    pub fn get(&self, expr: &ExprRef) -> Option<&Lowered<Term>> {
        self.entries.get(&identity(expr)).map(|(_, lowered)| lowered)
    }

    pub fn insert(&mut self, expr: &ExprRef, lowered: Lowered<Term>) {
        debug_assert!(!expr.is_constant(), "constants are never cached");
        self.entries
            .insert(identity(expr), (Rc::clone(expr), lowered));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of times the cache has been cleared.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn clear(&mut self) {
        log::debug!(
            "NodeCache::clear; dropping {} entries of generation {}",
            self.entries.len(),
            self.generation
        );
        self.entries.clear();
        self.generation += 1;
    }
}

impl<Term: Clone> Default for NodeCache<Term> {
    fn default() -> Self {
        Self::new()
    }
}

/// Terms for initial arrays and for the array state after each write.
pub struct ArrayTermCache<Term> {
    arrays: AHashMap<usize, (ArrayRef, SortedTerm<Term>)>,
    updates: AHashMap<usize, (UpdateNodeRef, SortedTerm<Term>)>,
    generation: u64,
}

impl<Term: Clone> ArrayTermCache<Term> {
    pub fn new() -> Self {
        ArrayTermCache {
            arrays: AHashMap::new(),
            updates: AHashMap::new(),
            generation: 0,
        }
    }

    pub fn lookup_array(&self, array: &ArrayRef) -> Option<&SortedTerm<Term>> {
        self.arrays.get(&identity(array)).map(|(_, term)| term)
    }

    pub fn insert_array(&mut self, array: &ArrayRef, term: SortedTerm<Term>) {
        self.arrays
            .insert(identity(array), (Rc::clone(array), term));
    }

    pub fn lookup_update(&self, node: &UpdateNodeRef) -> Option<&SortedTerm<Term>> {
        self.updates.get(&identity(node)).map(|(_, term)| term)
    }

    pub fn insert_update(&mut self, node: &UpdateNodeRef, term: SortedTerm<Term>) {
        self.updates
            .insert(identity(node), (Rc::clone(node), term));
    }

    pub fn array_count(&self) -> usize {
        self.arrays.len()
    }

    pub fn update_count(&self) -> usize {
        self.updates.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forgets the write states but keeps the initial array terms.
    pub fn clear_updates(&mut self) {
        log::debug!(
            "ArrayTermCache::clear_updates; dropping {} update states",
            self.updates.len()
        );
        self.updates.clear();
        self.generation += 1;
    }

    /// Forgets initial arrays and write states alike.
    pub fn clear(&mut self) {
        log::debug!(
            "ArrayTermCache::clear; dropping {} arrays and {} update states",
            self.arrays.len(),
            self.updates.len()
        );
        self.arrays.clear();
        self.updates.clear();
        self.generation += 1;
    }
}

impl<Term: Clone> Default for ArrayTermCache<Term> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Array, BinaryOp, Expr, UpdateList};
    use crate::term_algebra::Sort;
    use pretty_assertions::assert_eq;

    fn lowered(tag: u32) -> Lowered<u32> {
        Lowered {
            term: SortedTerm::new(Sort::BitVec(8), tag),
            width: 8,
        }
    }

    #[test]
    fn test_structurally_equal_nodes_are_distinct_keys() {
        let x = Expr::read(
            UpdateList::new(Array::symbolic("a", 32, 8)),
            Expr::bv(32, 0),
        );
        let one = Expr::binary(BinaryOp::Add, x.clone(), x.clone());
        let two = Expr::binary(BinaryOp::Add, x.clone(), x);
        let mut cache = NodeCache::new();
        cache.insert(&one, lowered(1));
        assert_eq!(cache.get(&one), Some(&lowered(1)));
        assert_eq!(cache.get(&two), None);
    }

    #[test]
    fn test_entries_pin_their_nodes() {
        let array = Array::symbolic("a", 32, 8);
        let x = Expr::read(UpdateList::new(array), Expr::bv(32, 0));
        let mut cache = NodeCache::new();
        cache.insert(&x, lowered(7));
        assert_eq!(Rc::strong_count(&x), 2);
        cache.clear();
        assert_eq!(Rc::strong_count(&x), 1);
    }

    #[test]
    fn test_clear_advances_generation() {
        let mut cache: NodeCache<u32> = NodeCache::new();
        assert_eq!(cache.generation(), 0);
        cache.clear();
        cache.clear();
        assert_eq!(cache.generation(), 2);
    }

    #[test]
    fn test_clear_updates_keeps_arrays() {
        let array = Array::symbolic("a", 32, 8);
        let mut updates = UpdateList::new(array.clone());
        updates.extend(Expr::bv(32, 1), Expr::bv(8, 2));
        let node = updates.head().unwrap().clone();

        let mut cache = ArrayTermCache::new();
        cache.insert_array(&array, SortedTerm::new(Sort::Array { domain: 32, range: 8 }, 1u32));
        cache.insert_update(&node, SortedTerm::new(Sort::Array { domain: 32, range: 8 }, 2u32));
        assert_eq!(cache.update_count(), 1);

        cache.clear_updates();
        assert_eq!(cache.update_count(), 0);
        assert_eq!(cache.array_count(), 1);
        assert!(cache.lookup_update(&node).is_none());
        assert_eq!(cache.lookup_array(&array).map(|t| t.rep), Some(1));
    }
}
