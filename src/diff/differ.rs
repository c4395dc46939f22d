//! Three-way differencing of resource collections keyed by identity.
//!
//! `source` is always the actual (remote) side and `target` the declared
//! side. Results keep the order of the collection they are drawn from.

use std::collections::HashMap;
use crate::model::Resource;

#[derive(Debug, Clone, PartialEq)]
pub struct DiffResult<T> {
    pub count: usize,
    pub items: Vec<T>,
}

impl<T> DiffResult<T> {
    fn from_items(items: Vec<T>) -> Self {
        Self { count: items.len(), items }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn identities(&self) -> Vec<&str>
    where
        T: Resource,
    {
        self.items.iter().map(|r| r.identity()).collect()
    }
}

fn index<T: Resource>(items: &[T]) -> HashMap<&str, &T> {
    items.iter().map(|r| (r.identity(), r)).collect()
}

/// Declared resources with no remote counterpart.
pub fn add<T: Resource>(source: &[T], target: &[T]) -> DiffResult<T> {
    let existing = index(source);
    DiffResult::from_items(
        target
            .iter()
            .filter(|t| !existing.contains_key(t.identity()))
            .cloned()
            .collect(),
    )
}

/// Declared resources whose remote counterpart differs in value.
pub fn change<T: Resource>(source: &[T], target: &[T]) -> DiffResult<T> {
    let existing = index(source);
    DiffResult::from_items(
        target
            .iter()
            .filter(|t| matches!(existing.get(t.identity()), Some(s) if *s != *t))
            .cloned()
            .collect(),
    )
}

/// Remote resources that are no longer declared.
pub fn destroy<T: Resource>(source: &[T], target: &[T]) -> DiffResult<T> {
    let declared = index(target);
    DiffResult::from_items(
        source
            .iter()
            .filter(|s| !declared.contains_key(s.identity()))
            .cloned()
            .collect(),
    )
}

/// Members of `a` whose identity also appears in `b`.
pub fn intersection<T: Resource>(a: &[T], b: &[T]) -> DiffResult<T> {
    let other = index(b);
    DiffResult::from_items(
        a.iter()
            .filter(|r| other.contains_key(r.identity()))
            .cloned()
            .collect(),
    )
}
