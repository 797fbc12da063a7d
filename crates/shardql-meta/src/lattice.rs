//! Join-semilattice trait and the merge primitives cluster metadata is built from.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A state type with a merge operator.
///
/// Properties:
/// - Associative: join(join(a, b), c) == join(a, join(b, c))
/// - Commutative: join(a, b) == join(b, a)
/// - Idempotent: join(a, a) == a
pub trait Semilattice: Clone + PartialEq {
    /// Merge `other` into `self`.
    fn join(&mut self, other: &Self);

    /// Merge without mutating either side.
    fn joined(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        merged.join(other);
        merged
    }
}

/// True when `multiple` already contains everything in `divisor`, i.e.
/// merging `divisor` into it would change nothing.
pub fn is_joined<T: Semilattice>(multiple: &T, divisor: &T) -> bool {
    multiple.joined(divisor) == *multiple
}

/// Version stamp for a last-writer-wins register.
///
/// Ordered by version first, then by the writing node so two nodes never
/// produce equal stamps for different writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub version: u64,
    pub node: Uuid,
}

impl Stamp {
    pub fn new(version: u64, node: Uuid) -> Self {
        Self { version, node }
    }
}

/// Last-writer-wins register.
///
/// Higher stamp wins. Equal stamps fall back to the larger value so the
/// merge stays commutative even if a stamp is reused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lww<T> {
    pub value: T,
    pub stamp: Stamp,
}

impl<T> Lww<T> {
    pub fn new(value: T, stamp: Stamp) -> Self {
        Self { value, stamp }
    }

    pub fn get(&self) -> &T {
        &self.value
    }
}

impl<T: Ord + Clone> Semilattice for Lww<T> {
    fn join(&mut self, other: &Self) {
        let other_wins = match other.stamp.cmp(&self.stamp) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => other.value > self.value,
        };
        if other_wins {
            *self = other.clone();
        }
    }
}

/// An entry that can be deleted. Deletion is permanent: a tombstone absorbs
/// every live version it is joined with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Deletable<T> {
    Live(T),
    Deleted,
}

impl<T> Deletable<T> {
    pub fn is_deleted(&self) -> bool {
        matches!(self, Deletable::Deleted)
    }

    pub fn live(&self) -> Option<&T> {
        match self {
            Deletable::Live(value) => Some(value),
            Deletable::Deleted => None,
        }
    }
}

impl<T: Semilattice> Semilattice for Deletable<T> {
    fn join(&mut self, other: &Self) {
        match (&mut *self, other) {
            (Deletable::Deleted, _) => {}
            (_, Deletable::Deleted) => *self = Deletable::Deleted,
            (Deletable::Live(mine), Deletable::Live(theirs)) => mine.join(theirs),
        }
    }
}

/// Key union; values present on both sides are joined.
impl<K, V> Semilattice for BTreeMap<K, V>
where
    K: Ord + Clone,
    V: Semilattice,
{
    fn join(&mut self, other: &Self) {
        for (key, theirs) in other {
            match self.get_mut(key) {
                Some(mine) => mine.join(theirs),
                None => {
                    self.insert(key.clone(), theirs.clone());
                }
            }
        }
    }
}
