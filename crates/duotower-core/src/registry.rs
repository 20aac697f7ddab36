//! Bidirectional mapping between raw identifiers and dense indices.
//!
//! Embedding tables are addressed by contiguous indices in `[0, N)`, while
//! interaction logs carry opaque external ids. [`IndexRegistry`] assigns the
//! indices once, up front, and never grows afterwards: an id that was not
//! present at construction time is a cold-start id and lookups for it fail
//! with [`RecError::UnknownIdentifier`].
//!
//! # Example
//!
//! ```
//! use duotower_core::registry::{IndexPolicy, IndexRegistry};
//! use duotower_core::EntityKind;
//!
//! let registry = IndexRegistry::assign(EntityKind::Item, vec![30, 10, 20, 10], IndexPolicy::Sorted);
//! assert_eq!(registry.len(), 3);
//! assert_eq!(registry.index_of(&10).unwrap(), 0);
//! assert_eq!(registry.id_of(2).unwrap(), &30);
//! assert!(registry.index_of(&99).is_err());
//! ```

use std::fmt::Display;
use std::hash::Hash;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::{EntityKind, RecError, Result};

/// Order in which dense indices are handed out.
///
/// Both policies are deterministic for a given input sequence, so two runs over
/// the same log produce the same tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexPolicy {
    /// Index `k` goes to the `k`-th distinct id in input order.
    FirstAppearance,
    /// Index `k` goes to the `k`-th smallest distinct id.
    #[default]
    Sorted,
}

/// Dense index registry for one entity kind.
#[derive(Debug, Clone)]
pub struct IndexRegistry<K> {
    kind: EntityKind,
    ids: Vec<K>,
    indices: HashMap<K, usize>,
}

impl<K> IndexRegistry<K>
where
    K: Clone + Eq + Hash + Ord + Display,
{
    /// Builds a registry from raw ids. Duplicates collapse to a single index.
    pub fn assign<I>(kind: EntityKind, raw_ids: I, policy: IndexPolicy) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        let mut ids: Vec<K> = Vec::new();
        let mut seen: HashMap<K, ()> = HashMap::new();
        for id in raw_ids {
            if seen.insert(id.clone(), ()).is_none() {
                ids.push(id);
            }
        }
        if policy == IndexPolicy::Sorted {
            ids.sort();
        }

        let indices = ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();

        Self { kind, ids, indices }
    }

    /// Returns the dense index of `id`.
    ///
    /// # Errors
    ///
    /// [`RecError::UnknownIdentifier`] if `id` was not registered.
    pub fn index_of(&self, id: &K) -> Result<usize> {
        self.indices
            .get(id)
            .copied()
            .ok_or_else(|| RecError::unknown(self.kind, id))
    }

    /// Returns the raw id stored at `index`.
    ///
    /// # Errors
    ///
    /// [`RecError::UnknownIdentifier`] if `index >= len()`.
    pub fn id_of(&self, index: usize) -> Result<&K> {
        self.ids
            .get(index)
            .ok_or_else(|| RecError::unknown(self.kind, format!("index {}", index)))
    }

    /// Returns `true` if `id` has an index.
    pub fn contains(&self, id: &K) -> bool {
        self.indices.contains_key(id)
    }

    /// Number of registered ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if no id was registered.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The entity kind this registry indexes.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// All registered ids in index order.
    pub fn ids(&self) -> &[K] {
        &self.ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_policy() {
        let registry =
            IndexRegistry::assign(EntityKind::User, vec![5, 3, 9, 3], IndexPolicy::Sorted);
        assert_eq!(registry.ids(), &[3, 5, 9]);
        assert_eq!(registry.index_of(&9).unwrap(), 2);
    }

    #[test]
    fn test_first_appearance_policy() {
        let registry = IndexRegistry::assign(
            EntityKind::Item,
            vec!["w".to_string(), "y".to_string(), "x".to_string(), "w".to_string()],
            IndexPolicy::FirstAppearance,
        );
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.index_of(&"y".to_string()).unwrap(), 1);
        assert_eq!(registry.id_of(2).unwrap(), "x");
    }

    #[test]
    fn test_round_trip() {
        let raw = vec![17_i64, -4, 1000, 0, 17, 63];
        for policy in [IndexPolicy::Sorted, IndexPolicy::FirstAppearance] {
            let registry = IndexRegistry::assign(EntityKind::Item, raw.clone(), policy);
            for id in &raw {
                let idx = registry.index_of(id).unwrap();
                assert_eq!(registry.id_of(idx).unwrap(), id);
            }
        }
    }

    #[test]
    fn test_unknown_identifier() {
        let registry = IndexRegistry::assign(EntityKind::User, vec![1, 2], IndexPolicy::Sorted);
        match registry.index_of(&3) {
            Err(RecError::UnknownIdentifier { kind, id }) => {
                assert_eq!(kind, EntityKind::User);
                assert_eq!(id, "3");
            }
            other => panic!("expected UnknownIdentifier, got {:?}", other),
        }
        assert!(registry.id_of(2).is_err());
    }

    #[test]
    fn test_empty_registry() {
        let registry: IndexRegistry<i64> =
            IndexRegistry::assign(EntityKind::Item, Vec::new(), IndexPolicy::Sorted);
        assert!(registry.is_empty());
        assert!(registry.id_of(0).is_err());
    }
}
