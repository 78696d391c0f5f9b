//! Three-way diff between a catalog snapshot and the identifiers seen in a run

use serde::Serialize;
use std::collections::BTreeSet;

use super::identifier::Identifier;

/// Identifiers persisted for one board when the run started
pub type CatalogSnapshot = BTreeSet<Identifier>;

/// Add/skip/delete sets for one board; the three sets are pairwise disjoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    /// Seen now, absent from the snapshot
    pub to_add: BTreeSet<Identifier>,
    /// Seen now and already persisted
    pub to_skip: BTreeSet<Identifier>,
    /// Persisted but no longer listed
    pub to_delete: BTreeSet<Identifier>,
}

impl ReconciliationPlan {
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_delete.is_empty()
    }
}

/// Compute the plan for `previous` (snapshot) against `current` (this run).
///
/// Both sets must be scoped to the same board.
pub fn reconcile(
    previous: &BTreeSet<Identifier>,
    current: &BTreeSet<Identifier>,
) -> ReconciliationPlan {
    ReconciliationPlan {
        to_add: current.difference(previous).cloned().collect(),
        to_skip: current.intersection(previous).cloned().collect(),
        to_delete: previous.difference(current).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(values: &[&str]) -> BTreeSet<Identifier> {
        values.iter().map(|v| Identifier::from(*v)).collect()
    }

    #[test]
    fn test_add_skip_delete() {
        let plan = reconcile(&ids(&["a", "b", "c"]), &ids(&["b", "c", "d"]));
        assert_eq!(plan.to_add, ids(&["d"]));
        assert_eq!(plan.to_skip, ids(&["b", "c"]));
        assert_eq!(plan.to_delete, ids(&["a"]));
        assert!(!plan.is_noop());
    }

    #[test]
    fn test_second_pass_is_noop() {
        let current = ids(&["b", "c", "d"]);
        let first = reconcile(&ids(&["a", "b", "c"]), &current);

        let persisted: BTreeSet<Identifier> =
            first.to_add.union(&first.to_skip).cloned().collect();
        let second = reconcile(&persisted, &current);

        assert!(second.to_add.is_empty());
        assert!(second.to_delete.is_empty());
        assert_eq!(second.to_skip, current);
        assert!(second.is_noop());
    }

    #[test]
    fn test_empty_snapshot_adds_everything() {
        let plan = reconcile(&BTreeSet::new(), &ids(&["a", "b"]));
        assert_eq!(plan.to_add, ids(&["a", "b"]));
        assert!(plan.to_skip.is_empty());
        assert!(plan.to_delete.is_empty());
    }

    proptest! {
        #[test]
        fn prop_plan_partitions_both_sets(
            previous in proptest::collection::btree_set("[a-e]{1,2}", 0..12),
            current in proptest::collection::btree_set("[a-e]{1,2}", 0..12),
        ) {
            let previous: BTreeSet<Identifier> =
                previous.iter().map(|v| Identifier::new(v.clone())).collect();
            let current: BTreeSet<Identifier> =
                current.iter().map(|v| Identifier::new(v.clone())).collect();
            let plan = reconcile(&previous, &current);

            let add_or_skip: BTreeSet<Identifier> =
                plan.to_add.union(&plan.to_skip).cloned().collect();
            let skip_or_delete: BTreeSet<Identifier> =
                plan.to_skip.union(&plan.to_delete).cloned().collect();

            prop_assert_eq!(add_or_skip, current);
            prop_assert_eq!(skip_or_delete, previous);
            prop_assert!(plan.to_add.is_disjoint(&plan.to_skip));
            prop_assert!(plan.to_add.is_disjoint(&plan.to_delete));
            prop_assert!(plan.to_skip.is_disjoint(&plan.to_delete));
        }
    }
}
