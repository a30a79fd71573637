//! # Anti-Merge Constraint Tracking
//!
//! Callers may forbid certain seed regions from ever ending up in the same
//! merged region. Constraints arrive as *anti-group tuples*: each tuple lists
//! two or more *coherent groups* of seed ids; seeds inside one coherent group
//! may stay together, but groups of the same tuple are mutually exclusive.
//!
//! The tracker keeps two maps: seed id to the group ids it belongs to, and
//! group id to its mutual-exclusion partners. Group membership is propagated
//! onto the survivor at every merge, so transitive merges cannot smuggle two
//! anti-groups into one region. A tracker built from an empty list
//! short-circuits both operations.

use rustc_hash::FxHashMap;

use crate::engine::errors::MergeError;
use crate::engine::graph::SegId;

/// Anti-merge tuples as supplied by the caller: each tuple is a list of
/// coherent seed-id lists.
pub type UnmergeList = Vec<Vec<Vec<u64>>>;

/// Tracks mutual-exclusion constraints across transitive merges.
#[derive(Debug, Default, Clone)]
pub struct UnmergeTracker {
    /// Seed id to the ids of every group it participates in.
    seg_to_groups: FxHashMap<u64, Vec<u64>>,
    /// Group id to the group ids it must never co-reside with.
    group_to_antis: FxHashMap<u64, Vec<u64>>,
    empty: bool,
}

impl UnmergeTracker {
    /// Builds a tracker from anti-group tuples.
    ///
    /// The id of each coherent group is its first seed id. `max_seed` bounds
    /// the valid id range; ids beyond it are rejected. Empty coherent groups
    /// are rejected as malformed.
    pub fn new(list: &UnmergeList, max_seed: u64) -> Result<Self, MergeError> {
        if list.is_empty() {
            return Ok(UnmergeTracker {
                empty: true,
                ..Default::default()
            });
        }

        let mut tracker = UnmergeTracker::default();
        for tuple in list {
            let mut mutex_group_ids = Vec::with_capacity(tuple.len());
            for seeds in tuple {
                let Some(&group_id) = seeds.first() else {
                    return Err(MergeError::Internal(
                        "empty coherent group in unmerge list".into(),
                    ));
                };
                mutex_group_ids.push(group_id);
                for &seed in seeds {
                    if seed == 0 || seed > max_seed {
                        return Err(MergeError::SeedOutOfRange {
                            id: seed,
                            max: max_seed,
                        });
                    }
                    tracker.seg_to_groups.entry(seed).or_default().push(group_id);
                }
            }

            // within one tuple, every pair of groups is mutually exclusive
            for &group in &mutex_group_ids {
                let antis = tracker.group_to_antis.entry(group).or_default();
                antis.extend(mutex_group_ids.iter().filter(|&&g| g != group));
            }
        }
        Ok(tracker)
    }

    /// Whether no constraints were supplied.
    pub fn is_unconstrained(&self) -> bool {
        self.empty
    }

    /// Whether merging the live regions `a` and `b` would put two mutually
    /// exclusive groups into one region.
    pub fn is_valid_merge(&self, a: SegId, b: SegId) -> bool {
        if self.empty {
            return true;
        }
        let Some(groups_a) = self.seg_to_groups.get(&a.0) else {
            return true;
        };
        let Some(groups_b) = self.seg_to_groups.get(&b.0) else {
            return true;
        };
        for group_a in groups_a {
            let Some(antis) = self.group_to_antis.get(group_a) else {
                continue;
            };
            for group_b in groups_b {
                if antis.contains(group_b) {
                    return false;
                }
            }
        }
        true
    }

    /// Unions the group memberships of `a` and `b` onto the survivor.
    ///
    /// Duplicate group ids are allowed; the validity check stays correct.
    pub fn on_merge(&mut self, a: SegId, b: SegId, survivor: SegId) {
        if self.empty {
            return;
        }
        debug_assert!(survivor == a || survivor == b);

        let mut groups = self.seg_to_groups.get(&a.0).cloned().unwrap_or_default();
        if let Some(groups_b) = self.seg_to_groups.get(&b.0) {
            groups.extend_from_slice(groups_b);
        }
        if !groups.is_empty() {
            self.seg_to_groups.insert(survivor.0, groups);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(list: UnmergeList) -> UnmergeTracker {
        UnmergeTracker::new(&list, 100).unwrap()
    }

    #[test]
    fn empty_list_short_circuits() {
        let t = tracker(vec![]);
        assert!(t.is_unconstrained());
        assert!(t.is_valid_merge(SegId(1), SegId(2)));
    }

    #[test]
    fn groups_of_same_tuple_are_mutually_exclusive() {
        let t = tracker(vec![vec![vec![1, 2], vec![3, 4]]]);
        assert!(!t.is_valid_merge(SegId(1), SegId(3)));
        assert!(!t.is_valid_merge(SegId(4), SegId(2)));
        // within a coherent group merging is fine
        assert!(t.is_valid_merge(SegId(1), SegId(2)));
        // unconstrained seeds are fine
        assert!(t.is_valid_merge(SegId(1), SegId(50)));
    }

    #[test]
    fn membership_propagates_through_merges() {
        let mut t = tracker(vec![vec![vec![3], vec![4]]]);
        // 1 is unconstrained until it absorbs 3
        assert!(t.is_valid_merge(SegId(1), SegId(4)));
        t.on_merge(SegId(1), SegId(3), SegId(1));
        assert!(!t.is_valid_merge(SegId(1), SegId(4)));

        // and transitively: 4's groups flow onto 2, which now clashes with 1
        t.on_merge(SegId(2), SegId(4), SegId(2));
        assert!(!t.is_valid_merge(SegId(1), SegId(2)));
    }

    #[test]
    fn seed_in_multiple_tuples() {
        let t = tracker(vec![
            vec![vec![1], vec![2]],
            vec![vec![1, 7], vec![9]],
        ]);
        assert!(!t.is_valid_merge(SegId(1), SegId(2)));
        assert!(!t.is_valid_merge(SegId(7), SegId(9)));
        assert!(t.is_valid_merge(SegId(2), SegId(9)));
    }

    #[test]
    fn out_of_range_seed_is_rejected() {
        let err = UnmergeTracker::new(&vec![vec![vec![1], vec![200]]], 100);
        assert!(matches!(
            err,
            Err(MergeError::SeedOutOfRange { id: 200, max: 100 })
        ));
    }
}
