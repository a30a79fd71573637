//! # Merge Visitors
//!
//! A visitor observes every event of a merge run: queue pops, deleted and
//! stale entries, candidate validation, and performed merges. All methods
//! default to no-ops, so a visitor implements only the capabilities it needs.
//!
//! Two stock visitors cover the common cases: [`HistoryVisitor`] records the
//! ordered merge history, and [`ConstrainedVisitor`] layers an
//! [`UnmergeTracker`] over any inner visitor.

use crate::engine::graph::{EdgeId, SegId};
use crate::engine::unmerge::UnmergeTracker;

/// One performed merge: regions `a` and `b` became `survivor` at `score`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Merge {
    pub a: SegId,
    pub b: SegId,
    pub survivor: SegId,
    pub score: f32,
}

/// Capability set invoked by the merge engine.
///
/// Stale and deleted pops are expected outcomes of the lazy queue discipline,
/// not errors; they are surfaced here for observability.
pub trait MergeVisitor {
    /// An entry was popped from the queue.
    fn on_pop(&mut self, _edge: EdgeId, _score: f32) {}

    /// The popped entry referenced an edge deleted by an earlier merge.
    fn on_deleted_edge(&mut self, _edge: EdgeId) {}

    /// The popped snapshot no longer matches the edge's current score.
    fn on_stale_edge(&mut self, _edge: EdgeId, _popped: f32, _current: f32) {}

    /// Whether merging the live regions `a` and `b` is allowed. Returning
    /// `false` deletes the edge so the pair is never retried.
    fn is_valid_merge(&mut self, _a: SegId, _b: SegId) -> bool {
        true
    }

    /// Regions `a` and `b` were merged into `survivor` at `score`.
    fn on_merge(&mut self, _a: SegId, _b: SegId, _survivor: SegId, _score: f32) {}
}

/// Visitor that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVisitor;

impl MergeVisitor for NoopVisitor {}

/// Appends every performed merge to an ordered history.
#[derive(Debug, Default, Clone)]
pub struct HistoryVisitor {
    history: Vec<Merge>,
}

impl HistoryVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The merges recorded so far, in execution order.
    pub fn history(&self) -> &[Merge] {
        &self.history
    }

    /// Consumes the visitor, returning the recorded history.
    pub fn into_history(self) -> Vec<Merge> {
        self.history
    }
}

impl MergeVisitor for HistoryVisitor {
    fn on_merge(&mut self, a: SegId, b: SegId, survivor: SegId, score: f32) {
        self.history.push(Merge {
            a,
            b,
            survivor,
            score,
        });
    }
}

/// Wraps an inner visitor and delegates merge validation and membership
/// propagation to an [`UnmergeTracker`].
///
/// The tracker is borrowed, not owned: it outlives the run so that group
/// membership accumulated by earlier `merge_until` calls is still in force
/// when a run resumes with a higher threshold.
#[derive(Debug)]
pub struct ConstrainedVisitor<'a, V> {
    inner: V,
    tracker: &'a mut UnmergeTracker,
}

impl<'a, V: MergeVisitor> ConstrainedVisitor<'a, V> {
    pub fn new(inner: V, tracker: &'a mut UnmergeTracker) -> Self {
        ConstrainedVisitor { inner, tracker }
    }

    /// Unwraps the inner visitor.
    pub fn into_inner(self) -> V {
        self.inner
    }
}

impl<V: MergeVisitor> MergeVisitor for ConstrainedVisitor<'_, V> {
    fn on_pop(&mut self, edge: EdgeId, score: f32) {
        self.inner.on_pop(edge, score);
    }

    fn on_deleted_edge(&mut self, edge: EdgeId) {
        self.inner.on_deleted_edge(edge);
    }

    fn on_stale_edge(&mut self, edge: EdgeId, popped: f32, current: f32) {
        self.inner.on_stale_edge(edge, popped, current);
    }

    fn is_valid_merge(&mut self, a: SegId, b: SegId) -> bool {
        self.tracker.is_valid_merge(a, b) && self.inner.is_valid_merge(a, b)
    }

    fn on_merge(&mut self, a: SegId, b: SegId, survivor: SegId, score: f32) {
        self.tracker.on_merge(a, b, survivor);
        self.inner.on_merge(a, b, survivor, score);
    }
}
