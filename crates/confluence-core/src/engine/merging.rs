//! # Iterative Region Merging
//!
//! The serial best-first merge loop. Every iteration pops the cheapest queue
//! entry, filters deleted and stale snapshots, checks the threshold, asks the
//! visitor whether the candidate pair may merge, performs the merge, and
//! rescores the survivor's incidence.
//!
//! ## Queue discipline
//!
//! The queue holds one entry per live edge plus any number of stale
//! duplicates. Entries are pushed on construction and whenever a rescore
//! *improves* (lowers) an edge's score; a worsened edge keeps its old entries,
//! which pop early, are detected as stale, and are re-pushed at the current
//! score. Merges are only ever performed from an entry whose snapshot equals
//! the current score, so quality never depends on queue hygiene.
//!
//! ## Termination and resumption
//!
//! A run ends when the queue drains or the best live score exceeds the
//! threshold; in the latter case the popped entry is pushed back, so a later
//! call with a larger threshold resumes exactly where the previous one
//! stopped.

use log::debug;

use crate::engine::graph::{EdgeId, RegionGraph, SegId};
use crate::engine::queue::MergeQueue;
use crate::engine::scoring::ScoringFunction;
use crate::engine::statistics::StatisticsProvider;
use crate::engine::visitor::MergeVisitor;

/// A live edge with a freshly computed score, as exported by
/// [`IterativeRegionMerging::extract_region_graph`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScoredEdge {
    pub u: SegId,
    pub v: SegId,
    pub score: f32,
}

/// The merge engine. Owns the region graph, the statistics provider, the
/// scoring function and the queue for its whole lifetime.
#[derive(Debug)]
pub struct IterativeRegionMerging<S, F, Q> {
    graph: RegionGraph,
    provider: S,
    scoring: F,
    queue: Q,
    /// Current score per edge slot; the cache the queue snapshots are
    /// validated against.
    scores: Vec<f32>,
    merges_performed: u64,
}

impl<S, F, Q> IterativeRegionMerging<S, F, Q>
where
    S: StatisticsProvider,
    F: ScoringFunction,
    Q: MergeQueue,
{
    /// Builds the engine over a constructed region graph and seeds the queue
    /// with every live edge, in ascending edge-slot order.
    pub fn new(graph: RegionGraph, provider: S, scoring: F, mut queue: Q) -> Self {
        let mut scores = vec![0.0f32; graph.num_edge_slots()];
        for e in graph.live_edges() {
            let score = scoring.score(provider.value(e));
            scores[e.index()] = score;
            queue.push(score, e);
        }
        debug!(
            "seeded merge queue with {} edges over {} regions",
            graph.num_live_edges(),
            graph.num_nodes()
        );
        IterativeRegionMerging {
            graph,
            provider,
            scoring,
            queue,
            scores,
            merges_performed: 0,
        }
    }

    /// The underlying region graph.
    pub fn graph(&self) -> &RegionGraph {
        &self.graph
    }

    /// The statistics provider.
    pub fn provider(&self) -> &S {
        &self.provider
    }

    /// Total merges performed over the engine's lifetime.
    pub fn merges_performed(&self) -> u64 {
        self.merges_performed
    }

    /// Current score of a live edge.
    pub fn current_score(&self, e: EdgeId) -> f32 {
        self.scores[e.index()]
    }

    /// Merges best-first until the queue drains or the best live edge scores
    /// above `threshold`. Returns the number of merges performed by this
    /// call.
    ///
    /// Stale and deleted entries are reported to the visitor and consumed
    /// without effect. A candidate rejected by `visitor.is_valid_merge` has
    /// its edge deleted so the pair is never offered again.
    pub fn merge_until<V: MergeVisitor>(&mut self, threshold: f32, visitor: &mut V) -> u64 {
        debug!("merging until threshold {threshold}");
        let mut merged = 0u64;

        while let Some((snapshot, e)) = self.queue.pop() {
            visitor.on_pop(e, snapshot);

            if self.graph.is_deleted(e) {
                visitor.on_deleted_edge(e);
                continue;
            }

            let current = self.scores[e.index()];
            if current != snapshot {
                visitor.on_stale_edge(e, snapshot, current);
                self.queue.push(current, e);
                continue;
            }

            if current > threshold {
                // best remaining edge is worse than the limit; leave the
                // entry for a future continuation
                self.queue.push(current, e);
                break;
            }

            let (a, b) = self.graph.endpoints(e);
            let u = self.graph.resolve(a);
            let v = self.graph.resolve(b);
            if u == v {
                // already merged transitively
                self.graph.delete_edge(e);
                continue;
            }

            if !visitor.is_valid_merge(u, v) {
                self.graph.delete_edge(e);
                continue;
            }

            let provider = &mut self.provider;
            let survivor = self
                .graph
                .merge_nodes(u, v, &mut |kept, absorbed| provider.combine(kept, absorbed));

            for &ie in self.graph.incident(survivor) {
                let score = self.scoring.score(self.provider.value(ie));
                let old = self.scores[ie.index()];
                self.scores[ie.index()] = score;
                if score < old {
                    self.queue.push(score, ie);
                }
            }

            visitor.on_merge(u, v, survivor, current);
            merged += 1;
        }

        self.merges_performed += merged;
        debug!("performed {merged} merges");
        merged
    }

    /// Remaps a seed labeling in place through the parent-link forest.
    ///
    /// One `resolve` per region id, then an O(V) sweep over the voxels.
    pub fn extract_segmentation(&mut self, labels: &mut [u64]) {
        let lookup = self.graph.root_lookup();

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            labels.par_iter_mut().for_each(|l| *l = lookup[*l as usize]);
        }
        #[cfg(not(feature = "parallel"))]
        for l in labels.iter_mut() {
            *l = lookup[*l as usize];
        }
    }

    /// Exports the current live edge set with freshly computed scores, in
    /// ascending edge-slot order.
    pub fn extract_region_graph(&self) -> Vec<ScoredEdge> {
        self.graph
            .live_edges()
            .map(|e| {
                let (u, v) = self.graph.endpoints(e);
                ScoredEdge {
                    u,
                    v,
                    score: self.scoring.score(self.provider.value(e)),
                }
            })
            .collect()
    }
}
