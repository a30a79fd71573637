//! # Region Adjacency Graph
//!
//! This module implements the dynamically merged region graph at the heart of
//! the agglomeration engine.
//!
//! ## Key Components
//!
//! - **SegId / EdgeId**: dense integer handles for regions and edge slots
//! - **RegionGraph**: node set, incidence structure, and the parent-link
//!   forest that records which live region absorbed each dead one
//!
//! ## Design
//!
//! Merging is the hot path. `merge_nodes` redirects the loser's incidence in
//! place instead of re-keying the whole structure, combines parallel edges
//! through a caller-supplied hook so the statistics provider can fold their
//! accumulators together, and deletes the self-loop between the two merged
//! regions. `resolve` walks parent links with path halving, so extracting the
//! final segmentation is near-linear in voxel count.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Maximum size for inline storage of per-node incidence lists.
const INLINE_EDGES: usize = 8;

/// A unique identifier for a region (seed / fragment).
///
/// Region ids are dense in `[1, N]`; id `0` is reserved for background and
/// never participates in the graph. SegId implements Ord/PartialOrd for
/// stable, deterministic iteration and survivor selection.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegId(pub u64);

impl SegId {
    /// The reserved background / unassigned id.
    pub const BACKGROUND: SegId = SegId(0);

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A unique identifier for an edge slot.
///
/// Edge slots are allocated once during construction and never reused; a slot
/// whose edge has been deleted by a merge stays dead forever.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeId(pub u32);

impl EdgeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One edge slot: current endpoints plus a deletion flag.
#[derive(Debug, Clone, Copy)]
struct EdgeSlot {
    u: SegId,
    v: SegId,
    deleted: bool,
}

/// Normalized pair key for the parallel-edge index.
#[inline]
fn pair_key(a: SegId, b: SegId) -> (u64, u64) {
    if a.0 < b.0 {
        (a.0, b.0)
    } else {
        (b.0, a.0)
    }
}

/// The region adjacency graph.
///
/// Nodes are created once at construction and die by merging; edges are
/// created during region-graph extraction and die by redirection, combination
/// or self-loop removal. The structure maintains three indexes:
///
/// - `incidence`: per live node, the live edges touching it
/// - `pair_index`: normalized `(u, v)` pair to live edge slot
/// - `parent`: forest of parent links with live roots
#[derive(Debug, Clone)]
pub struct RegionGraph {
    /// Parent link per id; `parent[i] == i` iff node `i` is live.
    parent: Vec<u64>,
    /// Live edges incident to each live node. Dead nodes have empty lists.
    incidence: Vec<SmallVec<[EdgeId; INLINE_EDGES]>>,
    /// Normalized endpoint pair to live edge slot.
    pair_index: FxHashMap<(u64, u64), EdgeId>,
    edges: Vec<EdgeSlot>,
    num_live_edges: usize,
}

impl RegionGraph {
    /// Creates a graph over region ids `1..=num_nodes`, all live, no edges.
    pub fn new(num_nodes: u64) -> Self {
        let slots = num_nodes as usize + 1;
        RegionGraph {
            parent: (0..slots as u64).collect(),
            incidence: vec![SmallVec::new(); slots],
            pair_index: FxHashMap::default(),
            edges: Vec::new(),
            num_live_edges: 0,
        }
    }

    /// Highest region id (regions are `1..=num_nodes`).
    pub fn num_nodes(&self) -> u64 {
        self.parent.len() as u64 - 1
    }

    /// Total number of edge slots ever allocated, dead ones included.
    pub fn num_edge_slots(&self) -> usize {
        self.edges.len()
    }

    /// Number of currently live edges.
    pub fn num_live_edges(&self) -> usize {
        self.num_live_edges
    }

    /// Whether `id` is a live region (has not been absorbed by a merge).
    #[inline]
    pub fn is_live(&self, id: SegId) -> bool {
        self.parent[id.index()] == id.0
    }

    /// Whether the edge slot has been deleted.
    #[inline]
    pub fn is_deleted(&self, e: EdgeId) -> bool {
        self.edges[e.index()].deleted
    }

    /// Current endpoints of an edge slot (normalized, smaller id first).
    #[inline]
    pub fn endpoints(&self, e: EdgeId) -> (SegId, SegId) {
        let slot = &self.edges[e.index()];
        (slot.u, slot.v)
    }

    /// Returns the live edge between `u` and `v`, if any.
    pub fn edge_between(&self, u: SegId, v: SegId) -> Option<EdgeId> {
        self.pair_index.get(&pair_key(u, v)).copied()
    }

    /// Adds an edge between two distinct live regions.
    ///
    /// Preconditions (debug-asserted): `u != v`, both endpoints live, and no
    /// edge between them yet. Region-graph construction guarantees these by
    /// probing [`edge_between`](Self::edge_between) first.
    pub fn add_edge(&mut self, u: SegId, v: SegId) -> EdgeId {
        debug_assert_ne!(u, v, "self-loops are not allowed");
        debug_assert!(self.is_live(u) && self.is_live(v));
        debug_assert!(self.edge_between(u, v).is_none(), "duplicate edge");

        let (u, v) = if u.0 < v.0 { (u, v) } else { (v, u) };
        let e = EdgeId(self.edges.len() as u32);
        self.edges.push(EdgeSlot {
            u,
            v,
            deleted: false,
        });
        self.incidence[u.index()].push(e);
        self.incidence[v.index()].push(e);
        self.pair_index.insert(pair_key(u, v), e);
        self.num_live_edges += 1;
        e
    }

    /// Live edges incident to a node, in insertion/redirection order.
    #[inline]
    pub fn incident(&self, n: SegId) -> &[EdgeId] {
        &self.incidence[n.index()]
    }

    /// All live edges, in ascending slot order.
    pub fn live_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.deleted)
            .map(|(i, _)| EdgeId(i as u32))
    }

    /// Resolves an id to its live root, compressing the walked path.
    ///
    /// Uses iterative path halving: each visited node is pointed at its
    /// grandparent, so repeated resolution over a merge forest stays near
    /// constant time per call.
    pub fn resolve(&mut self, id: SegId) -> SegId {
        let mut x = id.index();
        while self.parent[x] != x as u64 {
            let grandparent = self.parent[self.parent[x] as usize];
            self.parent[x] = grandparent;
            x = grandparent as usize;
        }
        SegId(x as u64)
    }

    /// Deletes a live edge, detaching it from both endpoints.
    pub fn delete_edge(&mut self, e: EdgeId) {
        let slot = self.edges[e.index()];
        debug_assert!(!slot.deleted);
        self.pair_index.remove(&pair_key(slot.u, slot.v));
        self.incidence[slot.u.index()].retain(|&mut x| x != e);
        self.incidence[slot.v.index()].retain(|&mut x| x != e);
        self.edges[e.index()].deleted = true;
        self.num_live_edges -= 1;
    }

    /// Merges two live regions and returns the survivor (the smaller id).
    ///
    /// The loser's incidence is reassigned in place: a `(loser, w)` edge is
    /// redirected to `(survivor, w)` unless a parallel `(survivor, w)` edge
    /// already exists, in which case `combine(kept, absorbed)` is invoked so
    /// the statistics provider can fold the two accumulators, and the
    /// absorbed slot is deleted. Any direct `(survivor, loser)` edge becomes
    /// a self-loop and is deleted. Finally the loser's parent link is set to
    /// the survivor.
    pub fn merge_nodes(
        &mut self,
        u: SegId,
        v: SegId,
        combine: &mut dyn FnMut(EdgeId, EdgeId),
    ) -> SegId {
        debug_assert_ne!(u, v);
        debug_assert!(self.is_live(u) && self.is_live(v));

        let (survivor, loser) = if u.0 < v.0 { (u, v) } else { (v, u) };

        let loser_edges = std::mem::take(&mut self.incidence[loser.index()]);
        for e in loser_edges {
            let slot = self.edges[e.index()];
            debug_assert!(!slot.deleted);
            let w = if slot.u == loser { slot.v } else { slot.u };
            self.pair_index.remove(&pair_key(loser, w));

            if w == survivor {
                // would become a self-loop
                self.incidence[survivor.index()].retain(|&mut x| x != e);
                self.edges[e.index()].deleted = true;
                self.num_live_edges -= 1;
            } else if let Some(&kept) = self.pair_index.get(&pair_key(survivor, w)) {
                combine(kept, e);
                self.incidence[w.index()].retain(|&mut x| x != e);
                self.edges[e.index()].deleted = true;
                self.num_live_edges -= 1;
            } else {
                let slot = &mut self.edges[e.index()];
                if slot.u == loser {
                    slot.u = survivor;
                } else {
                    slot.v = survivor;
                }
                if slot.u.0 > slot.v.0 {
                    std::mem::swap(&mut slot.u, &mut slot.v);
                }
                self.pair_index.insert(pair_key(survivor, w), e);
                self.incidence[survivor.index()].push(e);
            }
        }

        self.parent[loser.index()] = survivor.0;

        #[cfg(debug_assertions)]
        self.check_invariants();

        survivor
    }

    /// Resolves every id once and returns the lookup table `id -> live root`.
    ///
    /// Index 0 maps to 0 so background voxels pass through unchanged.
    pub fn root_lookup(&mut self) -> Vec<u64> {
        let n = self.parent.len();
        let mut lookup = Vec::with_capacity(n);
        for i in 0..n {
            lookup.push(self.resolve(SegId(i as u64)).0);
        }
        lookup
    }

    /// Checks the structural invariants; compiled only into debug builds.
    ///
    /// - incidence lists contain exactly the live edges with that endpoint
    /// - no duplicate edge between the same live pair, no self-loops
    /// - parent links form a forest with live roots
    #[cfg(debug_assertions)]
    pub fn check_invariants(&self) {
        let mut live_count = 0;
        for (i, slot) in self.edges.iter().enumerate() {
            if slot.deleted {
                continue;
            }
            live_count += 1;
            let e = EdgeId(i as u32);
            assert_ne!(slot.u, slot.v, "self-loop survived a merge");
            assert!(self.is_live(slot.u) && self.is_live(slot.v));
            assert_eq!(self.pair_index.get(&pair_key(slot.u, slot.v)), Some(&e));
            assert!(self.incidence[slot.u.index()].contains(&e));
            assert!(self.incidence[slot.v.index()].contains(&e));
        }
        assert_eq!(live_count, self.num_live_edges);
        for (node, list) in self.incidence.iter().enumerate() {
            for e in list {
                let slot = &self.edges[e.index()];
                assert!(!slot.deleted, "dead edge left in an incidence list");
                assert!(slot.u.index() == node || slot.v.index() == node);
            }
        }
    }
}
