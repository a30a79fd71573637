//! Watershed seeding on thresholded affinities.
//!
//! Produces the initial oversegmentation: affinities at or below `low` are
//! cut, affinities at or above `high` force their voxel pair into one seed,
//! and every remaining voxel joins the basin of its steepest-ascent neighbor.
//! Components are relabeled densely `1..=N` in first-visit raster order, so
//! the labeling is reproducible for identical inputs.

use crate::engine::errors::MergeError;
use crate::volume::AffinityView;

/// Disjoint sets over voxel ordinals with path-halving and union-by-rank.
///
/// When ranks are equal the lower ordinal becomes the root, so the
/// representative of a set never depends on union order.
#[derive(Debug, Clone)]
struct UnionFind {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n as u32).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x as u32 {
            let grandparent = self.parent[self.parent[x] as usize];
            self.parent[x] = grandparent;
            x = grandparent as usize;
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        let (root, child) = match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Greater => (ra, rb),
            std::cmp::Ordering::Less => (rb, ra),
            std::cmp::Ordering::Equal => {
                let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
                self.rank[root] += 1;
                (root, child)
            }
        };
        self.parent[child] = root as u32;
    }
}

/// The six lattice directions in tie-break order: negative axes first.
const DIRECTIONS: [(usize, isize); 6] = [
    (0, -1), // -x, channel 0 at self
    (1, -1), // -y, channel 1 at self
    (2, -1), // -z, channel 2 at self
    (0, 1),  // +x, channel 0 at +x neighbor
    (1, 1),  // +y
    (2, 1),  // +z
];

/// Runs watershed over `aff`, writing seed ids into `labels` and returning
/// per-seed voxel counts (`sizes[0] == 0` for the unused background id).
///
/// Fails fast on invalid thresholds or a label buffer whose length does not
/// match the affinity shape; `labels`' prior contents are ignored.
pub fn watershed(
    aff: &AffinityView<'_>,
    low: f32,
    high: f32,
    labels: &mut [u64],
) -> Result<Vec<u64>, MergeError> {
    validate_thresholds(low, high)?;
    let n = aff.num_voxels();
    if labels.len() != n {
        return Err(MergeError::ShapeMismatch {
            what: "segmentation",
            expected: n,
            actual: labels.len(),
        });
    }

    let (w, h, d) = (aff.width(), aff.height(), aff.depth());
    let mut uf = UnionFind::new(n);

    // forced merges across high-affinity faces
    for x in 0..w {
        for y in 0..h {
            for z in 0..d {
                let idx = (x * h + y) * d + z;
                if x > 0 && aff.get(0, x, y, z) >= high {
                    uf.union(idx, idx - h * d);
                }
                if y > 0 && aff.get(1, x, y, z) >= high {
                    uf.union(idx, idx - d);
                }
                if z > 0 && aff.get(2, x, y, z) >= high {
                    uf.union(idx, idx - 1);
                }
            }
        }
    }

    // steepest-ascent: each voxel joins its strongest neighbor above `low`
    for x in 0..w {
        for y in 0..h {
            for z in 0..d {
                let idx = (x * h + y) * d + z;
                let mut best = low;
                let mut best_neighbor = None;
                for (c, sign) in DIRECTIONS {
                    let value = match (c, sign) {
                        (0, -1) if x > 0 => Some((aff.get(0, x, y, z), idx - h * d)),
                        (1, -1) if y > 0 => Some((aff.get(1, x, y, z), idx - d)),
                        (2, -1) if z > 0 => Some((aff.get(2, x, y, z), idx - 1)),
                        (0, 1) if x + 1 < w => Some((aff.get(0, x + 1, y, z), idx + h * d)),
                        (1, 1) if y + 1 < h => Some((aff.get(1, x, y + 1, z), idx + d)),
                        (2, 1) if z + 1 < d => Some((aff.get(2, x, y, z + 1), idx + 1)),
                        _ => None,
                    };
                    if let Some((a, neighbor)) = value {
                        // strictly greater keeps the earliest direction on ties
                        if a > best {
                            best = a;
                            best_neighbor = Some(neighbor);
                        }
                    }
                }
                if let Some(neighbor) = best_neighbor {
                    uf.union(idx, neighbor);
                }
            }
        }
    }

    // dense relabel in first-visit raster order
    let mut root_label = vec![0u64; n];
    let mut sizes = vec![0u64];
    for (idx, label) in labels.iter_mut().enumerate() {
        let root = uf.find(idx);
        if root_label[root] == 0 {
            sizes.push(0);
            root_label[root] = sizes.len() as u64 - 1;
        }
        let seed = root_label[root];
        *label = seed;
        sizes[seed as usize] += 1;
    }

    log::debug!(
        "watershed produced {} fragments over {} voxels",
        sizes.len() - 1,
        n
    );
    Ok(sizes)
}

/// Derives per-seed voxel counts from a pre-supplied segmentation, skipping
/// watershed. The maximum label defines the node range.
pub fn count_fragments(labels: &[u64]) -> Vec<u64> {
    let max = labels.iter().copied().max().unwrap_or(0);
    let mut sizes = vec![0u64; max as usize + 1];
    for &l in labels {
        sizes[l as usize] += 1;
    }
    sizes
}

fn validate_thresholds(low: f32, high: f32) -> Result<(), MergeError> {
    if !low.is_finite() || !high.is_finite() {
        return Err(MergeError::InvalidThreshold(
            "thresholds must be finite".into(),
        ));
    }
    if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) {
        return Err(MergeError::InvalidThreshold(format!(
            "thresholds must lie in [0, 1], got low={low}, high={high}"
        )));
    }
    if low > high {
        return Err(MergeError::InvalidThreshold(format!(
            "low threshold {low} exceeds high threshold {high}"
        )));
    }
    Ok(())
}
