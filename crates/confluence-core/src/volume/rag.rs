//! Initial region-graph construction.
//!
//! One sweep over the three axis-neighbor pair sets of the volume: every
//! voxel face whose two sides carry distinct nonzero seed ids routes its
//! affinity into the edge between those seeds, creating the edge on first
//! contact. The sweep order is fixed (channel-major, raster within each
//! channel), so edge ids and initial statistics are reproducible.

use crate::engine::errors::MergeError;
use crate::engine::graph::{RegionGraph, SegId};
use crate::engine::statistics::StatisticsProvider;
use crate::volume::{AffinityView, VolumeView};

/// Builds the region graph over seeds `1..=num_nodes` and accumulates every
/// interfacial affinity into the statistics provider.
///
/// Seed ids above `num_nodes` fail fast; background voxels (id 0) contribute
/// no edges.
pub fn build_region_graph<S: StatisticsProvider>(
    aff: &AffinityView<'_>,
    seg: &VolumeView<'_, u64>,
    num_nodes: u64,
    provider: &mut S,
) -> Result<RegionGraph, MergeError> {
    if seg.width() != aff.width() || seg.height() != aff.height() || seg.depth() != aff.depth() {
        return Err(MergeError::ShapeMismatch {
            what: "segmentation",
            expected: aff.num_voxels(),
            actual: seg.width() * seg.height() * seg.depth(),
        });
    }

    let mut graph = RegionGraph::new(num_nodes);
    let (w, h, d) = (seg.width(), seg.height(), seg.depth());

    let mut touch = |a: u64, b: u64, affinity: f32| -> Result<(), MergeError> {
        if a == b || a == 0 || b == 0 {
            return Ok(());
        }
        if a > num_nodes || b > num_nodes {
            return Err(MergeError::SeedOutOfRange {
                id: a.max(b),
                max: num_nodes,
            });
        }
        let (u, v) = (SegId(a), SegId(b));
        let e = match graph.edge_between(u, v) {
            Some(e) => e,
            None => graph.add_edge(u, v),
        };
        provider.record(e, affinity);
        Ok(())
    };

    for x in 0..w {
        for y in 0..h {
            for z in 0..d {
                let here = seg.get(x, y, z);
                if x > 0 {
                    touch(here, seg.get(x - 1, y, z), aff.get(0, x, y, z))?;
                }
                if y > 0 {
                    touch(here, seg.get(x, y - 1, z), aff.get(1, x, y, z))?;
                }
                if z > 0 {
                    touch(here, seg.get(x, y, z - 1), aff.get(2, x, y, z))?;
                }
            }
        }
    }

    log::debug!(
        "region graph: {} nodes, {} edges",
        graph.num_nodes(),
        graph.num_live_edges()
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::statistics::MeanAffinity;

    #[test]
    fn two_seed_interface_collects_both_faces() {
        // 2x2x1, left column seed 1, right column seed 2: two x-faces
        let seg_data = vec![1u64, 1, 2, 2];
        let seg = VolumeView::from_slice(2, 2, 1, &seg_data).unwrap();
        let mut aff_data = vec![0.0f32; 3 * 4];
        // channel 0 faces at x=1: (1,0,0) and (1,1,0)
        aff_data[(0 * 2 + 1) * 2 * 1 + 0] = 0.3;
        aff_data[(0 * 2 + 1) * 2 * 1 + 1] = 0.5;
        let aff = AffinityView::from_slice(2, 2, 1, &aff_data).unwrap();

        let mut provider = MeanAffinity::new();
        let graph = build_region_graph(&aff, &seg, 2, &mut provider).unwrap();
        assert_eq!(graph.num_live_edges(), 1);
        let e = graph.edge_between(SegId(1), SegId(2)).unwrap();
        assert!((provider.value(e) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn background_contributes_no_edges() {
        let seg_data = vec![0u64, 1];
        let seg = VolumeView::from_slice(2, 1, 1, &seg_data).unwrap();
        let aff_data = vec![0.9f32; 3 * 2];
        let aff = AffinityView::from_slice(2, 1, 1, &aff_data).unwrap();
        let mut provider = MeanAffinity::new();
        let graph = build_region_graph(&aff, &seg, 1, &mut provider).unwrap();
        assert_eq!(graph.num_live_edges(), 0);
    }

    #[test]
    fn seed_over_declared_range_fails_fast() {
        let seg_data = vec![1u64, 5];
        let seg = VolumeView::from_slice(2, 1, 1, &seg_data).unwrap();
        let aff_data = vec![0.5f32; 3 * 2];
        let aff = AffinityView::from_slice(2, 1, 1, &aff_data).unwrap();
        let mut provider = MeanAffinity::new();
        let err = build_region_graph(&aff, &seg, 3, &mut provider);
        assert!(matches!(
            err,
            Err(MergeError::SeedOutOfRange { id: 5, max: 3 })
        ));
    }

    #[test]
    fn shape_mismatch_fails_fast() {
        let seg_data = vec![1u64, 2];
        let seg = VolumeView::from_slice(2, 1, 1, &seg_data).unwrap();
        let aff_data = vec![0.5f32; 3 * 4];
        let aff = AffinityView::from_slice(2, 2, 1, &aff_data).unwrap();
        let mut provider = MeanAffinity::new();
        assert!(build_region_graph(&aff, &seg, 2, &mut provider).is_err());
    }
}
