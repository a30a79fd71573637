//! High-level agglomeration sessions.
//!
//! [`Agglomerator`] wires the collaborators together: watershed seeding (or
//! size-counting over a pre-supplied segmentation), region-graph
//! construction, a statistics provider, a scoring function, a queue, and the
//! merge engine, plus the anti-merge tracker and optional ground-truth
//! evaluation. Components are selected at initialization time through
//! [`AgglomerationConfig`]; nothing degrades or switches dynamically during a
//! run.
//!
//! The agglomerator takes owned values and returns owned values; handle
//! registries for non-native callers live in the binding layer, not here.

use log::info;

use crate::engine::errors::MergeError;
use crate::engine::merging::{IterativeRegionMerging, ScoredEdge};
use crate::engine::queue::{BinQueue, BinaryQueue, MergeQueue};
use crate::engine::scoring::{IdentityValue, OneMinusValue, ScoringFunction};
use crate::engine::statistics::{
    HistogramQuantile, MaxAffinity, MeanAffinity, StatisticsProvider, VectorQuantile,
    DEFAULT_HISTOGRAM_BINS,
};
use crate::engine::unmerge::{UnmergeList, UnmergeTracker};
use crate::engine::visitor::{ConstrainedVisitor, HistoryVisitor, Merge};
use crate::metrics::{compare_volumes, EvaluationReport};
use crate::volume::rag::build_region_graph;
use crate::volume::watershed::{count_fragments, watershed};
use crate::volume::{AffinityView, VolumeView};

/// Default low affinity threshold for watershed seeding.
pub const DEFAULT_AFF_LOW: f32 = 0.0001;
/// Default high affinity threshold for watershed seeding.
pub const DEFAULT_AFF_HIGH: f32 = 0.9999;

/// Which per-edge statistic the provider accumulates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatisticKind {
    /// Maximum interfacial affinity.
    Max,
    /// Count-weighted mean affinity.
    Mean,
    /// Histogram-backed quantile: bounded memory, bin-width error.
    HistogramQuantile { quantile: f32, bins: usize },
    /// Vector-backed exact quantile. Preferred when memory permits.
    VectorQuantile { quantile: f32 },
}

/// Which queue realization backs the merge loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QueueKind {
    /// Exact binary heap.
    Binary,
    /// Binning queue over the unit score range.
    Bin { bins: usize },
}

/// Which statistic-to-score mapping drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScoringKind {
    /// `score = 1 - statistic` (merge strong affinities first).
    OneMinus,
    /// `score = statistic` (statistic is already a merge cost).
    Identity,
}

/// Initialization-time configuration of an agglomeration session.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgglomerationConfig {
    /// Watershed cut threshold: affinities at or below are never followed.
    pub aff_low: f32,
    /// Watershed merge threshold: affinities at or above force one seed.
    pub aff_high: f32,
    /// Run watershed; `false` trusts the supplied segmentation as-is.
    pub find_fragments: bool,
    pub statistic: StatisticKind,
    pub scoring: ScoringKind,
    pub queue: QueueKind,
}

impl Default for AgglomerationConfig {
    fn default() -> Self {
        AgglomerationConfig {
            aff_low: DEFAULT_AFF_LOW,
            aff_high: DEFAULT_AFF_HIGH,
            find_fragments: true,
            statistic: StatisticKind::VectorQuantile { quantile: 0.5 },
            scoring: ScoringKind::OneMinus,
            queue: QueueKind::Binary,
        }
    }
}

type DynProvider = Box<dyn StatisticsProvider + Send>;
type DynScoring = Box<dyn ScoringFunction + Send>;
type DynQueue = Box<dyn MergeQueue + Send>;

fn make_provider(kind: StatisticKind) -> DynProvider {
    match kind {
        StatisticKind::Max => Box::new(MaxAffinity::new()),
        StatisticKind::Mean => Box::new(MeanAffinity::new()),
        StatisticKind::HistogramQuantile { quantile, bins } => {
            let bins = if bins == 0 { DEFAULT_HISTOGRAM_BINS } else { bins };
            Box::new(HistogramQuantile::new(quantile, bins))
        }
        StatisticKind::VectorQuantile { quantile } => Box::new(VectorQuantile::new(quantile)),
    }
}

fn make_scoring(kind: ScoringKind) -> DynScoring {
    match kind {
        ScoringKind::OneMinus => Box::new(OneMinusValue),
        ScoringKind::Identity => Box::new(IdentityValue),
    }
}

fn make_queue(kind: QueueKind) -> DynQueue {
    match kind {
        QueueKind::Binary => Box::new(BinaryQueue::new()),
        QueueKind::Bin { bins } => Box::new(BinQueue::unit(bins.max(1))),
    }
}

/// An owned agglomeration session: seeded graph, engine state, label volume,
/// anti-merge tracker and (optionally) ground truth.
pub struct Agglomerator {
    engine: IterativeRegionMerging<DynProvider, DynScoring, DynQueue>,
    labels: Vec<u64>,
    width: usize,
    height: usize,
    depth: usize,
    sizes: Vec<u64>,
    ground_truth: Option<Vec<u32>>,
    tracker: UnmergeTracker,
    metrics: Option<EvaluationReport>,
}

impl Agglomerator {
    /// Seeds a session from an affinity volume.
    ///
    /// `segmentation` is the label buffer: when `config.find_fragments` is
    /// set its prior contents are ignored and watershed fills it; otherwise
    /// it is taken as the seed labeling and only counted. All inputs are
    /// validated up front; on error no session state exists.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize(
        width: usize,
        height: usize,
        depth: usize,
        affinities: &[f32],
        mut segmentation: Vec<u64>,
        ground_truth: Option<Vec<u32>>,
        unmerge_list: &UnmergeList,
        config: &AgglomerationConfig,
    ) -> Result<Self, MergeError> {
        let aff = AffinityView::from_slice(width, height, depth, affinities)?;
        aff.validate_finite()?;
        if let Some(gt) = &ground_truth {
            if gt.len() != aff.num_voxels() {
                return Err(MergeError::ShapeMismatch {
                    what: "ground truth",
                    expected: aff.num_voxels(),
                    actual: gt.len(),
                });
            }
        }

        let sizes = if config.find_fragments {
            watershed(&aff, config.aff_low, config.aff_high, &mut segmentation)?
        } else {
            if segmentation.len() != aff.num_voxels() {
                return Err(MergeError::ShapeMismatch {
                    what: "segmentation",
                    expected: aff.num_voxels(),
                    actual: segmentation.len(),
                });
            }
            count_fragments(&segmentation)
        };
        let num_nodes = sizes.len() as u64 - 1;

        let mut provider = make_provider(config.statistic);
        let seg_view = VolumeView::from_slice(width, height, depth, &segmentation)?;
        let graph = build_region_graph(&aff, &seg_view, num_nodes, &mut provider)?;

        let tracker = UnmergeTracker::new(unmerge_list, num_nodes)?;
        let engine = IterativeRegionMerging::new(
            graph,
            provider,
            make_scoring(config.scoring),
            make_queue(config.queue),
        );

        info!(
            "initialized agglomeration: {width}x{height}x{depth}, {num_nodes} fragments"
        );
        Ok(Agglomerator {
            engine,
            labels: segmentation,
            width,
            height,
            depth,
            sizes,
            ground_truth,
            tracker,
            metrics: None,
        })
    }

    /// Merges best-first until the cheapest remaining edge scores above
    /// `threshold`, honoring the anti-merge constraints. Returns the ordered
    /// history of merges performed by this call.
    ///
    /// After any merge the session's label volume is re-extracted, and when
    /// ground truth was supplied the quality metrics are re-evaluated.
    /// Successive calls with growing thresholds resume the same run.
    pub fn merge_until(&mut self, threshold: f32) -> Result<Vec<Merge>, MergeError> {
        if !threshold.is_finite() {
            return Err(MergeError::InvalidThreshold(
                "merge threshold must be finite".into(),
            ));
        }

        let mut visitor = ConstrainedVisitor::new(HistoryVisitor::new(), &mut self.tracker);
        let merged = self.engine.merge_until(threshold, &mut visitor);
        let history = visitor.into_inner().into_history();

        if merged > 0 {
            self.engine.extract_segmentation(&mut self.labels);
        }
        if let Some(gt) = &self.ground_truth {
            self.metrics = Some(compare_volumes(gt, &self.labels)?);
        }
        Ok(history)
    }

    /// Current live edge set with fresh scores.
    pub fn region_graph(&self) -> Vec<ScoredEdge> {
        self.engine.extract_region_graph()
    }

    /// Current label volume (updated after every merging call).
    pub fn segmentation(&self) -> &[u64] {
        &self.labels
    }

    /// Per-seed voxel counts from seeding (`sizes[0]` is background).
    pub fn fragment_sizes(&self) -> &[u64] {
        &self.sizes
    }

    /// Volume shape as `(width, height, depth)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.width, self.height, self.depth)
    }

    /// Number of seed regions.
    pub fn num_fragments(&self) -> u64 {
        self.engine.graph().num_nodes()
    }

    /// Quality metrics from the latest merging call, when ground truth was
    /// supplied.
    pub fn metrics(&self) -> Option<EvaluationReport> {
        self.metrics
    }

    /// Total merges performed over the session's lifetime.
    pub fn merges_performed(&self) -> u64 {
        self.engine.merges_performed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2x1x1 volume with a single interfacial x-face of the given affinity.
    fn two_voxel_session(face: f32, threshold_cfg: (f32, f32)) -> Agglomerator {
        let mut aff = vec![0.0f32; 3 * 2];
        aff[1] = face; // channel 0, x = 1
        Agglomerator::initialize(
            2,
            1,
            1,
            &aff,
            vec![0; 2],
            None,
            &Vec::new(),
            &AgglomerationConfig {
                aff_low: threshold_cfg.0,
                aff_high: threshold_cfg.1,
                statistic: StatisticKind::Max,
                scoring: ScoringKind::Identity,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn initialize_rejects_bad_shapes() {
        let aff = vec![0.5f32; 3 * 4];
        let r = Agglomerator::initialize(
            2,
            1,
            1,
            &aff,
            vec![0; 2],
            None,
            &Vec::new(),
            &AgglomerationConfig::default(),
        );
        assert!(matches!(r, Err(MergeError::ShapeMismatch { .. })));
    }

    #[test]
    fn initialize_rejects_non_finite_affinities() {
        let mut aff = vec![0.5f32; 3 * 2];
        aff[3] = f32::INFINITY;
        let r = Agglomerator::initialize(
            2,
            1,
            1,
            &aff,
            vec![0; 2],
            None,
            &Vec::new(),
            &AgglomerationConfig::default(),
        );
        assert!(matches!(r, Err(MergeError::NonFiniteAffinity { index: 3 })));
    }

    #[test]
    fn watershed_then_merge_collapses_weak_interface() {
        // low = 0.5 cuts the 0.2 face, seeding two fragments
        let mut session = two_voxel_session(0.2, (0.5, 0.9));
        assert_eq!(session.num_fragments(), 2);

        // identity scoring: the edge costs 0.2; a 0.1 threshold refuses it
        assert!(session.merge_until(0.1).unwrap().is_empty());
        let history = session.merge_until(0.5).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].score, 0.2);
        assert!(session.segmentation().iter().all(|&l| l == 1));
    }

    #[test]
    fn pre_supplied_segmentation_skips_watershed() {
        let mut aff = vec![0.0f32; 3 * 3];
        aff[1] = 0.8; // face between voxels 0 and 1
        aff[2] = 0.4; // face between voxels 1 and 2
        let session = Agglomerator::initialize(
            3,
            1,
            1,
            &aff,
            vec![5, 2, 9],
            None,
            &Vec::new(),
            &AgglomerationConfig {
                find_fragments: false,
                statistic: StatisticKind::Max,
                scoring: ScoringKind::Identity,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(session.num_fragments(), 9);
        assert_eq!(session.fragment_sizes()[5], 1);
        assert_eq!(session.region_graph().len(), 2);
    }

    #[test]
    fn unmerge_constraints_survive_resumed_runs() {
        // line of three seeds; A(1) and C(3) must stay apart
        let mut aff = vec![0.0f32; 3 * 3];
        aff[1] = 0.2;
        aff[2] = 0.6;
        let mut session = Agglomerator::initialize(
            3,
            1,
            1,
            &aff,
            vec![1, 2, 3],
            None,
            &vec![vec![vec![1], vec![3]]],
            &AgglomerationConfig {
                find_fragments: false,
                statistic: StatisticKind::Max,
                scoring: ScoringKind::Identity,
                ..Default::default()
            },
        )
        .unwrap();

        // first run merges 1-2 only
        let h1 = session.merge_until(0.3).unwrap();
        assert_eq!(h1.len(), 1);
        // the resumed run must remember that region 1 now contains seed 1
        let h2 = session.merge_until(1.0).unwrap();
        assert!(h2.is_empty());
        let labels = session.segmentation();
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn metrics_reported_against_ground_truth() {
        let mut session_aff = vec![1.0f32; 3 * 4];
        session_aff[0] = 0.0;
        let mut session = Agglomerator::initialize(
            4,
            1,
            1,
            &session_aff,
            vec![0; 4],
            Some(vec![1; 4]),
            &Vec::new(),
            &AgglomerationConfig::default(),
        )
        .unwrap();
        let _ = session.merge_until(1.0).unwrap();
        let m = session.metrics().unwrap();
        assert!(m.rand_merge.abs() < 1e-12);
        assert!(m.voi_merge.abs() < 1e-12);
        assert!(m.rand_split.abs() < 1e-12);
        assert!(m.voi_split.abs() < 1e-12);
    }
}
