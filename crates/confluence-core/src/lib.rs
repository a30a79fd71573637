//! # Confluence Core
//!
//! Hierarchical agglomeration of 3-D oversegmentations derived from neural
//! affinity volumes: watershed seeding, a dynamically merged region
//! adjacency graph with pluggable per-edge affinity statistics, a best-first
//! merge loop with anti-merge constraints, and Rand / Variation of
//! Information evaluation against a ground truth.

pub mod agglomerate;
pub mod engine;
pub mod metrics;
pub mod volume;

// Re-export commonly used types
pub use agglomerate::{Agglomerator, AgglomerationConfig, QueueKind, ScoringKind, StatisticKind};
pub use engine::errors::MergeError;
pub use engine::graph::{EdgeId, RegionGraph, SegId};
pub use engine::merging::{IterativeRegionMerging, ScoredEdge};
pub use engine::visitor::Merge;
pub use metrics::EvaluationReport;
