//! The agglomeration engine.
//!
//! This module provides:
//! - **errors**: error types for construction and run failures
//! - **graph**: the dynamically merged region adjacency graph
//! - **statistics**: per-edge affinity statistic providers
//! - **scoring**: statistic-to-score mappings
//! - **queue**: best-first edge queues tolerating stale entries
//! - **merging**: the serial best-first merge loop
//! - **unmerge**: anti-merge constraint tracking
//! - **visitor**: observation hooks for merge runs

pub mod errors;
pub mod graph;
pub mod merging;
pub mod queue;
pub mod scoring;
pub mod statistics;
pub mod unmerge;
pub mod visitor;
