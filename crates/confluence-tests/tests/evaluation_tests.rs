//! Ground-truth evaluation scenarios over full agglomeration runs.

use confluence_core::metrics::compare_volumes;
use confluence_core::{Agglomerator, AgglomerationConfig, ScoringKind, StatisticKind};

#[test]
fn collapsed_prediction_against_uniform_ground_truth_is_perfect() {
    // strong affinities everywhere: watershed already fuses the volume
    let aff = vec![1.0f32; 3 * 2 * 2 * 2];
    let mut session = Agglomerator::initialize(
        2,
        2,
        2,
        &aff,
        vec![0; 8],
        Some(vec![1; 8]),
        &Vec::new(),
        &AgglomerationConfig::default(),
    )
    .unwrap();
    session.merge_until(1.0).unwrap();
    let m = session.metrics().unwrap();
    assert!(m.rand_merge.abs() < 1e-12);
    assert!(m.voi_merge.abs() < 1e-12);
    assert!(m.rand_split.abs() < 1e-12);
    assert!(m.voi_split.abs() < 1e-12);
}

#[test]
fn oversegmentation_shows_as_split_error_until_merged() {
    // two voxels, weak interface, uniform ground truth
    let mut aff = vec![0.0f32; 3 * 2];
    aff[1] = 0.4;
    let mut session = Agglomerator::initialize(
        2,
        1,
        1,
        &aff,
        vec![1, 2],
        Some(vec![7, 7]),
        &Vec::new(),
        &AgglomerationConfig {
            find_fragments: false,
            statistic: StatisticKind::Max,
            scoring: ScoringKind::Identity,
            ..Default::default()
        },
    )
    .unwrap();

    // refusing the merge leaves pure split error
    session.merge_until(0.1).unwrap();
    let before = session.metrics().unwrap();
    assert!(before.rand_split > 0.0);
    assert!(before.voi_split > 0.0);
    assert!(before.rand_merge.abs() < 1e-12);
    assert!(before.voi_merge.abs() < 1e-12);

    // merging the pair clears it
    session.merge_until(0.5).unwrap();
    let after = session.metrics().unwrap();
    assert!(after.rand_split.abs() < 1e-12);
    assert!(after.voi_split.abs() < 1e-12);
}

#[test]
fn undersegmentation_shows_as_merge_error() {
    // ground truth splits what the prediction joins
    let gt = vec![1u32, 1, 2, 2];
    let pred = vec![3u64, 3, 3, 3];
    let m = compare_volumes(&gt, &pred).unwrap();
    assert!(m.rand_merge > 0.0);
    assert!(m.voi_merge > 0.0);
    assert!(m.rand_split.abs() < 1e-12);
    assert!(m.voi_split.abs() < 1e-12);
}

#[test]
fn metrics_absent_without_ground_truth() {
    let aff = vec![1.0f32; 3 * 2];
    let mut session = Agglomerator::initialize(
        2,
        1,
        1,
        &aff,
        vec![0; 2],
        None,
        &Vec::new(),
        &AgglomerationConfig::default(),
    )
    .unwrap();
    session.merge_until(1.0).unwrap();
    assert!(session.metrics().is_none());
}
