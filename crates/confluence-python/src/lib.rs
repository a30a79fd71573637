//! # Confluence Python Bindings
//!
//! Exposes the agglomeration engine to Python through an explicit session
//! store: `initialize` builds an owned [`Agglomerator`] and returns a typed
//! [`PyHandle`]; every later call looks the session up by id. Dropping a
//! session is explicit (`free`) and operations on a freed handle raise
//! `ValueError` instead of crashing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyModule};
use rustc_hash::FxHashMap;

use confluence_core::engine::unmerge::UnmergeList;
use confluence_core::{
    Agglomerator, AgglomerationConfig, MergeError, QueueKind, ScoringKind, StatisticKind,
};

/// Process-wide session store owned by the binding layer.
///
/// The core never sees handles; it takes owned values and returns owned
/// values. Ids are monotone and never reused.
struct SessionStore {
    sessions: Mutex<FxHashMap<u64, Agglomerator>>,
    next_id: AtomicU64,
}

impl SessionStore {
    fn global() -> &'static SessionStore {
        static STORE: OnceLock<SessionStore> = OnceLock::new();
        STORE.get_or_init(|| SessionStore {
            sessions: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
        })
    }

    fn insert(&self, session: Agglomerator) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions
            .lock()
            .expect("session store poisoned")
            .insert(id, session);
        id
    }

    fn take(&self, id: u64) -> PyResult<Agglomerator> {
        self.sessions
            .lock()
            .expect("session store poisoned")
            .remove(&id)
            .ok_or_else(|| PyValueError::new_err(format!("unknown or freed handle {id}")))
    }

    fn put_back(&self, id: u64, session: Agglomerator) {
        self.sessions
            .lock()
            .expect("session store poisoned")
            .insert(id, session);
    }

    fn free(&self, id: u64) -> bool {
        self.sessions
            .lock()
            .expect("session store poisoned")
            .remove(&id)
            .is_some()
    }
}

/// Runs `f` on the session behind `handle`, returning it to the store
/// afterwards even when `f` fails.
fn with_session<R>(
    handle: u64,
    f: impl FnOnce(&mut Agglomerator) -> PyResult<R>,
) -> PyResult<R> {
    let store = SessionStore::global();
    let mut session = store.take(handle)?;
    let result = f(&mut session);
    store.put_back(handle, session);
    result
}

/// Map core errors to rich Python exceptions.
fn map_merge_error(err: MergeError) -> PyErr {
    match err {
        MergeError::ShapeMismatch { .. }
        | MergeError::InvalidThreshold(_)
        | MergeError::NonFiniteAffinity { .. }
        | MergeError::SeedOutOfRange { .. } => PyValueError::new_err(err.to_string()),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

fn parse_statistic(name: &str, quantile: f32, bins: usize) -> PyResult<StatisticKind> {
    match name {
        "max" => Ok(StatisticKind::Max),
        "mean" => Ok(StatisticKind::Mean),
        "histogram_quantile" => Ok(StatisticKind::HistogramQuantile { quantile, bins }),
        "vector_quantile" => Ok(StatisticKind::VectorQuantile { quantile }),
        other => Err(PyValueError::new_err(format!(
            "unknown statistic '{other}' (expected max, mean, histogram_quantile or vector_quantile)"
        ))),
    }
}

fn parse_queue(name: &str, bins: usize) -> PyResult<QueueKind> {
    match name {
        "binary" => Ok(QueueKind::Binary),
        "bin" => Ok(QueueKind::Bin { bins }),
        other => Err(PyValueError::new_err(format!(
            "unknown queue '{other}' (expected binary or bin)"
        ))),
    }
}

fn parse_scoring(name: &str) -> PyResult<ScoringKind> {
    match name {
        "one_minus" => Ok(ScoringKind::OneMinus),
        "identity" => Ok(ScoringKind::Identity),
        other => Err(PyValueError::new_err(format!(
            "unknown scoring '{other}' (expected one_minus or identity)"
        ))),
    }
}

/// Typed handle to an agglomeration session.
#[pyclass(name = "Handle", frozen)]
pub struct PyHandle {
    #[pyo3(get)]
    id: u64,
}

#[pymethods]
impl PyHandle {
    fn __repr__(&self) -> String {
        format!("Handle(id={})", self.id)
    }
}

/// Seeds an agglomeration session and returns its handle.
///
/// `affinities` is a flat `[3][width][height][depth]` array (depth fastest);
/// `segmentation` is a flat `[width][height][depth]` label array, consumed
/// as seeds when `find_fragments` is false and overwritten by watershed
/// otherwise. Releases the GIL while seeding.
#[pyfunction]
#[pyo3(signature = (
    width, height, depth, affinities, segmentation,
    ground_truth = None,
    aff_low = 0.0001,
    aff_high = 0.9999,
    find_fragments = true,
    unmerge_list = None,
    statistic = "vector_quantile",
    quantile = 0.5,
    bins = 256,
    queue = "binary",
    scoring = "one_minus",
))]
#[allow(clippy::too_many_arguments)]
fn initialize(
    py: Python<'_>,
    width: usize,
    height: usize,
    depth: usize,
    affinities: Vec<f32>,
    segmentation: Vec<u64>,
    ground_truth: Option<Vec<u32>>,
    aff_low: f32,
    aff_high: f32,
    find_fragments: bool,
    unmerge_list: Option<UnmergeList>,
    statistic: &str,
    quantile: f32,
    bins: usize,
    queue: &str,
    scoring: &str,
) -> PyResult<PyHandle> {
    let config = AgglomerationConfig {
        aff_low,
        aff_high,
        find_fragments,
        statistic: parse_statistic(statistic, quantile, bins)?,
        scoring: parse_scoring(scoring)?,
        queue: parse_queue(queue, bins)?,
    };
    let unmerge = unmerge_list.unwrap_or_default();

    let session = py.allow_threads(|| {
        Agglomerator::initialize(
            width,
            height,
            depth,
            &affinities,
            segmentation,
            ground_truth,
            &unmerge,
            &config,
        )
    });
    match session {
        Ok(s) => Ok(PyHandle {
            id: SessionStore::global().insert(s),
        }),
        Err(err) => Err(map_merge_error(err)),
    }
}

/// Merges best-first until the cheapest remaining edge scores above
/// `threshold`. Returns the merge history as `(a, b, survivor, score)`
/// tuples; successive calls with growing thresholds resume the run.
#[pyfunction]
fn merge_until(py: Python<'_>, handle: &PyHandle, threshold: f32) -> PyResult<Vec<(u64, u64, u64, f32)>> {
    with_session(handle.id, |session| {
        let history = py
            .allow_threads(|| session.merge_until(threshold))
            .map_err(map_merge_error)?;
        Ok(history
            .into_iter()
            .map(|m| (m.a.0, m.b.0, m.survivor.0, m.score))
            .collect())
    })
}

/// Current live region graph as `(u, v, score)` tuples with fresh scores.
#[pyfunction]
fn get_region_graph(handle: &PyHandle) -> PyResult<Vec<(u64, u64, f32)>> {
    with_session(handle.id, |session| {
        Ok(session
            .region_graph()
            .into_iter()
            .map(|e| (e.u.0, e.v.0, e.score))
            .collect())
    })
}

/// Current label volume, updated after every merging call.
#[pyfunction]
fn get_segmentation(handle: &PyHandle) -> PyResult<Vec<u64>> {
    with_session(handle.id, |session| Ok(session.segmentation().to_vec()))
}

/// Quality metrics from the latest merge run, or None without ground truth.
#[pyfunction]
fn get_metrics<'py>(py: Python<'py>, handle: &PyHandle) -> PyResult<Option<Bound<'py, PyDict>>> {
    with_session(handle.id, |session| {
        let Some(m) = session.metrics() else {
            return Ok(None);
        };
        let d = PyDict::new_bound(py);
        d.set_item("rand_split", m.rand_split)?;
        d.set_item("rand_merge", m.rand_merge)?;
        d.set_item("voi_split", m.voi_split)?;
        d.set_item("voi_merge", m.voi_merge)?;
        Ok(Some(d))
    })
}

/// Drops the session behind the handle. Raises ValueError if already freed.
#[pyfunction]
fn free(handle: &PyHandle) -> PyResult<()> {
    if SessionStore::global().free(handle.id) {
        Ok(())
    } else {
        Err(PyValueError::new_err(format!(
            "unknown or freed handle {}",
            handle.id
        )))
    }
}

#[pymodule]
fn confluence(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyHandle>()?;
    m.add_function(wrap_pyfunction!(initialize, m)?)?;
    m.add_function(wrap_pyfunction!(merge_until, m)?)?;
    m.add_function(wrap_pyfunction!(get_region_graph, m)?)?;
    m.add_function(wrap_pyfunction!(get_segmentation, m)?)?;
    m.add_function(wrap_pyfunction!(get_metrics, m)?)?;
    m.add_function(wrap_pyfunction!(free, m)?)?;
    Ok(())
}
