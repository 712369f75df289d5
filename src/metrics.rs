// Metrics hooks for the match engine.
//
// Callers install a global `MatchMetrics` implementation via
// [`set_match_metrics`]; the engine then reports per-invocation latency
// and candidate counts. This keeps instrumentation decoupled from any
// specific metrics backend.
use std::sync::{Arc, RwLock};
use std::time::Duration;

use once_cell::sync::OnceCell;

/// Metrics observer for match invocations.
pub trait MatchMetrics: Send + Sync {
    /// Record the outcome of one invocation.
    ///
    /// `latency` is the wall-clock duration of the call, `candidates` the
    /// number submitted, `survivors` how many passed scoring, and `hits`
    /// the number of results returned after truncation.
    fn record_match(&self, latency: Duration, candidates: usize, survivors: usize, hits: usize);
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn MatchMetrics>>> {
    static METRICS: OnceCell<RwLock<Option<Arc<dyn MatchMetrics>>>> = OnceCell::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

pub(crate) fn metrics_recorder() -> Option<Arc<dyn MatchMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

/// Install or clear the global match metrics recorder.
///
/// Typically called once during service startup so all engine instances
/// share the same metrics backend.
pub fn set_match_metrics(recorder: Option<Arc<dyn MatchMetrics>>) {
    let lock = metrics_lock();
    let mut guard = lock.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}
