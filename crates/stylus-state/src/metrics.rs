use metrics::{Counter, Histogram};
use metrics_derive::Metrics;

#[derive(Metrics, Clone)]
#[metrics(scope = "stylus_state")]
pub(crate) struct OverlayMetrics {
    /// Programs newly added to the in-flight activation layer
    pub wasm_activations: Counter,
    /// Activations rejected for using a different target set
    pub inconsistent_activations: Counter,
    /// Number of snapshot reverts
    pub snapshot_reverts: Counter,
    /// Journal entries undone per revert
    pub reverted_entries: Histogram,
    /// Recent program cache hits
    pub recent_wasm_hits: Counter,
    /// Recent program cache misses
    pub recent_wasm_misses: Counter,
}

impl OverlayMetrics {
    pub(crate) fn record_revert(&self, reverted: usize) {
        self.snapshot_reverts.increment(1);
        self.reverted_entries.record(reverted as f64);
    }

    pub(crate) fn record_recent_wasm(&self, hit: bool) {
        if hit {
            self.recent_wasm_hits.increment(1);
        } else {
            self.recent_wasm_misses.increment(1);
        }
    }
}
