use tracing::trace;

// Trace-level counters emitted under the `lister.metrics` target, so a
// subscriber can route them with a `lister.metrics=trace` directive.

pub fn pass_finished(outcome: &'static str) {
    trace!(target: "lister.metrics", outcome, "passes_total_inc");
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128, ok: bool) {
    trace!(
        target: "lister.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        ok,
        "stage_elapsed"
    );
}
