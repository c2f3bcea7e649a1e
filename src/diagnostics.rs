use tracing::debug;

/// Receiver of free-form diagnostic messages emitted by a store running with
/// [`StoreConfig::debug_trace`](crate::StoreConfig::debug_trace) enabled.
pub trait DiagnosticSink: Send + Sync {
    fn trace(&self, message: &str);
}

/// Forwards diagnostics as `tracing` debug events under the `ephemera::diag` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn trace(&self, message: &str) {
        debug!(target: "ephemera::diag", "{}", message);
    }
}
