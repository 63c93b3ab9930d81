use crate::Kind;
use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};

/// Metrics for a [super::Source].
#[derive(Default)]
pub struct Metrics {
    /// Current number of outstanding requests, by kind
    pub outstanding: [Gauge; Kind::COUNT],
    /// Number of pages supplied by the synchronous fast path
    pub sync: Counter,
    /// Number of requests forwarded to the provider
    pub forwarded: Counter,
    /// Number of requests merged into an outstanding request
    pub piggybacked: Counter,
    /// Number of pages added to a batch
    pub batched: Counter,
    /// Number of requests completed successfully
    pub completed: Counter,
    /// Number of requests completed with an error
    pub failed: Counter,
    /// Number of requests canceled before completion
    pub canceled: Counter,
    /// Number of piggybacked requests promoted to outstanding
    pub promoted: Counter,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Self::default();
        for kind in Kind::ALL {
            context.register(
                format!("outstanding_{kind}"),
                format!("Current number of outstanding {kind} requests"),
                metrics.outstanding[kind.index()].clone(),
            );
        }
        context.register(
            "sync",
            "Number of pages supplied by the synchronous fast path",
            metrics.sync.clone(),
        );
        context.register(
            "forwarded",
            "Number of requests forwarded to the provider",
            metrics.forwarded.clone(),
        );
        context.register(
            "piggybacked",
            "Number of requests merged into an outstanding request",
            metrics.piggybacked.clone(),
        );
        context.register(
            "batched",
            "Number of pages added to a batch",
            metrics.batched.clone(),
        );
        context.register(
            "completed",
            "Number of requests completed successfully",
            metrics.completed.clone(),
        );
        context.register(
            "failed",
            "Number of requests completed with an error",
            metrics.failed.clone(),
        );
        context.register(
            "canceled",
            "Number of requests canceled before completion",
            metrics.canceled.clone(),
        );
        context.register(
            "promoted",
            "Number of piggybacked requests promoted to outstanding",
            metrics.promoted.clone(),
        );
        metrics
    }
}
