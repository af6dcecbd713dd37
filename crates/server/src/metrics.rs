use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::warn;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref TOOL_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("kube_mcp_tool_calls_total", "Total number of tool invocations."),
        &["tool", "status"]
    )
    .expect("tool call counter definition is valid");
    pub static ref COMMAND_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "kube_mcp_command_duration_seconds",
            "Wall-clock duration of kubectl and helm executions."
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["binary"]
    )
    .expect("command duration histogram definition is valid");
}

// Registration is idempotent so tests can call it from every server they build.
pub fn register_metrics() {
    let collectors: [Box<dyn prometheus::core::Collector>; 2] = [
        Box::new(TOOL_CALLS_TOTAL.clone()),
        Box::new(COMMAND_DURATION_SECONDS.clone()),
    ];
    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => warn!(error = %e, "Failed to register metric"),
        }
    }
}

// Function to gather metrics for exposition
pub fn gather_metrics() -> String {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
