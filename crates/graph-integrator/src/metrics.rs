use std::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;
use prometheus::{core::Collector, IntCounter, IntCounterVec, Registry};
use tracing::error;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphMetricsSnapshot {
    pub events_integrated: u64,
    pub events_ignored: u64,
    pub realtime_requests: u64,
    pub realtime_failures: u64,
    pub lane_emissions: u64,
    pub lanes_completed: u64,
}

static EVENTS_INTEGRATED: AtomicU64 = AtomicU64::new(0);
static EVENTS_IGNORED: AtomicU64 = AtomicU64::new(0);
static REALTIME_REQUESTS: AtomicU64 = AtomicU64::new(0);
static REALTIME_FAILURES: AtomicU64 = AtomicU64::new(0);
static LANE_EMISSIONS: AtomicU64 = AtomicU64::new(0);
static LANES_COMPLETED: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref EVENTS_INTEGRATED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "audion_events_integrated_total",
            "WebAudio events folded into a context graph"
        ),
        &["method"]
    )
    .unwrap();
    static ref EVENTS_IGNORED_TOTAL: IntCounter = IntCounter::new(
        "audion_events_ignored_total",
        "Protocol events outside the WebAudio graph domain or with malformed params"
    )
    .unwrap();
    static ref REALTIME_REQUESTS_TOTAL: IntCounter = IntCounter::new(
        "audion_realtime_requests_total",
        "Realtime data requests sent"
    )
    .unwrap();
    static ref REALTIME_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "audion_realtime_failures_total",
            "Realtime data requests that failed"
        ),
        &["reason"]
    )
    .unwrap();
    static ref LANE_EMISSIONS_TOTAL: IntCounter = IntCounter::new(
        "audion_lane_emissions_total",
        "Snapshots emitted by the per-context debounce lanes"
    )
    .unwrap();
    static ref LANES_COMPLETED_TOTAL: IntCounter = IntCounter::new(
        "audion_lanes_completed_total",
        "Per-context lanes completed by context destruction"
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(target: "audion-integrator", ?err, "failed to register graph metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, EVENTS_INTEGRATED_TOTAL.clone());
    register(registry, EVENTS_IGNORED_TOTAL.clone());
    register(registry, REALTIME_REQUESTS_TOTAL.clone());
    register(registry, REALTIME_FAILURES_TOTAL.clone());
    register(registry, LANE_EMISSIONS_TOTAL.clone());
    register(registry, LANES_COMPLETED_TOTAL.clone());
}

pub fn record_event_integrated(method: &str) {
    EVENTS_INTEGRATED.fetch_add(1, Ordering::Relaxed);
    EVENTS_INTEGRATED_TOTAL.with_label_values(&[method]).inc();
}

pub fn record_event_ignored() {
    EVENTS_IGNORED.fetch_add(1, Ordering::Relaxed);
    EVENTS_IGNORED_TOTAL.inc();
}

pub fn record_realtime_request() {
    REALTIME_REQUESTS.fetch_add(1, Ordering::Relaxed);
    REALTIME_REQUESTS_TOTAL.inc();
}

pub fn record_realtime_failure(reason: &str) {
    REALTIME_FAILURES.fetch_add(1, Ordering::Relaxed);
    REALTIME_FAILURES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_lane_emission() {
    LANE_EMISSIONS.fetch_add(1, Ordering::Relaxed);
    LANE_EMISSIONS_TOTAL.inc();
}

pub fn record_lane_completed() {
    LANES_COMPLETED.fetch_add(1, Ordering::Relaxed);
    LANES_COMPLETED_TOTAL.inc();
}

pub fn snapshot() -> GraphMetricsSnapshot {
    GraphMetricsSnapshot {
        events_integrated: EVENTS_INTEGRATED.load(Ordering::Relaxed),
        events_ignored: EVENTS_IGNORED.load(Ordering::Relaxed),
        realtime_requests: REALTIME_REQUESTS.load(Ordering::Relaxed),
        realtime_failures: REALTIME_FAILURES.load(Ordering::Relaxed),
        lane_emissions: LANE_EMISSIONS.load(Ordering::Relaxed),
        lanes_completed: LANES_COMPLETED.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    EVENTS_INTEGRATED.store(0, Ordering::Relaxed);
    EVENTS_IGNORED.store(0, Ordering::Relaxed);
    REALTIME_REQUESTS.store(0, Ordering::Relaxed);
    REALTIME_FAILURES.store(0, Ordering::Relaxed);
    LANE_EMISSIONS.store(0, Ordering::Relaxed);
    LANES_COMPLETED.store(0, Ordering::Relaxed);
}
