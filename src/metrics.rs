use prometheus::{Encoder, GaugeVec, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use warp::Filter;

use once_cell::sync::{Lazy, OnceCell};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static LATENCY_GAUGE: Lazy<GaugeVec> = Lazy::new(|| {
    let opts = Opts::new(
        "probe_latency_milliseconds_current",
        "Average probe latency of the last round in milliseconds",
    );
    let gauge = GaugeVec::new(opts, &["target", "kind"]).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

static DROPPED_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new(
        "probe_dropped_total",
        "Total number of attempts that never connected",
    );
    let ctr = IntCounterVec::new(opts, &["target", "kind"]).unwrap();
    REGISTRY.register(Box::new(ctr.clone())).unwrap();
    ctr
});

static ERROR_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new(
        "probe_errors_total",
        "Total number of attempts that finalized with an error",
    );
    let ctr = IntCounterVec::new(opts, &["target", "kind"]).unwrap();
    REGISTRY.register(Box::new(ctr.clone())).unwrap();
    ctr
});

// Optional histogram for latency history - only registered if enabled
static LATENCY_HIST: OnceCell<HistogramVec> = OnceCell::new();

pub fn initialize_metrics(enable_latency_history: bool) {
    if enable_latency_history {
        let opts = Opts::new(
            "probe_latency_milliseconds",
            "Probe latency in milliseconds",
        );
        let hist = HistogramVec::new(
            prometheus::HistogramOpts {
                common_opts: opts,
                buckets: vec![
                    0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 250.0, 500.0,
                    1000.0,
                ],
            },
            &["target", "kind"],
        )
        .expect("creating histogram");

        REGISTRY.register(Box::new(hist.clone())).unwrap();
        let _ = LATENCY_HIST.set(hist);
    }
}

pub async fn serve_metrics(addr: SocketAddr) {
    let metrics_route = warp::path!("metrics").map(move || {
        let encoder = TextEncoder::new();
        let mf = REGISTRY.gather();
        let mut buf = Vec::new();
        encoder.encode(&mf, &mut buf).unwrap();
        warp::http::Response::builder()
            .header("Content-Type", encoder.format_type())
            .body(buf)
            .unwrap()
    });

    warp::serve(metrics_route).run(addr).await;
}

pub fn observe_latency(target: &str, kind: &str, latency_ms: f64) {
    LATENCY_GAUGE
        .with_label_values(&[target, kind])
        .set(latency_ms);

    if let Some(hist) = LATENCY_HIST.get() {
        hist.with_label_values(&[target, kind]).observe(latency_ms);
    }
}

pub fn add_dropped(target: &str, kind: &str, dropped: u64) {
    if dropped > 0 {
        DROPPED_COUNTER
            .with_label_values(&[target, kind])
            .inc_by(dropped);
    }
}

pub fn add_errors(target: &str, kind: &str, errors: u64) {
    if errors > 0 {
        ERROR_COUNTER
            .with_label_values(&[target, kind])
            .inc_by(errors);
    }
}
