// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;

use crate::domain::{Side, TokenAggregate};
use crate::summary::Snapshot;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Poll loop --------
pub static POLLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("polls_total", "poll cycles (label: status=ok|error)"), &["status"]).unwrap()
});

pub static POLL_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("poll_latency_ms", "Full poll latency: fetch + decode + aggregate (ms)")
            .buckets(vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]),
    )
    .unwrap()
});

pub static LAST_SUCCESS_TS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("last_success_ts", "Unix seconds of the last successful poll").unwrap());

pub static FETCH_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("fetch_retries_total", "upstream fetch retries (label: what)"), &["what"]).unwrap()
});

// -------- Decoding / calculation --------
pub static DECODE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("decode_failures_total", "accounts skipped as malformed (labels: kind, reason)"),
        &["kind", "reason"],
    )
    .unwrap()
});

pub static CYCLE_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("dca_cycle_errors_total", "DCA accounts excluded for invalid cycle config").unwrap()
});

// -------- Per token --------
pub static ORDERS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("orders_open", "open orders per token (labels: kind=limit|dca, token, side)"),
        &["kind", "token", "side"],
    )
    .unwrap()
});

pub static VOLUME_USDC: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new("order_volume_usdc", "order volume in quote units (labels: kind, token, side)"),
        &["kind", "token", "side"],
    )
    .unwrap()
});

pub static PRICE: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(Opts::new("token_price", "reference price per tracked token, 0 = unknown"), &["token"]).unwrap()
});

// ---- Config visibility ----
pub static CONFIG_TRACKED: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("config_tracked_token", "tracked tokens (labels: symbol, mint)"), &["symbol", "mint"])
        .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(POLLS.clone())),
        REGISTRY.register(Box::new(POLL_LATENCY.clone())),
        REGISTRY.register(Box::new(LAST_SUCCESS_TS.clone())),
        REGISTRY.register(Box::new(FETCH_RETRIES.clone())),
        REGISTRY.register(Box::new(DECODE_FAILURES.clone())),
        REGISTRY.register(Box::new(CYCLE_ERRORS.clone())),
        REGISTRY.register(Box::new(ORDERS.clone())),
        REGISTRY.register(Box::new(VOLUME_USDC.clone())),
        REGISTRY.register(Box::new(PRICE.clone())),
        REGISTRY.register(Box::new(CONFIG_TRACKED.clone())),
    ] {
        let _ = m;
    }
}

fn set_aggregate(kind: &str, token: &str, agg: &TokenAggregate) {
    for (side, orders, usdc) in [
        (Side::Buy, agg.buy_orders, agg.buy_volume_usdc),
        (Side::Sell, agg.sell_orders, agg.sell_volume_usdc),
    ] {
        ORDERS.with_label_values(&[kind, token, side.as_str()]).set(orders as i64);
        VOLUME_USDC.with_label_values(&[kind, token, side.as_str()]).set(usdc.to_f64().unwrap_or(0.0));
    }
}

/// Export the per-token gauges of a fresh snapshot.
pub fn record_snapshot(snap: &Snapshot) {
    for (token, agg) in &snap.limit_summary {
        set_aggregate("limit", token, agg);
        PRICE.with_label_values(&[token.as_str()]).set(agg.price.to_f64().unwrap_or(0.0));
    }
    for (token, agg) in &snap.dca_summary {
        set_aggregate("dca", token, agg);
    }
    LAST_SUCCESS_TS.set(snap.taken_at);
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}
