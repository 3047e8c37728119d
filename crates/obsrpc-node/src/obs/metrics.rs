//! Counters, gauges, and histograms with dynamic labels.
//!
//! Label sets are flattened into sorted key vectors so rendering order is
//! deterministic. Histogram buckets are fixed in microseconds.

use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use obsrpc_core::ErrorCode;

type LabelKey = Vec<(String, String)>;

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

/// `k1="v1",k2="v2"` plus an optional trailing pair (used for `le`).
fn label_body(key: &LabelKey, trailing: Option<(&str, &str)>) -> String {
    key.iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(trailing)
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

/// One metric family: a value per label set.
struct Family<V> {
    map: DashMap<LabelKey, V>,
}

impl<V: Default> Default for Family<V> {
    fn default() -> Self {
        Self { map: DashMap::new() }
    }
}

impl<V: Default> Family<V> {
    fn with<R>(&self, labels: &[(&str, &str)], f: impl FnOnce(&V) -> R) -> R {
        let entry = self.map.entry(label_key(labels)).or_default();
        f(entry.value())
    }
}

#[derive(Default)]
pub struct CounterVec(Family<AtomicU64>);

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        self.0.with(labels, |c| c.fetch_add(v, Ordering::Relaxed));
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} counter");
        for r in self.0.map.iter() {
            let v = r.value().load(Ordering::Relaxed);
            let _ = writeln!(out, "{name}{{{}}} {v}", label_body(r.key(), None));
        }
    }
}

#[derive(Default)]
pub struct GaugeVec(Family<AtomicI64>);

impl GaugeVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn dec(&self, labels: &[(&str, &str)]) {
        self.add(labels, -1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: i64) {
        self.0.with(labels, |g| g.fetch_add(v, Ordering::Relaxed));
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} gauge");
        for r in self.0.map.iter() {
            let v = r.value().load(Ordering::Relaxed);
            let _ = writeln!(out, "{name}{{{}}} {v}", label_body(r.key(), None));
        }
    }
}

// 100us .. 1s, plus an implicit +Inf
const BUCKETS_MICROS: [u64; 9] = [100, 500, 1_000, 5_000, 10_000, 50_000, 100_000, 500_000, 1_000_000];

#[derive(Default)]
struct Histogram {
    count: AtomicU64,
    sum_micros: AtomicU64,
    buckets: [AtomicU64; BUCKETS_MICROS.len()],
}

#[derive(Default)]
pub struct HistogramVec(Family<Histogram>);

impl HistogramVec {
    pub fn observe(&self, labels: &[(&str, &str)], took: Duration) {
        let micros = u64::try_from(took.as_micros()).unwrap_or(u64::MAX);
        self.0.with(labels, |h| {
            h.count.fetch_add(1, Ordering::Relaxed);
            h.sum_micros.fetch_add(micros, Ordering::Relaxed);
            for (bucket, le) in h.buckets.iter().zip(BUCKETS_MICROS) {
                if micros <= le {
                    bucket.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} histogram");
        for r in self.0.map.iter() {
            let h = r.value();
            let count = h.count.load(Ordering::Relaxed);
            for (bucket, le) in h.buckets.iter().zip(BUCKETS_MICROS) {
                let le = le.to_string();
                let _ = writeln!(
                    out,
                    "{name}_bucket{{{}}} {}",
                    label_body(r.key(), Some(("le", &le))),
                    bucket.load(Ordering::Relaxed)
                );
            }
            let _ = writeln!(out, "{name}_bucket{{{}}} {count}", label_body(r.key(), Some(("le", "+Inf"))));
            let labels = label_body(r.key(), None);
            let _ = writeln!(out, "{name}_sum{{{labels}}} {}", h.sum_micros.load(Ordering::Relaxed));
            let _ = writeln!(out, "{name}_count{{{labels}}} {count}");
        }
    }
}

#[derive(Default)]
pub struct NodeMetrics {
    pub requests: CounterVec,
    pub protocol_mismatches: CounterVec,
    pub unknown_commands: CounterVec,
    pub transport_errors: CounterVec,
    pub dispatch_duration: HistogramVec, // microseconds
    pub active_connections: GaugeVec,
    draining: AtomicBool,
}

impl NodeMetrics {
    pub fn set_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    /// Account for one dispatched request after the reply is built.
    pub fn record_dispatch(&self, service: &str, command: u16, errorcode: u16, took: Duration) {
        let command = command.to_string();
        let result = match ErrorCode::from_u16(errorcode) {
            None => "ok",
            Some(code) => code.as_str(),
        };
        self.requests
            .inc(&[("service", service), ("command", &command), ("result", result)]);
        match ErrorCode::from_u16(errorcode) {
            Some(ErrorCode::ProtocolWrong) => self.protocol_mismatches.inc(&[("service", service)]),
            Some(ErrorCode::BadCommand) => self
                .unknown_commands
                .inc(&[("service", service), ("command", &command)]),
            _ => {}
        }
        self.dispatch_duration.observe(&[("service", service)], took);
    }

    /// Render all metrics plus caller-provided lines (already formatted names).
    pub fn render(&self, extra: &[(&str, u64)]) -> String {
        let mut out = String::new();
        self.requests.render("obsrpc_requests_total", &mut out);
        self.protocol_mismatches.render("obsrpc_protocol_mismatches_total", &mut out);
        self.unknown_commands.render("obsrpc_unknown_commands_total", &mut out);
        self.transport_errors.render("obsrpc_transport_errors_total", &mut out);
        self.dispatch_duration.render("obsrpc_dispatch_duration_micros", &mut out);
        self.active_connections.render("obsrpc_connections_active", &mut out);

        let _ = writeln!(
            out,
            "# TYPE obsrpc_draining gauge\nobsrpc_draining {}",
            u8::from(self.is_draining())
        );
        for (k, v) in extra {
            let _ = writeln!(out, "{} {}", k, v);
        }
        out
    }
}
