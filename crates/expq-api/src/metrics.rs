//! Request counters and their Prometheus text exposition.
//!
//! One mutex guards all counters. It is taken only to mutate or snapshot and
//! is never held across an `.await`.
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestCounters {
    pub total: u64,
    pub expense: u64,
    pub query: u64,
    pub conversation: u64,
    pub clarify: u64,
    pub errors: u64,
}

#[derive(Debug, Default)]
pub struct Metrics {
    counters: Mutex<RequestCounters>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire, mutate, release
    pub fn record<F: FnOnce(&mut RequestCounters)>(&self, update: F) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        update(&mut counters);
    }

    pub fn snapshot(&self) -> RequestCounters {
        *self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Prometheus text format, labelled by request kind
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let snapshot = self.snapshot();
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new("expq_requests_total", "Requests handled, by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(requests.clone()))?;

        for (kind, value) in [
            ("total", snapshot.total),
            ("expense", snapshot.expense),
            ("query", snapshot.query),
            ("conversation", snapshot.conversation),
            ("clarify", snapshot.clarify),
            ("errors", snapshot.errors),
        ] {
            requests.with_label_values(&[kind]).inc_by(value);
        }

        encode(&registry)
    }
}

pub fn encode(registry: &Registry) -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_encode() {
        let metrics = Metrics::new();
        metrics.record(|c| {
            c.total += 2;
            c.query += 1;
            c.clarify += 1;
        });
        assert_eq!(metrics.snapshot().total, 2);

        let text = metrics.encode().unwrap();
        assert!(text.contains("expq_requests_total{kind=\"total\"} 2"));
        assert!(text.contains("expq_requests_total{kind=\"clarify\"} 1"));
        assert!(text.contains("expq_requests_total{kind=\"errors\"} 0"));
    }
}
