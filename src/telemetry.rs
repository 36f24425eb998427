//! Per-query telemetry.
//!
//! The orchestrator emits one `QueryEvent` per query attempt to an optional
//! injected `TelemetrySink`. Sinks observe only; whether one is attached
//! never changes a match result.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::Sender;
use serde::Serialize;
use tracing::debug;

use crate::models::QueryType;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryEvent {
    /// Title of the track being matched
    pub track_title: String,
    pub query_text: String,
    pub query_type: QueryType,
    pub query_index: usize,
    pub execution_time: Duration,
    pub candidates_found: usize,
    pub failed: bool,
}

pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &QueryEvent);
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for Arc<T> {
    fn record(&self, event: &QueryEvent) {
        (**self).record(event)
    }
}

// ============================================================================
// Tracing Sink
// ============================================================================

/// Emits each event as a structured `tracing` debug event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, event: &QueryEvent) {
        debug!(
            target: "trackmatch::telemetry",
            track = %event.track_title,
            query = %event.query_text,
            query_type = event.query_type.as_str(),
            index = event.query_index,
            elapsed_ms = event.execution_time.as_millis() as u64,
            candidates = event.candidates_found,
            failed = event.failed,
            "query attempt"
        );
    }
}

// ============================================================================
// Channel Sink
// ============================================================================

/// Forwards events to an external consumer (e.g. a live dashboard).
/// A disconnected receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<QueryEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<QueryEvent>) -> Self {
        Self { tx }
    }
}

impl TelemetrySink for ChannelSink {
    fn record(&self, event: &QueryEvent) {
        let _ = self.tx.send(event.clone());
    }
}

// ============================================================================
// Aggregating Sink
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryTypeMetrics {
    pub attempts: usize,
    pub failures: usize,
    pub candidates_found: usize,
    pub total_ms: u64,
}

impl QueryTypeMetrics {
    pub fn average_ms(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.attempts as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_attempts: usize,
    pub total_failures: usize,
    /// Keyed by `QueryType::as_str()`
    pub by_type: BTreeMap<String, QueryTypeMetrics>,
}

/// Aggregates attempts, failures, candidates and time per query type.
/// Shared across worker threads; one instance per run, not process-wide.
#[derive(Debug, Default)]
pub struct QueryMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl QueryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl TelemetrySink for QueryMetrics {
    fn record(&self, event: &QueryEvent) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.total_attempts += 1;
        if event.failed {
            inner.total_failures += 1;
        }
        let entry = inner
            .by_type
            .entry(event.query_type.as_str().to_string())
            .or_default();
        entry.attempts += 1;
        entry.candidates_found += event.candidates_found;
        entry.total_ms += event.execution_time.as_millis() as u64;
        if event.failed {
            entry.failures += 1;
        }
    }
}

/// Sends every event to each inner sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl TelemetrySink for FanoutSink {
    fn record(&self, event: &QueryEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn event(query_type: QueryType, failed: bool, found: usize, ms: u64) -> QueryEvent {
        QueryEvent {
            track_title: "Strobe".to_string(),
            query_text: "deadmau5 strobe".to_string(),
            query_type,
            query_index: 0,
            execution_time: Duration::from_millis(ms),
            candidates_found: found,
            failed,
        }
    }

    #[test]
    fn test_metrics_aggregate_by_type() {
        let metrics = QueryMetrics::new();
        metrics.record(&event(QueryType::Priority, false, 4, 10));
        metrics.record(&event(QueryType::Priority, true, 0, 30));
        metrics.record(&event(QueryType::NGram, false, 2, 5));

        let snap = metrics.snapshot();
        assert_eq!(snap.total_attempts, 3);
        assert_eq!(snap.total_failures, 1);
        let priority = &snap.by_type["priority"];
        assert_eq!(priority.attempts, 2);
        assert_eq!(priority.failures, 1);
        assert_eq!(priority.candidates_found, 4);
        assert_eq!(priority.average_ms(), 20.0);
        assert_eq!(snap.by_type["n_gram"].attempts, 1);
    }

    #[test]
    fn test_channel_sink_forwards_and_survives_disconnect() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = ChannelSink::new(tx);
        sink.record(&event(QueryType::Remix, false, 1, 1));
        assert_eq!(rx.try_recv().unwrap().query_type, QueryType::Remix);
        drop(rx);
        sink.record(&event(QueryType::Remix, false, 1, 1));
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Arc::new(QueryMetrics::new());
        let b = Arc::new(QueryMetrics::new());
        let fanout = FanoutSink::new().with(a.clone()).with(b.clone()).with(Arc::new(TracingSink));
        fanout.record(&event(QueryType::TitleOnly, false, 0, 1));
        assert_eq!(a.snapshot().total_attempts, 1);
        assert_eq!(b.snapshot().total_attempts, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = QueryMetrics::new();
        metrics.record(&event(QueryType::Priority, false, 1, 2));
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("\"priority\""));
    }
}
