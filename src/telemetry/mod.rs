//! Observation hooks and logging setup.
//!
//! Observers are application-controlled: nothing is recorded unless one is
//! attached to a call. They see a read-only [`CallRecord`] after every call, at
//! stream exhaustion and after extraction, and cannot alter what the call
//! returns.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CallObserver`] | Trait for record destinations |
//! | [`NoopObserver`] | Default observer (records nothing) |
//! | [`TracingObserver`] | Emits each record as a `tracing` event |
//! | [`InMemoryObserver`] | Keeps records in memory, for tests |
//! | [`init_tracing`] | Installs a `tracing-subscriber` fmt subscriber |

use crate::providers::Provider;
use crate::response::CallResponse;
use crate::types::{ToolCall, Usage};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Which invocation variant produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Call,
    Stream,
    Extract,
    StructuredStream,
}

/// Summary of one finished call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub kind: CallKind,
    pub provider: &'static str,
    pub model: String,
    pub id: Option<String>,
    pub content: String,
    pub finish_reasons: Option<Vec<String>>,
    pub usage: Option<Usage>,
    pub cost: Option<f64>,
    pub tool_calls: Vec<ToolCall>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub prompt_template: Option<String>,
    pub metadata: Map<String, Value>,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

impl CallRecord {
    pub fn from_response<P: Provider>(kind: CallKind, response: &CallResponse<P>) -> Self {
        let context = response.context();
        Self {
            kind,
            provider: P::NAME,
            model: response.model().unwrap_or_else(|| context.model().to_string()),
            id: response.id(),
            content: response.content(),
            finish_reasons: response.finish_reasons(),
            usage: response.usage(),
            cost: response.cost(),
            tool_calls: response.tool_calls(),
            duration: response.duration(),
            prompt_template: context.prompt_template().map(str::to_string),
            metadata: context.metadata().clone(),
        }
    }
}

pub trait CallObserver: Send + Sync {
    fn on_record(&self, record: &CallRecord);
}

/// Records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CallObserver for NoopObserver {
    fn on_record(&self, _record: &CallRecord) {}
}

pub fn noop_observer() -> Arc<dyn CallObserver> {
    Arc::new(NoopObserver)
}

/// Logs each record at `info` under the `ai_call::observer` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CallObserver for TracingObserver {
    fn on_record(&self, record: &CallRecord) {
        tracing::info!(
            target: "ai_call::observer",
            kind = ?record.kind,
            provider = record.provider,
            model = %record.model,
            input_tokens = record.usage.map(|u| u.input_tokens),
            output_tokens = record.usage.map(|u| u.output_tokens),
            cost = record.cost,
            tool_calls = record.tool_calls.len(),
            duration_ms = record.duration.as_millis() as u64,
            "call finished"
        );
    }
}

/// In-memory observer for tests; keeps at most `max_records`.
#[derive(Debug)]
pub struct InMemoryObserver {
    records: Mutex<Vec<CallRecord>>,
    max_records: usize,
}

impl InMemoryObserver {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            max_records,
        }
    }

    pub fn records(&self) -> Vec<CallRecord> {
        self.lock().clone()
    }

    pub fn records_of(&self, kind: CallKind) -> Vec<CallRecord> {
        self.lock()
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CallRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemoryObserver {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl CallObserver for InMemoryObserver {
    fn on_record(&self, record: &CallRecord) {
        let mut records = self.lock();
        records.push(record.clone());
        if records.len() > self.max_records {
            records.remove(0);
        }
    }
}

/// Install a global fmt subscriber. `RUST_LOG` takes precedence over `default_filter`.
///
/// Returns `false` when a global subscriber was already set.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: CallKind) -> CallRecord {
        CallRecord {
            kind,
            provider: "openai",
            model: "gpt-4o-mini".into(),
            id: None,
            content: "hi".into(),
            finish_reasons: Some(vec!["stop".into()]),
            usage: Some(Usage::new(1, 2)),
            cost: None,
            tool_calls: Vec::new(),
            duration: Duration::from_millis(12),
            prompt_template: None,
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_in_memory_observer_caps_records() {
        let observer = InMemoryObserver::new(2);
        observer.on_record(&record(CallKind::Call));
        observer.on_record(&record(CallKind::Stream));
        observer.on_record(&record(CallKind::Extract));
        assert_eq!(observer.len(), 2);
        assert_eq!(observer.records()[0].kind, CallKind::Stream);
        assert_eq!(observer.records_of(CallKind::Extract).len(), 1);
        observer.clear();
        assert!(observer.is_empty());
    }

    #[test]
    fn test_record_serializes_duration_in_ms() {
        let v = serde_json::to_value(record(CallKind::StructuredStream)).unwrap();
        assert_eq!(v["duration"], 12);
        assert_eq!(v["kind"], "structured_stream");
    }

    #[test]
    fn test_noop_and_tracing_observers_accept_records() {
        noop_observer().on_record(&record(CallKind::Call));
        TracingObserver.on_record(&record(CallKind::Call));
    }
}
