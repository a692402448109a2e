//! Telemetry span tree.
//!
//! Spans form a strict tree: every child ends before or at the time its
//! parent ends, and a span is immutable once ended. Ending a span with
//! error status propagates an error marker up to the root so backend
//! exporters can flag the whole run.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, Weak},
    time::Instant,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Terminal state of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// A point event recorded inside a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanEvent {
    pub name: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Exported, immutable form of a finished span tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanData {
    pub name: String,
    pub status: SpanStatus,
    /// Set when this span or any descendant ended with error status.
    pub error_marker: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SpanEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SpanData>,
}

impl SpanData {
    /// Depth-first lookup by span name.
    pub fn find(&self, name: &str) -> Option<&SpanData> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    /// Every span in the tree, depth-first.
    pub fn flatten(&self) -> Vec<&SpanData> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }
}

struct SpanInner {
    name: String,
    attributes: BTreeMap<String, serde_json::Value>,
    events: Vec<SpanEvent>,
    status: SpanStatus,
    error_marker: bool,
    started_at: DateTime<Utc>,
    started_instant: Instant,
    ended_at: Option<DateTime<Utc>>,
    duration_ms: u64,
    parent: Weak<Mutex<SpanInner>>,
    children: Vec<Arc<Mutex<SpanInner>>>,
}

impl SpanInner {
    fn export(&self) -> SpanData {
        SpanData {
            name: self.name.clone(),
            status: self.status,
            error_marker: self.error_marker,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_ms: self.duration_ms,
            attributes: self.attributes.clone(),
            events: self.events.clone(),
            children: self
                .children
                .iter()
                .map(|child| child.lock().expect("span lock poisoned").export())
                .collect(),
        }
    }
}

/// A live span. Handles are cheap clones over shared state.
#[derive(Clone)]
pub struct Span {
    inner: Arc<Mutex<SpanInner>>,
}

impl Span {
    fn new(name: &str, parent: Weak<Mutex<SpanInner>>) -> Span {
        Span {
            inner: Arc::new(Mutex::new(SpanInner {
                name: name.to_string(),
                attributes: BTreeMap::new(),
                events: Vec::new(),
                status: SpanStatus::Ok,
                error_marker: false,
                started_at: Utc::now(),
                started_instant: Instant::now(),
                ended_at: None,
                duration_ms: 0,
                parent,
                children: Vec::new(),
            })),
        }
    }

    pub fn name(&self) -> String {
        self.inner.lock().expect("span lock poisoned").name.clone()
    }

    /// Start a child span. Children must end before this span ends.
    pub fn start_child(&self, name: &str) -> Span {
        let child = Span::new(name, Arc::downgrade(&self.inner));
        let mut inner = self.inner.lock().expect("span lock poisoned");
        if inner.ended_at.is_some() {
            warn!("span `{}` already ended; child `{name}` will be orphaned", inner.name);
        }
        inner.children.push(child.inner.clone());
        child
    }

    /// Set an attribute. Ignored with a warning after the span has ended.
    pub fn set_attribute(&self, key: impl Into<String>, value: serde_json::Value) {
        let mut inner = self.inner.lock().expect("span lock poisoned");
        if inner.ended_at.is_some() {
            warn!("span `{}` already ended; attribute dropped", inner.name);
            return;
        }
        inner.attributes.insert(key.into(), value);
    }

    /// Record a point event on the span.
    pub fn add_event(
        &self,
        name: impl Into<String>,
        attributes: BTreeMap<String, serde_json::Value>,
    ) {
        let mut inner = self.inner.lock().expect("span lock poisoned");
        if inner.ended_at.is_some() {
            warn!("span `{}` already ended; event dropped", inner.name);
            return;
        }
        inner.events.push(SpanEvent {
            name: name.into(),
            at: Utc::now(),
            attributes,
        });
    }

    /// End the span. A second end is ignored with a warning. Ending with
    /// error status marks every ancestor's error marker.
    pub fn end(&self, status: SpanStatus) {
        let parent = {
            let mut inner = self.inner.lock().expect("span lock poisoned");
            if inner.ended_at.is_some() {
                warn!("span `{}` ended twice", inner.name);
                return;
            }
            inner.ended_at = Some(Utc::now());
            inner.duration_ms = inner.started_instant.elapsed().as_millis() as u64;
            inner.status = status;
            if status == SpanStatus::Error {
                inner.error_marker = true;
                inner.parent.clone()
            } else {
                Weak::new()
            }
        };
        // Walk ancestors outside our own lock to keep lock order child→parent.
        let mut current = parent.upgrade();
        while let Some(ancestor) = current {
            let mut inner = ancestor.lock().expect("span lock poisoned");
            inner.error_marker = true;
            current = inner.parent.upgrade();
        }
    }

    /// End with additional attributes set atomically with the end.
    pub fn end_with_attributes(
        &self,
        status: SpanStatus,
        attributes: BTreeMap<String, serde_json::Value>,
    ) {
        {
            let mut inner = self.inner.lock().expect("span lock poisoned");
            if inner.ended_at.is_none() {
                inner.attributes.extend(attributes);
            }
        }
        self.end(status);
    }

    pub fn is_ended(&self) -> bool {
        self.inner
            .lock()
            .expect("span lock poisoned")
            .ended_at
            .is_some()
    }

    fn export(&self) -> SpanData {
        self.inner.lock().expect("span lock poisoned").export()
    }
}

/// Exporter port for telemetry backends.
#[async_trait]
pub trait TelemetryExporter: Send + Sync {
    async fn export_spans(&self, root: SpanData);
}

/// A no-op exporter for builds without telemetry configured.
pub struct NullExporter;

#[async_trait]
impl TelemetryExporter for NullExporter {
    async fn export_spans(&self, _root: SpanData) {}
}

/// One telemetry session: a root span plus the exporter it flushes to.
pub struct TelemetrySession {
    root: Span,
    exporter: Arc<dyn TelemetryExporter>,
}

impl TelemetrySession {
    pub fn new(root_name: &str, exporter: Arc<dyn TelemetryExporter>) -> Self {
        Self {
            root: Span::new(root_name, Weak::new()),
            exporter,
        }
    }

    pub fn root(&self) -> &Span {
        &self.root
    }

    /// Export the tree as it stands. Invoked on success and error paths
    /// alike.
    pub async fn export(&self) -> SpanData {
        let data = self.root.export();
        self.exporter.export_spans(data.clone()).await;
        data
    }
}
