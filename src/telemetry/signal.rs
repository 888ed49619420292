// src/telemetry/signal.rs
use opentelemetry::trace::Span as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::Span;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Key/value attributes attached to a metric recording or span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn to_key_values(&self) -> Vec<KeyValue> {
        self.0
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Attributes
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// An instrumented component. Its name becomes the instrumentation scope of
/// every span and metric it records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySource {
    pub(crate) name: Arc<str>,
}

impl TelemetrySource {
    pub(crate) fn new(name: &str) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An open span returned by `start_span`; hand it back to `end_span`.
pub struct SpanHandle {
    name: String,
    trace_id: String,
    span_id: String,
    span: Option<Span>,
}

impl SpanHandle {
    pub(crate) fn noop(name: &str) -> Self {
        Self {
            name: name.to_string(),
            trace_id: String::new(),
            span_id: String::new(),
            span: None,
        }
    }

    pub(crate) fn recording(name: &str, span: Span) -> Self {
        let context = span.span_context();
        Self {
            name: name.to_string(),
            trace_id: context.trace_id().to_string(),
            span_id: context.span_id().to_string(),
            span: Some(span),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 32 lowercase hex digits, empty when not recording.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// 16 lowercase hex digits, empty when not recording.
    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// False when the span was started while no exporter was active.
    pub fn is_recording(&self) -> bool {
        self.span.as_ref().is_some_and(|span| span.is_recording())
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if let Some(span) = &mut self.span {
            span.set_attribute(KeyValue::new(key.into(), value.into()));
        }
    }

    pub(crate) fn end(self) {
        if let Some(mut span) = self.span {
            span.end();
        }
    }
}

impl fmt::Debug for SpanHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanHandle")
            .field("name", &self.name)
            .field("trace_id", &self.trace_id)
            .field("span_id", &self.span_id)
            .field("recording", &self.span.is_some())
            .finish()
    }
}
