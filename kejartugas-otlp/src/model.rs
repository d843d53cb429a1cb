//! In-memory span records handed to the exporter.
//!
//! These records are produced by the span-recording layer once a span has
//! ended. The exporter only reads them.
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A point in time as a `[seconds, nanosecond remainder]` pair since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HrTime {
    /// Whole seconds since the epoch.
    pub seconds: u64,
    /// Nanoseconds past `seconds`, below one second.
    pub nanos: u32,
}

impl HrTime {
    /// Create a time pair.
    pub const fn new(seconds: u64, nanos: u32) -> Self {
        HrTime { seconds, nanos }
    }

    /// The current wall clock time.
    pub fn now() -> Self {
        SystemTime::now().into()
    }
}

impl From<(u64, u32)> for HrTime {
    fn from((seconds, nanos): (u64, u32)) -> Self {
        HrTime { seconds, nanos }
    }
}

impl From<SystemTime> for HrTime {
    fn from(time: SystemTime) -> Self {
        let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        HrTime {
            seconds: since_epoch.as_secs(),
            nanos: since_epoch.subsec_nanos(),
        }
    }
}

/// The role a span plays in a trace, numbered the way the recording layer numbers it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// Internal operation within an application.
    Internal = 0,
    /// Server side handling of a remote request.
    Server = 1,
    /// Outgoing request to a remote service.
    Client = 2,
    /// Initiator of an asynchronous request.
    Producer = 3,
    /// Receiver of an asynchronous request.
    Consumer = 4,
}

/// A dynamically typed attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    /// UTF-8 text.
    String(String),
    /// Signed integer.
    I64(i64),
    /// Floating point number. Integral values are still exported as integers.
    F64(f64),
    /// Boolean.
    Bool(bool),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered list of values.
    Array(Vec<AttributeValue>),
    /// Nested key-value map.
    Map(Vec<KeyValue>),
    /// A value that has no wire representation.
    Null,
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<Cow<'static, str>> for AttributeValue {
    fn from(s: Cow<'static, str>) -> Self {
        AttributeValue::String(s.into_owned())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::I64(i)
    }
}

impl From<i32> for AttributeValue {
    fn from(i: i32) -> Self {
        AttributeValue::I64(i.into())
    }
}

impl From<u32> for AttributeValue {
    fn from(i: u32) -> Self {
        AttributeValue::I64(i.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::F64(f)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(b: Vec<u8>) -> Self {
        AttributeValue::Bytes(b)
    }
}

impl From<Vec<AttributeValue>> for AttributeValue {
    fn from(values: Vec<AttributeValue>) -> Self {
        AttributeValue::Array(values)
    }
}

impl From<Vec<KeyValue>> for AttributeValue {
    fn from(entries: Vec<KeyValue>) -> Self {
        AttributeValue::Map(entries)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(AttributeValue::Null, Into::into)
    }
}

/// A key-value pair. Attribute sets keep their entries in insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue {
    /// The attribute name.
    pub key: String,
    /// The attribute value.
    pub value: AttributeValue,
}

impl KeyValue {
    /// Create a new key-value pair.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Vendor specific trace identification carried alongside a span context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceState(Vec<(String, String)>);

impl TraceState {
    /// Build a trace state from `key=value` entries, most recent first.
    pub fn from_key_value<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        TraceState(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Look up the value stored for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize into the `tracestate` header form, `k1=v1,k2=v2`.
    pub fn header(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for TraceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header())
    }
}

/// Outcome code of a span.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// No outcome was recorded.
    #[default]
    Unset = 0,
    /// The operation completed successfully.
    Ok = 1,
    /// The operation failed.
    Error = 2,
}

/// The `{code, message}` outcome of a span.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    /// Outcome code.
    pub code: StatusCode,
    /// Optional description, usually only set for errors.
    pub message: Option<String>,
}

impl Status {
    /// Successful outcome.
    pub fn ok() -> Self {
        Status {
            code: StatusCode::Ok,
            message: None,
        }
    }

    /// Failed outcome with a description.
    pub fn error(message: impl Into<String>) -> Self {
        Status {
            code: StatusCode::Error,
            message: Some(message.into()),
        }
    }
}

/// A timed annotation recorded during a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Event name.
    pub name: String,
    /// When the event happened.
    pub time: HrTime,
    /// Event attributes.
    pub attributes: Vec<KeyValue>,
    /// Number of attributes the recorder discarded, if it tracked them.
    pub dropped_attributes_count: Option<u32>,
}

impl Event {
    /// Create an event with no dropped attributes recorded.
    pub fn new(name: impl Into<String>, time: HrTime, attributes: Vec<KeyValue>) -> Self {
        Event {
            name: name.into(),
            time,
            attributes,
            dropped_attributes_count: None,
        }
    }
}

/// A reference from a span to another span.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    /// Trace id of the linked span.
    pub trace_id: String,
    /// Span id of the linked span.
    pub span_id: String,
    /// Trace state of the linked span context.
    pub trace_state: Option<TraceState>,
    /// Link attributes.
    pub attributes: Vec<KeyValue>,
    /// Number of attributes the recorder discarded, if it tracked them.
    pub dropped_attributes_count: Option<u32>,
}

impl Link {
    /// Create a link without trace state.
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        attributes: Vec<KeyValue>,
    ) -> Self {
        Link {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            trace_state: None,
            attributes,
            dropped_attributes_count: None,
        }
    }
}

/// Attributes describing the process that produced the spans.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resource {
    /// Resource attributes such as `service.name`.
    pub attributes: Vec<KeyValue>,
}

impl Resource {
    /// Create a resource from its attributes.
    pub fn new<T: IntoIterator<Item = KeyValue>>(attributes: T) -> Self {
        Resource {
            attributes: attributes.into_iter().collect(),
        }
    }

    /// Whether the resource carries no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Identifies the instrumentation that produced a span.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstrumentationScope {
    /// Instrumentation name.
    pub name: Option<String>,
    /// Instrumentation version.
    pub version: Option<String>,
}

impl InstrumentationScope {
    /// Create a scope with a name and no version.
    pub fn new(name: impl Into<String>) -> Self {
        InstrumentationScope {
            name: Some(name.into()),
            version: None,
        }
    }

    /// Attach a version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// A finished span as handed over by the recording layer.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanRecord {
    /// Hex encoded trace id.
    pub trace_id: String,
    /// Hex encoded span id.
    pub span_id: String,
    /// Hex encoded parent span id, absent for root spans.
    pub parent_span_id: Option<String>,
    /// Operation name.
    pub name: String,
    /// Span kind, `None` when the recorder left it unset.
    pub kind: Option<SpanKind>,
    /// Start time.
    pub start_time: HrTime,
    /// End time.
    pub end_time: HrTime,
    /// Span attributes.
    pub attributes: Vec<KeyValue>,
    /// Attributes discarded by the recorder.
    pub dropped_attributes_count: Option<u32>,
    /// Events discarded by the recorder.
    pub dropped_events_count: Option<u32>,
    /// Links discarded by the recorder.
    pub dropped_links_count: Option<u32>,
    /// Events in recording order.
    pub events: Vec<Event>,
    /// Links in recording order.
    pub links: Vec<Link>,
    /// Span outcome.
    pub status: Status,
    /// Vendor trace state.
    pub trace_state: Option<TraceState>,
    /// Producing process. Shared by every span of a provider.
    pub resource: Arc<Resource>,
    /// Producing instrumentation.
    pub instrumentation_scope: InstrumentationScope,
}

impl SpanRecord {
    /// Start building a span record. Unset fields take their empty defaults.
    pub fn builder(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        name: impl Into<String>,
    ) -> SpanRecordBuilder {
        SpanRecordBuilder {
            record: SpanRecord {
                trace_id: trace_id.into(),
                span_id: span_id.into(),
                parent_span_id: None,
                name: name.into(),
                kind: None,
                start_time: HrTime::default(),
                end_time: HrTime::default(),
                attributes: Vec::new(),
                dropped_attributes_count: None,
                dropped_events_count: None,
                dropped_links_count: None,
                events: Vec::new(),
                links: Vec::new(),
                status: Status::default(),
                trace_state: None,
                resource: Arc::new(Resource::default()),
                instrumentation_scope: InstrumentationScope::default(),
            },
        }
    }
}

/// Builder for [`SpanRecord`].
#[derive(Debug)]
pub struct SpanRecordBuilder {
    record: SpanRecord,
}

impl SpanRecordBuilder {
    /// Set the parent span id.
    pub fn with_parent_span_id(mut self, parent_span_id: impl Into<String>) -> Self {
        self.record.parent_span_id = Some(parent_span_id.into());
        self
    }

    /// Set the span kind.
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.record.kind = Some(kind);
        self
    }

    /// Set start and end times.
    pub fn with_times(mut self, start: impl Into<HrTime>, end: impl Into<HrTime>) -> Self {
        self.record.start_time = start.into();
        self.record.end_time = end.into();
        self
    }

    /// Set the span attributes.
    pub fn with_attributes<T: IntoIterator<Item = KeyValue>>(mut self, attributes: T) -> Self {
        self.record.attributes = attributes.into_iter().collect();
        self
    }

    /// Set the dropped counters for attributes, events and links.
    pub fn with_dropped_counts(
        mut self,
        attributes: Option<u32>,
        events: Option<u32>,
        links: Option<u32>,
    ) -> Self {
        self.record.dropped_attributes_count = attributes;
        self.record.dropped_events_count = events;
        self.record.dropped_links_count = links;
        self
    }

    /// Set the events.
    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.record.events = events;
        self
    }

    /// Set the links.
    pub fn with_links(mut self, links: Vec<Link>) -> Self {
        self.record.links = links;
        self
    }

    /// Set the status.
    pub fn with_status(mut self, status: Status) -> Self {
        self.record.status = status;
        self
    }

    /// Set the trace state.
    pub fn with_trace_state(mut self, trace_state: TraceState) -> Self {
        self.record.trace_state = Some(trace_state);
        self
    }

    /// Set the producing resource.
    pub fn with_resource(mut self, resource: Arc<Resource>) -> Self {
        self.record.resource = resource;
        self
    }

    /// Set the instrumentation scope.
    pub fn with_instrumentation_scope(mut self, scope: InstrumentationScope) -> Self {
        self.record.instrumentation_scope = scope;
        self
    }

    /// Finish the record.
    pub fn build(self) -> SpanRecord {
        self.record
    }
}
