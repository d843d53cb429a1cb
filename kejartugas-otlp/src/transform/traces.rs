use crate::model::{self, SpanRecord};
use crate::transform::common::{convert_attributes, hr_time_to_nanos, KeyValue};
use serde::Serialize;

/// The request body posted to the collector's `/v1/traces` endpoint.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTraceServiceRequest {
    /// Always a single entry, see [`build_resource_spans`].
    pub resource_spans: Vec<ResourceSpans>,
}

impl ExportTraceServiceRequest {
    /// Serialize into compact JSON bytes.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Spans grouped under the resource that produced them.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    /// The producing resource.
    pub resource: Resource,
    /// Always a single entry.
    pub scope_spans: Vec<ScopeSpans>,
}

/// Wire form of the producing resource.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Resource {
    /// Resource attributes, empty when the resource has none.
    pub attributes: Vec<KeyValue>,
}

/// Spans grouped under the instrumentation that produced them.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScopeSpans {
    /// The producing instrumentation.
    pub scope: Scope,
    /// Every span of the batch.
    pub spans: Vec<Span>,
}

/// Wire form of the instrumentation scope. Absent fields are not written.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Scope {
    /// Instrumentation name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Instrumentation version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Wire form of a finished span.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    /// Hex encoded trace id.
    pub trace_id: String,
    /// Hex encoded span id.
    pub span_id: String,
    /// Hex encoded parent span id, absent for root spans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    /// W3C `tracestate` header value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_state: Option<String>,
    /// Operation name.
    pub name: String,
    /// `0` is unspecified; recorded kinds are shifted up by one.
    pub kind: i32,
    /// Start time in nanoseconds since the Unix epoch.
    pub start_time_unix_nano: u64,
    /// End time in nanoseconds since the Unix epoch.
    pub end_time_unix_nano: u64,
    /// Span attributes in recording order.
    pub attributes: Vec<KeyValue>,
    /// Attributes discarded by the recorder.
    pub dropped_attributes_count: u32,
    /// Events discarded by the recorder.
    pub dropped_events_count: u32,
    /// Timed events.
    pub events: Vec<Event>,
    /// Final status.
    pub status: Status,
    /// Links to other spans.
    pub links: Vec<Link>,
    /// Unlike the other dropped counters this one is passed through as recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped_links_count: Option<u32>,
}

/// Wire form of a span event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event attributes.
    pub attributes: Vec<KeyValue>,
    /// Event name.
    pub name: String,
    /// Event time in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,
    /// Attributes discarded by the recorder.
    pub dropped_attributes_count: u32,
}

/// Wire form of a link to another span.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    /// Link attributes.
    pub attributes: Vec<KeyValue>,
    /// Hex encoded id of the linked span.
    pub span_id: String,
    /// Hex encoded trace id of the linked span.
    pub trace_id: String,
    /// W3C `tracestate` of the linked span.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_state: Option<String>,
    /// Attributes discarded by the recorder.
    pub dropped_attributes_count: u32,
}

/// Wire form of the span status.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Status {
    /// `0` unset, `1` ok, `2` error.
    pub code: i32,
    /// Description, written only when recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Build the export envelope for a batch.
///
/// The resource and the instrumentation scope are taken from the first span
/// and applied to the whole batch; spans from other resources are not
/// regrouped. Every span of the batch ends up under the single scope entry.
pub fn build_resource_spans(spans: &[SpanRecord]) -> ExportTraceServiceRequest {
    let first = spans.first();
    let resource = Resource {
        attributes: first
            .map(|span| convert_attributes(&span.resource.attributes))
            .unwrap_or_default(),
    };
    let scope = first
        .map(|span| Scope {
            name: span.instrumentation_scope.name.clone(),
            version: span.instrumentation_scope.version.clone(),
        })
        .unwrap_or_default();

    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource,
            scope_spans: vec![ScopeSpans {
                scope,
                spans: spans.iter().map(convert_span).collect(),
            }],
        }],
    }
}

/// Convert one span record.
pub fn convert_span(span: &SpanRecord) -> Span {
    Span {
        trace_id: span.trace_id.clone(),
        span_id: span.span_id.clone(),
        parent_span_id: span.parent_span_id.clone(),
        trace_state: span.trace_state.as_ref().map(model::TraceState::header),
        name: span.name.clone(),
        kind: span.kind.map_or(0, |kind| kind as i32 + 1),
        start_time_unix_nano: hr_time_to_nanos(span.start_time),
        end_time_unix_nano: hr_time_to_nanos(span.end_time),
        attributes: convert_attributes(&span.attributes),
        dropped_attributes_count: span.dropped_attributes_count.unwrap_or(0),
        dropped_events_count: span.dropped_events_count.unwrap_or(0),
        events: span.events.iter().map(convert_event).collect(),
        status: Status {
            code: span.status.code as i32,
            message: span.status.message.clone(),
        },
        links: span.links.iter().map(convert_link).collect(),
        dropped_links_count: span.dropped_links_count,
    }
}

/// Convert one span event.
pub fn convert_event(event: &model::Event) -> Event {
    Event {
        attributes: convert_attributes(&event.attributes),
        name: event.name.clone(),
        time_unix_nano: hr_time_to_nanos(event.time),
        dropped_attributes_count: event.dropped_attributes_count.unwrap_or(0),
    }
}

/// Convert one span link.
pub fn convert_link(link: &model::Link) -> Link {
    Link {
        attributes: convert_attributes(&link.attributes),
        span_id: link.span_id.clone(),
        trace_id: link.trace_id.clone(),
        trace_state: link.trace_state.as_ref().map(model::TraceState::header),
        dropped_attributes_count: link.dropped_attributes_count.unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Event as SpanEvent, HrTime, InstrumentationScope, KeyValue as Attr, Link as SpanLink,
        Resource as SpanResource, SpanKind, Status as SpanStatus, TraceState,
    };
    use serde_json::json;
    use std::sync::Arc;

    const TRACE_ID: &str = "5b8efff798038103d269b633813fc60c";

    fn app_resource() -> Arc<SpanResource> {
        Arc::new(SpanResource::new([
            Attr::new("service.name", "kejartugas-mobile"),
            Attr::new("deployment.environment", "staging"),
        ]))
    }

    fn attendance_span(span_id: &str, resource: Arc<SpanResource>) -> SpanRecord {
        SpanRecord::builder(TRACE_ID, span_id, "attendance.check_in")
            .with_kind(SpanKind::Client)
            .with_times((1_700_000_000, 123_456_789), (1_700_000_001, 0))
            .with_resource(resource)
            .with_instrumentation_scope(InstrumentationScope::new("fetch").with_version("0.1.0"))
            .build()
    }

    #[test]
    fn kind_is_shifted_by_one() {
        let kinds = [
            (SpanKind::Internal, 1),
            (SpanKind::Server, 2),
            (SpanKind::Client, 3),
            (SpanKind::Producer, 4),
            (SpanKind::Consumer, 5),
        ];
        for (kind, expected) in kinds {
            let span = SpanRecord::builder(TRACE_ID, "1", "op").with_kind(kind).build();
            assert_eq!(convert_span(&span).kind, expected, "{kind:?}");
        }

        let unset = SpanRecord::builder(TRACE_ID, "1", "op").build();
        assert_eq!(convert_span(&unset).kind, 0);
    }

    #[test]
    fn span_times_are_exact_nanos() {
        let span = convert_span(&attendance_span("00f067aa0ba902b7", app_resource()));
        assert_eq!(span.start_time_unix_nano, 1_700_000_000_123_456_789);
        assert_eq!(span.end_time_unix_nano, 1_700_000_001_000_000_000);

        let json = serde_json::to_value(&span).unwrap();
        assert_eq!(json["startTimeUnixNano"], json!(1_700_000_000_123_456_789u64));
    }

    #[test]
    fn empty_collections_serialize_as_empty_arrays() {
        let span = SpanRecord::builder(TRACE_ID, "00f067aa0ba902b7", "idle").build();

        let json = serde_json::to_value(convert_span(&span)).unwrap();

        assert_eq!(json["attributes"], json!([]));
        assert_eq!(json["events"], json!([]));
        assert_eq!(json["links"], json!([]));
        assert_eq!(json["droppedAttributesCount"], json!(0));
        assert_eq!(json["droppedEventsCount"], json!(0));
    }

    #[test]
    fn absent_optionals_are_omitted() {
        let span = SpanRecord::builder(TRACE_ID, "00f067aa0ba902b7", "root").build();

        let json = serde_json::to_value(convert_span(&span)).unwrap();
        let object = json.as_object().unwrap();

        assert!(!object.contains_key("parentSpanId"));
        assert!(!object.contains_key("traceState"));
        assert!(!object.contains_key("droppedLinksCount"));
        assert_eq!(json["status"], json!({"code": 0}));
    }

    #[test]
    fn dropped_links_count_is_passed_through() {
        let span = SpanRecord::builder(TRACE_ID, "1", "op")
            .with_dropped_counts(Some(2), None, Some(0))
            .build();

        let converted = convert_span(&span);

        assert_eq!(converted.dropped_attributes_count, 2);
        assert_eq!(converted.dropped_events_count, 0);
        assert_eq!(converted.dropped_links_count, Some(0));
    }

    #[test]
    fn converts_full_span() {
        let span = SpanRecord::builder(TRACE_ID, "00f067aa0ba902b7", "task.approve")
            .with_parent_span_id("53995c3f42cd8ad8")
            .with_kind(SpanKind::Server)
            .with_times((10, 5), (11, 6))
            .with_attributes([Attr::new("task.id", 42), Attr::new("approved", true)])
            .with_events(vec![SpanEvent {
                dropped_attributes_count: Some(1),
                ..SpanEvent::new(
                    "photo.uploaded",
                    HrTime::new(10, 500),
                    vec![Attr::new("size", 2048)],
                )
            }])
            .with_links(vec![SpanLink {
                trace_state: Some(TraceState::from_key_value([("kt", "1")])),
                ..SpanLink::new(TRACE_ID, "1111111111111111", vec![])
            }])
            .with_status(SpanStatus::error("rejected"))
            .with_trace_state(TraceState::from_key_value([("kt", "mobile"), ("x", "y")]))
            .build();

        let json = serde_json::to_value(convert_span(&span)).unwrap();

        assert_eq!(
            json,
            json!({
                "traceId": TRACE_ID,
                "spanId": "00f067aa0ba902b7",
                "parentSpanId": "53995c3f42cd8ad8",
                "traceState": "kt=mobile,x=y",
                "name": "task.approve",
                "kind": 2,
                "startTimeUnixNano": 10_000_000_005u64,
                "endTimeUnixNano": 11_000_000_006u64,
                "attributes": [
                    {"key": "task.id", "value": {"intValue": 42}},
                    {"key": "approved", "value": {"boolValue": true}},
                ],
                "droppedAttributesCount": 0,
                "droppedEventsCount": 0,
                "events": [{
                    "attributes": [{"key": "size", "value": {"intValue": 2048}}],
                    "name": "photo.uploaded",
                    "timeUnixNano": 10_000_000_500u64,
                    "droppedAttributesCount": 1,
                }],
                "status": {"code": 2, "message": "rejected"},
                "links": [{
                    "attributes": [],
                    "spanId": "1111111111111111",
                    "traceId": TRACE_ID,
                    "traceState": "kt=1",
                    "droppedAttributesCount": 0,
                }],
            })
        );
    }

    #[test]
    fn batch_shares_one_resource_and_scope() {
        let resource = app_resource();
        let spans = vec![
            attendance_span("0000000000000001", resource.clone()),
            attendance_span("0000000000000002", resource.clone()),
            attendance_span("0000000000000003", resource),
        ];

        let request = build_resource_spans(&spans);

        assert_eq!(request.resource_spans.len(), 1);
        let resource_spans = &request.resource_spans[0];
        assert_eq!(resource_spans.resource.attributes.len(), 2);
        assert_eq!(resource_spans.scope_spans.len(), 1);
        let scope_spans = &resource_spans.scope_spans[0];
        assert_eq!(scope_spans.scope.name.as_deref(), Some("fetch"));
        assert_eq!(scope_spans.scope.version.as_deref(), Some("0.1.0"));
        let ids: Vec<_> = scope_spans.spans.iter().map(|s| s.span_id.as_str()).collect();
        assert_eq!(
            ids,
            ["0000000000000001", "0000000000000002", "0000000000000003"]
        );
    }

    #[test]
    fn resource_is_taken_from_first_span_only() {
        let other = Arc::new(SpanResource::new([Attr::new("service.name", "other")]));
        let spans = vec![
            attendance_span("0000000000000001", app_resource()),
            attendance_span("0000000000000002", other),
        ];

        let request = build_resource_spans(&spans);

        assert_eq!(request.resource_spans.len(), 1);
        let attributes = serde_json::to_value(&request.resource_spans[0].resource).unwrap();
        assert_eq!(
            attributes["attributes"][0],
            json!({"key": "service.name", "value": {"stringValue": "kejartugas-mobile"}})
        );
        assert_eq!(request.resource_spans[0].scope_spans[0].spans.len(), 2);
    }

    #[test]
    fn scope_without_name_omits_keys() {
        let span = SpanRecord::builder(TRACE_ID, "1", "op").build();

        let json = serde_json::to_value(build_resource_spans(&[span])).unwrap();

        assert_eq!(json["resourceSpans"][0]["scopeSpans"][0]["scope"], json!({}));
        assert_eq!(json["resourceSpans"][0]["resource"], json!({"attributes": []}));
    }

    #[test]
    fn empty_batch_builds_empty_envelope() {
        let json = serde_json::to_value(build_resource_spans(&[])).unwrap();

        assert_eq!(
            json,
            json!({"resourceSpans": [{
                "resource": {"attributes": []},
                "scopeSpans": [{"scope": {}, "spans": []}],
            }]})
        );
    }

    #[test]
    fn conversion_is_deterministic() {
        let spans = vec![
            attendance_span("0000000000000001", app_resource()),
            attendance_span("0000000000000002", app_resource()),
        ];

        let first = build_resource_spans(&spans).to_json().unwrap();
        let second = build_resource_spans(&spans).to_json().unwrap();

        assert_eq!(first, second);
    }
}
