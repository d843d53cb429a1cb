use crate::model::{AttributeValue, HrTime};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Combine a `[seconds, nanos]` pair into nanoseconds since the Unix epoch.
///
/// Saturates at `u64::MAX`, around the year 2554.
pub fn hr_time_to_nanos(time: HrTime) -> u64 {
    time.seconds
        .saturating_mul(NANOS_PER_SECOND)
        .saturating_add(u64::from(time.nanos))
}

/// A tagged wire value. Exactly one variant key is written, or none for [`AnyValue::Empty`].
#[derive(Clone, Debug, PartialEq)]
pub enum AnyValue {
    /// `{"stringValue": ...}`
    StringValue(String),
    /// `{"intValue": ...}`
    IntValue(i64),
    /// `{"doubleValue": ...}`
    DoubleValue(f64),
    /// `{"boolValue": ...}`
    BoolValue(bool),
    /// `{"bytesValue": "<base64>"}`
    BytesValue(Vec<u8>),
    /// `{"arrayValue": {"values": [...]}}`
    ArrayValue(ArrayValue),
    /// `{"kvlistValue": {"values": [...]}}`
    KvlistValue(KeyValueList),
    /// `{}`, for values with no wire representation.
    Empty,
}

impl Serialize for AnyValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = if matches!(self, AnyValue::Empty) { 0 } else { 1 };
        let mut map = serializer.serialize_map(Some(len))?;
        match self {
            AnyValue::StringValue(s) => map.serialize_entry("stringValue", s)?,
            AnyValue::IntValue(i) => map.serialize_entry("intValue", i)?,
            AnyValue::DoubleValue(d) => map.serialize_entry("doubleValue", d)?,
            AnyValue::BoolValue(b) => map.serialize_entry("boolValue", b)?,
            AnyValue::BytesValue(b) => map.serialize_entry("bytesValue", &STANDARD.encode(b))?,
            AnyValue::ArrayValue(a) => map.serialize_entry("arrayValue", a)?,
            AnyValue::KvlistValue(kv) => map.serialize_entry("kvlistValue", kv)?,
            AnyValue::Empty => {}
        }
        map.end()
    }
}

/// Wire form of a list value.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ArrayValue {
    /// Converted elements, in order.
    pub values: Vec<AnyValue>,
}

/// Wire form of a nested map value.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct KeyValueList {
    /// Converted entries, in order.
    pub values: Vec<KeyValue>,
}

/// Wire form of an attribute.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KeyValue {
    /// Attribute name.
    pub key: String,
    /// Attribute value.
    pub value: AnyValue,
}

/// Convert an attribute value into its tagged wire form.
///
/// Checked in order: string, number (integral numbers become `intValue`),
/// boolean, bytes, array, map. Anything else becomes [`AnyValue::Empty`].
pub fn to_any_value(value: &AttributeValue) -> AnyValue {
    match value {
        AttributeValue::String(s) => AnyValue::StringValue(s.clone()),
        AttributeValue::I64(i) => AnyValue::IntValue(*i),
        AttributeValue::F64(f) => match integral(*f) {
            Some(i) => AnyValue::IntValue(i),
            None => AnyValue::DoubleValue(*f),
        },
        AttributeValue::Bool(b) => AnyValue::BoolValue(*b),
        AttributeValue::Bytes(b) => AnyValue::BytesValue(b.clone()),
        AttributeValue::Array(values) => AnyValue::ArrayValue(ArrayValue {
            values: values.iter().map(to_any_value).collect(),
        }),
        AttributeValue::Map(entries) => AnyValue::KvlistValue(KeyValueList {
            values: convert_attributes(entries),
        }),
        AttributeValue::Null => AnyValue::Empty,
    }
}

// Integral doubles outside the i64 range stay doubles.
fn integral(f: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    if f.is_finite() && f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

/// Convert a single attribute.
pub fn convert_key_value(kv: &crate::model::KeyValue) -> KeyValue {
    KeyValue {
        key: kv.key.clone(),
        value: to_any_value(&kv.value),
    }
}

/// Convert an attribute set, keeping its order.
pub fn convert_attributes(attributes: &[crate::model::KeyValue]) -> Vec<KeyValue> {
    attributes.iter().map(convert_key_value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KeyValue as Attr;
    use serde_json::json;

    fn to_json(value: &AnyValue) -> serde_json::Value {
        serde_json::to_value(value).unwrap()
    }

    #[test]
    fn combines_time_pair_into_nanos() {
        assert_eq!(
            hr_time_to_nanos(HrTime::new(1_700_000_000, 123_456_789)),
            1_700_000_000_123_456_789
        );
        assert_eq!(hr_time_to_nanos(HrTime::new(0, 7)), 7);
        assert_eq!(hr_time_to_nanos(HrTime::new(u64::MAX, 1)), u64::MAX);
    }

    #[test]
    fn converts_scalars_in_order() {
        let attributes = vec![
            Attr::new("a", "x"),
            Attr::new("b", 3),
            Attr::new("c", 3.5),
            Attr::new("d", true),
        ];

        let converted = serde_json::to_value(convert_attributes(&attributes)).unwrap();

        assert_eq!(
            converted,
            json!([
                {"key": "a", "value": {"stringValue": "x"}},
                {"key": "b", "value": {"intValue": 3}},
                {"key": "c", "value": {"doubleValue": 3.5}},
                {"key": "d", "value": {"boolValue": true}},
            ])
        );
    }

    #[test]
    fn integral_double_becomes_int() {
        assert_eq!(
            to_any_value(&AttributeValue::F64(42.0)),
            AnyValue::IntValue(42)
        );
        assert_eq!(
            to_any_value(&AttributeValue::F64(-0.25)),
            AnyValue::DoubleValue(-0.25)
        );
        assert_eq!(
            to_any_value(&AttributeValue::F64(1e300)),
            AnyValue::DoubleValue(1e300)
        );
        assert!(matches!(
            to_any_value(&AttributeValue::F64(f64::NAN)),
            AnyValue::DoubleValue(d) if d.is_nan()
        ));
    }

    #[test]
    fn nested_values_recurse() {
        let value = AttributeValue::Array(vec![
            AttributeValue::from("gps"),
            AttributeValue::Map(vec![
                Attr::new("lat", -6.2),
                Attr::new("accurate", false),
            ]),
        ]);

        assert_eq!(
            to_json(&to_any_value(&value)),
            json!({"arrayValue": {"values": [
                {"stringValue": "gps"},
                {"kvlistValue": {"values": [
                    {"key": "lat", "value": {"doubleValue": -6.2}},
                    {"key": "accurate", "value": {"boolValue": false}},
                ]}},
            ]}})
        );
    }

    #[test]
    fn bytes_are_base64() {
        let value = to_any_value(&AttributeValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(to_json(&value), json!({"bytesValue": "3q2+7w=="}));
    }

    #[test]
    fn null_becomes_empty_object() {
        let value = to_any_value(&AttributeValue::Null);
        assert_eq!(value, AnyValue::Empty);
        assert_eq!(to_json(&value), json!({}));
    }

    #[test]
    fn every_variant_writes_at_most_one_key() {
        let values = [
            AttributeValue::from("s"),
            AttributeValue::I64(1),
            AttributeValue::F64(1.5),
            AttributeValue::Bool(true),
            AttributeValue::Bytes(vec![1]),
            AttributeValue::Array(vec![]),
            AttributeValue::Map(vec![]),
            AttributeValue::Null,
        ];
        for value in &values {
            let json = to_json(&to_any_value(value));
            let keys = json.as_object().map(|o| o.len()).unwrap_or_default();
            assert!(keys <= 1, "{value:?} produced {json}");
        }
    }
}
