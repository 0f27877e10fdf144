//! Remote primitive types and their mapping to output values.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Digits a NUM column may have and still fit an `i32`.
const NUM_INT32_MAX_LEN: usize = 9;
/// Digits a NUM column may have and still fit an `i64`.
const NUM_INT64_MAX_LEN: usize = 19;

/// Data type tag of a remote field or parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RfcType {
    Char,
    Date,
    Bcd,
    Time,
    Byte,
    Num,
    Float,
    Int,
    Int1,
    Int2,
    Int8,
    String,
    XString,
    Structure,
    Table,
    AbapObject,
    /// Any tag the connector has no special handling for.
    Other(String),
}

impl RfcType {
    pub fn as_str(&self) -> &str {
        match self {
            RfcType::Char => "CHAR",
            RfcType::Date => "DATE",
            RfcType::Bcd => "BCD",
            RfcType::Time => "TIME",
            RfcType::Byte => "BYTE",
            RfcType::Num => "NUM",
            RfcType::Float => "FLOAT",
            RfcType::Int => "INT",
            RfcType::Int1 => "INT1",
            RfcType::Int2 => "INT2",
            RfcType::Int8 => "INT8",
            RfcType::String => "STRING",
            RfcType::XString => "XSTRING",
            RfcType::Structure => "STRUCTURE",
            RfcType::Table => "TABLE",
            RfcType::AbapObject => "ABAPOBJECT",
            RfcType::Other(tag) => tag,
        }
    }

    /// True for types that hold other elements rather than a single value.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            RfcType::Structure | RfcType::Table | RfcType::AbapObject
        )
    }
}

impl From<&str> for RfcType {
    fn from(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "CHAR" => RfcType::Char,
            "DATE" => RfcType::Date,
            "BCD" => RfcType::Bcd,
            "TIME" => RfcType::Time,
            "BYTE" => RfcType::Byte,
            "NUM" => RfcType::Num,
            "FLOAT" => RfcType::Float,
            "INT" => RfcType::Int,
            "INT1" => RfcType::Int1,
            "INT2" => RfcType::Int2,
            "INT8" => RfcType::Int8,
            "STRING" => RfcType::String,
            "XSTRING" => RfcType::XString,
            "STRUCTURE" => RfcType::Structure,
            "TABLE" => RfcType::Table,
            "ABAPOBJECT" => RfcType::AbapObject,
            _ => RfcType::Other(tag.to_string()),
        }
    }
}

impl From<String> for RfcType {
    fn from(tag: String) -> Self {
        RfcType::from(tag.as_str())
    }
}

impl From<RfcType> for String {
    fn from(value: RfcType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RfcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Representation a column value is read as when decoding output tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bytes,
    Int32,
    UInt8,
    Int16,
    Float64,
    Int64,
    String,
}

impl ValueKind {
    /// Maps a remote type tag and its declared length to the output kind.
    ///
    /// Unknown tags always fall back to `String`.
    pub fn for_field(data_type: &RfcType, length: usize) -> Self {
        match data_type {
            RfcType::Byte => ValueKind::Bytes,
            RfcType::Int => ValueKind::Int32,
            RfcType::Int1 => ValueKind::UInt8,
            RfcType::Int2 => ValueKind::Int16,
            RfcType::Float => ValueKind::Float64,
            RfcType::Num if length <= NUM_INT32_MAX_LEN => ValueKind::Int32,
            RfcType::Num if length <= NUM_INT64_MAX_LEN => ValueKind::Int64,
            _ => ValueKind::String,
        }
    }
}

/// A single value read from a remote container.
#[derive(Debug, Clone, PartialEq)]
pub enum RfcValue {
    Bytes(Vec<u8>),
    Int32(i32),
    UInt8(u8),
    Int16(i16),
    Float64(f64),
    Int64(i64),
    String(String),
}

impl RfcValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            RfcValue::Bytes(_) => ValueKind::Bytes,
            RfcValue::Int32(_) => ValueKind::Int32,
            RfcValue::UInt8(_) => ValueKind::UInt8,
            RfcValue::Int16(_) => ValueKind::Int16,
            RfcValue::Float64(_) => ValueKind::Float64,
            RfcValue::Int64(_) => ValueKind::Int64,
            RfcValue::String(_) => ValueKind::String,
        }
    }

    /// JSON form used in call results. Byte sequences are base64 encoded and
    /// non-finite floats become `null`.
    pub fn into_json(self) -> Value {
        match self {
            RfcValue::Bytes(bytes) => Value::String(STANDARD.encode(bytes)),
            RfcValue::Int32(v) => Value::from(v),
            RfcValue::UInt8(v) => Value::from(v),
            RfcValue::Int16(v) => Value::from(v),
            RfcValue::Float64(v) => Number::from_f64(v).map_or(Value::Null, Value::Number),
            RfcValue::Int64(v) => Value::from(v),
            RfcValue::String(s) => Value::String(s),
        }
    }
}

impl fmt::Display for RfcValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RfcValue::Bytes(bytes) => f.write_str(&STANDARD.encode(bytes)),
            RfcValue::Int32(v) => write!(f, "{v}"),
            RfcValue::UInt8(v) => write!(f, "{v}"),
            RfcValue::Int16(v) => write!(f, "{v}"),
            RfcValue::Float64(v) => write!(f, "{v}"),
            RfcValue::Int64(v) => write!(f, "{v}"),
            RfcValue::String(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn num_length_selects_integer_width() {
        assert_eq!(ValueKind::for_field(&RfcType::Num, 9), ValueKind::Int32);
        assert_eq!(ValueKind::for_field(&RfcType::Num, 10), ValueKind::Int64);
        assert_eq!(ValueKind::for_field(&RfcType::Num, 19), ValueKind::Int64);
        assert_eq!(ValueKind::for_field(&RfcType::Num, 20), ValueKind::String);
    }

    #[test]
    fn fixed_width_types_ignore_length() {
        assert_eq!(ValueKind::for_field(&RfcType::Int2, 0), ValueKind::Int16);
        assert_eq!(ValueKind::for_field(&RfcType::Int2, 40), ValueKind::Int16);
        assert_eq!(ValueKind::for_field(&RfcType::Int, 4), ValueKind::Int32);
        assert_eq!(ValueKind::for_field(&RfcType::Int1, 1), ValueKind::UInt8);
        assert_eq!(ValueKind::for_field(&RfcType::Float, 8), ValueKind::Float64);
        assert_eq!(ValueKind::for_field(&RfcType::Byte, 16), ValueKind::Bytes);
    }

    #[test]
    fn unknown_tags_fall_back_to_string() {
        assert_eq!(ValueKind::for_field(&RfcType::Char, 10), ValueKind::String);
        assert_eq!(ValueKind::for_field(&RfcType::Bcd, 7), ValueKind::String);
        assert_eq!(
            ValueKind::for_field(&RfcType::from("DECF34"), 34),
            ValueKind::String
        );
    }

    #[test]
    fn type_tags_parse_case_insensitively() {
        assert_eq!(RfcType::from("num"), RfcType::Num);
        assert_eq!(RfcType::from(" INT2 "), RfcType::Int2);
        assert_eq!(RfcType::from("UTCLONG"), RfcType::Other("UTCLONG".into()));
        assert_eq!(RfcType::Other("UTCLONG".into()).to_string(), "UTCLONG");
    }

    #[test]
    fn type_tags_serialize_as_strings() {
        let encoded = serde_json::to_value(RfcType::Int1).unwrap();
        assert_eq!(encoded, json!("INT1"));
        let decoded: RfcType = serde_json::from_value(json!("FLOAT")).unwrap();
        assert_eq!(decoded, RfcType::Float);
    }

    #[test]
    fn values_render_as_json() {
        assert_eq!(RfcValue::Int16(-3).into_json(), json!(-3));
        assert_eq!(RfcValue::UInt8(255).into_json(), json!(255));
        assert_eq!(RfcValue::Float64(1.5).into_json(), json!(1.5));
        assert_eq!(RfcValue::Float64(f64::NAN).into_json(), Value::Null);
        assert_eq!(RfcValue::Bytes(vec![1, 2, 3]).into_json(), json!("AQID"));
        assert_eq!(RfcValue::String("x".into()).into_json(), json!("x"));
    }
}
