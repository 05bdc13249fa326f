//! Dynamically typed Cadence values and their JSON-Cadence encoding.
//!
//! Script results and event payloads arrive from the access node as
//! JSON-Cadence documents (`{"type": "...", "value": ...}`), usually wrapped in
//! base64. Everything here is shape-agnostic; turning a value into a domain
//! record is the job of `crate::decoding`.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use thiserror::Error;

use super::flow::{Fix64, FlowAddress, UFix64};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CadenceJsonError {
    #[error("Missing 'type' tag in JSON-Cadence value")]
    MissingType,

    #[error("Invalid {type_name} value: {reason}")]
    InvalidValue { type_name: String, reason: String },

    #[error("Invalid base64 payload: {0}")]
    Base64(String),

    #[error("Invalid JSON payload: {0}")]
    Json(String),
}

fn invalid(type_name: &str, reason: impl Into<String>) -> CadenceJsonError {
    CadenceJsonError::InvalidValue {
        type_name: type_name.to_string(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    Struct,
    Resource,
    Event,
    Contract,
    Enum,
}

impl CompositeKind {
    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "Struct" => Some(Self::Struct),
            "Resource" => Some(Self::Resource),
            "Event" => Some(Self::Event),
            "Contract" => Some(Self::Contract),
            "Enum" => Some(Self::Enum),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Struct => "Struct",
            Self::Resource => "Resource",
            Self::Event => "Event",
            Self::Contract => "Contract",
            Self::Enum => "Enum",
        }
    }
}

/// A struct, resource, event, contract or enum value with ordered fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    pub kind: CompositeKind,
    /// Fully qualified type id, e.g. `A.c1e4f4f4c4257510.Market.MomentPurchased`.
    pub id: String,
    pub fields: Vec<(String, CadenceValue)>,
}

impl Composite {
    /// Field by declaration position.
    pub fn field(&self, index: usize) -> Option<&CadenceValue> {
        self.fields.get(index).map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CadenceValue {
    Void,
    Optional(Option<Box<CadenceValue>>),
    Bool(bool),
    String(String),
    Character(String),
    Address(FlowAddress),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    UInt128(u128),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    Word8(u8),
    Word16(u16),
    Word32(u32),
    Word64(u64),
    /// Arbitrary precision `Int`, kept as validated decimal text.
    Int(String),
    /// Arbitrary precision `UInt`, kept as validated decimal text.
    UInt(String),
    Fix64(Fix64),
    UFix64(UFix64),
    Array(Vec<CadenceValue>),
    /// Key/value pairs in the order the node returned them.
    Dictionary(Vec<(CadenceValue, CadenceValue)>),
    Composite(Composite),
    Path { domain: String, identifier: String },
    /// Any kind this crate has no typed representation for (Type, Capability, ...).
    Other { type_name: String, value: Value },
}

impl CadenceValue {
    /// JSON-Cadence type tag of this value.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Void => "Void",
            Self::Optional(_) => "Optional",
            Self::Bool(_) => "Bool",
            Self::String(_) => "String",
            Self::Character(_) => "Character",
            Self::Address(_) => "Address",
            Self::UInt8(_) => "UInt8",
            Self::UInt16(_) => "UInt16",
            Self::UInt32(_) => "UInt32",
            Self::UInt64(_) => "UInt64",
            Self::UInt128(_) => "UInt128",
            Self::Int8(_) => "Int8",
            Self::Int16(_) => "Int16",
            Self::Int32(_) => "Int32",
            Self::Int64(_) => "Int64",
            Self::Int128(_) => "Int128",
            Self::Word8(_) => "Word8",
            Self::Word16(_) => "Word16",
            Self::Word32(_) => "Word32",
            Self::Word64(_) => "Word64",
            Self::Int(_) => "Int",
            Self::UInt(_) => "UInt",
            Self::Fix64(_) => "Fix64",
            Self::UFix64(_) => "UFix64",
            Self::Array(_) => "Array",
            Self::Dictionary(_) => "Dictionary",
            Self::Composite(c) => c.kind.type_name(),
            Self::Path { .. } => "Path",
            Self::Other { type_name, .. } => type_name.as_str(),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::UInt32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<FlowAddress> {
        match self {
            Self::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_ufix64(&self) -> Option<UFix64> {
        match self {
            Self::UFix64(v) => Some(*v),
            _ => None,
        }
    }

    /// `Some(inner)` for an `Optional`, where `inner` is `None` for `nil`.
    pub fn as_optional(&self) -> Option<Option<&CadenceValue>> {
        match self {
            Self::Optional(inner) => Some(inner.as_deref()),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&[(CadenceValue, CadenceValue)]> {
        match self {
            Self::Dictionary(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&Composite> {
        match self {
            Self::Composite(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::UInt8(_)
                | Self::UInt16(_)
                | Self::UInt32(_)
                | Self::UInt64(_)
                | Self::UInt128(_)
                | Self::Int8(_)
                | Self::Int16(_)
                | Self::Int32(_)
                | Self::Int64(_)
                | Self::Int128(_)
                | Self::Word8(_)
                | Self::Word16(_)
                | Self::Word32(_)
                | Self::Word64(_)
                | Self::Int(_)
                | Self::UInt(_)
                | Self::Fix64(_)
                | Self::UFix64(_)
        )
    }

    /// Parses a JSON-Cadence document.
    pub fn from_json(json: &Value) -> Result<Self, CadenceJsonError> {
        let type_name = json
            .get("type")
            .and_then(Value::as_str)
            .ok_or(CadenceJsonError::MissingType)?;
        let value = json.get("value").unwrap_or(&Value::Null);

        let decoded = match type_name {
            "Void" => Self::Void,
            "Optional" => {
                if value.is_null() {
                    Self::Optional(None)
                } else {
                    Self::Optional(Some(Box::new(Self::from_json(value)?)))
                }
            }
            "Bool" => Self::Bool(
                value
                    .as_bool()
                    .ok_or_else(|| invalid(type_name, "expected a boolean"))?,
            ),
            "String" => Self::String(expect_str(type_name, value)?.to_string()),
            "Character" => Self::Character(expect_str(type_name, value)?.to_string()),
            "Address" => Self::Address(
                expect_str(type_name, value)?
                    .parse()
                    .map_err(|e: super::flow::FlowTypeError| invalid(type_name, e.to_string()))?,
            ),
            "UInt8" => Self::UInt8(parse_number(type_name, value)?),
            "UInt16" => Self::UInt16(parse_number(type_name, value)?),
            "UInt32" => Self::UInt32(parse_number(type_name, value)?),
            "UInt64" => Self::UInt64(parse_number(type_name, value)?),
            "UInt128" => Self::UInt128(parse_number(type_name, value)?),
            "Int8" => Self::Int8(parse_number(type_name, value)?),
            "Int16" => Self::Int16(parse_number(type_name, value)?),
            "Int32" => Self::Int32(parse_number(type_name, value)?),
            "Int64" => Self::Int64(parse_number(type_name, value)?),
            "Int128" => Self::Int128(parse_number(type_name, value)?),
            "Word8" => Self::Word8(parse_number(type_name, value)?),
            "Word16" => Self::Word16(parse_number(type_name, value)?),
            "Word32" => Self::Word32(parse_number(type_name, value)?),
            "Word64" => Self::Word64(parse_number(type_name, value)?),
            "Int" => Self::Int(parse_big_integer(type_name, value, true)?),
            "UInt" => Self::UInt(parse_big_integer(type_name, value, false)?),
            "Fix64" => Self::Fix64(parse_number(type_name, value)?),
            "UFix64" => Self::UFix64(parse_number(type_name, value)?),
            "Array" => Self::Array(
                value
                    .as_array()
                    .ok_or_else(|| invalid(type_name, "expected an array"))?
                    .iter()
                    .map(Self::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            "Dictionary" => {
                let entries = value
                    .as_array()
                    .ok_or_else(|| invalid(type_name, "expected an array of entries"))?;
                let mut pairs = Vec::with_capacity(entries.len());
                for entry in entries {
                    let key = entry
                        .get("key")
                        .ok_or_else(|| invalid(type_name, "entry without key"))?;
                    let val = entry
                        .get("value")
                        .ok_or_else(|| invalid(type_name, "entry without value"))?;
                    pairs.push((Self::from_json(key)?, Self::from_json(val)?));
                }
                Self::Dictionary(pairs)
            }
            "Path" => Self::Path {
                domain: expect_str(type_name, value.get("domain").unwrap_or(&Value::Null))?
                    .to_string(),
                identifier: expect_str(
                    type_name,
                    value.get("identifier").unwrap_or(&Value::Null),
                )?
                .to_string(),
            },
            other => match CompositeKind::from_type_name(other) {
                Some(kind) => Self::Composite(parse_composite(kind, value)?),
                None => Self::Other {
                    type_name: other.to_string(),
                    value: value.clone(),
                },
            },
        };

        Ok(decoded)
    }

    /// Encodes this value as a JSON-Cadence document.
    pub fn to_json(&self) -> Value {
        let type_name = self.type_name();
        match self {
            Self::Void => json!({ "type": "Void" }),
            Self::Optional(inner) => json!({
                "type": type_name,
                "value": inner.as_ref().map(|v| v.to_json()),
            }),
            Self::Bool(b) => json!({ "type": type_name, "value": b }),
            Self::String(s) | Self::Character(s) => json!({ "type": type_name, "value": s }),
            Self::Array(items) => json!({
                "type": type_name,
                "value": items.iter().map(Self::to_json).collect::<Vec<_>>(),
            }),
            Self::Dictionary(pairs) => json!({
                "type": type_name,
                "value": pairs
                    .iter()
                    .map(|(k, v)| json!({ "key": k.to_json(), "value": v.to_json() }))
                    .collect::<Vec<_>>(),
            }),
            Self::Composite(c) => json!({
                "type": type_name,
                "value": {
                    "id": c.id,
                    "fields": c
                        .fields
                        .iter()
                        .map(|(name, v)| json!({ "name": name, "value": v.to_json() }))
                        .collect::<Vec<_>>(),
                },
            }),
            Self::Path { domain, identifier } => json!({
                "type": type_name,
                "value": { "domain": domain, "identifier": identifier },
            }),
            Self::Other { type_name, value } => json!({ "type": type_name, "value": value }),
            // Addresses and every numeric kind travel as strings.
            _ => json!({ "type": type_name, "value": self.to_string() }),
        }
    }

    /// Decodes the base64-wrapped JSON-Cadence form used by the REST access API.
    pub fn from_base64_json(encoded: &str) -> Result<Self, CadenceJsonError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CadenceJsonError::Base64(e.to_string()))?;
        let json: Value =
            serde_json::from_slice(&bytes).map_err(|e| CadenceJsonError::Json(e.to_string()))?;
        Self::from_json(&json)
    }

    pub fn to_base64_json(&self) -> String {
        STANDARD.encode(self.to_json().to_string())
    }
}

fn expect_str<'a>(type_name: &str, value: &'a Value) -> Result<&'a str, CadenceJsonError> {
    value
        .as_str()
        .ok_or_else(|| invalid(type_name, "expected a string"))
}

fn parse_number<T: FromStr>(type_name: &str, value: &Value) -> Result<T, CadenceJsonError> {
    let text = expect_str(type_name, value)?;
    text.trim()
        .parse()
        .map_err(|_| invalid(type_name, format!("'{}' is out of range or malformed", text)))
}

fn parse_big_integer(
    type_name: &str,
    value: &Value,
    signed: bool,
) -> Result<String, CadenceJsonError> {
    let text = expect_str(type_name, value)?.trim();
    let digits = match text.strip_prefix('-') {
        Some(rest) if signed => rest,
        _ => text,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(type_name, format!("'{}' is not an integer", text)));
    }
    Ok(text.to_string())
}

fn parse_composite(kind: CompositeKind, value: &Value) -> Result<Composite, CadenceJsonError> {
    let type_name = kind.type_name();
    let id = expect_str(type_name, value.get("id").unwrap_or(&Value::Null))?.to_string();
    let raw_fields = value
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid(type_name, "expected a fields array"))?;

    let mut fields = Vec::with_capacity(raw_fields.len());
    for field in raw_fields {
        let name = expect_str(type_name, field.get("name").unwrap_or(&Value::Null))?;
        let field_value = field
            .get("value")
            .ok_or_else(|| invalid(type_name, format!("field '{}' has no value", name)))?;
        fields.push((name.to_string(), CadenceValue::from_json(field_value)?));
    }

    Ok(Composite { kind, id, fields })
}

impl fmt::Display for CadenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "()"),
            Self::Optional(None) => write!(f, "nil"),
            Self::Optional(Some(inner)) => write!(f, "{}", inner),
            Self::Bool(b) => write!(f, "{}", b),
            Self::String(s) | Self::Character(s) => write!(f, "{:?}", s),
            Self::Address(a) => write!(f, "{}", a),
            Self::UInt8(v) | Self::Word8(v) => write!(f, "{}", v),
            Self::UInt16(v) | Self::Word16(v) => write!(f, "{}", v),
            Self::UInt32(v) | Self::Word32(v) => write!(f, "{}", v),
            Self::UInt64(v) | Self::Word64(v) => write!(f, "{}", v),
            Self::UInt128(v) => write!(f, "{}", v),
            Self::Int8(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::Int128(v) => write!(f, "{}", v),
            Self::Int(v) | Self::UInt(v) => write!(f, "{}", v),
            Self::Fix64(v) => write!(f, "{}", v),
            Self::UFix64(v) => write!(f, "{}", v),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Dictionary(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Self::Composite(c) => {
                write!(f, "{}(", c.id)?;
                for (i, (name, v)) in c.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, v)?;
                }
                write!(f, ")")
            }
            Self::Path { domain, identifier } => write!(f, "/{}/{}", domain, identifier),
            Self::Other { type_name, value } => write!(f, "{}({})", type_name, value),
        }
    }
}
