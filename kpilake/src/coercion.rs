//! Decoding of wire-format string cells into typed field values.

use serde_json::{Map, Value};

use crate::executor::RowRecord;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl From<FieldValue> for Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Int(i) => Value::from(i),
            // NaN and infinities have no JSON form and become null
            FieldValue::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Text(s) => Value::String(s),
            FieldValue::Bool(b) => Value::Bool(b),
            FieldValue::Null => Value::Null,
        }
    }
}

/// How a present cell is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decode {
    /// Integer, else float, else the original text.
    Numeric,
    Text,
    /// Case-insensitive `true`/`false`; anything else stays text.
    Boolean,
}

/// What a null cell becomes. Part of each endpoint's documented contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPolicy {
    /// `0` for numeric fields, `false` for booleans, `""` for text.
    Zero,
    Null,
    /// Field left out of the output object.
    Omit,
}

/// Declared output field of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub decode: Decode,
    pub on_null: NullPolicy,
}

impl FieldSpec {
    pub const fn new(name: &'static str, decode: Decode, on_null: NullPolicy) -> Self {
        Self {
            name,
            decode,
            on_null,
        }
    }

    /// Decode one cell. `None` means the field is omitted.
    pub fn decode(&self, cell: Option<&str>) -> Option<FieldValue> {
        match cell {
            Some(text) => Some(decode_cell(text, self.decode)),
            None => match self.on_null {
                NullPolicy::Omit => None,
                NullPolicy::Null => Some(FieldValue::Null),
                NullPolicy::Zero => Some(match self.decode {
                    Decode::Numeric => FieldValue::Int(0),
                    Decode::Boolean => FieldValue::Bool(false),
                    Decode::Text => FieldValue::Text(String::new()),
                }),
            },
        }
    }
}

pub fn decode_cell(text: &str, decode: Decode) -> FieldValue {
    match decode {
        Decode::Text => FieldValue::Text(text.to_string()),
        Decode::Numeric => {
            if let Ok(i) = text.parse::<i64>() {
                FieldValue::Int(i)
            } else if let Some(f) = text.parse::<f64>().ok().filter(|f| f.is_finite()) {
                FieldValue::Float(f)
            } else {
                FieldValue::Text(text.to_string())
            }
        }
        Decode::Boolean => {
            if text.eq_ignore_ascii_case("true") {
                FieldValue::Bool(true)
            } else if text.eq_ignore_ascii_case("false") {
                FieldValue::Bool(false)
            } else {
                FieldValue::Text(text.to_string())
            }
        }
    }
}

/// Map a row into the declared output shape. Columns without a `FieldSpec` are not emitted.
pub fn decode_row(row: &RowRecord, fields: &[FieldSpec]) -> Map<String, Value> {
    let mut out = Map::new();
    for field in fields {
        if let Some(value) = field.decode(row.get(field.name)) {
            out.insert(field.name.to_string(), value.into());
        }
    }
    out
}
