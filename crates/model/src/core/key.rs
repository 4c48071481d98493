//! Canonical merge keys used to match child rows to their parents.

use crate::core::value::Value;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How two key values are compared when child rows are stitched onto parents.
///
/// `Strict` compares typed values (`5` and `"5"` differ). `Loose` treats any
/// representation of the same number as the same key and ignores uuid case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCoercion {
    Strict,
    #[default]
    Loose,
}

impl FromStr for KeyCoercion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(KeyCoercion::Strict),
            "loose" => Ok(KeyCoercion::Loose),
            other => Err(format!("unknown key coercion '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart {
    Typed(Value),
    Number(String),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey(Vec<KeyPart>);

impl MergeKey {
    /// Builds the key for a (possibly composite) tuple of values. A tuple with
    /// any null component has no key and never matches anything.
    pub fn from_values<'a, I>(values: I, coercion: KeyCoercion) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut parts = Vec::new();
        for value in values {
            if value.is_null() {
                return None;
            }
            parts.push(match coercion {
                KeyCoercion::Strict => KeyPart::Typed(value.clone()),
                KeyCoercion::Loose => loose_part(value),
            });
        }
        if parts.is_empty() {
            return None;
        }
        Some(MergeKey(parts))
    }
}

fn loose_part(value: &Value) -> KeyPart {
    match value {
        Value::Int(v) => number_part(&v.to_string()),
        Value::Uint(v) => number_part(&v.to_string()),
        Value::Float(v) => number_part(&v.to_string()),
        Value::Decimal(v) => KeyPart::Number(v.normalized().to_string()),
        Value::String(s) => text_part(s),
        Value::Uuid(u) => KeyPart::Text(u.to_string()),
        Value::Json(serde_json::Value::Number(n)) => number_part(&n.to_string()),
        Value::Json(serde_json::Value::String(s)) => text_part(s),
        other => KeyPart::Typed(other.clone()),
    }
}

fn number_part(raw: &str) -> KeyPart {
    canonical_number(raw)
        .map(KeyPart::Number)
        .unwrap_or_else(|| KeyPart::Text(raw.to_string()))
}

fn text_part(raw: &str) -> KeyPart {
    if let Some(number) = canonical_number(raw) {
        return KeyPart::Number(number);
    }
    match uuid::Uuid::parse_str(raw.trim()) {
        Ok(uuid) => KeyPart::Text(uuid.to_string()),
        Err(_) => KeyPart::Text(raw.to_string()),
    }
}

fn canonical_number(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    BigDecimal::from_str(trimmed)
        .ok()
        .map(|d| d.normalized().to_string())
}
