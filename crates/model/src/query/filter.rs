//! Logical filter trees shared by user filters and permission filters.

use crate::query::field::{FieldFunction, RelationDescriptor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Condition(Condition),
}

impl Filter {
    pub fn condition(field: impl Into<String>, comparison: Comparison) -> Self {
        Filter::Condition(Condition {
            field: field.into(),
            path: Vec::new(),
            through: Vec::new(),
            function: None,
            comparison,
        })
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    pub fn negate(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }
}

/// A leaf condition on one field, optionally reaching into a JSON column
/// through `path`. With `through` set, the field belongs to the collection
/// at the end of that relation chain rather than to the filtered one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub through: Vec<RelationStep>,
    /// Applied to the field before comparing, e.g. `year(created_at) = 2024`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FieldFunction>,
    #[serde(flatten)]
    pub comparison: Comparison,
}

impl Condition {
    /// Moves the condition behind `relation`, which becomes the first hop.
    pub fn through(mut self, relation: RelationDescriptor, quantifier: Quantifier) -> Self {
        self.through.insert(
            0,
            RelationStep {
                relation,
                quantifier,
            },
        );
        self
    }

    pub fn with_function(mut self, function: FieldFunction) -> Self {
        self.function = Some(function);
        self
    }
}

/// One hop from the filtered collection to a related one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationStep {
    pub relation: RelationDescriptor,
    #[serde(default)]
    pub quantifier: Quantifier,
}

/// Whether some related record must match, or none may.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantifier {
    #[default]
    Some,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum Comparison {
    Eq(JsonValue),
    Neq(JsonValue),
    Lt(JsonValue),
    Lte(JsonValue),
    Gt(JsonValue),
    Gte(JsonValue),

    #[serde(rename = "ieq")]
    IEq(String),
    #[serde(rename = "nieq")]
    NIEq(String),
    Contains(String),
    #[serde(rename = "ncontains")]
    NContains(String),
    #[serde(rename = "icontains")]
    IContains(String),
    #[serde(rename = "nicontains")]
    NIContains(String),
    StartsWith(String),
    #[serde(rename = "nstarts_with")]
    NStartsWith(String),
    #[serde(rename = "istarts_with")]
    IStartsWith(String),
    #[serde(rename = "nistarts_with")]
    NIStartsWith(String),
    EndsWith(String),
    #[serde(rename = "nends_with")]
    NEndsWith(String),
    #[serde(rename = "iends_with")]
    IEndsWith(String),
    #[serde(rename = "niends_with")]
    NIEndsWith(String),

    In(ValueList),
    #[serde(rename = "nin")]
    NIn(ValueList),
    Between(ValueList),
    #[serde(rename = "nbetween")]
    NBetween(ValueList),

    Null,
    #[serde(rename = "nnull")]
    NNull,
    Empty,
    #[serde(rename = "nempty")]
    NEmpty,

    Intersects(JsonValue),
    #[serde(rename = "nintersects")]
    NIntersects(JsonValue),
    IntersectsBbox(JsonValue),
    #[serde(rename = "nintersects_bbox")]
    NIntersectsBbox(JsonValue),

    /// Equality against another field of the same row.
    EqField(String),
}

/// Pattern comparison decoded from the string operators:
/// `(anchor, case_insensitive, negated, needle)`.
pub type TextComparison<'a> = (TextMatch, bool, bool, &'a str);

impl Comparison {
    pub fn text_match(&self) -> Option<TextComparison<'_>> {
        use TextMatch as M;
        let decoded = match self {
            Comparison::Contains(v) => (M::Contains, false, false, v),
            Comparison::NContains(v) => (M::Contains, false, true, v),
            Comparison::IContains(v) => (M::Contains, true, false, v),
            Comparison::NIContains(v) => (M::Contains, true, true, v),
            Comparison::StartsWith(v) => (M::StartsWith, false, false, v),
            Comparison::NStartsWith(v) => (M::StartsWith, false, true, v),
            Comparison::IStartsWith(v) => (M::StartsWith, true, false, v),
            Comparison::NIStartsWith(v) => (M::StartsWith, true, true, v),
            Comparison::EndsWith(v) => (M::EndsWith, false, false, v),
            Comparison::NEndsWith(v) => (M::EndsWith, false, true, v),
            Comparison::IEndsWith(v) => (M::EndsWith, true, false, v),
            Comparison::NIEndsWith(v) => (M::EndsWith, true, true, v),
            Comparison::Eq(_)
            | Comparison::Neq(_)
            | Comparison::Lt(_)
            | Comparison::Lte(_)
            | Comparison::Gt(_)
            | Comparison::Gte(_)
            | Comparison::IEq(_)
            | Comparison::NIEq(_)
            | Comparison::In(_)
            | Comparison::NIn(_)
            | Comparison::Between(_)
            | Comparison::NBetween(_)
            | Comparison::Null
            | Comparison::NNull
            | Comparison::Empty
            | Comparison::NEmpty
            | Comparison::Intersects(_)
            | Comparison::NIntersects(_)
            | Comparison::IntersectsBbox(_)
            | Comparison::NIntersectsBbox(_)
            | Comparison::EqField(_) => return None,
        };
        Some((decoded.0, decoded.1, decoded.2, decoded.3.as_str()))
    }
}

/// Where a substring match is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    Contains,
    StartsWith,
    EndsWith,
}

/// An ordered list operand. Transports encode long arrays as maps keyed by
/// index (`{"0": a, "1": b}`) or as comma-separated strings; all three forms
/// normalize to the same ordered sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueList(pub Vec<JsonValue>);

impl ValueList {
    pub fn new(values: Vec<JsonValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[JsonValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValueList {
    Array(Vec<JsonValue>),
    Indexed(BTreeMap<String, JsonValue>),
    Csv(String),
    Scalar(JsonValue),
}

impl<'de> Deserialize<'de> for ValueList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawValueList::deserialize(deserializer)? {
            RawValueList::Array(values) => Ok(ValueList(values)),
            RawValueList::Indexed(map) => {
                let mut entries = map
                    .into_iter()
                    .map(|(key, value)| {
                        key.parse::<usize>().map(|index| (index, value)).map_err(|_| {
                            serde::de::Error::custom(format!(
                                "list operand key '{key}' is not an index"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, D::Error>>()?;
                entries.sort_by_key(|(index, _)| *index);
                Ok(ValueList(entries.into_iter().map(|(_, v)| v).collect()))
            }
            RawValueList::Csv(raw) => Ok(ValueList(
                raw.split(',')
                    .map(|part| JsonValue::String(part.trim().to_string()))
                    .collect(),
            )),
            RawValueList::Scalar(value) => Ok(ValueList(vec![value])),
        }
    }
}

impl Serialize for ValueList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}
