//! The requested field tree for one collection.

use crate::query::modifiers::QueryModifiers;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One requested field. Every relational variant carries its fully resolved
/// relation descriptor; the engine never looks up collection metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldNode {
    /// A scalar column, or a member of the enclosing JSON object.
    Primitive {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },

    /// A scalar derived from a column through a named transform.
    Function {
        function: FieldFunction,
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },

    /// Cardinality-one nesting, either joined in or read from a JSON object.
    NestedSingle {
        key: String,
        fields: Vec<FieldNode>,
        nesting: SingleNesting,
    },

    /// Cardinality-many relation, fetched as separate batched queries.
    NestedMany {
        key: String,
        fields: Vec<FieldNode>,
        relation: RelationDescriptor,
        #[serde(default)]
        query: QueryModifiers,
        /// Primary key of the related collection, appended to the nested sort
        /// so that offset pagination is stable.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        identifier_fields: Vec<String>,
    },

    /// Polymorphic reference, resolved against one of several collections
    /// named by a discriminator column on the parent row.
    NestedUnion {
        key: String,
        discriminator: String,
        key_field: String,
        collections: Vec<UnionMember>,
    },
}

impl FieldNode {
    /// The key under which the node appears in the output object.
    pub fn output_key(&self) -> &str {
        match self {
            FieldNode::Primitive { field, alias } => alias.as_deref().unwrap_or(field),
            FieldNode::Function { field, alias, .. } => alias.as_deref().unwrap_or(field),
            FieldNode::NestedSingle { key, .. }
            | FieldNode::NestedMany { key, .. }
            | FieldNode::NestedUnion { key, .. } => key,
        }
    }

    /// The column of the owning collection whose visibility governs this node.
    pub fn governing_field(&self) -> &str {
        match self {
            FieldNode::Primitive { field, .. } | FieldNode::Function { field, .. } => field,
            FieldNode::NestedSingle { key, nesting, .. } => match nesting {
                SingleNesting::Relational { relation } => {
                    relation.local.first().map(String::as_str).unwrap_or(key)
                }
                SingleNesting::Object { path } => path,
            },
            FieldNode::NestedMany { key, .. } => key,
            FieldNode::NestedUnion { key_field, .. } => key_field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SingleNesting {
    /// Many-to-one reference resolved with a join.
    Relational { relation: RelationDescriptor },
    /// Member of a JSON-typed column (or of the enclosing JSON object).
    Object { path: String },
}

/// Equality predicate linking parent rows to related rows:
/// `parent.local[i] = related.foreign.fields[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    pub local: Vec<String>,
    pub foreign: ForeignKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub store: String,
    pub collection: String,
    pub fields: Vec<String>,
}

/// One collection a polymorphic reference may point to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionMember {
    pub store: String,
    pub collection: String,
    pub key_field: String,
    pub fields: Vec<FieldNode>,
    #[serde(default)]
    pub query: QueryModifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFunction {
    Year,
    Month,
    Week,
    Day,
    Weekday,
    Hour,
    Minute,
    Second,
    Count,
}

impl FieldFunction {
    pub fn name(&self) -> &'static str {
        match self {
            FieldFunction::Year => "year",
            FieldFunction::Month => "month",
            FieldFunction::Week => "week",
            FieldFunction::Day => "day",
            FieldFunction::Weekday => "weekday",
            FieldFunction::Hour => "hour",
            FieldFunction::Minute => "minute",
            FieldFunction::Second => "second",
            FieldFunction::Count => "count",
        }
    }
}

impl fmt::Display for FieldFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
