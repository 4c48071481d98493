use thiserror::Error;

/// A malformed field or filter tree. These are programming-contract
/// violations of the request parser, never user input errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Relation '{0}' has no key fields")]
    MissingRelationKeys(String),

    #[error("Relation '{field}' pairs {local} local keys with {foreign} foreign keys")]
    KeyArityMismatch {
        field: String,
        local: usize,
        foreign: usize,
    },

    #[error("Relation '{0}' cannot be nested inside a JSON object path")]
    RelationInsideObject(String),

    #[error("Relation '{field}' joins store '{to}' from store '{from}'")]
    CrossStoreJoin {
        field: String,
        from: String,
        to: String,
    },

    #[error("Relation '{0}' names no identifier fields to page its children by")]
    MissingIdentifier(String),

    #[error("Polymorphic field '{0}' lists no collections")]
    EmptyUnion(String),

    #[error("Invalid operand for '{field}': {reason}")]
    InvalidOperand { field: String, reason: String },

    #[error("Relational nesting deeper than {0} levels")]
    DepthExceeded(usize),
}
