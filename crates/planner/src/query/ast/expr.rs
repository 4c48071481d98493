//! Defines the AST for SQL expressions.

use crate::query::ast::select::Select;
use model::core::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A column or table identifier, e.g., `users` or `users.id`.
    Identifier(Ident),

    /// A literal value, bound as a parameter when rendered.
    Value(Value),

    /// A reference into the compiled query's parameter list.
    Param(usize),

    /// `TRUE` / `FALSE`.
    Boolean(bool),

    /// A binary operation, e.g., `column = 'value'` or `a AND b`.
    BinaryOp(Box<BinaryOp>),

    /// A function call, e.g., `COUNT(*)` or `LOWER(name)`.
    FunctionCall(FunctionCall),

    /// An aliased expression, e.g. `COUNT(*) AS total_count`
    Alias { expr: Box<Expr>, alias: String },

    Not(Box<Expr>),

    IsNull { expr: Box<Expr>, negated: bool },

    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },

    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },

    /// `expr LIKE pattern`, the pattern escaping `%`, `_` and `\` with `\`.
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        case_insensitive: bool,
        negated: bool,
    },

    /// Text extraction from a JSON column, e.g. `meta -> 'a' -> 'b'`.
    JsonPath { expr: Box<Expr>, path: Vec<String> },

    /// Number of elements of a JSON array.
    JsonLength(Box<Expr>),

    DatePart { part: DatePart, expr: Box<Expr> },

    /// Geometry intersection against a GeoJSON operand.
    Intersects {
        expr: Box<Expr>,
        geometry: Box<Expr>,
        bbox: bool,
    },

    /// `CASE WHEN condition THEN TRUE ELSE FALSE END`
    Flag(Box<Expr>),

    /// `EXISTS (subquery)`, correlated through the subquery's WHERE clause.
    Exists { select: Box<Select>, negated: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub qualifier: Option<String>, // e.g., the 't0' in 't0.id'
    pub name: String,              // e.g., the 'id' in 't0.id'
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOp {
    pub left: Expr,
    pub op: BinaryOperator,
    pub right: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub wildcard: bool, // represents the '*' in 'COUNT(*)'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,    // =
    NotEq, // <>
    Lt,    // <
    LtEq,  // <=
    Gt,    // >
    GtEq,  // >=

    // Logical
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Week,
    Day,
    Weekday,
    Hour,
    Minute,
    Second,
}

impl Expr {
    pub fn column(qualifier: &str, name: &str) -> Expr {
        Expr::Identifier(Ident {
            qualifier: Some(qualifier.to_string()),
            name: name.to_string(),
        })
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
        Expr::BinaryOp(Box::new(BinaryOp { left, op, right }))
    }

    pub fn eq(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::Eq, right)
    }

    pub fn and(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::And, right)
    }

    pub fn or(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::Or, right)
    }

    pub fn aliased(self, alias: impl Into<String>) -> Expr {
        Expr::Alias {
            expr: Box::new(self),
            alias: alias.into(),
        }
    }

    pub fn negate(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

/// Folds operands into a left-nested `AND`. Each operand keeps its own
/// parentheses when rendered, so an `OR` inside one operand cannot escape it.
/// An empty list is `TRUE`.
pub fn and_all(operands: impl IntoIterator<Item = Expr>) -> Expr {
    operands
        .into_iter()
        .reduce(Expr::and)
        .unwrap_or(Expr::Boolean(true))
}

/// Folds operands into a left-nested `OR`. An empty list is `FALSE`.
pub fn or_all(operands: impl IntoIterator<Item = Expr>) -> Expr {
    operands
        .into_iter()
        .reduce(Expr::or)
        .unwrap_or(Expr::Boolean(false))
}
