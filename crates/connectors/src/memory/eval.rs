//! Evaluation of compiled selects over in-memory rows, following the
//! PostgreSQL semantics the compiler targets: three-valued conditions,
//! `NULLS LAST` for ascending sorts and text results from JSON extraction.

use crate::error::DbError;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use planner::query::ast::{
    common::{JoinKind, OrderDir},
    expr::{BinaryOperator, DatePart, Expr, FunctionCall},
    select::Select,
};
use serde_json::Value as JsonValue;
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    str::FromStr,
};

pub type MemoryRow = BTreeMap<String, Value>;

/// Rows of every joined table for one candidate output row, by table alias.
type Env<'r> = Vec<(&'r str, Option<&'r MemoryRow>)>;

/// Limit and offset as evaluated for one select.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub struct Evaluator<'a> {
    tables: &'a HashMap<String, Vec<MemoryRow>>,
    params: &'a [Value],
}

impl<'a> Evaluator<'a> {
    pub fn new(tables: &'a HashMap<String, Vec<MemoryRow>>, params: &'a [Value]) -> Self {
        Self { tables, params }
    }

    pub fn window(&self, select: &Select) -> Result<Window, DbError> {
        let empty = Env::new();
        let count = |expr: &Option<Expr>| -> Result<Option<u64>, DbError> {
            match expr {
                Some(expr) => Ok(self
                    .eval(expr, &empty)?
                    .as_i64()
                    .and_then(|n| u64::try_from(n).ok())),
                None => Ok(None),
            }
        };
        Ok(Window {
            limit: count(&select.limit)?,
            offset: count(&select.offset)?,
        })
    }

    pub fn run(&self, select: &Select, entity: &str) -> Result<Vec<RowData>, DbError> {
        let from = select
            .from
            .as_ref()
            .ok_or_else(|| DbError::Unsupported("select without FROM".to_string()))?;
        let base_alias = from.alias.as_deref().unwrap_or(&from.table.name);
        let mut envs: Vec<Env> = self
            .table(&from.table.name)?
            .iter()
            .map(|row| vec![(base_alias, Some(row))])
            .collect();

        for join in &select.joins {
            let alias = join.alias.as_deref().unwrap_or(&join.table.name);
            let rows = self.table(&join.table.name)?;
            let mut joined = Vec::with_capacity(envs.len());
            for env in envs {
                let mut matched = false;
                for row in rows {
                    let mut candidate = env.clone();
                    candidate.push((alias, Some(row)));
                    if truth(&self.eval(&join.on, &candidate)?) == Some(true) {
                        matched = true;
                        joined.push(candidate);
                    }
                }
                if !matched && join.kind == JoinKind::Left {
                    let mut candidate = env;
                    candidate.push((alias, None));
                    joined.push(candidate);
                }
            }
            envs = joined;
        }

        if let Some(condition) = &select.where_clause {
            let mut kept = Vec::with_capacity(envs.len());
            for env in envs {
                if truth(&self.eval(condition, &env)?) == Some(true) {
                    kept.push(env);
                }
            }
            envs = kept;
        }

        if !select.order_by.is_empty() {
            let mut keyed = envs
                .into_iter()
                .map(|env| {
                    let keys = select
                        .order_by
                        .iter()
                        .map(|order| self.eval(&order.expr, &env))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok((keys, env))
                })
                .collect::<Result<Vec<_>, DbError>>()?;
            keyed.sort_by(|(a, _), (b, _)| {
                select
                    .order_by
                    .iter()
                    .zip(a.iter().zip(b))
                    .map(|(order, (x, y))| sort_order(x, y, order.direction == Some(OrderDir::Desc)))
                    .find(|ordering| *ordering != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
            envs = keyed.into_iter().map(|(_, env)| env).collect();
        }

        let window = self.window(select)?;
        let offset = window.offset.unwrap_or(0) as usize;
        let limit = window.limit.map(|n| n as usize).unwrap_or(usize::MAX);

        envs.iter()
            .skip(offset)
            .take(limit)
            .map(|env| {
                let field_values = select
                    .columns
                    .iter()
                    .map(|column| {
                        Ok(FieldValue {
                            name: column_name(column),
                            value: self.eval(column, env)?,
                        })
                    })
                    .collect::<Result<Vec<_>, DbError>>()?;
                Ok(RowData::new(entity, field_values))
            })
            .collect()
    }

    fn table(&self, name: &str) -> Result<&'a Vec<MemoryRow>, DbError> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::UnknownCollection(name.to_string()))
    }

    fn eval(&self, expr: &Expr, env: &Env) -> Result<Value, DbError> {
        let value = match expr {
            Expr::Identifier(ident) => {
                let row = match &ident.qualifier {
                    Some(qualifier) => env
                        .iter()
                        .find(|(alias, _)| *alias == qualifier.as_str())
                        .ok_or_else(|| DbError::Unsupported(format!("unknown table alias '{qualifier}'")))?
                        .1,
                    None => env.iter().find_map(|(_, row)| row.filter(|r| r.contains_key(&ident.name))),
                };
                row.and_then(|r| r.get(&ident.name))
                    .cloned()
                    .unwrap_or(Value::Null)
            }
            Expr::Value(value) => value.clone(),
            Expr::Param(index) => self.params.get(*index).cloned().unwrap_or(Value::Null),
            Expr::Boolean(b) => Value::Boolean(*b),
            Expr::BinaryOp(op) => {
                let left = self.eval(&op.left, env)?;
                let right = self.eval(&op.right, env)?;
                match op.op {
                    BinaryOperator::And => from_truth(match (truth(&left), truth(&right)) {
                        (Some(false), _) | (_, Some(false)) => Some(false),
                        (Some(true), Some(true)) => Some(true),
                        _ => None,
                    }),
                    BinaryOperator::Or => from_truth(match (truth(&left), truth(&right)) {
                        (Some(true), _) | (_, Some(true)) => Some(true),
                        (Some(false), Some(false)) => Some(false),
                        _ => None,
                    }),
                    comparison => compare(&left, &right, comparison),
                }
            }
            Expr::FunctionCall(call) => self.call(call, env)?,
            Expr::Alias { expr, .. } => self.eval(expr, env)?,
            Expr::Not(inner) => from_truth(truth(&self.eval(inner, env)?).map(|b| !b)),
            Expr::IsNull { expr, negated } => Value::Boolean(self.eval(expr, env)?.is_null() != *negated),
            Expr::InList { expr, list, negated } => {
                let needle = self.eval(expr, env)?;
                let mut result = Some(false);
                if needle.is_null() {
                    result = None;
                } else {
                    for item in list {
                        let item = self.eval(item, env)?;
                        if item.is_null() {
                            result = None;
                        } else if coerce_compare(&needle, &item) == Some(Ordering::Equal) {
                            result = Some(true);
                            break;
                        }
                    }
                }
                from_truth(result.map(|b| b != *negated))
            }
            Expr::Between { expr, low, high, negated } => {
                let value = self.eval(expr, env)?;
                let low = self.eval(low, env)?;
                let high = self.eval(high, env)?;
                let above = truth(&compare(&value, &low, BinaryOperator::GtEq));
                let below = truth(&compare(&value, &high, BinaryOperator::LtEq));
                let inside = match (above, below) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                };
                from_truth(inside.map(|b| b != *negated))
            }
            Expr::Like {
                expr,
                pattern,
                case_insensitive,
                negated,
            } => {
                let text = self.eval(expr, env)?;
                let pattern = self.eval(pattern, env)?;
                match (text.as_string(), pattern.as_string()) {
                    (Some(text), Some(pattern)) => {
                        Value::Boolean(like(&text, &pattern, *case_insensitive) != *negated)
                    }
                    _ => Value::Null,
                }
            }
            Expr::JsonPath { expr, path } => {
                let document = json_document(self.eval(expr, env)?);
                let found = path.iter().try_fold(&document, |node, segment| match node {
                    JsonValue::Object(map) => map.get(segment),
                    JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                    _ => None,
                });
                match found {
                    None | Some(JsonValue::Null) => Value::Null,
                    Some(JsonValue::String(s)) => Value::String(s.clone()),
                    Some(other) => Value::String(other.to_string()),
                }
            }
            Expr::JsonLength(expr) => match json_document(self.eval(expr, env)?) {
                JsonValue::Array(items) => Value::Int(items.len() as i64),
                _ => Value::Null,
            },
            Expr::DatePart { part, expr } => match timestamp(&self.eval(expr, env)?) {
                Some(ts) => Value::Int(date_part(*part, &ts)),
                None => Value::Null,
            },
            Expr::Intersects {
                expr,
                geometry,
                bbox: true,
            } => {
                let shape = bounds(&json_document(self.eval(expr, env)?));
                let area = bounds(&json_document(self.eval(geometry, env)?));
                match (shape, area) {
                    (Some(shape), Some(area)) => Value::Boolean(shape.overlaps(&area)),
                    _ => Value::Null,
                }
            }
            Expr::Intersects { bbox: false, .. } => {
                return Err(DbError::Unsupported(
                    "exact geometry intersection in the in-memory store".to_string(),
                ));
            }
            Expr::Flag(condition) => Value::Boolean(truth(&self.eval(condition, env)?) == Some(true)),
            Expr::Exists { select, negated } => Value::Boolean(self.exists(select, env)? != *negated),
        };
        Ok(value)
    }

    /// Whether any row of the subquery's table satisfies its WHERE clause
    /// with the outer row in scope.
    fn exists(&self, select: &Select, env: &Env) -> Result<bool, DbError> {
        let from = select
            .from
            .as_ref()
            .ok_or_else(|| DbError::Unsupported("subquery without FROM".to_string()))?;
        if !select.joins.is_empty() {
            return Err(DbError::Unsupported("joins inside a subquery".to_string()));
        }
        let alias = from.alias.as_deref().unwrap_or(&from.table.name);
        for row in self.table(&from.table.name)? {
            let mut candidate: Env = env.clone();
            candidate.push((alias, Some(row)));
            let matched = match &select.where_clause {
                Some(condition) => truth(&self.eval(condition, &candidate)?) == Some(true),
                None => true,
            };
            if matched {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn call(&self, call: &FunctionCall, env: &Env) -> Result<Value, DbError> {
        let args = call
            .args
            .iter()
            .map(|arg| self.eval(arg, env))
            .collect::<Result<Vec<_>, _>>()?;
        let text = args.first().and_then(Value::as_string);
        match call.name.to_ascii_uppercase().as_str() {
            "LOWER" => Ok(text.map(|s| Value::String(s.to_lowercase())).unwrap_or(Value::Null)),
            "UPPER" => Ok(text.map(|s| Value::String(s.to_uppercase())).unwrap_or(Value::Null)),
            other => Err(DbError::Unsupported(format!("function {other}"))),
        }
    }
}

fn column_name(column: &Expr) -> String {
    match column {
        Expr::Alias { alias, .. } => alias.clone(),
        Expr::Identifier(ident) => ident.name.clone(),
        _ => "?column?".to_string(),
    }
}

fn truth(value: &Value) -> Option<bool> {
    if value.is_null() { None } else { value.as_bool() }
}

fn from_truth(truth: Option<bool>) -> Value {
    truth.map(Value::Boolean).unwrap_or(Value::Null)
}

/// Comparison after the implicit casts a bound parameter would get.
fn coerce_compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let Some(ordering) = a.compare(b) {
        return Some(ordering);
    }
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (timestamp(a), timestamp(b)) {
        return Some(x.cmp(&y));
    }
    match (a.as_string(), b.as_string()) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => None,
    }
}

fn compare(left: &Value, right: &Value, op: BinaryOperator) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    let Some(ordering) = coerce_compare(left, right) else {
        return Value::Null;
    };
    Value::Boolean(match op {
        BinaryOperator::Eq => ordering == Ordering::Equal,
        BinaryOperator::NotEq => ordering != Ordering::Equal,
        BinaryOperator::Lt => ordering == Ordering::Less,
        BinaryOperator::LtEq => ordering != Ordering::Greater,
        BinaryOperator::Gt => ordering == Ordering::Greater,
        BinaryOperator::GtEq => ordering != Ordering::Less,
        BinaryOperator::And | BinaryOperator::Or => return Value::Null,
    })
}

fn sort_order(a: &Value, b: &Value, descending: bool) -> Ordering {
    let ordering = match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => coerce_compare(a, b).unwrap_or(Ordering::Equal),
    };
    if descending { ordering.reverse() } else { ordering }
}

enum LikeToken {
    AnySequence,
    AnyChar,
    Literal(char),
}

/// SQL LIKE with `\` as the escape character.
fn like(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let (text, pattern) = if case_insensitive {
        (text.to_lowercase(), pattern.to_lowercase())
    } else {
        (text.to_string(), pattern.to_string())
    };

    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        tokens.push(match ch {
            '%' => LikeToken::AnySequence,
            '_' => LikeToken::AnyChar,
            '\\' => LikeToken::Literal(chars.next().unwrap_or('\\')),
            other => LikeToken::Literal(other),
        });
    }

    let text: Vec<char> = text.chars().collect();
    let mut reachable = vec![false; text.len() + 1];
    reachable[0] = true;
    for token in &tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            LikeToken::AnySequence => {
                let mut seen = false;
                for (i, slot) in next.iter_mut().enumerate() {
                    seen |= reachable[i];
                    *slot = seen;
                }
            }
            LikeToken::AnyChar => {
                for i in 0..text.len() {
                    if reachable[i] {
                        next[i + 1] = true;
                    }
                }
            }
            LikeToken::Literal(expected) => {
                for i in 0..text.len() {
                    if reachable[i] && text[i] == *expected {
                        next[i + 1] = true;
                    }
                }
            }
        }
        reachable = next;
    }
    reachable[text.len()]
}

fn json_document(value: Value) -> JsonValue {
    match value {
        Value::Json(json) => json,
        Value::String(text) => serde_json::from_str(&text).unwrap_or(JsonValue::Null),
        _ => JsonValue::Null,
    }
}

/// Axis-aligned bounding box of a GeoJSON geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Bounds {
    fn point(x: f64, y: f64) -> Bounds {
        Bounds {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn union(self, other: Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    fn overlaps(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

fn bounds(geometry: &JsonValue) -> Option<Bounds> {
    match geometry.get("type").and_then(JsonValue::as_str)? {
        "Feature" => bounds(geometry.get("geometry")?),
        "GeometryCollection" => geometry
            .get("geometries")?
            .as_array()?
            .iter()
            .filter_map(bounds)
            .reduce(Bounds::union),
        _ => coordinate_bounds(geometry.get("coordinates")?),
    }
}

/// Positions nest to any depth; a position is an array starting with two numbers.
fn coordinate_bounds(node: &JsonValue) -> Option<Bounds> {
    let items = node.as_array()?;
    match (
        items.first().and_then(JsonValue::as_f64),
        items.get(1).and_then(JsonValue::as_f64),
    ) {
        (Some(x), Some(y)) => Some(Bounds::point(x, y)),
        _ => items.iter().filter_map(coordinate_bounds).reduce(Bounds::union),
    }
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::Date(date) => date.and_hms_opt(0, 0, 0).map(|ts| ts.and_utc()),
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .ok()
            .or_else(|| NaiveDateTime::from_str(raw).ok().map(|ts| ts.and_utc()))
            .or_else(|| {
                NaiveDate::from_str(raw)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|ts| ts.and_utc())
            }),
        _ => None,
    }
}

fn date_part(part: DatePart, ts: &DateTime<Utc>) -> i64 {
    let value = match part {
        DatePart::Year => return i64::from(ts.year()),
        DatePart::Month => ts.month(),
        DatePart::Week => ts.iso_week().week(),
        DatePart::Day => ts.day(),
        DatePart::Weekday => ts.weekday().num_days_from_sunday(),
        DatePart::Hour => ts.hour(),
        DatePart::Minute => ts.minute(),
        DatePart::Second => ts.second(),
    };
    i64::from(value)
}
