//! Filter trees and permission rules to condition expressions.

use crate::{
    compile::{
        alias::IndexGenerator,
        fields::{check_keys, date_part},
    },
    error::PlanError,
    query::{
        ast::{
            common::TableRef,
            expr::{BinaryOperator, Expr, FunctionCall, and_all, or_all},
        },
        builder::select::SelectBuilder,
    },
};
use model::{
    core::{identifiers::CollectionRef, value::Value},
    query::{
        access::{AccessMap, Visibility},
        filter::{Comparison, Condition, Filter, Quantifier, RelationStep, TextMatch, ValueList},
    },
};
use serde_json::Value as JsonValue;

/// The table a filter is compiled against.
///
/// `access` is set for caller-supplied filters: a condition that reaches a
/// related collection only sees the rows the caller may read there. Permission
/// filters are compiled without it.
#[derive(Debug, Clone, Copy)]
pub struct FilterScope<'a> {
    pub store: &'a str,
    pub table: &'a str,
    pub access: Option<&'a AccessMap>,
}

impl<'a> FilterScope<'a> {
    pub fn trusted(store: &'a str, table: &'a str) -> Self {
        Self {
            store,
            table,
            access: None,
        }
    }

    pub fn guarded(store: &'a str, table: &'a str, access: &'a AccessMap) -> Self {
        Self {
            store,
            table,
            access: Some(access),
        }
    }
}

pub fn compile_filter(
    filter: &Filter,
    scope: FilterScope<'_>,
    generator: &mut IndexGenerator,
) -> Result<Expr, PlanError> {
    match filter {
        Filter::And(parts) => Ok(and_all(
            parts
                .iter()
                .map(|part| compile_filter(part, scope, generator))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Filter::Or(parts) => Ok(or_all(
            parts
                .iter()
                .map(|part| compile_filter(part, scope, generator))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Filter::Not(inner) => Ok(compile_filter(inner, scope, generator)?.negate()),
        Filter::Condition(condition) => compile_condition(condition, &condition.through, scope, generator),
    }
}

/// The top-level row condition: every permission filter, the injected parent
/// key filter and the user filter each become their own `AND` operand, so no
/// user `OR` can reach around a permission filter. Only the user filter is
/// checked against `scope.access`.
pub fn combine_conditions(
    permission_filters: &[Filter],
    injected: Option<&Filter>,
    user: Option<&Filter>,
    scope: FilterScope<'_>,
    generator: &mut IndexGenerator,
) -> Result<Option<Expr>, PlanError> {
    let trusted = FilterScope { access: None, ..scope };
    let mut operands = Vec::new();
    for filter in permission_filters.iter().chain(injected) {
        operands.push(compile_filter(filter, trusted, generator)?);
    }
    if let Some(filter) = user {
        operands.push(compile_filter(filter, scope, generator)?);
    }
    if operands.is_empty() {
        return Ok(None);
    }
    Ok(Some(and_all(operands)))
}

/// How the visibility of one field is decided for each row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityCheck {
    Always,
    Never,
    /// Name of the projected boolean column holding the per-row decision.
    Column(String),
}

/// Compiles a visibility rule. A conditional rule becomes a projected flag
/// column, pushed onto `columns`; it never filters rows.
pub fn compile_visibility(
    visibility: &Visibility,
    scope: FilterScope<'_>,
    generator: &mut IndexGenerator,
    columns: &mut Vec<Expr>,
) -> Result<VisibilityCheck, PlanError> {
    match visibility {
        Visibility::Always => Ok(VisibilityCheck::Always),
        Visibility::Never => Ok(VisibilityCheck::Never),
        Visibility::When(filter) => {
            let condition = compile_filter(filter, scope, generator)?;
            let alias = format!("v_{}", generator.column_alias());
            columns.push(Expr::Flag(Box::new(condition)).aliased(alias.clone()));
            Ok(VisibilityCheck::Column(alias))
        }
    }
}

fn compile_condition(
    condition: &Condition,
    steps: &[RelationStep],
    scope: FilterScope<'_>,
    generator: &mut IndexGenerator,
) -> Result<Expr, PlanError> {
    match steps.split_first() {
        None => compile_leaf(condition, scope.table, generator),
        Some((step, rest)) => compile_related(condition, step, rest, scope, generator),
    }
}

/// `[NOT] EXISTS (SELECT TRUE FROM related WHERE keys match AND ...)`, one
/// level per relation hop. The remaining hops and the leaf are compiled
/// against the related alias.
fn compile_related(
    condition: &Condition,
    step: &RelationStep,
    rest: &[RelationStep],
    scope: FilterScope<'_>,
    generator: &mut IndexGenerator,
) -> Result<Expr, PlanError> {
    let relation = &step.relation;
    check_keys(&condition.field, relation)?;
    if relation.foreign.store != scope.store {
        return Err(PlanError::CrossStoreJoin {
            field: condition.field.clone(),
            from: scope.store.to_string(),
            to: relation.foreign.store.clone(),
        });
    }

    let alias = generator.table_alias();
    let mut operands = relation
        .local
        .iter()
        .zip(&relation.foreign.fields)
        .map(|(local, foreign)| Expr::eq(Expr::column(scope.table, local), Expr::column(&alias, foreign)))
        .collect::<Vec<_>>();

    if let Some(access) = scope.access {
        let related = access.get(&CollectionRef::new(&relation.foreign.store, &relation.foreign.collection));
        if related.is_denied() {
            operands.push(Expr::Boolean(false));
        }
        for filter in related.filters() {
            let trusted = FilterScope::trusted(&relation.foreign.store, &alias);
            operands.push(compile_filter(filter, trusted, generator)?);
        }
    }

    let inner = FilterScope {
        store: &relation.foreign.store,
        table: &alias,
        access: scope.access,
    };
    operands.push(compile_condition(condition, rest, inner, generator)?);

    let select = SelectBuilder::new()
        .select(vec![Expr::Boolean(true)])
        .from(
            TableRef {
                schema: None,
                name: relation.foreign.collection.clone(),
            },
            Some(&alias),
        )
        .where_clause(Some(and_all(operands)))
        .build();
    Ok(Expr::Exists {
        select: Box::new(select),
        negated: step.quantifier == Quantifier::None,
    })
}

/// The compared expression: the column, a JSON member of it, and the
/// condition's function applied on top.
fn target(condition: &Condition, table: &str) -> Expr {
    let column = Expr::column(table, &condition.field);
    let value = if condition.path.is_empty() {
        column
    } else {
        Expr::JsonPath {
            expr: Box::new(column),
            path: condition.path.clone(),
        }
    };
    match condition.function {
        None => value,
        Some(function) => match date_part(function) {
            Some(part) => Expr::DatePart {
                part,
                expr: Box::new(value),
            },
            None => Expr::JsonLength(Box::new(value)),
        },
    }
}

fn invalid(condition: &Condition, reason: impl Into<String>) -> PlanError {
    PlanError::InvalidOperand {
        field: condition.field.clone(),
        reason: reason.into(),
    }
}

fn compare(
    condition: &Condition,
    subject: Expr,
    generator: &mut IndexGenerator,
    op: BinaryOperator,
    operand: &JsonValue,
) -> Result<Expr, PlanError> {
    if operand.is_null() {
        return Err(invalid(condition, "ordering comparison against null"));
    }
    let value = generator.bind(Value::from(operand));
    Ok(Expr::binary(subject, op, value))
}

fn lower(expr: Expr) -> Expr {
    Expr::FunctionCall(FunctionCall {
        name: "LOWER".to_string(),
        args: vec![expr],
        wildcard: false,
    })
}

/// Escapes LIKE wildcards so the needle matches literally.
fn like_literal(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn pattern(condition: &Condition, subject: Expr, generator: &mut IndexGenerator) -> Result<Expr, PlanError> {
    let Some((anchor, case_insensitive, negated, needle)) = condition.comparison.text_match() else {
        return Err(invalid(condition, "not a pattern operator"));
    };
    let escaped = like_literal(needle);
    let pattern = match anchor {
        TextMatch::Contains => format!("%{escaped}%"),
        TextMatch::StartsWith => format!("{escaped}%"),
        TextMatch::EndsWith => format!("%{escaped}"),
    };
    Ok(Expr::Like {
        expr: Box::new(subject),
        pattern: Box::new(generator.bind(Value::String(pattern))),
        case_insensitive,
        negated,
    })
}

fn bind_list(list: &ValueList, generator: &mut IndexGenerator) -> Vec<Expr> {
    list.values()
        .iter()
        .map(|value| generator.bind(Value::from(value)))
        .collect()
}

fn compile_leaf(condition: &Condition, table: &str, generator: &mut IndexGenerator) -> Result<Expr, PlanError> {
    let subject = target(condition, table);
    let expr = match &condition.comparison {
        Comparison::Eq(JsonValue::Null) => Expr::IsNull {
            expr: Box::new(subject),
            negated: false,
        },
        Comparison::Neq(JsonValue::Null) => Expr::IsNull {
            expr: Box::new(subject),
            negated: true,
        },
        Comparison::Eq(operand) => Expr::eq(subject, generator.bind(Value::from(operand))),
        Comparison::Neq(operand) => Expr::binary(
            subject,
            BinaryOperator::NotEq,
            generator.bind(Value::from(operand)),
        ),
        Comparison::Lt(v) => compare(condition, subject, generator, BinaryOperator::Lt, v)?,
        Comparison::Lte(v) => compare(condition, subject, generator, BinaryOperator::LtEq, v)?,
        Comparison::Gt(v) => compare(condition, subject, generator, BinaryOperator::Gt, v)?,
        Comparison::Gte(v) => compare(condition, subject, generator, BinaryOperator::GtEq, v)?,
        Comparison::IEq(v) => Expr::eq(
            lower(subject),
            lower(generator.bind(Value::String(v.clone()))),
        ),
        Comparison::NIEq(v) => Expr::binary(
            lower(subject),
            BinaryOperator::NotEq,
            lower(generator.bind(Value::String(v.clone()))),
        ),
        Comparison::Contains(_)
        | Comparison::NContains(_)
        | Comparison::IContains(_)
        | Comparison::NIContains(_)
        | Comparison::StartsWith(_)
        | Comparison::NStartsWith(_)
        | Comparison::IStartsWith(_)
        | Comparison::NIStartsWith(_)
        | Comparison::EndsWith(_)
        | Comparison::NEndsWith(_)
        | Comparison::IEndsWith(_)
        | Comparison::NIEndsWith(_) => pattern(condition, subject, generator)?,
        Comparison::In(list) | Comparison::NIn(list) => {
            let negated = matches!(condition.comparison, Comparison::NIn(_));
            if list.is_empty() {
                return Ok(Expr::Boolean(negated));
            }
            Expr::InList {
                expr: Box::new(subject),
                list: bind_list(list, generator),
                negated,
            }
        }
        Comparison::Between(list) | Comparison::NBetween(list) => {
            let negated = matches!(condition.comparison, Comparison::NBetween(_));
            let [low, high] = list.values() else {
                return Err(invalid(
                    condition,
                    format!("between expects 2 values, got {}", list.len()),
                ));
            };
            Expr::Between {
                expr: Box::new(subject),
                low: Box::new(generator.bind(Value::from(low))),
                high: Box::new(generator.bind(Value::from(high))),
                negated,
            }
        }
        Comparison::Null => Expr::IsNull {
            expr: Box::new(subject),
            negated: false,
        },
        Comparison::NNull => Expr::IsNull {
            expr: Box::new(subject),
            negated: true,
        },
        Comparison::Empty => Expr::or(
            Expr::IsNull {
                expr: Box::new(subject.clone()),
                negated: false,
            },
            Expr::eq(subject, generator.bind(Value::String(String::new()))),
        ),
        Comparison::NEmpty => Expr::and(
            Expr::IsNull {
                expr: Box::new(subject.clone()),
                negated: true,
            },
            Expr::binary(
                subject,
                BinaryOperator::NotEq,
                generator.bind(Value::String(String::new())),
            ),
        ),
        Comparison::Intersects(geometry)
        | Comparison::NIntersects(geometry)
        | Comparison::IntersectsBbox(geometry)
        | Comparison::NIntersectsBbox(geometry) => {
            if !geometry.is_object() {
                return Err(invalid(condition, "geometry operand must be a GeoJSON object"));
            }
            let bbox = matches!(
                condition.comparison,
                Comparison::IntersectsBbox(_) | Comparison::NIntersectsBbox(_)
            );
            let negated = matches!(
                condition.comparison,
                Comparison::NIntersects(_) | Comparison::NIntersectsBbox(_)
            );
            let intersects = Expr::Intersects {
                expr: Box::new(subject),
                geometry: Box::new(generator.bind(Value::String(geometry.to_string()))),
                bbox,
            };
            if negated {
                intersects.negate()
            } else {
                intersects
            }
        }
        Comparison::EqField(other) => Expr::eq(subject, Expr::column(table, other)),
    };
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{
        dialect::{Dialect, MySql, Postgres},
        renderer::render_with,
    };
    use model::query::{
        access::CollectionAccess,
        field::{FieldFunction, ForeignKey, RelationDescriptor},
    };
    use serde_json::json;
    use std::collections::BTreeMap;

    const STORE: &str = "main";

    /// A generator that has already handed out the base alias `t0`.
    fn base() -> IndexGenerator {
        let mut generator = IndexGenerator::new();
        generator.table_alias();
        generator
    }

    fn trusted() -> FilterScope<'static> {
        FilterScope::trusted(STORE, "t0")
    }

    fn render_in(dialect: &dyn Dialect, expr: &Expr, generator: &IndexGenerator) -> (String, Vec<Value>) {
        render_with(dialect, generator.parameters(), expr)
    }

    fn render(expr: &Expr, generator: IndexGenerator) -> (String, Vec<Value>) {
        render_in(&Postgres, expr, &generator)
    }

    fn compiled(filter: &Filter) -> (Expr, IndexGenerator) {
        let mut generator = base();
        let expr = compile_filter(filter, trusted(), &mut generator).unwrap();
        (expr, generator)
    }

    fn comments_of_article() -> RelationDescriptor {
        RelationDescriptor {
            local: vec!["id".into()],
            foreign: ForeignKey {
                store: STORE.into(),
                collection: "comments".into(),
                fields: vec!["article_id".into()],
            },
        }
    }

    fn related(comparison: Comparison, quantifier: Quantifier) -> Filter {
        let Filter::Condition(condition) = Filter::condition("body", comparison) else {
            unreachable!();
        };
        Filter::Condition(condition.through(comments_of_article(), quantifier))
    }

    #[test]
    fn permission_filters_stay_outside_user_or() {
        let permission = Filter::condition("status", Comparison::Neq(json!("hidden")));
        let user = Filter::or([
            Filter::condition("status", Comparison::Eq(json!("hidden"))),
            Filter::condition("id", Comparison::Gt(json!(0))),
        ]);
        let access = AccessMap::unrestricted();
        let mut generator = base();
        let scope = FilterScope::guarded(STORE, "t0", &access);
        let expr = combine_conditions(&[permission], None, Some(&user), scope, &mut generator)
            .unwrap()
            .unwrap();

        let (sql, params) = render(&expr, generator);
        assert_eq!(
            sql,
            r#"(("t0"."status" <> $1) AND (("t0"."status" = $2) OR ("t0"."id" > $3)))"#
        );
        assert_eq!(
            params,
            vec![
                Value::String("hidden".into()),
                Value::String("hidden".into()),
                Value::Int(0)
            ]
        );
    }

    #[test]
    fn text_operators_escape_wildcards() {
        let (expr, generator) = compiled(&Filter::condition("title", Comparison::IStartsWith("50%_off".into())));
        let (sql, params) = render(&expr, generator);

        assert_eq!(sql, r#"("t0"."title" ILIKE $1 ESCAPE '\')"#);
        assert_eq!(params, vec![Value::String(r"50\%\_off%".into())]);
    }

    #[test]
    fn every_text_operator_becomes_a_like() {
        let cases = [
            (Comparison::Contains("a".into()), "%a%", false, false),
            (Comparison::NContains("a".into()), "%a%", false, true),
            (Comparison::IContains("a".into()), "%a%", true, false),
            (Comparison::NIContains("a".into()), "%a%", true, true),
            (Comparison::StartsWith("a".into()), "a%", false, false),
            (Comparison::NStartsWith("a".into()), "a%", false, true),
            (Comparison::IStartsWith("a".into()), "a%", true, false),
            (Comparison::NIStartsWith("a".into()), "a%", true, true),
            (Comparison::EndsWith("a".into()), "%a", false, false),
            (Comparison::NEndsWith("a".into()), "%a", false, true),
            (Comparison::IEndsWith("a".into()), "%a", true, false),
            (Comparison::NIEndsWith("a".into()), "%a", true, true),
        ];
        for (comparison, expected, insensitive, negative) in cases {
            let (expr, generator) = compiled(&Filter::condition("title", comparison.clone()));
            let Expr::Like {
                case_insensitive,
                negated,
                ..
            } = &expr
            else {
                panic!("{comparison:?} did not compile to LIKE");
            };
            assert_eq!((*case_insensitive, *negated), (insensitive, negative), "{comparison:?}");
            assert_eq!(generator.parameters(), &[Value::String(expected.into())]);
        }
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let (none, _) = compiled(&Filter::condition("id", Comparison::In(ValueList::default())));
        let (all, _) = compiled(&Filter::condition("id", Comparison::NIn(ValueList::default())));
        assert_eq!(none, Expr::Boolean(false));
        assert_eq!(all, Expr::Boolean(true));
    }

    #[test]
    fn null_equality_becomes_is_null() {
        let mut generator = base();
        let expr = compile_filter(
            &Filter::condition("deleted_at", Comparison::Eq(JsonValue::Null)),
            FilterScope::trusted(STORE, "t3"),
            &mut generator,
        )
        .unwrap();
        let (sql, params) = render(&expr, generator);
        assert_eq!(sql, r#"("t3"."deleted_at" IS NULL)"#);
        assert!(params.is_empty());
    }

    #[test]
    fn malformed_operands_are_contract_violations() {
        let mut generator = base();
        let between = Filter::condition(
            "price",
            Comparison::Between(ValueList::new(vec![json!(1)])),
        );
        assert!(matches!(
            compile_filter(&between, trusted(), &mut generator),
            Err(PlanError::InvalidOperand { .. })
        ));

        let geo = Filter::condition("area", Comparison::Intersects(json!("not geojson")));
        assert!(compile_filter(&geo, trusted(), &mut generator).is_err());
    }

    #[test]
    fn between_binds_both_bounds() {
        let (expr, generator) = compiled(&Filter::condition(
            "price",
            Comparison::NBetween(ValueList::new(vec![json!(10), json!(20)])),
        ));

        let (sql, params) = render_in(&Postgres, &expr, &generator);
        assert_eq!(sql, r#"("t0"."price" NOT BETWEEN $1 AND $2)"#);
        assert_eq!(params, vec![Value::Int(10), Value::Int(20)]);
        let (sql, _) = render_in(&MySql, &expr, &generator);
        assert_eq!(sql, "(`t0`.`price` NOT BETWEEN ? AND ?)");
    }

    #[test]
    fn field_comparison_stays_on_one_row() {
        let (expr, generator) = compiled(&Filter::condition("author_id", Comparison::EqField("editor_id".into())));

        let (sql, params) = render_in(&Postgres, &expr, &generator);
        assert_eq!(sql, r#"("t0"."author_id" = "t0"."editor_id")"#);
        assert!(params.is_empty());
        let (sql, _) = render_in(&MySql, &expr, &generator);
        assert_eq!(sql, "(`t0`.`author_id` = `t0`.`editor_id`)");
    }

    #[test]
    fn json_path_condition_extracts_text() {
        let Filter::Condition(mut condition) = Filter::condition("meta", Comparison::Eq(json!("a"))) else {
            unreachable!();
        };
        condition.path = vec!["seo".into(), "slug".into()];
        let (expr, generator) = compiled(&Filter::Condition(condition));

        let (sql, _) = render_in(&Postgres, &expr, &generator);
        assert_eq!(
            sql,
            r#"(jsonb_extract_path_text(CAST("t0"."meta" AS jsonb), 'seo', 'slug') = $1)"#
        );
        let (sql, _) = render_in(&MySql, &expr, &generator);
        assert_eq!(
            sql,
            r#"(JSON_UNQUOTE(JSON_EXTRACT(`t0`.`meta`, '$."seo"."slug"')) = ?)"#
        );
    }

    #[test]
    fn geometry_conditions_bind_geojson() {
        let area = json!({ "type": "Point", "coordinates": [1.0, 2.0] });
        let (exact, generator) = compiled(&Filter::condition("location", Comparison::Intersects(area.clone())));
        let (sql, params) = render_in(&Postgres, &exact, &generator);
        assert_eq!(sql, r#"ST_Intersects("t0"."location", ST_GeomFromGeoJSON($1))"#);
        assert_eq!(params, vec![Value::String(area.to_string())]);
        let (sql, _) = render_in(&MySql, &exact, &generator);
        assert_eq!(sql, "ST_Intersects(`t0`.`location`, ST_GeomFromGeoJSON(?))");

        let (bbox, generator) = compiled(&Filter::condition("location", Comparison::NIntersectsBbox(area)));
        let (sql, _) = render_in(&Postgres, &bbox, &generator);
        assert_eq!(sql, r#"(NOT ("t0"."location" && ST_GeomFromGeoJSON($1)))"#);
        let (sql, _) = render_in(&MySql, &bbox, &generator);
        assert_eq!(sql, "(NOT MBRIntersects(`t0`.`location`, ST_GeomFromGeoJSON(?)))");
    }

    #[test]
    fn function_targets_wrap_the_column() {
        let Filter::Condition(condition) = Filter::condition("published_on", Comparison::Eq(json!(2024))) else {
            unreachable!();
        };
        let (expr, generator) = compiled(&Filter::Condition(condition.with_function(FieldFunction::Year)));

        let (sql, _) = render_in(&Postgres, &expr, &generator);
        assert_eq!(sql, r#"(CAST(EXTRACT(YEAR FROM "t0"."published_on") AS integer) = $1)"#);
        let (sql, _) = render_in(&MySql, &expr, &generator);
        assert_eq!(sql, "(YEAR(`t0`.`published_on`) = ?)");
    }

    #[test]
    fn related_conditions_become_correlated_exists() {
        let (some, generator) = compiled(&related(Comparison::Contains("spam".into()), Quantifier::Some));
        let (sql, params) = render(&some, generator);
        assert_eq!(
            sql,
            concat!(
                r#"EXISTS (SELECT TRUE FROM "comments" AS "t1" "#,
                r#"WHERE (("t0"."id" = "t1"."article_id") AND ("t1"."body" LIKE $1 ESCAPE '\')))"#
            )
        );
        assert_eq!(params, vec![Value::String("%spam%".into())]);

        let (none, generator) = compiled(&related(Comparison::Contains("spam".into()), Quantifier::None));
        let (sql, _) = render_in(&MySql, &none, &generator);
        assert_eq!(
            sql,
            "NOT EXISTS (SELECT TRUE FROM `comments` AS `t1` \
             WHERE ((`t0`.`id` = `t1`.`article_id`) AND (`t1`.`body` LIKE ?)))"
        );
    }

    #[test]
    fn related_conditions_respect_caller_access() {
        let comments = CollectionRef::new(STORE, "comments");
        let access = AccessMap::default().with(
            comments.clone(),
            CollectionAccess::Granted {
                filters: vec![Filter::condition("approved", Comparison::Eq(json!(true)))],
                fields: BTreeMap::new(),
            },
        );
        let filter = related(Comparison::Eq(json!("hi")), Quantifier::Some);
        let mut generator = base();
        let expr = compile_filter(&filter, FilterScope::guarded(STORE, "t0", &access), &mut generator).unwrap();
        let (sql, params) = render(&expr, generator);
        assert_eq!(
            sql,
            concat!(
                r#"EXISTS (SELECT TRUE FROM "comments" AS "t1" WHERE "#,
                r#"((("t0"."id" = "t1"."article_id") AND ("t1"."approved" = $1)) AND ("t1"."body" = $2)))"#
            )
        );
        assert_eq!(params, vec![Value::Boolean(true), Value::String("hi".into())]);

        let denied = AccessMap::default();
        let mut generator = base();
        let expr = compile_filter(&filter, FilterScope::guarded(STORE, "t0", &denied), &mut generator).unwrap();
        let (sql, _) = render(&expr, generator);
        assert!(sql.contains("AND FALSE)"), "{sql}");
    }

    #[test]
    fn related_conditions_stay_in_one_store() {
        let mut relation = comments_of_article();
        relation.foreign.store = "archive".into();
        let Filter::Condition(condition) = Filter::condition("body", Comparison::NNull) else {
            unreachable!();
        };
        let filter = Filter::Condition(condition.through(relation, Quantifier::Some));
        let mut generator = base();
        assert!(matches!(
            compile_filter(&filter, trusted(), &mut generator),
            Err(PlanError::CrossStoreJoin { .. })
        ));
    }

    #[test]
    fn conditional_visibility_is_projected() {
        let rule = Visibility::When(Filter::condition("owner", Comparison::Eq(json!(7))));
        let mut generator = IndexGenerator::new();
        let mut columns = Vec::new();
        let check = compile_visibility(&rule, trusted(), &mut generator, &mut columns).unwrap();

        assert_eq!(check, VisibilityCheck::Column("v_c0".into()));
        assert_eq!(columns.len(), 1);
        let (sql, _) = render(&columns[0], generator);
        assert_eq!(
            sql,
            r#"CASE WHEN ("t0"."owner" = $1) THEN TRUE ELSE FALSE END AS "v_c0""#
        );
    }
}
