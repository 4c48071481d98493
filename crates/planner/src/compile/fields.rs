//! Field trees to select columns, joins, alias mappings and sub-queries.

use crate::{
    compile::{
        alias::IndexGenerator,
        condition::{FilterScope, VisibilityCheck, compile_filter, compile_visibility},
    },
    error::PlanError,
    query::ast::{
        common::{JoinKind, TableRef},
        expr::{DatePart, Expr, and_all},
        select::JoinClause,
    },
};
use model::{
    core::identifiers::CollectionRef,
    query::{
        access::{AccessMap, CollectionAccess},
        field::{FieldFunction, FieldNode, RelationDescriptor, SingleNesting, UnionMember},
        modifiers::QueryModifiers,
    },
};
use serde::Serialize;

/// Reassembly instructions for one object level.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObjectMapping {
    pub nodes: Vec<AliasNode>,
    /// Keys projected only so nested relations can be merged.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stitch: Vec<StitchColumn>,
}

impl ObjectMapping {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(AliasNode::key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StitchColumn {
    pub field: String,
    pub column: String,
}

/// One requested field, in request order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AliasNode {
    Column {
        key: String,
        column: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        visibility: Option<String>,
    },
    /// Cardinality-one nesting. The object is null when every presence
    /// column of a row is null.
    Object {
        key: String,
        mapping: ObjectMapping,
        presence: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        visibility: Option<String>,
    },
    /// Placeholder filled by the to-many merge.
    Many {
        key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        visibility: Option<String>,
    },
    /// Placeholder filled by the polymorphic merge.
    Union {
        key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        visibility: Option<String>,
    },
    /// Never visible to the caller; nothing is selected for it.
    Withheld { key: String },
}

impl AliasNode {
    pub fn key(&self) -> &str {
        match self {
            AliasNode::Column { key, .. }
            | AliasNode::Object { key, .. }
            | AliasNode::Many { key, .. }
            | AliasNode::Union { key, .. }
            | AliasNode::Withheld { key } => key,
        }
    }
}

/// A relation fetched by its own batched query.
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuery {
    /// Keys of the cardinality-one objects leading from the level's root
    /// record to the record that owns the field.
    pub path: Vec<String>,
    pub key: String,
    pub kind: SubQueryKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubQueryKind {
    Many {
        relation: RelationDescriptor,
        fields: Vec<FieldNode>,
        query: QueryModifiers,
        identifier_fields: Vec<String>,
    },
    Union {
        discriminator: String,
        key_field: String,
        member: UnionMember,
    },
}

/// Everything one level of a field tree contributes to its select.
#[derive(Debug, Default)]
pub struct CompiledFields {
    pub columns: Vec<Expr>,
    pub joins: Vec<JoinClause>,
    pub mapping: ObjectMapping,
    pub sub_queries: Vec<SubQuery>,
}

#[derive(Debug, Clone)]
struct Scope {
    store: String,
    table: String,
    access: CollectionAccess,
    /// JSON column and member path when compiling inside an embedded object.
    object: Option<(String, Vec<String>)>,
    path: Vec<String>,
}

impl Scope {
    fn target(&self, field: &str) -> Expr {
        match &self.object {
            None => Expr::column(&self.table, field),
            Some((column, members)) => {
                let mut path = members.clone();
                path.push(field.to_string());
                Expr::JsonPath {
                    expr: Box::new(Expr::column(&self.table, column)),
                    path,
                }
            }
        }
    }
}

pub struct FieldCompiler<'a> {
    generator: &'a mut IndexGenerator,
    access: &'a AccessMap,
    out: CompiledFields,
}

impl<'a> FieldCompiler<'a> {
    pub fn new(generator: &'a mut IndexGenerator, access: &'a AccessMap) -> Self {
        Self {
            generator,
            access,
            out: CompiledFields::default(),
        }
    }

    /// Compiles `fields` against the base table aliased `table`. Every name in
    /// `stitch_fields` is projected as a stitching key of the root object.
    pub fn compile(
        mut self,
        target: &CollectionRef,
        table: &str,
        fields: &[FieldNode],
        stitch_fields: &[String],
    ) -> Result<CompiledFields, PlanError> {
        let scope = Scope {
            store: target.store.clone(),
            table: table.to_string(),
            access: self.access.get(target),
            object: None,
            path: Vec::new(),
        };
        let mut mapping = self.compile_fields(&scope, fields)?;
        for field in stitch_fields {
            self.stitch(&scope, field, &mut mapping.stitch);
        }
        self.out.mapping = mapping;
        Ok(self.out)
    }

    fn compile_fields(&mut self, scope: &Scope, fields: &[FieldNode]) -> Result<ObjectMapping, PlanError> {
        let mut mapping = ObjectMapping::default();
        for node in fields {
            let alias_node = self.compile_node(scope, node, &mut mapping.stitch)?;
            mapping.nodes.push(alias_node);
        }
        Ok(mapping)
    }

    fn project(&mut self, expr: Expr, prefix: Option<&str>) -> String {
        let alias = match prefix {
            Some(prefix) => format!("{prefix}_{}", self.generator.column_alias()),
            None => self.generator.column_alias(),
        };
        self.out.columns.push(expr.aliased(alias.clone()));
        alias
    }

    fn stitch(&mut self, scope: &Scope, field: &str, stitch: &mut Vec<StitchColumn>) {
        if stitch.iter().any(|s| s.field == field) {
            return;
        }
        let column = self.project(scope.target(field), None);
        stitch.push(StitchColumn {
            field: field.to_string(),
            column,
        });
    }

    /// `None` means the node is never visible and must not be compiled.
    fn visibility(&mut self, scope: &Scope, node: &FieldNode) -> Result<Option<Option<String>>, PlanError> {
        // Members of an embedded object are governed by the object's column.
        if scope.object.is_some() {
            return Ok(Some(None));
        }
        let rule = scope.access.visibility(node.governing_field());
        let target = FilterScope::trusted(&scope.store, &scope.table);
        match compile_visibility(&rule, target, self.generator, &mut self.out.columns)? {
            VisibilityCheck::Always => Ok(Some(None)),
            VisibilityCheck::Never => Ok(None),
            VisibilityCheck::Column(column) => Ok(Some(Some(column))),
        }
    }

    fn compile_node(
        &mut self,
        scope: &Scope,
        node: &FieldNode,
        stitch: &mut Vec<StitchColumn>,
    ) -> Result<AliasNode, PlanError> {
        let key = node.output_key().to_string();
        let Some(visibility) = self.visibility(scope, node)? else {
            return Ok(AliasNode::Withheld { key });
        };

        match node {
            FieldNode::Primitive { field, .. } => {
                let column = self.project(scope.target(field), None);
                Ok(AliasNode::Column {
                    key,
                    column,
                    visibility,
                })
            }
            FieldNode::Function { function, field, .. } => {
                let target = Box::new(scope.target(field));
                let expr = match date_part(*function) {
                    Some(part) => Expr::DatePart { part, expr: target },
                    None => Expr::JsonLength(target),
                };
                let column = self.project(expr, Some(function.name()));
                Ok(AliasNode::Column {
                    key,
                    column,
                    visibility,
                })
            }
            FieldNode::NestedSingle {
                fields,
                nesting: SingleNesting::Object { path },
                ..
            } => {
                let object = match &scope.object {
                    None => (path.clone(), Vec::new()),
                    Some((column, members)) => {
                        let mut members = members.clone();
                        members.push(path.clone());
                        (column.clone(), members)
                    }
                };
                let presence_expr = if object.1.is_empty() {
                    Expr::column(&scope.table, &object.0)
                } else {
                    Expr::JsonPath {
                        expr: Box::new(Expr::column(&scope.table, &object.0)),
                        path: object.1.clone(),
                    }
                };
                let presence = self.project(presence_expr, None);
                let nested = Scope {
                    object: Some(object),
                    path: child_path(&scope.path, &key),
                    ..scope.clone()
                };
                let mapping = self.compile_fields(&nested, fields)?;
                Ok(AliasNode::Object {
                    key,
                    mapping,
                    presence: vec![presence],
                    visibility,
                })
            }
            FieldNode::NestedSingle {
                fields,
                nesting: SingleNesting::Relational { relation },
                ..
            } => {
                if scope.object.is_some() {
                    return Err(PlanError::RelationInsideObject(key));
                }
                check_keys(&key, relation)?;
                if relation.foreign.store != scope.store {
                    return Err(PlanError::CrossStoreJoin {
                        field: key,
                        from: scope.store.clone(),
                        to: relation.foreign.store.clone(),
                    });
                }

                let alias = self.generator.table_alias();
                let related = CollectionRef::new(&relation.foreign.store, &relation.foreign.collection);
                let access = self.access.get(&related);

                let mut on = relation
                    .local
                    .iter()
                    .zip(&relation.foreign.fields)
                    .map(|(local, foreign)| Expr::eq(Expr::column(&scope.table, local), Expr::column(&alias, foreign)))
                    .collect::<Vec<_>>();
                if access.is_denied() {
                    on.push(Expr::Boolean(false));
                }
                for filter in access.filters() {
                    let target = FilterScope::trusted(&relation.foreign.store, &alias);
                    on.push(compile_filter(filter, target, self.generator)?);
                }
                self.out.joins.push(JoinClause {
                    kind: JoinKind::Left,
                    table: TableRef {
                        schema: None,
                        name: relation.foreign.collection.clone(),
                    },
                    alias: Some(alias.clone()),
                    on: and_all(on),
                });

                let presence = relation
                    .foreign
                    .fields
                    .iter()
                    .map(|field| self.project(Expr::column(&alias, field), None))
                    .collect();
                let nested = Scope {
                    store: relation.foreign.store.clone(),
                    table: alias,
                    access,
                    object: None,
                    path: child_path(&scope.path, &key),
                };
                let mapping = self.compile_fields(&nested, fields)?;
                Ok(AliasNode::Object {
                    key,
                    mapping,
                    presence,
                    visibility,
                })
            }
            FieldNode::NestedMany {
                fields,
                relation,
                query,
                identifier_fields,
                ..
            } => {
                if scope.object.is_some() {
                    return Err(PlanError::RelationInsideObject(key));
                }
                check_keys(&key, relation)?;
                if identifier_fields.is_empty() {
                    return Err(PlanError::MissingIdentifier(key));
                }
                for local in &relation.local {
                    self.stitch(scope, local, stitch);
                }
                self.out.sub_queries.push(SubQuery {
                    path: scope.path.clone(),
                    key: key.clone(),
                    kind: SubQueryKind::Many {
                        relation: relation.clone(),
                        fields: fields.clone(),
                        query: query.clone(),
                        identifier_fields: identifier_fields.clone(),
                    },
                });
                Ok(AliasNode::Many { key, visibility })
            }
            FieldNode::NestedUnion {
                discriminator,
                key_field,
                collections,
                ..
            } => {
                if scope.object.is_some() {
                    return Err(PlanError::RelationInsideObject(key));
                }
                if collections.is_empty() {
                    return Err(PlanError::EmptyUnion(key));
                }
                self.stitch(scope, discriminator, stitch);
                self.stitch(scope, key_field, stitch);
                for member in collections {
                    self.out.sub_queries.push(SubQuery {
                        path: scope.path.clone(),
                        key: key.clone(),
                        kind: SubQueryKind::Union {
                            discriminator: discriminator.clone(),
                            key_field: key_field.clone(),
                            member: member.clone(),
                        },
                    });
                }
                Ok(AliasNode::Union { key, visibility })
            }
        }
    }
}

fn child_path(path: &[String], key: &str) -> Vec<String> {
    let mut child = path.to_vec();
    child.push(key.to_string());
    child
}

pub(crate) fn check_keys(key: &str, relation: &RelationDescriptor) -> Result<(), PlanError> {
    if relation.local.is_empty() || relation.foreign.fields.is_empty() {
        return Err(PlanError::MissingRelationKeys(key.to_string()));
    }
    if relation.local.len() != relation.foreign.fields.len() {
        return Err(PlanError::KeyArityMismatch {
            field: key.to_string(),
            local: relation.local.len(),
            foreign: relation.foreign.fields.len(),
        });
    }
    Ok(())
}

pub(crate) fn date_part(function: FieldFunction) -> Option<DatePart> {
    match function {
        FieldFunction::Year => Some(DatePart::Year),
        FieldFunction::Month => Some(DatePart::Month),
        FieldFunction::Week => Some(DatePart::Week),
        FieldFunction::Day => Some(DatePart::Day),
        FieldFunction::Weekday => Some(DatePart::Weekday),
        FieldFunction::Hour => Some(DatePart::Hour),
        FieldFunction::Minute => Some(DatePart::Minute),
        FieldFunction::Second => Some(DatePart::Second),
        FieldFunction::Count => None,
    }
}
