//! Compilation of one query level into an immutable [`CompiledQuery`].

pub mod alias;
pub mod condition;
pub mod fields;

use crate::{
    compile::{
        alias::IndexGenerator,
        condition::{FilterScope, combine_conditions},
        fields::{FieldCompiler, ObjectMapping, SubQuery},
    },
    error::PlanError,
    query::{
        ast::{
            common::{OrderDir, TableRef},
            expr::{Expr, and_all},
            select::Select,
        },
        builder::select::SelectBuilder,
        dialect::{Dialect, Postgres},
        renderer::render_with,
    },
};
use model::{
    core::{identifiers::CollectionRef, value::Value},
    query::{access::AccessMap, field::FieldNode, filter::Filter, modifiers::SortField},
};
use tracing::debug;

/// Inputs for compiling one collection level.
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    pub target: &'a CollectionRef,
    pub fields: &'a [FieldNode],
    pub access: &'a AccessMap,
    /// Caller-supplied filter.
    pub filter: Option<&'a Filter>,
    /// Parent key filter injected by a nested fetch.
    pub injected: Option<&'a Filter>,
    pub sort: &'a [SortField],
    /// Appended to the sort when not already sorted on.
    pub tie_breakers: &'a [String],
    /// Fields projected for merging with a parent level.
    pub stitch_fields: &'a [String],
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl<'a> CompileRequest<'a> {
    pub fn new(target: &'a CollectionRef, fields: &'a [FieldNode], access: &'a AccessMap) -> Self {
        Self {
            target,
            fields,
            access,
            filter: None,
            injected: None,
            sort: &[],
            tie_breakers: &[],
            stitch_fields: &[],
            limit: None,
            offset: None,
        }
    }

    pub fn filter(mut self, filter: Option<&'a Filter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn injected(mut self, filter: Option<&'a Filter>) -> Self {
        self.injected = filter;
        self
    }

    pub fn sort(mut self, sort: &'a [SortField], tie_breakers: &'a [String]) -> Self {
        self.sort = sort;
        self.tie_breakers = tie_breakers;
        self
    }

    pub fn stitch_fields(mut self, fields: &'a [String]) -> Self {
        self.stitch_fields = fields;
        self
    }

    pub fn page(mut self, limit: Option<u64>, offset: Option<u64>) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// The clause set, parameters and alias mapping of one level. Never mutated
/// after [`compile`] returns it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub target: CollectionRef,
    pub select: Select,
    pub parameters: Vec<Value>,
    pub mapping: ObjectMapping,
    pub sub_queries: Vec<SubQuery>,
}

impl CompiledQuery {
    pub fn render(&self, dialect: &dyn Dialect) -> (String, Vec<Value>) {
        render_with(dialect, &self.parameters, &self.select)
    }

    /// Stable digest of the statement text, used to correlate log lines.
    pub fn fingerprint(&self) -> String {
        let (sql, _) = self.render(&Postgres);
        let hash = blake3::hash(sql.as_bytes()).to_hex();
        hash.as_str()[..16].to_string()
    }
}

pub fn compile(request: CompileRequest<'_>) -> Result<CompiledQuery, PlanError> {
    let mut generator = IndexGenerator::new();
    let base = generator.table_alias();
    let access = request.access.get(request.target);

    let compiled = FieldCompiler::new(&mut generator, request.access).compile(
        request.target,
        &base,
        request.fields,
        request.stitch_fields,
    )?;

    let mut condition = combine_conditions(
        access.filters(),
        request.injected,
        request.filter,
        FilterScope::guarded(&request.target.store, &base, request.access),
        &mut generator,
    )?;
    if access.is_denied() {
        condition = Some(and_all(condition.into_iter().chain([Expr::Boolean(false)])));
    }

    let mut builder = SelectBuilder::new()
        .select(compiled.columns)
        .from(
            TableRef {
                schema: None,
                name: request.target.collection.clone(),
            },
            Some(&base),
        )
        .joins(compiled.joins)
        .where_clause(condition);

    for sort in request.sort {
        let direction = if sort.descending { OrderDir::Desc } else { OrderDir::Asc };
        builder = builder.order_by(Expr::column(&base, &sort.field), Some(direction));
    }
    for field in request.tie_breakers {
        if request.sort.iter().all(|sort| &sort.field != field) {
            builder = builder.order_by(Expr::column(&base, field), Some(OrderDir::Asc));
        }
    }

    let limit = request.limit.map(|limit| generator.bind(Value::Uint(limit)));
    let offset = request
        .offset
        .filter(|offset| *offset > 0)
        .map(|offset| generator.bind(Value::Uint(offset)));
    let select = builder.limit(limit).offset(offset).build();

    let query = CompiledQuery {
        target: request.target.clone(),
        select,
        parameters: generator.into_parameters(),
        mapping: compiled.mapping,
        sub_queries: compiled.sub_queries,
    };
    debug!(
        collection = %query.target,
        fingerprint = %query.fingerprint(),
        sub_queries = query.sub_queries.len(),
        "Compiled query level"
    );
    Ok(query)
}
