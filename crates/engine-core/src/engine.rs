//! The recursive executor: one compiled query per level, batched fetches for
//! every to-many and polymorphic field, merged back onto the parent records.

use crate::{
    error::EngineError,
    permissions::{Authorizer, PermissionContext, level_collections, resolve_access},
    reassembly::{ChildWindow, discriminates, merge_many, merge_union, reassemble},
};
use connectors::store::{FetchRowsRequest, Store, StoreRegistry};
use engine_config::settings::EngineSettings;
use futures::future::{BoxFuture, FutureExt, try_join_all};
use model::{
    core::{
        identifiers::{CollectionRef, RequestId},
        key::MergeKey,
        value::Value,
    },
    query::{
        access::AccessMap,
        field::FieldNode,
        filter::{Comparison, Filter, ValueList},
        modifiers::SortField,
        request::QueryRequest,
    },
    records::{
        record::{Entry, Record, records_at_path, records_at_path_ref},
        row::RowData,
    },
};
use planner::{
    compile::{
        CompileRequest, CompiledQuery, compile,
        fields::{ObjectMapping, SubQuery, SubQueryKind},
    },
    error::PlanError,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::{collections::HashSet, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, info, info_span, warn};

/// Result of one top-level read.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    /// `null`, one object, or an array of objects.
    pub data: JsonValue,
    /// Alias mapping of the root level, for introspection only.
    pub mapping: ObjectMapping,
}

pub struct Engine {
    stores: StoreRegistry,
    authorizer: Arc<dyn Authorizer>,
    settings: EngineSettings,
}

/// One level of the traversal: the root request, or one batch page of a
/// nested field.
struct Level<'a> {
    target: CollectionRef,
    fields: &'a [FieldNode],
    filter: Option<&'a Filter>,
    injected: Option<&'a Filter>,
    sort: &'a [SortField],
    tie_breakers: &'a [String],
    stitch_fields: &'a [String],
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'a> Level<'a> {
    fn compile_request<'b>(&'b self, access: &'b AccessMap) -> CompileRequest<'b> {
        CompileRequest::new(&self.target, self.fields, access)
            .filter(self.filter)
            .injected(self.injected)
            .sort(self.sort, self.tie_breakers)
            .stitch_fields(self.stitch_fields)
            .page(self.limit, self.offset)
    }
}

/// Parents of one sub-query that need children, reduced to distinct keys.
struct NestedFetch<'q> {
    sub_query: &'q SubQuery,
    keys: Vec<Vec<Value>>,
}

impl Engine {
    pub fn new(stores: StoreRegistry, authorizer: Arc<dyn Authorizer>, settings: EngineSettings) -> Self {
        Self {
            stores,
            authorizer,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Runs `request` for the caller in `permissions`. Cancelling `cancel`
    /// aborts every outstanding fetch of the traversal.
    pub async fn execute(
        &self,
        request: &QueryRequest,
        permissions: &PermissionContext,
        cancel: &CancellationToken,
    ) -> Result<QueryOutput, EngineError> {
        let request_id = RequestId::generate();
        let span = info_span!("execute", request_id = %request_id, collection = %request.target());

        async move {
            info!(single = request.single, "Executing request");
            let max_depth = self.settings.max_depth();
            if nesting_depth(&request.fields) > max_depth {
                return Err(PlanError::DepthExceeded(max_depth).into());
            }
            let level = Level {
                target: request.target(),
                fields: &request.fields,
                filter: request.query.filter.as_ref(),
                injected: None,
                sort: &request.query.sort,
                tie_breakers: &[],
                stitch_fields: &[],
                limit: root_limit(request, &self.settings),
                offset: request.query.offset,
            };
            let (mut records, mapping) = self.run_level(level, permissions, cancel, 0).await?;
            records.iter_mut().for_each(Record::strip_stitching);

            let data = if request.single {
                records.first().map(Record::to_json).unwrap_or(JsonValue::Null)
            } else {
                JsonValue::Array(records.iter().map(Record::to_json).collect())
            };
            info!(rows = records.len(), "Request complete");
            Ok(QueryOutput { data, mapping })
        }
        .instrument(span)
        .await
    }

    fn run_level<'a>(
        &'a self,
        level: Level<'a>,
        permissions: &'a PermissionContext,
        cancel: &'a CancellationToken,
        depth: usize,
    ) -> BoxFuture<'a, Result<(Vec<Record>, ObjectMapping), EngineError>> {
        async move {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let collections = level_collections(&level.target, level.fields, level.filter);
            let access = resolve_access(self.authorizer.as_ref(), permissions, &collections).await?;
            let query = compile(level.compile_request(&access))?;

            let rows = self.fetch(&query, cancel).await?;
            let mut records = reassemble(&rows, &query.mapping);
            if records.is_empty() || query.sub_queries.is_empty() {
                return Ok((records, query.mapping));
            }

            let fetches: Vec<NestedFetch<'_>> = query
                .sub_queries
                .iter()
                .map(|sub_query| self.nested_fetch(sub_query, &records))
                .collect();
            let batches = if self.settings.concurrent_siblings() {
                try_join_all(
                    fetches
                        .iter()
                        .map(|fetch| self.fetch_nested(fetch, permissions, cancel, depth)),
                )
                .await?
            } else {
                let mut batches = Vec::with_capacity(fetches.len());
                for fetch in &fetches {
                    batches.push(self.fetch_nested(fetch, permissions, cancel, depth).await?);
                }
                batches
            };

            for (fetch, children) in fetches.iter().zip(batches) {
                self.merge(&mut records, fetch.sub_query, children);
            }
            warn_unknown_discriminators(&records, &query.sub_queries);
            Ok((records, query.mapping))
        }
        .boxed()
    }

    async fn fetch(&self, query: &CompiledQuery, cancel: &CancellationToken) -> Result<Vec<RowData>, EngineError> {
        let store = self.store(&query.target.store)?;
        let request = FetchRowsRequest::from(query);
        let rows = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            rows = store.fetch_rows(request) => rows?,
        };
        debug!(
            collection = %query.target,
            fingerprint = %query.fingerprint(),
            rows = rows.len(),
            "Fetched rows"
        );
        Ok(rows)
    }

    fn store(&self, name: &str) -> Result<Arc<dyn Store>, EngineError> {
        self.stores
            .get(name)
            .ok_or_else(|| EngineError::UnknownStore(name.to_string()))
    }

    /// Collects the distinct non-null keys of the parents a sub-query serves.
    /// Parents with a null key or a withheld field never reach the store.
    fn nested_fetch<'q>(&self, sub_query: &'q SubQuery, records: &[Record]) -> NestedFetch<'q> {
        let coercion = self.settings.key_coercion();
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for parent in records_at_path_ref(records, &sub_query.path) {
            if matches!(parent.get(&sub_query.key), Some(Entry::Withheld)) {
                continue;
            }
            let values = match &sub_query.kind {
                SubQueryKind::Many { relation, .. } => parent.key_values(&relation.local),
                SubQueryKind::Union {
                    discriminator,
                    key_field,
                    member,
                } => {
                    if !discriminates(parent, discriminator, &member.collection) {
                        continue;
                    }
                    vec![parent.key_value(key_field)]
                }
            };
            if let Some(key) = MergeKey::from_values(&values, coercion) {
                if seen.insert(key) {
                    keys.push(values);
                }
            }
        }
        NestedFetch { sub_query, keys }
    }

    /// Pages through the related collection until a short page comes back.
    async fn fetch_nested(
        &self,
        fetch: &NestedFetch<'_>,
        permissions: &PermissionContext,
        cancel: &CancellationToken,
        depth: usize,
    ) -> Result<Vec<Record>, EngineError> {
        if fetch.keys.is_empty() {
            return Ok(Vec::new());
        }

        let (target, fields, filter, sort, tie_breakers, stitch_fields) = match &fetch.sub_query.kind {
            SubQueryKind::Many {
                relation,
                fields,
                query,
                identifier_fields,
            } => (
                CollectionRef::new(&relation.foreign.store, &relation.foreign.collection),
                fields.as_slice(),
                query.filter.as_ref(),
                query.sort.as_slice(),
                identifier_fields.as_slice(),
                relation.foreign.fields.clone(),
            ),
            // The member's key is unique in its collection, so it orders pages.
            SubQueryKind::Union { member, .. } => (
                CollectionRef::new(&member.store, &member.collection),
                member.fields.as_slice(),
                member.query.filter.as_ref(),
                member.query.sort.as_slice(),
                std::slice::from_ref(&member.key_field),
                vec![member.key_field.clone()],
            ),
        };
        let injected = parent_filter(&stitch_fields, &fetch.keys);
        let page = self.settings.batch_size() as u64;

        let span = debug_span!("nested", collection = %target, depth = depth + 1);
        async move {
            let mut children = Vec::new();
            let mut offset = 0;
            loop {
                let level = Level {
                    target: target.clone(),
                    fields,
                    filter,
                    injected: Some(&injected),
                    sort,
                    tie_breakers,
                    stitch_fields: &stitch_fields,
                    limit: Some(page),
                    offset: Some(offset),
                };
                let (batch, _) = self.run_level(level, permissions, cancel, depth + 1).await?;
                let fetched = batch.len() as u64;
                debug!(
                    field = %fetch.sub_query.key,
                    keys = fetch.keys.len(),
                    offset,
                    fetched,
                    "Fetched batch"
                );
                children.extend(batch);
                if fetched < page {
                    break;
                }
                offset += page;
            }
            Ok(children)
        }
        .instrument(span)
        .await
    }

    fn merge(&self, records: &mut [Record], sub_query: &SubQuery, children: Vec<Record>) {
        let coercion = self.settings.key_coercion();
        let parents = records_at_path(records, &sub_query.path);
        match &sub_query.kind {
            SubQueryKind::Many { relation, query, .. } => merge_many(
                parents,
                children,
                &relation.local,
                &relation.foreign.fields,
                &sub_query.key,
                ChildWindow::new(query.offset, query.limit.and_then(|limit| limit.count())),
                coercion,
            ),
            SubQueryKind::Union {
                discriminator,
                key_field,
                member,
            } => merge_union(
                parents,
                children,
                discriminator,
                key_field,
                member,
                &sub_query.key,
                coercion,
            ),
        }
    }
}

/// Root limit: the request's own, or the configured default. `-1` lifts it.
pub fn root_limit(request: &QueryRequest, settings: &EngineSettings) -> Option<u64> {
    if request.single {
        return Some(1);
    }
    match request.query.limit {
        Some(limit) => limit.count(),
        None => Some(settings.default_limit()),
    }
}

/// Number of batched levels below the root: every to-many and polymorphic
/// field opens one, joins and JSON objects stay in their parent's level.
pub fn nesting_depth(fields: &[FieldNode]) -> usize {
    fields
        .iter()
        .map(|node| match node {
            FieldNode::Primitive { .. } | FieldNode::Function { .. } => 0,
            FieldNode::NestedSingle { fields, .. } => nesting_depth(fields),
            FieldNode::NestedMany { fields, .. } => 1 + nesting_depth(fields),
            FieldNode::NestedUnion { collections, .. } => {
                1 + collections
                    .iter()
                    .map(|member| nesting_depth(&member.fields))
                    .max()
                    .unwrap_or(0)
            }
        })
        .max()
        .unwrap_or(0)
}

/// Compiles the root level of `request` without executing it.
pub fn plan(request: &QueryRequest, access: &AccessMap, settings: &EngineSettings) -> Result<CompiledQuery, PlanError> {
    let target = request.target();
    compile(
        CompileRequest::new(&target, &request.fields, access)
            .filter(request.query.filter.as_ref())
            .sort(&request.query.sort, &[])
            .page(root_limit(request, settings), request.query.offset),
    )
}

/// `foreign IN (keys)` for single keys, an OR of per-key ANDs for composite
/// ones.
pub fn parent_filter(foreign: &[String], keys: &[Vec<Value>]) -> Filter {
    if let [field] = foreign {
        let values = keys
            .iter()
            .filter_map(|key| key.first().map(Value::to_json))
            .collect();
        return Filter::condition(field, Comparison::In(ValueList(values)));
    }
    Filter::or(keys.iter().map(|key| {
        Filter::and(
            foreign
                .iter()
                .zip(key)
                .map(|(field, value)| Filter::condition(field, Comparison::Eq(value.to_json()))),
        )
    }))
}

fn warn_unknown_discriminators(records: &[Record], sub_queries: &[SubQuery]) {
    let mut checked = HashSet::new();
    for sub_query in sub_queries {
        let SubQueryKind::Union { discriminator, .. } = &sub_query.kind else {
            continue;
        };
        if !checked.insert((&sub_query.path, &sub_query.key)) {
            continue;
        }
        let members: Vec<&str> = sub_queries
            .iter()
            .filter(|other| other.path == sub_query.path && other.key == sub_query.key)
            .filter_map(|other| match &other.kind {
                SubQueryKind::Union { member, .. } => Some(member.collection.as_str()),
                SubQueryKind::Many { .. } => None,
            })
            .collect();
        for parent in records_at_path_ref(records, &sub_query.path) {
            let Some(name) = parent.key_value(discriminator).as_string() else {
                continue;
            };
            if !members.contains(&name.as_str()) {
                warn!(field = %sub_query.key, discriminator = %name, "Unknown discriminator, value left null");
            }
        }
    }
}
