use async_trait::async_trait;
use connectors::{
    error::DbError,
    store::{FetchRowsRequest, Store},
};
use model::{
    query::{
        field::{FieldFunction, FieldNode, ForeignKey, RelationDescriptor, SingleNesting, UnionMember},
        filter::{Comparison, Filter, Quantifier},
        modifiers::{Limit, QueryModifiers, SortField},
    },
    records::row::RowData,
};
use planner::query::dialect::Dialect;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::STORE;

pub fn field(name: &str) -> FieldNode {
    FieldNode::Primitive {
        field: name.into(),
        alias: None,
    }
}

pub fn fields(names: &[&str]) -> Vec<FieldNode> {
    names.iter().map(|name| field(name)).collect()
}

pub fn function(function: FieldFunction, name: &str, alias: &str) -> FieldNode {
    FieldNode::Function {
        function,
        field: name.into(),
        alias: Some(alias.into()),
    }
}

pub fn relation(local: &[&str], collection: &str, foreign: &[&str]) -> RelationDescriptor {
    RelationDescriptor {
        local: local.iter().map(|f| f.to_string()).collect(),
        foreign: ForeignKey {
            store: STORE.into(),
            collection: collection.into(),
            fields: foreign.iter().map(|f| f.to_string()).collect(),
        },
    }
}

/// Many-to-one, joined in.
pub fn m2o(key: &str, local: &str, collection: &str, nested: Vec<FieldNode>) -> FieldNode {
    FieldNode::NestedSingle {
        key: key.into(),
        fields: nested,
        nesting: SingleNesting::Relational {
            relation: relation(&[local], collection, &["id"]),
        },
    }
}

/// Member object of a JSON column.
pub fn object(key: &str, nested: Vec<FieldNode>) -> FieldNode {
    FieldNode::NestedSingle {
        key: key.into(),
        fields: nested,
        nesting: SingleNesting::Object { path: key.into() },
    }
}

/// One-to-many from the parent's `id`, sorted by the child's `id`.
pub fn o2m(key: &str, collection: &str, foreign: &str, nested: Vec<FieldNode>) -> FieldNode {
    o2m_with(key, collection, foreign, nested, QueryModifiers::default())
}

pub fn o2m_with(
    key: &str,
    collection: &str,
    foreign: &str,
    nested: Vec<FieldNode>,
    query: QueryModifiers,
) -> FieldNode {
    FieldNode::NestedMany {
        key: key.into(),
        fields: nested,
        relation: relation(&["id"], collection, &[foreign]),
        query,
        identifier_fields: vec!["id".into()],
    }
}

pub fn member(collection: &str, nested: Vec<FieldNode>) -> UnionMember {
    UnionMember {
        store: STORE.into(),
        collection: collection.into(),
        key_field: "id".into(),
        fields: nested,
        query: QueryModifiers::default(),
    }
}

pub fn union(key: &str, members: Vec<UnionMember>) -> FieldNode {
    FieldNode::NestedUnion {
        key: key.into(),
        discriminator: "collection".into(),
        key_field: "item".into(),
        collections: members,
    }
}

/// `comparison` on `field` of the records `relation` leads to.
pub fn related(relation: RelationDescriptor, quantifier: Quantifier, field: &str, comparison: Comparison) -> Filter {
    match Filter::condition(field, comparison) {
        Filter::Condition(condition) => Filter::Condition(condition.through(relation, quantifier)),
        other => other,
    }
}

/// `comparison` on the JSON member `path` of `field`.
pub fn at_path(field: &str, path: &[&str], comparison: Comparison) -> Filter {
    match Filter::condition(field, comparison) {
        Filter::Condition(mut condition) => {
            condition.path = path.iter().map(|segment| segment.to_string()).collect();
            Filter::Condition(condition)
        }
        other => other,
    }
}

/// `comparison` on `function(field)`.
pub fn applied(function: FieldFunction, field: &str, comparison: Comparison) -> Filter {
    match Filter::condition(field, comparison) {
        Filter::Condition(condition) => Filter::Condition(condition.with_function(function)),
        other => other,
    }
}

pub fn sorted_by(field: &str) -> QueryModifiers {
    QueryModifiers {
        sort: vec![SortField::asc(field)],
        ..Default::default()
    }
}

pub fn filtered(filter: Filter) -> QueryModifiers {
    QueryModifiers {
        filter: Some(filter),
        sort: vec![SortField::asc("id")],
        ..Default::default()
    }
}

pub fn window(offset: u64, limit: u64) -> QueryModifiers {
    QueryModifiers {
        sort: vec![SortField::asc("id")],
        limit: Some(Limit::Count(limit)),
        offset: Some(offset),
        ..Default::default()
    }
}

/// Object keys of a JSON value, in order.
pub fn keys(value: &JsonValue) -> Vec<String> {
    value
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

/// Fails every fetch against `collection`; forwards everything else.
pub struct FailingStore {
    pub inner: Arc<dyn Store>,
    pub collection: String,
}

#[async_trait]
impl Store for FailingStore {
    fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect()
    }

    async fn fetch_rows(&self, request: FetchRowsRequest) -> Result<Vec<RowData>, DbError> {
        if request.collection.collection == self.collection {
            return Err(DbError::Unsupported(format!("{} is offline", self.collection)));
        }
        self.inner.fetch_rows(request).await
    }
}

/// Cancels `token` when `collection` is fetched, then never answers.
pub struct CancellingStore {
    pub inner: Arc<dyn Store>,
    pub collection: String,
    pub token: CancellationToken,
}

#[async_trait]
impl Store for CancellingStore {
    fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect()
    }

    async fn fetch_rows(&self, request: FetchRowsRequest) -> Result<Vec<RowData>, DbError> {
        if request.collection.collection == self.collection {
            self.token.cancel();
            std::future::pending::<()>().await;
        }
        self.inner.fetch_rows(request).await
    }
}

/// One select as a [`RecordingStore`] saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenSelect {
    pub collection: String,
    pub order_terms: usize,
    pub paged: bool,
}

/// Records the ordering and paging of every select; forwards everything.
pub struct RecordingStore {
    pub inner: Arc<dyn Store>,
    pub seen: Mutex<Vec<SeenSelect>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub async fn seen(&self) -> Vec<SeenSelect> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl Store for RecordingStore {
    fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect()
    }

    async fn fetch_rows(&self, request: FetchRowsRequest) -> Result<Vec<RowData>, DbError> {
        self.seen.lock().await.push(SeenSelect {
            collection: request.collection.collection.clone(),
            order_terms: request.select.order_by.len(),
            paged: request.select.limit.is_some(),
        });
        self.inner.fetch_rows(request).await
    }
}
