#![allow(dead_code)]

use connectors::{
    memory::store::MemoryStore,
    store::{Store, StoreRegistry},
};
use engine_config::settings::{EngineSettings, EngineSettingsBuilder};
use engine_core::{
    engine::Engine,
    error::EngineError,
    permissions::{Accountability, AllowAll, Authorizer, PermissionContext},
};
use model::query::request::QueryRequest;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod properties;
pub mod scenarios;
pub mod utils;

/// Store name every fixture is registered under.
pub const STORE: &str = "main";

/// Articles with authors, comments, tags and a polymorphic block list.
pub fn blog_store() -> MemoryStore {
    MemoryStore::from_json(json!({
        "articles": [
            {"id": 1, "title": "A", "status": "published", "author_id": 5, "editor_id": 6,
             "meta": {"source": "rss", "seo": {"slug": "a"}}, "published_on": "2024-03-09T10:00:00Z"},
            {"id": 2, "title": "B", "status": "draft", "author_id": null, "editor_id": 5,
             "meta": null, "published_on": "2023-12-31T23:00:00Z"},
            {"id": 3, "title": "Hidden", "status": "hidden", "author_id": 6, "editor_id": null,
             "meta": {"source": "manual"}, "published_on": null}
        ],
        "authors": [
            {"id": 5, "name": "Jane", "country": "NZ"},
            {"id": 6, "name": "Joe", "country": "PL"}
        ],
        "books": [
            {"id": 100, "author_id": 5, "title": "Rust in Anger"},
            {"id": 101, "author_id": 5, "title": "Borrowed Time"},
            {"id": 102, "author_id": 6, "title": "Async Everything"}
        ],
        "comments": [
            {"id": 10, "article_id": 1, "body": "first"},
            {"id": 11, "article_id": 1, "body": "second"},
            {"id": 12, "article_id": 1, "body": "third"},
            {"id": 13, "article_id": 2, "body": "only"}
        ],
        "reactions": [
            {"id": 1000, "comment_id": 10, "kind": "like"},
            {"id": 1001, "comment_id": 10, "kind": "laugh"},
            {"id": 1002, "comment_id": 13, "kind": "like"}
        ],
        "blocks": [
            {"id": 1, "collection": "pages", "item": "1"},
            {"id": 2, "collection": "posts", "item": "1"},
            {"id": 3, "collection": "videos", "item": "9"},
            {"id": 4, "collection": null, "item": null}
        ],
        "pages": [
            {"id": 1, "title": "About"}
        ],
        "posts": [
            {"id": 1, "headline": "Launch"}
        ]
    }))
    .expect("valid blog fixture")
}

pub fn settings() -> EngineSettingsBuilder {
    EngineSettingsBuilder::default()
}

pub fn engine(store: Arc<dyn Store>, settings: EngineSettings) -> Engine {
    engine_with(store, Arc::new(AllowAll), settings)
}

pub fn engine_with(store: Arc<dyn Store>, authorizer: Arc<dyn Authorizer>, settings: EngineSettings) -> Engine {
    Engine::new(StoreRegistry::new().with(STORE, store), authorizer, settings)
}

pub fn admin() -> PermissionContext {
    PermissionContext::new(Accountability::admin())
}

/// Executes `request` and returns the client-visible data.
pub async fn run(engine: &Engine, request: &QueryRequest, permissions: &PermissionContext) -> JsonValue {
    try_run(engine, request, permissions)
        .await
        .expect("query should succeed")
}

pub async fn try_run(
    engine: &Engine,
    request: &QueryRequest,
    permissions: &PermissionContext,
) -> Result<JsonValue, EngineError> {
    engine
        .execute(request, permissions, &CancellationToken::new())
        .await
        .map(|output| output.data)
}
