#[cfg(test)]
mod tests {
    use crate::{
        admin, blog_store, engine, engine_with, run, settings, try_run,
        utils::{
            CancellingStore, FailingStore, RecordingStore, field, fields, filtered, function, keys,
            m2o, member, o2m, o2m_with, object, related, relation, sorted_by, union, window,
        },
    };
    use connectors::{memory::store::MemoryStore, store::Store};
    use engine_config::settings::EngineSettings;
    use engine_core::{
        engine::plan,
        error::{AuthorizationError, EngineError},
        permissions::{Accountability, Authorizer, PermissionContext, PolicyAuthorizer},
    };
    use model::{
        core::{identifiers::CollectionRef, key::KeyCoercion},
        query::{
            access::{AccessMap, CollectionAccess},
            field::{FieldFunction, FieldNode},
            filter::{Comparison, Filter, Quantifier},
            request::QueryRequest,
        },
    };
    use planner::{error::PlanError, query::dialect::Postgres};
    use serde_json::{Value as JsonValue, json};
    use std::{collections::HashSet, sync::Arc};
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    fn articles(fields: Vec<FieldNode>) -> QueryRequest {
        QueryRequest::new("main", "articles", fields).with_query(sorted_by("id"))
    }

    fn editor_policy(filter: Filter) -> PolicyAuthorizer {
        PolicyAuthorizer::default().grant(
            "editor",
            &CollectionRef::new("main", "articles"),
            CollectionAccess::Granted {
                filters: vec![filter],
                fields: Default::default(),
            },
        )
    }

    fn editor() -> PermissionContext {
        PermissionContext::new(Accountability::role("editor"))
    }

    // Scenario: Field trees without relations.
    // Expected Outcome: Every row carries exactly the requested keys, in request order.
    #[traced_test]
    #[tokio::test]
    async fn scalar_trees_return_exactly_requested_fields() {
        let engine = engine(Arc::new(blog_store()), EngineSettings::default());
        let requested = ["title", "id", "status"];

        let data = run(&engine, &articles(fields(&requested)), &admin()).await;
        let rows = data.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        for row in rows {
            assert_eq!(keys(row), requested);
        }
    }

    // Scenario: A tree mixing joins, JSON objects, functions and batched relations.
    // Expected Outcome: Output keys mirror the tree at every level; stitching keys never leak.
    #[traced_test]
    #[tokio::test]
    async fn output_shape_mirrors_field_tree() {
        let engine = engine(Arc::new(blog_store()), EngineSettings::default());
        let tree = vec![
            field("title"),
            function(FieldFunction::Year, "published_on", "year"),
            m2o("author", "author_id", "authors", fields(&["name"])),
            object("meta", vec![field("source"), object("seo", fields(&["slug"]))]),
            o2m("comments", "comments", "article_id", fields(&["body"])),
        ];

        let data = run(&engine, &articles(tree), &admin()).await;
        assert_eq!(
            data[0],
            json!({
                "title": "A",
                "year": 2024,
                "author": { "name": "Jane" },
                "meta": { "source": "rss", "seo": { "slug": "a" } },
                "comments": [{ "body": "first" }, { "body": "second" }, { "body": "third" }]
            })
        );
        assert_eq!(
            data[1],
            json!({
                "title": "B",
                "year": 2023,
                "author": null,
                "meta": null,
                "comments": [{ "body": "only" }]
            })
        );
        assert_eq!(data[2]["meta"], json!({ "source": "manual", "seo": null }));
        assert_eq!(data[2]["comments"], json!([]));
        assert_eq!(data[2]["year"], JsonValue::Null);
    }

    // Scenario: The to-many relation hangs off a nullable column that is null on some parents.
    // Expected Outcome: Those parents get `[]` and, when every key is null, nothing is queried.
    #[traced_test]
    #[tokio::test]
    async fn null_parent_keys_issue_no_query() {
        let store = MemoryStore::from_json(json!({
            "articles": [
                {"id": 1, "thread_id": null},
                {"id": 2, "thread_id": null}
            ],
            "posts": [{"id": 7, "thread_id": 1}]
        }))
        .unwrap();
        let engine = engine(Arc::new(store.clone()), EngineSettings::default());
        let posts = FieldNode::NestedMany {
            key: "posts".into(),
            fields: fields(&["id"]),
            relation: relation(&["thread_id"], "posts", &["thread_id"]),
            query: Default::default(),
            identifier_fields: vec!["id".into()],
        };

        let data = run(&engine, &articles(vec![field("id"), posts]), &admin()).await;
        assert_eq!(data, json!([{ "id": 1, "posts": [] }, { "id": 2, "posts": [] }]));
        assert!(store.issued_for("posts").await.is_empty());
    }

    // Scenario: Every parent has a key but no child matches.
    // Expected Outcome: One query, `[]` everywhere, no error.
    #[traced_test]
    #[tokio::test]
    async fn empty_child_batch_yields_empty_lists() {
        let store = blog_store();
        let engine = engine(Arc::new(store.clone()), EngineSettings::default());
        let request = articles(vec![
            field("id"),
            o2m("books", "books", "article_id_that_does_not_exist", fields(&["id"])),
        ]);

        let data = run(&engine, &request, &admin()).await;
        for row in data.as_array().unwrap() {
            assert_eq!(row["books"], json!([]));
        }
        assert_eq!(store.issued_for("books").await.len(), 1);
    }

    // Scenario: Permission filter `status != hidden`, user filter `status = hidden`,
    // alone and smuggled inside an OR.
    // Expected Outcome: No hidden article is ever returned.
    #[traced_test]
    #[tokio::test]
    async fn permission_filter_cannot_be_bypassed() {
        let policy = editor_policy(Filter::condition("status", Comparison::Neq(json!("hidden"))));
        let engine = engine_with(Arc::new(blog_store()), Arc::new(policy), EngineSettings::default());
        let hidden = Filter::condition("status", Comparison::Eq(json!("hidden")));

        let direct = QueryRequest::new("main", "articles", fields(&["id"])).with_query(filtered(hidden.clone()));
        assert_eq!(run(&engine, &direct, &editor()).await, json!([]));

        let smuggled = QueryRequest::new("main", "articles", fields(&["id"])).with_query(filtered(Filter::or([
            hidden,
            Filter::condition("id", Comparison::Gt(json!(0))),
        ])));
        assert_eq!(
            run(&engine, &smuggled, &editor()).await,
            json!([{ "id": 1 }, { "id": 2 }])
        );
    }

    // Scenario: A user filter asks for articles with a comment reading "only". The caller may read
    // comments other than that one, or no comments at all.
    // Expected Outcome: The filter cannot see unreadable comments, so no article matches; an
    // administrator gets article 2.
    #[traced_test]
    #[tokio::test]
    async fn related_filters_only_see_readable_rows() {
        let request = QueryRequest::new("main", "articles", fields(&["id"])).with_query(filtered(related(
            relation(&["id"], "comments", &["article_id"]),
            Quantifier::Some,
            "body",
            Comparison::Eq(json!("only")),
        )));

        let admin_engine = engine(Arc::new(blog_store()), EngineSettings::default());
        assert_eq!(run(&admin_engine, &request, &admin()).await, json!([{ "id": 2 }]));

        let filtered_comments = editor_policy(Filter::and([])).grant(
            "editor",
            &CollectionRef::new("main", "comments"),
            CollectionAccess::Granted {
                filters: vec![Filter::condition("body", Comparison::Neq(json!("only")))],
                fields: Default::default(),
            },
        );
        let engine = engine_with(Arc::new(blog_store()), Arc::new(filtered_comments), EngineSettings::default());
        assert_eq!(run(&engine, &request, &editor()).await, json!([]));

        let no_comments = editor_policy(Filter::and([]));
        let engine = engine_with(Arc::new(blog_store()), Arc::new(no_comments), EngineSettings::default());
        assert_eq!(run(&engine, &request, &editor()).await, json!([]));
    }

    // Scenario: Child counts {0, 1, n, n+1, 2n} with batch size n = 3.
    // Expected Outcome: The loop terminates with exactly that many children, no duplicates,
    // after count / n + 1 pages.
    #[traced_test]
    #[tokio::test]
    async fn batch_loop_returns_every_child_once() {
        let page = 3;
        for count in [0, 1, page, page + 1, 2 * page] {
            let comments: Vec<JsonValue> = (0..count)
                .map(|i| json!({ "id": 100 + i, "article_id": 1 }))
                .collect();
            let store = MemoryStore::from_json(json!({
                "articles": [{ "id": 1 }],
                "comments": comments
            }))
            .unwrap();
            let engine = engine(
                Arc::new(store.clone()),
                settings().batch_size(page).build().unwrap(),
            );
            let request = articles(vec![o2m("comments", "comments", "article_id", fields(&["id"]))]);

            let data = run(&engine, &request, &admin()).await;
            let ids: Vec<i64> = data[0]["comments"]
                .as_array()
                .unwrap()
                .iter()
                .map(|c| c["id"].as_i64().unwrap())
                .collect();
            let unique: HashSet<i64> = ids.iter().copied().collect();
            assert_eq!(ids.len(), count, "children for count {count}");
            assert_eq!(unique.len(), count, "duplicates for count {count}");
            assert_eq!(
                store.issued_for("comments").await.len(),
                count / page + 1,
                "pages for count {count}"
            );
        }
    }

    // Scenario: Two sibling relations join the same collection.
    // Expected Outcome: Distinct table aliases in the compiled select, correct objects per sibling.
    #[traced_test]
    #[tokio::test]
    async fn sibling_joins_get_distinct_aliases() {
        let tree = vec![
            field("id"),
            m2o("author", "author_id", "authors", fields(&["name"])),
            m2o("editor", "editor_id", "authors", fields(&["name"])),
        ];
        let request = articles(tree);

        let query = plan(&request, &AccessMap::unrestricted(), &EngineSettings::default()).unwrap();
        let aliases: Vec<Option<&str>> = query.select.joins.iter().map(|j| j.alias.as_deref()).collect();
        assert_eq!(aliases, vec![Some("t1"), Some("t2")]);
        let (sql, _) = query.render(&Postgres);
        assert!(sql.contains(r#"LEFT JOIN "authors" AS "t1""#), "{sql}");
        assert!(sql.contains(r#"LEFT JOIN "authors" AS "t2""#), "{sql}");

        let engine = engine(Arc::new(blog_store()), EngineSettings::default());
        let data = run(&engine, &request, &admin()).await;
        assert_eq!(
            data[0],
            json!({ "id": 1, "author": { "name": "Jane" }, "editor": { "name": "Joe" } })
        );
        assert_eq!(data[2]["editor"], JsonValue::Null);
    }

    // Scenario: The same tree with sibling relations fetched sequentially and concurrently.
    // Expected Outcome: Identical output.
    #[traced_test]
    #[tokio::test]
    async fn concurrent_siblings_do_not_change_output() {
        let tree = vec![
            field("id"),
            o2m("comments", "comments", "article_id", fields(&["id"])),
            m2o(
                "author",
                "author_id",
                "authors",
                vec![field("name"), o2m("books", "books", "author_id", fields(&["title"]))],
            ),
        ];
        let request = articles(tree);

        let sequential = engine(Arc::new(blog_store()), settings().batch_size(2).build().unwrap());
        let concurrent = engine(
            Arc::new(blog_store()),
            settings().batch_size(2).concurrent_siblings(true).build().unwrap(),
        );
        let a = run(&sequential, &request, &admin()).await;
        let b = run(&concurrent, &request, &admin()).await;
        assert_eq!(a, b);
        assert_eq!(
            a[0]["author"]["books"],
            json!([{ "title": "Rust in Anger" }, { "title": "Borrowed Time" }])
        );
    }

    // Scenario: Relations nested under relations.
    // Expected Outcome: Each level is batched from the level above and merged in place.
    #[traced_test]
    #[tokio::test]
    async fn nested_batches_recurse() {
        let store = blog_store();
        let engine = engine(Arc::new(store.clone()), EngineSettings::default());
        let reactions = o2m("reactions", "reactions", "comment_id", fields(&["kind"]));
        let request = articles(vec![
            field("id"),
            o2m("comments", "comments", "article_id", vec![field("id"), reactions]),
        ]);

        let data = run(&engine, &request, &admin()).await;
        assert_eq!(
            data[0]["comments"][0],
            json!({ "id": 10, "reactions": [{ "kind": "like" }, { "kind": "laugh" }] })
        );
        assert_eq!(data[0]["comments"][1]["reactions"], json!([]));
        assert_eq!(data[1]["comments"][0]["reactions"], json!([{ "kind": "like" }]));
        assert_eq!(store.issued_for("reactions").await.len(), 1);
    }

    // Scenario: A to-many field with its own offset and limit.
    // Expected Outcome: The window applies per parent, after all batches are merged.
    #[traced_test]
    #[tokio::test]
    async fn nested_window_applies_per_parent() {
        let engine = engine(Arc::new(blog_store()), settings().batch_size(1).build().unwrap());
        let request = articles(vec![
            field("id"),
            o2m_with("comments", "comments", "article_id", fields(&["id"]), window(1, 1)),
        ]);

        let data = run(&engine, &request, &admin()).await;
        assert_eq!(data[0]["comments"], json!([{ "id": 11 }]));
        assert_eq!(data[1]["comments"], json!([]));
    }

    // Scenario: Child keys stored as strings, parent keys as integers.
    // Expected Outcome: Loose coercion stitches them, strict coercion does not.
    #[traced_test]
    #[tokio::test]
    async fn key_coercion_is_explicit() {
        let fixture = json!({
            "articles": [{ "id": 1 }],
            "comments": [{ "id": 10, "article_id": "1" }]
        });
        let request = articles(vec![o2m("comments", "comments", "article_id", fields(&["id"]))]);

        let loose = engine(
            Arc::new(MemoryStore::from_json(fixture.clone()).unwrap()),
            settings().key_coercion(KeyCoercion::Loose).build().unwrap(),
        );
        let strict = engine(
            Arc::new(MemoryStore::from_json(fixture).unwrap()),
            settings().key_coercion(KeyCoercion::Strict).build().unwrap(),
        );
        assert_eq!(
            run(&loose, &request, &admin()).await,
            json!([{ "comments": [{ "id": 10 }] }])
        );
        assert_eq!(
            run(&strict, &request, &admin()).await,
            json!([{ "comments": [] }])
        );
    }

    // Scenario: A self-referencing category tree nested deeper than the configured maximum.
    // Expected Outcome: Rejected as a contract violation, not silently truncated.
    #[traced_test]
    #[tokio::test]
    async fn self_reference_beyond_max_depth_is_rejected() {
        let store = MemoryStore::from_json(json!({
            "categories": [
                { "id": 1, "parent_id": null },
                { "id": 2, "parent_id": 1 },
                { "id": 3, "parent_id": 2 },
                { "id": 4, "parent_id": 3 }
            ]
        }))
        .unwrap();
        let children = |nested: Vec<FieldNode>| {
            let mut inner = vec![field("id")];
            inner.extend(nested);
            o2m("children", "categories", "parent_id", inner)
        };
        let tree = vec![field("id"), children(vec![children(vec![children(vec![])])])];
        let request = QueryRequest::new("main", "categories", tree)
            .with_query(filtered(Filter::condition("id", Comparison::Eq(json!(1)))));

        let shallow = engine(Arc::new(store.clone()), settings().max_depth(2).build().unwrap());
        let err = try_run(&shallow, &request, &admin()).await.unwrap_err();
        assert!(matches!(err, EngineError::Contract(PlanError::DepthExceeded(2))));

        let deep = engine(Arc::new(store), settings().max_depth(3).build().unwrap());
        let data = run(&deep, &request, &admin()).await;
        assert_eq!(
            data,
            json!([{ "id": 1, "children": [{ "id": 2, "children": [{ "id": 3, "children": [{ "id": 4 }] }] }] }])
        );
    }

    // Scenario: A polymorphic list and an unsorted to-many relation are fetched one row per page.
    // Expected Outcome: Every paged select carries an ORDER BY, so offset paging is deterministic.
    #[traced_test]
    #[tokio::test]
    async fn batched_pages_are_always_ordered() {
        let store = Arc::new(RecordingStore::new(Arc::new(blog_store())));
        let engine = engine(store.clone(), settings().batch_size(1).build().unwrap());
        let item = union(
            "item",
            vec![
                member("pages", fields(&["title"])),
                member("posts", fields(&["headline"])),
            ],
        );
        let blocks = QueryRequest::new("main", "blocks", vec![field("id"), item]).with_query(sorted_by("id"));
        run(&engine, &blocks, &admin()).await;

        let unsorted = articles(vec![
            field("id"),
            o2m("comments", "comments", "article_id", fields(&["body"])),
        ]);
        let data = run(&engine, &unsorted, &admin()).await;
        assert_eq!(data[0]["comments"].as_array().unwrap().len(), 3);

        let nested: Vec<_> = store
            .seen()
            .await
            .into_iter()
            .filter(|select| select.collection != "blocks" && select.collection != "articles")
            .collect();
        assert!(nested.iter().any(|select| select.collection == "pages"));
        assert!(nested.iter().any(|select| select.collection == "posts"));
        assert!(nested.iter().any(|select| select.collection == "comments"));
        for select in nested {
            assert!(select.paged);
            assert!(select.order_terms > 0, "{} paged without an order", select.collection);
        }
    }

    // Scenario: A tree nested deeper than `max_depth` whose deep levels would match no rows.
    // Expected Outcome: Rejected from the tree's shape alone, before any store is queried.
    #[traced_test]
    #[tokio::test]
    async fn depth_is_checked_before_any_fetch() {
        let store = MemoryStore::from_json(json!({
            "categories": [
                { "id": 1, "parent_id": null },
                { "id": 2, "parent_id": null }
            ]
        }))
        .unwrap();
        let children = |nested: Vec<FieldNode>| {
            let mut inner = vec![field("id")];
            inner.extend(nested);
            o2m("children", "categories", "parent_id", inner)
        };
        let tree = vec![field("id"), children(vec![children(vec![children(vec![])])])];
        let request = QueryRequest::new("main", "categories", tree)
            .with_query(filtered(Filter::condition("id", Comparison::Eq(json!(1)))));

        let engine = engine(Arc::new(store.clone()), settings().max_depth(1).build().unwrap());
        let err = try_run(&engine, &request, &admin()).await.unwrap_err();
        assert!(matches!(err, EngineError::Contract(PlanError::DepthExceeded(1))));
        assert!(store.issued().await.is_empty());
    }

    // Scenario: The nested store fails while batching comments.
    // Expected Outcome: The whole traversal fails; no partial result.
    #[traced_test]
    #[tokio::test]
    async fn store_failure_aborts_traversal() {
        let store: Arc<dyn Store> = Arc::new(FailingStore {
            inner: Arc::new(blog_store()),
            collection: "comments".into(),
        });
        let engine = engine(store, EngineSettings::default());
        let request = articles(vec![
            field("id"),
            o2m("comments", "comments", "article_id", fields(&["id"])),
        ]);

        let err = try_run(&engine, &request, &admin()).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)), "{err}");
    }

    // Scenario: Cancellation fires while a nested batch is outstanding.
    // Expected Outcome: The traversal stops with `Cancelled`.
    #[traced_test]
    #[tokio::test]
    async fn cancellation_reaches_nested_fetches() {
        let token = CancellationToken::new();
        let store: Arc<dyn Store> = Arc::new(CancellingStore {
            inner: Arc::new(blog_store()),
            collection: "comments".into(),
            token: token.clone(),
        });
        let engine = engine(store, EngineSettings::default());
        let request = articles(vec![
            field("id"),
            o2m("comments", "comments", "article_id", fields(&["id"])),
        ]);

        let err = engine.execute(&request, &admin(), &token).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    // Scenario: The caller has no policy for the base collection, or only for the base.
    // Expected Outcome:
    // - A denied base collection yields an empty result, not an error.
    // - A denied joined collection nulls the nested object; the parent rows survive.
    #[traced_test]
    #[tokio::test]
    async fn denied_collections_fail_closed() {
        let policy = editor_policy(Filter::and([]));
        let engine = engine_with(Arc::new(blog_store()), Arc::new(policy), EngineSettings::default());

        let authors = QueryRequest::new("main", "authors", fields(&["name"]));
        assert_eq!(run(&engine, &authors, &editor()).await, json!([]));

        let request = articles(vec![
            field("id"),
            m2o("author", "author_id", "authors", fields(&["name"])),
        ]);
        let data = run(&engine, &request, &editor()).await;
        assert_eq!(
            data,
            json!([
                { "id": 1, "author": null },
                { "id": 2, "author": null },
                { "id": 3, "author": null }
            ])
        );
        assert!(logs_contain("Permission denied"));
    }

    // Scenario: The authorization backend cannot be reached.
    // Expected Outcome: The failure is propagated instead of granting or silently denying.
    #[traced_test]
    #[tokio::test]
    async fn unreachable_authorizer_is_propagated() {
        struct Offline;

        #[async_trait::async_trait]
        impl Authorizer for Offline {
            async fn access(
                &self,
                _accountability: &Accountability,
                _collection: &CollectionRef,
            ) -> Result<CollectionAccess, AuthorizationError> {
                Err(AuthorizationError::Unavailable("timeout".into()))
            }
        }

        let engine = engine_with(Arc::new(blog_store()), Arc::new(Offline), EngineSettings::default());
        let err = try_run(&engine, &articles(fields(&["id"])), &editor())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Authorization(AuthorizationError::Unavailable(_))
        ));
    }

    // Scenario: `single` requests.
    // Expected Outcome: The first object, or null when nothing matches.
    #[traced_test]
    #[tokio::test]
    async fn single_requests_unwrap_the_list() {
        let engine = engine(Arc::new(blog_store()), EngineSettings::default());
        let first = articles(fields(&["title"])).single();
        assert_eq!(run(&engine, &first, &admin()).await, json!({ "title": "A" }));

        let none = QueryRequest::new("main", "articles", fields(&["title"]))
            .with_query(filtered(Filter::condition("id", Comparison::Gt(json!(99)))))
            .single();
        assert_eq!(run(&engine, &none, &admin()).await, JsonValue::Null);
    }
}
