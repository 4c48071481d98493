#[cfg(test)]
mod tests {
    use crate::{
        admin, blog_store, engine, engine_with, run, settings,
        utils::{
            applied, at_path, field, fields, filtered, m2o, member, o2m_with, related, relation,
            sorted_by, union,
        },
    };
    use connectors::memory::store::{IssuedQuery, MemoryStore};
    use engine_config::settings::EngineSettings;
    use engine_core::permissions::{Accountability, PermissionContext, PolicyAuthorizer};
    use model::query::{
        field::FieldFunction,
        filter::{Comparison, Filter, Quantifier, ValueList},
        modifiers::{QueryModifiers, SortField},
        request::QueryRequest,
    };
    use serde_json::json;
    use std::sync::Arc;
    use tracing_test::traced_test;

    // Scenario: Two articles, scalar fields only.
    // Expected Outcome: Exactly the requested fields for every row, in store order.
    #[traced_test]
    #[tokio::test]
    async fn scalar_fields_over_two_rows() {
        let store = MemoryStore::from_json(json!({
            "articles": [
                {"id": 1, "title": "A", "body": "long text"},
                {"id": 2, "title": "B", "body": "more text"}
            ]
        }))
        .unwrap();
        let engine = engine(Arc::new(store), EngineSettings::default());
        let request = QueryRequest::new("main", "articles", fields(&["id", "title"]));

        let data = run(&engine, &request, &admin()).await;
        assert_eq!(data, json!([{ "id": 1, "title": "A" }, { "id": 2, "title": "B" }]));
    }

    // Scenario: Article 1 references author 5; article 2 has no author.
    // Expected Outcome: The joined author is nested for article 1 and null for article 2.
    #[traced_test]
    #[tokio::test]
    async fn many_to_one_with_null_reference() {
        let store = blog_store();
        let engine = engine(Arc::new(store.clone()), EngineSettings::default());
        let request = QueryRequest::new(
            "main",
            "articles",
            vec![field("id"), m2o("author", "author_id", "authors", fields(&["name"]))],
        )
        .with_query(filtered(Filter::condition(
            "id",
            Comparison::In(ValueList(vec![json!(1), json!(2)])),
        )));

        let data = run(&engine, &request, &admin()).await;
        assert_eq!(
            data,
            json!([
                { "id": 1, "author": { "name": "Jane" } },
                { "id": 2, "author": null }
            ])
        );
        // The join is resolved in the base query.
        assert_eq!(store.issued().await.len(), 1);
    }

    // Scenario: Article 1 has three comments and the batch size is 2.
    // Expected Outcome:
    // - Two batch fetches: limit 2 offset 0, then limit 2 offset 2.
    // - The second batch returns one row and the loop stops.
    // - All three comments, in the order the nested sort produced.
    #[traced_test]
    #[tokio::test]
    async fn to_many_batches_until_short_page() {
        let store = blog_store();
        let engine = engine(
            Arc::new(store.clone()),
            settings().batch_size(2).build().unwrap(),
        );
        let comments = o2m_with(
            "comments",
            "comments",
            "article_id",
            fields(&["id", "body"]),
            QueryModifiers {
                sort: vec![SortField::desc("id")],
                ..Default::default()
            },
        );
        let request = QueryRequest::new("main", "articles", vec![field("id"), comments])
            .with_query(filtered(Filter::condition("id", Comparison::Eq(json!(1)))));

        let data = run(&engine, &request, &admin()).await;
        assert_eq!(
            data,
            json!([{
                "id": 1,
                "comments": [
                    { "id": 12, "body": "third" },
                    { "id": 11, "body": "second" },
                    { "id": 10, "body": "first" }
                ]
            }])
        );
        assert_eq!(
            store.issued_for("comments").await,
            vec![
                IssuedQuery {
                    collection: "comments".into(),
                    limit: Some(2),
                    offset: None,
                },
                IssuedQuery {
                    collection: "comments".into(),
                    limit: Some(2),
                    offset: Some(2),
                },
            ]
        );
        assert!(logs_contain("Fetched batch"));
    }

    // Scenario: The caller may only see `price` on items they own.
    // Expected Outcome: Foreign items come back with `price: null`, every other field intact.
    #[traced_test]
    #[tokio::test]
    async fn field_visibility_nulls_price_of_foreign_items() {
        let store = MemoryStore::from_json(json!({
            "items": [
                {"id": 1, "name": "Lamp", "price": 40, "owner": "u1"},
                {"id": 2, "name": "Desk", "price": 250, "owner": "u2"}
            ]
        }))
        .unwrap();
        let policy = PolicyAuthorizer::from_json(json!({
            "roles": {
                "customer": {
                    "main.items": {
                        "granted": {
                            "fields": {
                                "price": { "when": { "condition": { "field": "owner", "op": "eq", "value": "u1" } } }
                            }
                        }
                    }
                }
            }
        }))
        .unwrap();
        let engine = engine_with(Arc::new(store), Arc::new(policy), EngineSettings::default());
        let request = QueryRequest::new("main", "items", fields(&["id", "name", "price"]))
            .with_query(sorted_by("id"));
        let caller = PermissionContext::new(Accountability::role("customer").with_user("u1"));

        let data = run(&engine, &request, &caller).await;
        assert_eq!(
            data,
            json!([
                { "id": 1, "name": "Lamp", "price": 40 },
                { "id": 2, "name": "Desk", "price": null }
            ])
        );
    }

    // Scenario: Blocks reference pages, posts or an unknown collection through a discriminator.
    // Expected Outcome:
    // - A `pages` block is sourced only from `pages`, a `posts` block only from `posts`,
    //   even though both share the key 1.
    // - Unknown or null discriminators yield null.
    #[traced_test]
    #[tokio::test]
    async fn union_picks_member_by_discriminator() {
        let store = blog_store();
        let engine = engine(Arc::new(store.clone()), EngineSettings::default());
        let item = union(
            "item",
            vec![
                member("pages", fields(&["title"])),
                member("posts", fields(&["headline"])),
            ],
        );
        let request = QueryRequest::new("main", "blocks", vec![field("id"), item])
            .with_query(sorted_by("id"));

        let data = run(&engine, &request, &admin()).await;
        assert_eq!(
            data,
            json!([
                { "id": 1, "item": { "title": "About" } },
                { "id": 2, "item": { "headline": "Launch" } },
                { "id": 3, "item": null },
                { "id": 4, "item": null }
            ])
        );
        assert_eq!(store.issued_for("pages").await.len(), 1);
        assert_eq!(store.issued_for("posts").await.len(), 1);
        assert!(logs_contain("Unknown discriminator"));
    }

    // Scenario: Articles filtered by their comments: some comment containing "on",
    // then no comment at all.
    // Expected Outcome: Articles 1 and 2 match the first filter; only article 3 matches the second.
    #[traced_test]
    #[tokio::test]
    async fn related_filters_match_some_or_none() {
        let engine = engine(Arc::new(blog_store()), EngineSettings::default());
        let comments = || relation(&["id"], "comments", &["article_id"]);

        let some = QueryRequest::new("main", "articles", fields(&["id"])).with_query(filtered(related(
            comments(),
            Quantifier::Some,
            "body",
            Comparison::Contains("on".into()),
        )));
        assert_eq!(run(&engine, &some, &admin()).await, json!([{ "id": 1 }, { "id": 2 }]));

        let none = QueryRequest::new("main", "articles", fields(&["id"])).with_query(filtered(related(
            comments(),
            Quantifier::None,
            "id",
            Comparison::NNull,
        )));
        assert_eq!(run(&engine, &none, &admin()).await, json!([{ "id": 3 }]));
    }

    // Scenario: Leaf conditions on a function of a column, a JSON member, a closed range
    // and another column of the same row.
    // Expected Outcome: Each selects exactly the rows whose values satisfy it.
    #[traced_test]
    #[tokio::test]
    async fn leaf_conditions_select_matching_rows() {
        let engine = engine(Arc::new(blog_store()), EngineSettings::default());
        let ids = |filter: Filter| {
            QueryRequest::new("main", "articles", fields(&["id"])).with_query(filtered(filter))
        };

        let year = applied(FieldFunction::Year, "published_on", Comparison::Eq(json!(2024)));
        assert_eq!(run(&engine, &ids(year), &admin()).await, json!([{ "id": 1 }]));

        let slug = at_path("meta", &["seo", "slug"], Comparison::Eq(json!("a")));
        assert_eq!(run(&engine, &ids(slug), &admin()).await, json!([{ "id": 1 }]));

        let range = Filter::condition("id", Comparison::Between(ValueList::new(vec![json!(2), json!(3)])));
        assert_eq!(
            run(&engine, &ids(range), &admin()).await,
            json!([{ "id": 2 }, { "id": 3 }])
        );

        let store = MemoryStore::from_json(json!({
            "shifts": [
                {"id": 1, "planned_by": 4, "worked_by": 4},
                {"id": 2, "planned_by": 4, "worked_by": 7},
                {"id": 3, "planned_by": 5, "worked_by": null}
            ]
        }))
        .unwrap();
        let shifts = crate::engine(Arc::new(store), EngineSettings::default());
        let same = QueryRequest::new("main", "shifts", fields(&["id"])).with_query(filtered(Filter::condition(
            "planned_by",
            Comparison::EqField("worked_by".into()),
        )));
        assert_eq!(run(&shifts, &same, &admin()).await, json!([{ "id": 1 }]));
    }

    // Scenario: Places with point locations, one without a location, filtered by a bounding box.
    // Expected Outcome: `intersects_bbox` keeps the point inside; the negation keeps the one outside;
    // the missing location matches neither.
    #[traced_test]
    #[tokio::test]
    async fn bounding_box_filters_over_geojson() {
        let store = MemoryStore::from_json(json!({
            "places": [
                {"id": 1, "location": {"type": "Point", "coordinates": [1.0, 1.0]}},
                {"id": 2, "location": {"type": "Point", "coordinates": [8.0, 8.0]}},
                {"id": 3, "location": null}
            ]
        }))
        .unwrap();
        let engine = engine(Arc::new(store), EngineSettings::default());
        let area = json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]]]
        });
        let places = |comparison: Comparison| {
            QueryRequest::new("main", "places", fields(&["id"]))
                .with_query(filtered(Filter::condition("location", comparison)))
        };

        let inside = places(Comparison::IntersectsBbox(area.clone()));
        assert_eq!(run(&engine, &inside, &admin()).await, json!([{ "id": 1 }]));
        let outside = places(Comparison::NIntersectsBbox(area));
        assert_eq!(run(&engine, &outside, &admin()).await, json!([{ "id": 2 }]));
    }
}
