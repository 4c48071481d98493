use model::records::{
    record::{Entry, Record},
    row::RowData,
};
use planner::compile::fields::{AliasNode, ObjectMapping};

/// Rebuilds one record per row. The keys of every record are exactly the
/// mapping's keys, in request order; stitching values are kept apart.
pub fn reassemble(rows: &[RowData], mapping: &ObjectMapping) -> Vec<Record> {
    rows.iter().map(|row| build(row, mapping)).collect()
}

fn build(row: &RowData, mapping: &ObjectMapping) -> Record {
    let mut record = Record::new();
    for node in &mapping.nodes {
        let entry = match node {
            AliasNode::Withheld { .. } => Entry::Withheld,
            AliasNode::Column { visibility, .. }
            | AliasNode::Object { visibility, .. }
            | AliasNode::Many { visibility, .. }
            | AliasNode::Union { visibility, .. }
                if hidden(row, visibility.as_deref()) =>
            {
                Entry::Withheld
            }
            AliasNode::Column { column, .. } => Entry::Value(row.get_value(column)),
            AliasNode::Object {
                mapping, presence, ..
            } => {
                if presence.iter().all(|column| row.get_value(column).is_null()) {
                    Entry::Object(None)
                } else {
                    Entry::Object(Some(build(row, mapping)))
                }
            }
            AliasNode::Many { .. } => Entry::List(Vec::new()),
            AliasNode::Union { .. } => Entry::Object(None),
        };
        record.push(node.key(), entry);
    }
    for stitch in &mapping.stitch {
        record.set_stitch(&stitch.field, row.get_value(&stitch.column));
    }
    record
}

// A missing or null flag hides the field.
fn hidden(row: &RowData, flag: Option<&str>) -> bool {
    match flag {
        None => false,
        Some(column) => !row.get_value(column).as_bool().unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::value::{FieldValue, Value};
    use planner::compile::fields::StitchColumn;
    use serde_json::json;

    fn row(values: &[(&str, Value)]) -> RowData {
        RowData::new(
            "articles",
            values
                .iter()
                .map(|(name, value)| FieldValue {
                    name: name.to_string(),
                    value: value.clone(),
                })
                .collect(),
        )
    }

    fn column(key: &str, column: &str) -> AliasNode {
        AliasNode::Column {
            key: key.into(),
            column: column.into(),
            visibility: None,
        }
    }

    fn article_mapping() -> ObjectMapping {
        ObjectMapping {
            nodes: vec![
                column("id", "c0"),
                AliasNode::Object {
                    key: "author".into(),
                    mapping: ObjectMapping {
                        nodes: vec![column("name", "c2")],
                        stitch: vec![],
                    },
                    presence: vec!["c1".into()],
                    visibility: None,
                },
                AliasNode::Many {
                    key: "comments".into(),
                    visibility: None,
                },
            ],
            stitch: vec![StitchColumn {
                field: "id".into(),
                column: "c3".into(),
            }],
        }
    }

    #[test]
    fn rebuilds_nested_shape_in_request_order() {
        let rows = vec![
            row(&[
                ("c0", Value::Int(5)),
                ("c1", Value::Int(5)),
                ("c2", Value::String("Jane".into())),
                ("c3", Value::Int(5)),
            ]),
            row(&[
                ("c0", Value::Int(6)),
                ("c1", Value::Null),
                ("c2", Value::Null),
                ("c3", Value::Int(6)),
            ]),
        ];

        let records = reassemble(&rows, &article_mapping());
        assert_eq!(
            records[0].to_json(),
            json!({ "id": 5, "author": { "name": "Jane" }, "comments": [] })
        );
        assert_eq!(
            records[1].to_json(),
            json!({ "id": 6, "author": null, "comments": [] })
        );
        assert_eq!(records[1].key_value("id"), Value::Int(6));
    }

    #[test]
    fn false_or_null_flag_withholds_the_value() {
        let mapping = ObjectMapping {
            nodes: vec![
                column("id", "c0"),
                AliasNode::Column {
                    key: "price".into(),
                    column: "c1".into(),
                    visibility: Some("v_c1".into()),
                },
                AliasNode::Withheld {
                    key: "secret".into(),
                },
            ],
            stitch: vec![],
        };
        let rows = vec![
            row(&[
                ("c0", Value::Int(1)),
                ("c1", Value::Int(10)),
                ("v_c1", Value::Boolean(true)),
            ]),
            row(&[
                ("c0", Value::Int(2)),
                ("c1", Value::Int(20)),
                ("v_c1", Value::Int(0)),
            ]),
            row(&[("c0", Value::Int(3)), ("c1", Value::Int(30)), ("v_c1", Value::Null)]),
        ];

        let records = reassemble(&rows, &mapping);
        assert_eq!(records[0].get("price"), Some(&Entry::Value(Value::Int(10))));
        assert_eq!(records[1].get("price"), Some(&Entry::Withheld));
        assert_eq!(records[2].get("price"), Some(&Entry::Withheld));
        assert!(records.iter().all(|r| r.get("secret") == Some(&Entry::Withheld)));
        assert_eq!(
            records[1].to_json(),
            json!({ "id": 2, "price": null, "secret": null })
        );
    }

    #[test]
    fn keys_match_mapping_exactly() {
        let mapping = article_mapping();
        let records = reassemble(&[row(&[("c0", Value::Int(1))])], &mapping);
        let keys: Vec<&str> = records[0].entries().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, mapping.keys().collect::<Vec<_>>());
    }
}
