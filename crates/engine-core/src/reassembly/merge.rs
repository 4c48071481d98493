//! Stitching batched child records onto their parents.

use model::{
    core::key::{KeyCoercion, MergeKey},
    query::field::UnionMember,
    records::record::{Entry, Record},
};
use std::collections::HashMap;

/// Per-parent slice of a to-many field, applied after every batch is merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildWindow {
    pub offset: u64,
    pub limit: Option<u64>,
}

impl ChildWindow {
    pub fn new(offset: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            offset: offset.unwrap_or(0),
            limit,
        }
    }

    fn apply(&self, children: &[Record]) -> Vec<Record> {
        let skip = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let take = self
            .limit
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        children.iter().skip(skip).take(take).cloned().collect()
    }
}

/// Children grouped by their key, each group in store order.
fn group(children: Vec<Record>, foreign: &[String], coercion: KeyCoercion) -> HashMap<MergeKey, Vec<Record>> {
    let mut groups: HashMap<MergeKey, Vec<Record>> = HashMap::new();
    for child in children {
        if let Some(key) = MergeKey::from_values(&child.key_values(foreign), coercion) {
            groups.entry(key).or_default().push(child);
        }
    }
    groups
}

fn parent_key(parent: &Record, local: &[String], coercion: KeyCoercion) -> Option<MergeKey> {
    MergeKey::from_values(&parent.key_values(local), coercion)
}

/// Assigns to every parent the children whose `foreign` key equals the
/// parent's `local` key. Parents without a key or without children get `[]`.
/// Withheld fields stay withheld.
pub fn merge_many(
    parents: Vec<&mut Record>,
    children: Vec<Record>,
    local: &[String],
    foreign: &[String],
    field: &str,
    window: ChildWindow,
    coercion: KeyCoercion,
) {
    let groups = group(children, foreign, coercion);
    for parent in parents {
        let list = parent_key(parent, local, coercion)
            .and_then(|key| groups.get(&key))
            .map(|children| window.apply(children))
            .unwrap_or_default();
        if let Some(entry) = parent.get_mut(field) {
            if !matches!(entry, Entry::Withheld) {
                *entry = Entry::List(list);
            }
        }
    }
}

/// Like [`merge_many`] but assigns at most one child, or null.
pub fn merge_one(
    parents: Vec<&mut Record>,
    children: Vec<Record>,
    local: &[String],
    foreign: &[String],
    field: &str,
    coercion: KeyCoercion,
) {
    let groups = group(children, foreign, coercion);
    for parent in parents {
        let child = parent_key(parent, local, coercion)
            .and_then(|key| groups.get(&key))
            .and_then(|children| children.first().cloned());
        if let Some(entry) = parent.get_mut(field) {
            if !matches!(entry, Entry::Withheld) {
                *entry = Entry::Object(child);
            }
        }
    }
}

/// Whether the parent's discriminator names `collection`.
pub fn discriminates(parent: &Record, discriminator: &str, collection: &str) -> bool {
    parent
        .key_value(discriminator)
        .as_string()
        .is_some_and(|name| name == collection)
}

/// Merges the records of one member collection of a polymorphic field. Only
/// parents whose discriminator names that collection are touched; all others
/// keep whatever another member (or nothing) put there.
pub fn merge_union(
    parents: Vec<&mut Record>,
    children: Vec<Record>,
    discriminator: &str,
    key_field: &str,
    member: &UnionMember,
    field: &str,
    coercion: KeyCoercion,
) {
    let parents = parents
        .into_iter()
        .filter(|parent| discriminates(parent, discriminator, &member.collection))
        .collect();
    merge_one(
        parents,
        children,
        &[key_field.to_string()],
        &[member.key_field.clone()],
        field,
        coercion,
    );
}
