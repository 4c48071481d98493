//! Resolution of row filters and field visibility for the collections a
//! query level touches.

use crate::error::{AuthorizationError, PolicyError};
use async_trait::async_trait;
use model::{
    core::identifiers::CollectionRef,
    query::{
        access::{AccessMap, CollectionAccess},
        field::{FieldNode, SingleNesting},
        filter::Filter,
    },
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::Path,
    sync::Arc,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Who is asking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accountability {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Administrative callers skip permission resolution entirely.
    #[serde(default)]
    pub admin: bool,
}

impl Accountability {
    pub fn admin() -> Self {
        Self {
            admin: true,
            ..Self::default()
        }
    }

    pub fn role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Resolved access per collection. Lives as long as the caller wants it to:
/// typically one request, never process-wide.
#[derive(Debug, Clone, Default)]
pub struct PermissionCache {
    entries: Arc<RwLock<HashMap<CollectionRef, CollectionAccess>>>,
}

impl PermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, collection: &CollectionRef) -> Option<CollectionAccess> {
        self.entries.read().await.get(collection).cloned()
    }

    pub async fn insert(&self, collection: CollectionRef, access: CollectionAccess) {
        self.entries.write().await.insert(collection, access);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// Handed down through every level of one traversal.
#[derive(Debug, Clone, Default)]
pub struct PermissionContext {
    accountability: Accountability,
    cache: PermissionCache,
}

impl PermissionContext {
    pub fn new(accountability: Accountability) -> Self {
        Self {
            accountability,
            cache: PermissionCache::new(),
        }
    }

    pub fn with_cache(accountability: Accountability, cache: PermissionCache) -> Self {
        Self {
            accountability,
            cache,
        }
    }

    pub fn accountability(&self) -> &Accountability {
        &self.accountability
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }
}

/// The authorization collaborator. Returns the read access of one caller
/// on one collection.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn access(
        &self,
        accountability: &Accountability,
        collection: &CollectionRef,
    ) -> Result<CollectionAccess, AuthorizationError>;
}

/// Grants everything. For trusted callers and tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn access(
        &self,
        _accountability: &Accountability,
        _collection: &CollectionRef,
    ) -> Result<CollectionAccess, AuthorizationError> {
        Ok(CollectionAccess::unrestricted())
    }
}

pub const PUBLIC_ROLE: &str = "public";

/// Static per-role policies read from JSON:
///
/// ```json
/// { "roles": { "editor": { "main.articles": { "granted": { "filters": [] } } } } }
/// ```
///
/// Collections are keyed `store.collection`. Callers without a role use the
/// `public` role. Anything not listed is denied.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyAuthorizer {
    #[serde(default)]
    roles: BTreeMap<String, BTreeMap<String, CollectionAccess>>,
}

impl PolicyAuthorizer {
    pub fn from_path(path: &Path) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(serde_json::from_str(&raw)?)
    }

    pub fn from_json(document: serde_json::Value) -> Result<Self, PolicyError> {
        Ok(serde_json::from_value(document)?)
    }

    pub fn grant(mut self, role: &str, collection: &CollectionRef, access: CollectionAccess) -> Self {
        self.roles
            .entry(role.to_string())
            .or_default()
            .insert(collection.to_string(), access);
        self
    }
}

#[async_trait]
impl Authorizer for PolicyAuthorizer {
    async fn access(
        &self,
        accountability: &Accountability,
        collection: &CollectionRef,
    ) -> Result<CollectionAccess, AuthorizationError> {
        let role = accountability.role.as_deref().unwrap_or(PUBLIC_ROLE);
        let policies = self
            .roles
            .get(role)
            .ok_or_else(|| AuthorizationError::Denied(format!("no policy for role '{role}'")))?;
        policies
            .get(&collection.to_string())
            .cloned()
            .ok_or_else(|| AuthorizationError::Denied(format!("role '{role}' has no access to {collection}")))
    }
}

/// The collections whose access one compiled level needs: the target, every
/// collection joined in through cardinality-one relations and every
/// collection the caller's filter reaches through a relation.
pub fn level_collections(
    target: &CollectionRef,
    fields: &[FieldNode],
    filter: Option<&Filter>,
) -> BTreeSet<CollectionRef> {
    let mut collections = BTreeSet::from([target.clone()]);
    collect_joined(fields, &mut collections);
    if let Some(filter) = filter {
        collect_filtered(filter, &mut collections);
    }
    collections
}

fn collect_filtered(filter: &Filter, out: &mut BTreeSet<CollectionRef>) {
    match filter {
        Filter::And(parts) | Filter::Or(parts) => parts.iter().for_each(|part| collect_filtered(part, out)),
        Filter::Not(inner) => collect_filtered(inner, out),
        Filter::Condition(condition) => {
            for step in &condition.through {
                let foreign = &step.relation.foreign;
                out.insert(CollectionRef::new(&foreign.store, &foreign.collection));
            }
        }
    }
}

fn collect_joined(fields: &[FieldNode], out: &mut BTreeSet<CollectionRef>) {
    for node in fields {
        if let FieldNode::NestedSingle { fields, nesting, .. } = node {
            if let SingleNesting::Relational { relation } = nesting {
                out.insert(CollectionRef::new(&relation.foreign.store, &relation.foreign.collection));
            }
            collect_joined(fields, out);
        }
    }
}

/// Builds the access map for `collections`. Administrative callers get an
/// unrestricted map without consulting the authorizer. A denial resolves to
/// [`CollectionAccess::Denied`]; only an unreachable authorizer is an error.
pub async fn resolve_access(
    authorizer: &dyn Authorizer,
    context: &PermissionContext,
    collections: &BTreeSet<CollectionRef>,
) -> Result<AccessMap, AuthorizationError> {
    if context.accountability.admin {
        return Ok(AccessMap::unrestricted());
    }

    let mut map = AccessMap::default();
    for collection in collections {
        if let Some(access) = context.cache.get(collection).await {
            map.insert(collection.clone(), access);
            continue;
        }

        let access = match authorizer.access(&context.accountability, collection).await {
            Ok(access) => access,
            Err(AuthorizationError::Denied(reason)) => {
                warn!(%collection, %reason, "Permission denied, collection yields no rows");
                CollectionAccess::Denied
            }
            Err(err) => return Err(err),
        };
        debug!(%collection, denied = access.is_denied(), "Resolved permissions");
        context.cache.insert(collection.clone(), access.clone()).await;
        map.insert(collection.clone(), access);
    }
    Ok(map)
}
