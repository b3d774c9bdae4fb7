//! In-memory store with garbage collection by owner.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::ResourceStore;
use crate::error::{Error, Result};
use crate::resources::{ObjectKey, Resource};

/// One successful create, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub key: ObjectKey,
    pub uid: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<ObjectKey, Resource>,
    journal: Vec<JournalEntry>,
}

/// Store backed by a map behind a tokio lock. Cheap to clone; clones share
/// state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored objects, ordered by key.
    pub async fn list(&self) -> Vec<Resource> {
        self.inner.read().await.objects.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.objects.is_empty()
    }

    pub async fn contains(&self, key: &ObjectKey) -> bool {
        self.inner.read().await.objects.contains_key(key)
    }

    /// Creates in the order they happened.
    pub async fn journal(&self) -> Vec<JournalEntry> {
        self.inner.read().await.journal.clone()
    }

    /// Delete an object out-of-band. Returns whether it existed.
    pub async fn delete(&self, key: &ObjectKey) -> bool {
        self.inner.write().await.objects.remove(key).is_some()
    }

    /// Garbage-collect every object owned, directly or transitively, by the
    /// given uid. Returns the removed keys.
    pub async fn collect_owned_by(&self, owner_uid: &str) -> Vec<ObjectKey> {
        let mut inner = self.inner.write().await;

        let mut doomed_uids: BTreeSet<String> = BTreeSet::from([owner_uid.to_string()]);
        let mut removed = Vec::new();
        loop {
            let next: Vec<ObjectKey> = inner
                .objects
                .iter()
                .filter(|(_, resource)| {
                    resource
                        .meta()
                        .owner_references
                        .iter()
                        .any(|r| doomed_uids.contains(&r.uid))
                })
                .map(|(key, _)| key.clone())
                .collect();
            if next.is_empty() {
                break;
            }
            for key in next {
                if let Some(resource) = inner.objects.remove(&key) {
                    if let Some(uid) = &resource.meta().uid {
                        doomed_uids.insert(uid.clone());
                    }
                    removed.push(key);
                }
            }
        }

        debug!(owner = %owner_uid, removed = removed.len(), "Collected owned objects");
        removed
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Resource> {
        self.inner
            .read()
            .await
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(key.kind, key.name.clone()))
    }

    async fn create(&self, mut resource: Resource) -> Result<Resource> {
        let key = resource.key();
        if key.name.is_empty() {
            return Err(Error::Store(format!("{} has no name", key.kind)));
        }
        if key.kind.is_cluster_scoped() != key.namespace.is_none() {
            return Err(Error::Store(format!(
                "{} has the wrong scope for its kind",
                key
            )));
        }

        let mut inner = self.inner.write().await;
        if inner.objects.contains_key(&key) {
            return Err(Error::already_exists(key.kind, key.name));
        }

        let uid = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let meta = resource.meta_mut();
        meta.uid = Some(uid.clone());
        meta.creation_timestamp = Some(created_at);

        inner.journal.push(JournalEntry {
            key: key.clone(),
            uid,
            created_at,
        });
        inner.objects.insert(key, resource.clone());
        Ok(resource)
    }
}
