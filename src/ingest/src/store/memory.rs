use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use inventory_common::{JarHash, JarHashSet, NewInstance};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{InstanceRow, InstanceStore, StoreCounts, StoreTransaction, StoredInstance};
use crate::error::PersistenceError;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    instances: BTreeMap<i64, MemoryInstance>,
    by_linking_hash: HashMap<String, i64>,
    /// Shared jar hash values, never removed.
    jar_hashes: BTreeMap<String, JarHash>,
}

#[derive(Debug, Clone)]
struct MemoryInstance {
    instance: NewInstance,
    /// Direct jar set, the only part updates touch.
    jar_hashes: BTreeSet<String>,
}

impl MemoryState {
    fn remember_jars<'a>(&mut self, jars: impl IntoIterator<Item = &'a JarHash>) {
        for jar in jars {
            self.jar_hashes
                .entry(jar.hash.clone())
                .or_insert_with(|| jar.clone());
        }
    }
}

fn hash_values(jars: &JarHashSet) -> BTreeSet<String> {
    jars.iter().map(|j| j.hash.clone()).collect()
}

/// In-process store with the same contract as Postgres.
///
/// A transaction holds the store lock for its whole lifetime and works on a staged copy that
/// replaces the shared state on commit, so transactions are fully serialized.
#[derive(Debug, Clone, Default)]
pub struct MemoryInstanceStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

impl InstanceStore for MemoryInstanceStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, PersistenceError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTransaction { guard, staged })
    }

    async fn find_instance(
        &self,
        linking_hash: &str,
    ) -> Result<Option<StoredInstance>, PersistenceError> {
        let state = self.state.lock().await;
        let Some(id) = state.by_linking_hash.get(linking_hash) else {
            return Ok(None);
        };
        let Some(stored) = state.instances.get(id) else {
            return Err(PersistenceError::Inconsistent(format!(
                "linking hash {} points at missing instance {}",
                linking_hash, id
            )));
        };

        let jvm = stored.instance.jvm();
        let (server_version, module_jar_hashes, deployment_jar_hashes) = match &stored.instance {
            NewInstance::Jvm(_) => (None, BTreeSet::new(), BTreeMap::new()),
            NewInstance::AppServer(app) => (
                app.server_version.clone(),
                hash_values(&app.module_jar_hashes),
                app.configuration
                    .iter()
                    .flat_map(|c| c.deployments.iter())
                    .map(|d| (d.name.clone(), hash_values(&d.archive_jar_hashes)))
                    .collect(),
            ),
        };

        Ok(Some(StoredInstance {
            id: *id,
            kind: stored.instance.kind(),
            linking_hash: jvm.linking_hash.clone(),
            org_id: jvm.org_id.clone(),
            account_id: jvm.account_id.clone(),
            created: jvm.created,
            hostname: jvm.hostname.clone(),
            launch_time: jvm.launch_time,
            server_version,
            jar_hashes: stored.jar_hashes.clone(),
            module_jar_hashes,
            deployment_jar_hashes,
        }))
    }

    async fn delete_instance(&self, linking_hash: &str) -> Result<bool, PersistenceError> {
        let mut state = self.state.lock().await;
        match state.by_linking_hash.remove(linking_hash) {
            Some(id) => Ok(state.instances.remove(&id).is_some()),
            None => Ok(false),
        }
    }

    async fn counts(&self) -> Result<StoreCounts, PersistenceError> {
        let state = self.state.lock().await;
        let mut counts = StoreCounts {
            jar_hashes: state.jar_hashes.len() as i64,
            ..StoreCounts::default()
        };

        for stored in state.instances.values() {
            counts.instances += 1;
            counts.instance_jar_hashes += stored.jar_hashes.len() as i64;

            let NewInstance::AppServer(app) = &stored.instance else {
                continue;
            };
            counts.app_server_instances += 1;
            counts.module_jar_hashes += app.module_jar_hashes.len() as i64;

            if let Some(config) = &app.configuration {
                counts.configurations += 1;
                counts.deployments += config.deployments.len() as i64;
                counts.deployment_jar_hashes += config
                    .deployments
                    .iter()
                    .map(|d| d.archive_jar_hashes.len() as i64)
                    .sum::<i64>();
                counts.extensions += config.extensions.len() as i64;
                counts.extension_subsystems += config
                    .extensions
                    .iter()
                    .map(|e| e.subsystems.len() as i64)
                    .sum::<i64>();
                counts.configuration_subsystems += config.subsystems.len() as i64;
            }
        }

        Ok(counts)
    }
}

impl StoreTransaction for MemoryTransaction {
    async fn insert_instance(&mut self, instance: &NewInstance) -> Result<i64, PersistenceError> {
        let linking_hash = instance.linking_hash();
        if self.staged.by_linking_hash.contains_key(linking_hash) {
            return Err(PersistenceError::UniqueViolation {
                linking_hash: linking_hash.to_string(),
            });
        }

        match instance {
            NewInstance::Jvm(jvm) => self.staged.remember_jars(&jvm.jar_hashes),
            NewInstance::AppServer(app) => self.staged.remember_jars(&app.all_jar_hashes()),
        }

        self.staged.next_id += 1;
        let id = self.staged.next_id;
        self.staged.instances.insert(
            id,
            MemoryInstance {
                instance: instance.clone(),
                jar_hashes: hash_values(&instance.jvm().jar_hashes),
            },
        );
        self.staged
            .by_linking_hash
            .insert(linking_hash.to_string(), id);

        Ok(id)
    }

    async fn instances_by_linking_hash(
        &mut self,
        linking_hash: &str,
    ) -> Result<Vec<InstanceRow>, PersistenceError> {
        let Some(id) = self.staged.by_linking_hash.get(linking_hash) else {
            return Ok(Vec::new());
        };

        Ok(self
            .staged
            .instances
            .get(id)
            .map(|stored| InstanceRow {
                id: *id,
                linking_hash: linking_hash.to_string(),
                kind: stored.instance.kind(),
            })
            .into_iter()
            .collect())
    }

    async fn add_instance_jar_hashes(
        &mut self,
        instance_id: i64,
        jar_hashes: &JarHashSet,
    ) -> Result<u64, PersistenceError> {
        self.staged.remember_jars(jar_hashes);

        let stored = self
            .staged
            .instances
            .get_mut(&instance_id)
            .ok_or_else(|| {
                PersistenceError::Inconsistent(format!("no instance with id {}", instance_id))
            })?;

        let added = jar_hashes
            .iter()
            .filter(|jar| stored.jar_hashes.insert(jar.hash.clone()))
            .count();

        Ok(added as u64)
    }

    async fn commit(mut self) -> Result<(), PersistenceError> {
        *self.guard = std::mem::take(&mut self.staged);
        Ok(())
    }

    async fn rollback(self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use inventory_common::JvmInstance;

    fn jvm(linking_hash: &str, jars: &[&str]) -> NewInstance {
        NewInstance::Jvm(JvmInstance {
            linking_hash: linking_hash.to_string(),
            account_id: None,
            org_id: "org".to_string(),
            created: Utc.with_ymd_and_hms(2023, 4, 1, 1, 0, 0).unwrap(),
            hostname: "fedora".to_string(),
            launch_time: 1,
            vendor: None,
            version_string: None,
            version: None,
            heap_min: None,
            heap_max: None,
            processors: None,
            java_home: None,
            java_class_path: None,
            pid: None,
            details: serde_json::json!({}),
            jar_hashes: jars.iter().map(|h| JarHash::new(*h)).collect(),
        })
    }

    #[tokio::test]
    async fn test_uncommitted_work_is_invisible() {
        let store = MemoryInstanceStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_instance(&jvm("h", &["a"])).await.unwrap();
        drop(tx);

        assert_eq!(store.counts().await.unwrap(), StoreCounts::default());
        assert!(store.find_instance("h").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_publishes_and_uniqueness_holds() {
        let store = MemoryInstanceStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_instance(&jvm("h", &["a", "b"])).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_instance(&jvm("h", &[])).await.unwrap_err();
        assert!(matches!(err, PersistenceError::UniqueViolation { .. }));
        tx.rollback().await.unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.instances, 1);
        assert_eq!(counts.jar_hashes, 2);
        assert_eq!(counts.instance_jar_hashes, 2);
    }

    #[tokio::test]
    async fn test_add_jar_hashes_counts_only_new() {
        let store = MemoryInstanceStore::new();

        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_instance(&jvm("h", &["a", "b"])).await.unwrap();
        let added = tx
            .add_instance_jar_hashes(id, &["b", "c"].iter().map(|h| JarHash::new(*h)).collect())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(added, 1);
        let stored = store.find_instance("h").await.unwrap().unwrap();
        assert_eq!(
            stored.jar_hashes,
            ["a", "b", "c"].iter().map(|h| h.to_string()).collect()
        );
    }

    #[tokio::test]
    async fn test_delete_keeps_jar_hash_values() {
        let store = MemoryInstanceStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_instance(&jvm("h", &["a"])).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.delete_instance("h").await.unwrap());
        assert!(!store.delete_instance("h").await.unwrap());

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.instances, 0);
        assert_eq!(counts.instance_jar_hashes, 0);
        assert_eq!(counts.jar_hashes, 1);
    }
}
