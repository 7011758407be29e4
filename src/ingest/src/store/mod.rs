//! Transactional write boundary for instance graphs.
//!
//! Reconciliation only ever talks to [`InstanceStore`] and [`StoreTransaction`]. The store is
//! responsible for linking-hash uniqueness and for row locking strong enough that two
//! transactions merging into the same instance cannot lose each other's jar hashes.

mod memory;
mod postgres;

pub use memory::{MemoryInstanceStore, MemoryTransaction};
pub use postgres::{PgInstanceStore, PgTransaction};

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use inventory_common::{InstanceKind, JarHashSet, NewInstance};
use serde::Serialize;

use crate::error::PersistenceError;

/// Identity of a stored instance as seen from inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRow {
    pub id: i64,
    pub linking_hash: String,
    pub kind: InstanceKind,
}

/// Read-back view of a stored instance and every jar hash position it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInstance {
    pub id: i64,
    pub kind: InstanceKind,
    pub linking_hash: String,
    pub org_id: String,
    pub account_id: Option<String>,
    pub created: DateTime<Utc>,
    pub hostname: String,
    pub launch_time: i64,
    pub server_version: Option<String>,
    pub jar_hashes: BTreeSet<String>,
    pub module_jar_hashes: BTreeSet<String>,
    /// Keyed by deployment name.
    pub deployment_jar_hashes: BTreeMap<String, BTreeSet<String>>,
}

/// Row counts per entity and association table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub instances: i64,
    pub app_server_instances: i64,
    pub configurations: i64,
    pub deployments: i64,
    pub extensions: i64,
    pub extension_subsystems: i64,
    pub configuration_subsystems: i64,
    pub jar_hashes: i64,
    pub instance_jar_hashes: i64,
    pub module_jar_hashes: i64,
    pub deployment_jar_hashes: i64,
}

#[allow(async_fn_in_trait)]
pub trait InstanceStore: Send + Sync {
    type Transaction: StoreTransaction;

    async fn begin(&self) -> Result<Self::Transaction, PersistenceError>;

    async fn find_instance(
        &self,
        linking_hash: &str,
    ) -> Result<Option<StoredInstance>, PersistenceError>;

    /// Administrative removal. Cascades the configuration subtree and every association row;
    /// shared jar hash values stay behind. Returns whether an instance was removed.
    async fn delete_instance(&self, linking_hash: &str) -> Result<bool, PersistenceError>;

    async fn counts(&self) -> Result<StoreCounts, PersistenceError>;
}

/// One unit of work. Dropping a transaction without committing rolls it back.
#[allow(async_fn_in_trait)]
pub trait StoreTransaction: Send {
    /// Writes the full entity graph and returns the new instance id. A linking hash that is
    /// already stored fails with [`PersistenceError::UniqueViolation`].
    async fn insert_instance(&mut self, instance: &NewInstance) -> Result<i64, PersistenceError>;

    /// Every stored instance carrying the linking hash, locked until the transaction ends.
    async fn instances_by_linking_hash(
        &mut self,
        linking_hash: &str,
    ) -> Result<Vec<InstanceRow>, PersistenceError>;

    /// Unions `jar_hashes` into the instance's direct jar set and returns how many were new.
    async fn add_instance_jar_hashes(
        &mut self,
        instance_id: i64,
        jar_hashes: &JarHashSet,
    ) -> Result<u64, PersistenceError>;

    async fn commit(self) -> Result<(), PersistenceError>;

    async fn rollback(self) -> Result<(), PersistenceError>;
}

/// The store picked at startup.
pub enum StoreBackend {
    Postgres(PgInstanceStore),
    Memory(MemoryInstanceStore),
}

pub enum BackendTransaction {
    Postgres(PgTransaction),
    Memory(MemoryTransaction),
}

impl InstanceStore for StoreBackend {
    type Transaction = BackendTransaction;

    async fn begin(&self) -> Result<Self::Transaction, PersistenceError> {
        match self {
            StoreBackend::Postgres(store) => store.begin().await.map(BackendTransaction::Postgres),
            StoreBackend::Memory(store) => store.begin().await.map(BackendTransaction::Memory),
        }
    }

    async fn find_instance(
        &self,
        linking_hash: &str,
    ) -> Result<Option<StoredInstance>, PersistenceError> {
        match self {
            StoreBackend::Postgres(store) => store.find_instance(linking_hash).await,
            StoreBackend::Memory(store) => store.find_instance(linking_hash).await,
        }
    }

    async fn delete_instance(&self, linking_hash: &str) -> Result<bool, PersistenceError> {
        match self {
            StoreBackend::Postgres(store) => store.delete_instance(linking_hash).await,
            StoreBackend::Memory(store) => store.delete_instance(linking_hash).await,
        }
    }

    async fn counts(&self) -> Result<StoreCounts, PersistenceError> {
        match self {
            StoreBackend::Postgres(store) => store.counts().await,
            StoreBackend::Memory(store) => store.counts().await,
        }
    }
}

impl StoreTransaction for BackendTransaction {
    async fn insert_instance(&mut self, instance: &NewInstance) -> Result<i64, PersistenceError> {
        match self {
            BackendTransaction::Postgres(tx) => tx.insert_instance(instance).await,
            BackendTransaction::Memory(tx) => tx.insert_instance(instance).await,
        }
    }

    async fn instances_by_linking_hash(
        &mut self,
        linking_hash: &str,
    ) -> Result<Vec<InstanceRow>, PersistenceError> {
        match self {
            BackendTransaction::Postgres(tx) => tx.instances_by_linking_hash(linking_hash).await,
            BackendTransaction::Memory(tx) => tx.instances_by_linking_hash(linking_hash).await,
        }
    }

    async fn add_instance_jar_hashes(
        &mut self,
        instance_id: i64,
        jar_hashes: &JarHashSet,
    ) -> Result<u64, PersistenceError> {
        match self {
            BackendTransaction::Postgres(tx) => {
                tx.add_instance_jar_hashes(instance_id, jar_hashes).await
            }
            BackendTransaction::Memory(tx) => {
                tx.add_instance_jar_hashes(instance_id, jar_hashes).await
            }
        }
    }

    async fn commit(self) -> Result<(), PersistenceError> {
        match self {
            BackendTransaction::Postgres(tx) => tx.commit().await,
            BackendTransaction::Memory(tx) => tx.commit().await,
        }
    }

    async fn rollback(self) -> Result<(), PersistenceError> {
        match self {
            BackendTransaction::Postgres(tx) => tx.rollback().await,
            BackendTransaction::Memory(tx) => tx.rollback().await,
        }
    }
}
