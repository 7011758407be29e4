//! Applies classified messages to the store, one transaction per message.

use inventory_common::{Announcement, InsightsMessage, UpdateInstance};
use tracing::{debug, instrument, warn};

use crate::error::{IngestResult, IntegrityError};
use crate::keyed_lock::KeyedLocks;
use crate::store::{InstanceStore, StoreTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Inserted { instance_id: i64 },
    Merged { instance_id: i64, added_jar_hashes: u64 },
}

impl Reconciled {
    pub fn instance_id(&self) -> i64 {
        match self {
            Reconciled::Inserted { instance_id } | Reconciled::Merged { instance_id, .. } => {
                *instance_id
            }
        }
    }
}

pub struct ReconciliationEngine<S> {
    store: S,
    locks: Option<KeyedLocks>,
}

impl<S: InstanceStore> ReconciliationEngine<S> {
    /// With `serialize_by_linking_hash` set, reconciliations sharing a linking hash wait for each
    /// other in-process before opening their transaction. Row locking in the store still applies.
    pub fn new(store: S, serialize_by_linking_hash: bool) -> Self {
        Self {
            store,
            locks: serialize_by_linking_hash.then(KeyedLocks::new),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Inserts a new instance graph or merges an update into the stored instance. Either every
    /// write commits or none does.
    #[instrument(
        name = "reconcile",
        skip_all,
        fields(
            org_id = %announce.org_id,
            linking_hash = message.linking_hash(),
            variant = message.variant_name(),
        )
    )]
    pub async fn reconcile(
        &self,
        announce: &Announcement,
        message: &InsightsMessage,
    ) -> IngestResult<Reconciled> {
        let _guard = match &self.locks {
            Some(locks) => Some(locks.lock(message.linking_hash()).await),
            None => None,
        };

        let mut tx = self.store.begin().await?;

        match apply(&mut tx, message).await {
            Ok(reconciled) => {
                tx.commit().await?;
                debug!(?reconciled, "transaction committed");
                Ok(reconciled)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

async fn apply<T: StoreTransaction>(
    tx: &mut T,
    message: &InsightsMessage,
) -> IngestResult<Reconciled> {
    match message {
        InsightsMessage::NewInstance(instance) => {
            let instance_id = tx.insert_instance(instance).await?;
            Ok(Reconciled::Inserted { instance_id })
        }
        InsightsMessage::UpdateInstance(update) => merge(tx, update).await,
    }
}

async fn merge<T: StoreTransaction>(
    tx: &mut T,
    update: &UpdateInstance,
) -> IngestResult<Reconciled> {
    let rows = tx.instances_by_linking_hash(&update.linking_hash).await?;

    match rows.as_slice() {
        [] => Err(IntegrityError::UnknownLinkingHash(update.linking_hash.clone()).into()),
        [row] => {
            let added_jar_hashes = tx
                .add_instance_jar_hashes(row.id, &update.jar_hashes)
                .await?;
            Ok(Reconciled::Merged {
                instance_id: row.id,
                added_jar_hashes,
            })
        }
        _ => Err(IntegrityError::LinkingHashNotUnique {
            linking_hash: update.linking_hash.clone(),
            matches: rows.len(),
        }
        .into()),
    }
}
