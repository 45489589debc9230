//! Backup snapshots of the pending order collection.
//!
//! A snapshot copies the pending collection verbatim into the backup
//! collection (full replace, never merged) together with count/timestamp
//! metadata. Clearing erases the backup wholesale; orders are never deleted
//! one by one. No retry or sync-status logic lives here.

use tracing::info;

use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::order::{BackupMetadata, Order};
use crate::store::OrderStore;
use crate::sync::SyncEngine;

impl<S: OrderStore, R> SyncEngine<S, R> {
    /// Snapshot the pending collection into the backup collection,
    /// replacing any previous backup.
    pub async fn create_backup_snapshot(&self) -> Result<BackupMetadata, SyncError> {
        let _guard = self.state.backup_lock.lock().await;

        let pending = self.store.pending_orders()?;
        self.store.replace_backup_orders(&pending)?;

        let metadata = self
            .store
            .backup_metadata()?
            .ok_or_else(|| SyncError::Storage("backup metadata missing after snapshot".into()))?;

        info!(count = metadata.count, "backup snapshot created");
        self.events.emit(SyncEvent::BackupCreated {
            count: metadata.count,
        });
        Ok(metadata)
    }

    /// Erase the backup collection and its metadata.
    pub async fn clear_backup(&self) -> Result<(), SyncError> {
        let _guard = self.state.backup_lock.lock().await;

        self.store.clear_backup_orders()?;
        info!("backup collection cleared");
        self.events.emit(SyncEvent::BackupCleared);
        Ok(())
    }

    pub fn backup_orders(&self) -> Result<Vec<Order>, SyncError> {
        self.store.backup_orders()
    }

    pub fn backup_metadata(&self) -> Result<Option<BackupMetadata>, SyncError> {
        self.store.backup_metadata()
    }
}
