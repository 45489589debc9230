//! Persistent order store contract plus the in-memory adapter.
//!
//! The engine works over two independent collections - pending orders and
//! backup orders - each persisted as an atomically replaceable record. A
//! writer must never leave a partially updated collection observable;
//! retry-on-failure lives in the engine, not in the store.

use std::sync::RwLock;

use chrono::Utc;

use crate::error::SyncError;
use crate::order::{BackupMetadata, Order};

/// Storage seam consumed by the sync engine. All replace operations are
/// full replaces of the named collection.
pub trait OrderStore: Send + Sync {
    fn pending_orders(&self) -> Result<Vec<Order>, SyncError>;

    fn replace_pending_orders(&self, orders: &[Order]) -> Result<(), SyncError>;

    fn backup_orders(&self) -> Result<Vec<Order>, SyncError>;

    /// Full replace of the backup collection; also refreshes the backup
    /// metadata record (count + snapshot timestamp).
    fn replace_backup_orders(&self, orders: &[Order]) -> Result<(), SyncError>;

    fn backup_metadata(&self) -> Result<Option<BackupMetadata>, SyncError>;

    /// Erase the backup collection and its metadata.
    fn clear_backup_orders(&self) -> Result<(), SyncError>;

    /// Most recently created pending order, if any. Receipt-reprint flows
    /// read this; the engine itself does not.
    fn last_order(&self) -> Result<Option<Order>, SyncError>;
}

// ---------------------------------------------------------------------------
// In-memory adapter
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    pending: Vec<Order>,
    backup: Vec<Order>,
    metadata: Option<BackupMetadata>,
}

/// Volatile store for tests and ephemeral kiosk sessions. Same contract as
/// the SQLite adapter, nothing survives a restart.
#[derive(Default)]
pub struct MemoryOrderStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the pending collection directly (test setup convenience).
    pub fn with_pending(orders: Vec<Order>) -> Self {
        MemoryOrderStore {
            inner: RwLock::new(MemoryInner {
                pending: orders,
                ..MemoryInner::default()
            }),
        }
    }
}

impl OrderStore for MemoryOrderStore {
    fn pending_orders(&self) -> Result<Vec<Order>, SyncError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| SyncError::Storage("order store lock poisoned".into()))?;
        Ok(inner.pending.clone())
    }

    fn replace_pending_orders(&self, orders: &[Order]) -> Result<(), SyncError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| SyncError::Storage("order store lock poisoned".into()))?;
        inner.pending = orders.to_vec();
        Ok(())
    }

    fn backup_orders(&self) -> Result<Vec<Order>, SyncError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| SyncError::Storage("order store lock poisoned".into()))?;
        Ok(inner.backup.clone())
    }

    fn replace_backup_orders(&self, orders: &[Order]) -> Result<(), SyncError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| SyncError::Storage("order store lock poisoned".into()))?;
        inner.backup = orders.to_vec();
        inner.metadata = Some(BackupMetadata {
            count: orders.len(),
            last_backup: Utc::now(),
        });
        Ok(())
    }

    fn backup_metadata(&self) -> Result<Option<BackupMetadata>, SyncError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| SyncError::Storage("order store lock poisoned".into()))?;
        Ok(inner.metadata.clone())
    }

    fn clear_backup_orders(&self) -> Result<(), SyncError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| SyncError::Storage("order store lock poisoned".into()))?;
        inner.backup.clear();
        inner.metadata = None;
        Ok(())
    }

    fn last_order(&self) -> Result<Option<Order>, SyncError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| SyncError::Storage("order store lock poisoned".into()))?;
        Ok(inner
            .pending
            .iter()
            .max_by_key(|o| o.created_at)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Order;

    #[test]
    fn test_reads_are_idempotent() {
        let store = MemoryOrderStore::with_pending(vec![Order::new(vec![], 4.5)]);
        let first = store.pending_orders().unwrap();
        let second = store.pending_orders().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_backup_replace_refreshes_metadata() {
        let store = MemoryOrderStore::new();
        assert!(store.backup_metadata().unwrap().is_none());

        let orders = vec![Order::new(vec![], 1.0), Order::new(vec![], 2.0)];
        store.replace_backup_orders(&orders).unwrap();

        let meta = store.backup_metadata().unwrap().expect("metadata written");
        assert_eq!(meta.count, 2);

        // A later snapshot fully replaces the previous one.
        store.replace_backup_orders(&orders[..1]).unwrap();
        let meta = store.backup_metadata().unwrap().unwrap();
        assert_eq!(meta.count, 1);
        assert_eq!(store.backup_orders().unwrap().len(), 1);
    }

    #[test]
    fn test_clear_erases_orders_and_metadata() {
        let store = MemoryOrderStore::new();
        store
            .replace_backup_orders(&[Order::new(vec![], 3.0)])
            .unwrap();

        store.clear_backup_orders().unwrap();
        assert!(store.backup_orders().unwrap().is_empty());
        assert!(store.backup_metadata().unwrap().is_none());
    }

    #[test]
    fn test_collections_are_independent() {
        let store = MemoryOrderStore::with_pending(vec![Order::new(vec![], 9.0)]);
        store
            .replace_backup_orders(&[Order::new(vec![], 1.0)])
            .unwrap();

        store.replace_pending_orders(&[]).unwrap();
        assert!(store.pending_orders().unwrap().is_empty());
        assert_eq!(store.backup_orders().unwrap().len(), 1);
    }

    #[test]
    fn test_last_order_is_newest_by_creation() {
        let older = Order::new(vec![], 1.0);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer = Order::new(vec![], 2.0);
        let newest_session = newer.session.clone();

        let store = MemoryOrderStore::with_pending(vec![older, newer]);
        let last = store.last_order().unwrap().expect("has orders");
        assert_eq!(last.session, newest_session);
    }
}
