//! Operator-selected manual resync.
//!
//! Pulls hand-picked orders out of the backup collection and pushes them to
//! the order service in one batch. This path deliberately bypasses the
//! automatic bookkeeping: retry counters and sync statuses do not move, and
//! the backup collection itself is never mutated. Product lines are
//! expanded to unit quantity for transport only; a line of quantity N goes
//! over the wire as N quantity-1 lines.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::api::RemoteSync;
use crate::error::SyncError;
use crate::order::{Order, ProductLine, SyncRequest};
use crate::store::OrderStore;
use crate::sync::{SyncEngine, SyncReport};

/// Expand each product line of quantity N into N unit-quantity lines.
fn expand_product_lines(products: &[ProductLine]) -> Vec<ProductLine> {
    let mut expanded = Vec::with_capacity(products.len());
    for line in products {
        let units = line.quantity.max(1);
        for _ in 0..units {
            expanded.push(ProductLine {
                quantity: 1,
                ..line.clone()
            });
        }
    }
    expanded
}

impl<S: OrderStore, R: RemoteSync> SyncEngine<S, R> {
    /// Re-submit the selected backup orders as one batch.
    ///
    /// The empty selection is rejected before any I/O. Sessions that do not
    /// exist in the backup collection are skipped with a warning; when none
    /// match, nothing is dispatched. The batch outcome is reported as a
    /// unit.
    pub async fn sync_selected(
        &self,
        sessions: &HashSet<String>,
    ) -> Result<SyncReport, SyncError> {
        if sessions.is_empty() {
            return Err(SyncError::NoSelection);
        }

        let backup = self.store.backup_orders()?;
        let selected: Vec<Order> = backup
            .into_iter()
            .filter(|o| sessions.contains(&o.session))
            .collect();

        for session in sessions {
            if !selected.iter().any(|o| &o.session == session) {
                warn!(%session, "selected order not found in backup; skipping");
            }
        }

        if selected.is_empty() {
            return Err(SyncError::NoMatchingOrders);
        }

        let expanded: Vec<Order> = selected
            .into_iter()
            .map(|mut order| {
                order.products = expand_product_lines(&order.products);
                order
            })
            .collect();
        let count = expanded.len();

        info!(count, "submitting manual resync batch");
        match self.remote.submit(SyncRequest::new(expanded)).await {
            Ok(resp) if resp.success => {
                info!(count, "manual resync batch accepted");
                Ok(SyncReport {
                    success: true,
                    synced: count,
                    message: Some(format!("resubmitted {count} orders")),
                })
            }
            Ok(resp) => {
                let message = resp
                    .message
                    .unwrap_or_else(|| "order service rejected the batch".to_string());
                warn!(count, error = %message, "manual resync batch rejected");
                Ok(SyncReport {
                    success: false,
                    synced: 0,
                    message: Some(message),
                })
            }
            Err(err) => {
                let message = err.to_string();
                warn!(count, error = %message, "manual resync batch failed");
                Ok(SyncReport {
                    success: false,
                    synced: 0,
                    message: Some(message),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use crate::order::{SyncResponse, SyncStatus};
    use crate::store::MemoryOrderStore;

    struct ScriptRemote {
        outcomes: Mutex<VecDeque<Result<SyncResponse, SyncError>>>,
        requests: Mutex<Vec<SyncRequest>>,
    }

    impl ScriptRemote {
        fn new(outcomes: Vec<Result<SyncResponse, SyncError>>) -> Self {
            ScriptRemote {
                outcomes: Mutex::new(outcomes.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request_orders(&self, call: usize) -> Vec<Order> {
            self.requests.lock().unwrap()[call].orders.clone()
        }
    }

    impl RemoteSync for ScriptRemote {
        async fn submit(&self, request: SyncRequest) -> Result<SyncResponse, SyncError> {
            self.requests.lock().unwrap().push(request);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(SyncResponse::ok()))
        }

        async fn is_reachable(&self) -> bool {
            true
        }
    }

    fn line(name: &str, quantity: u32, price: f64) -> ProductLine {
        ProductLine {
            name: name.into(),
            quantity,
            price,
            notes: None,
        }
    }

    fn backed_up_engine(
        backup: Vec<Order>,
        outcomes: Vec<Result<SyncResponse, SyncError>>,
    ) -> (
        SyncEngine<MemoryOrderStore, ScriptRemote>,
        Arc<MemoryOrderStore>,
        Arc<ScriptRemote>,
    ) {
        let store = Arc::new(MemoryOrderStore::new());
        store.replace_backup_orders(&backup).unwrap();
        let remote = Arc::new(ScriptRemote::new(outcomes));
        let engine = SyncEngine::new(store.clone(), remote.clone());
        (engine, store, remote)
    }

    #[test]
    fn test_expand_product_lines() {
        let expanded = expand_product_lines(&[line("Latte", 3, 4.2), line("Muffin", 1, 2.8)]);
        assert_eq!(expanded.len(), 4);
        assert!(expanded.iter().all(|l| l.quantity == 1));
        assert_eq!(expanded.iter().filter(|l| l.name == "Latte").count(), 3);

        // A malformed zero-quantity line still ships one unit.
        let degenerate = expand_product_lines(&[line("Water", 0, 0.0)]);
        assert_eq!(degenerate.len(), 1);
    }

    #[tokio::test]
    async fn test_selected_orders_are_expanded_but_backup_is_not_mutated() {
        let mut order = Order::new(vec![line("Latte", 3, 4.2), line("Muffin", 1, 2.8)], 15.4);
        order.sync_status = SyncStatus::Failed;
        order.retry_count = 5;
        let session = order.session.clone();

        let (engine, store, remote) = backed_up_engine(vec![order], vec![Ok(SyncResponse::ok())]);

        let selection: HashSet<String> = [session.clone()].into();
        let report = engine.sync_selected(&selection).await.unwrap();
        assert!(report.success);
        assert_eq!(report.synced, 1);

        // Wire payload carries 4 unit-quantity lines.
        let sent = remote.request_orders(0);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].products.len(), 4);
        assert!(sent[0].products.iter().all(|l| l.quantity == 1));

        // The stored representation keeps its 2 original lines, and the
        // bypass leaves the retry bookkeeping untouched.
        let stored = store.backup_orders().unwrap();
        assert_eq!(stored[0].products.len(), 2);
        assert_eq!(stored[0].products[0].quantity, 3);
        assert_eq!(stored[0].retry_count, 5);
        assert_eq!(stored[0].sync_status, SyncStatus::Failed);
    }

    #[tokio::test]
    async fn test_empty_selection_never_reaches_the_remote() {
        let (engine, _store, remote) = backed_up_engine(vec![Order::new(vec![], 1.0)], vec![]);

        let err = engine.sync_selected(&HashSet::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::NoSelection));
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_sessions_are_skipped() {
        let known = Order::new(vec![line("Tea", 1, 2.0)], 2.0);
        let known_session = known.session.clone();

        let (engine, _store, remote) = backed_up_engine(vec![known], vec![Ok(SyncResponse::ok())]);

        let selection: HashSet<String> =
            [known_session.clone(), "no-such-session".to_string()].into();
        let report = engine.sync_selected(&selection).await.unwrap();
        assert!(report.success);
        assert_eq!(report.synced, 1);

        let sent = remote.request_orders(0);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].session, known_session);
    }

    #[tokio::test]
    async fn test_no_matching_sessions_short_circuits() {
        let (engine, _store, remote) = backed_up_engine(vec![Order::new(vec![], 1.0)], vec![]);

        let selection: HashSet<String> = ["missing".to_string()].into();
        let err = engine.sync_selected(&selection).await.unwrap_err();
        assert!(matches!(err, SyncError::NoMatchingOrders));
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_failure_reports_as_unit_without_bookkeeping() {
        let order = Order::new(vec![line("Mocha", 2, 4.8)], 9.6);
        let session = order.session.clone();

        let (engine, store, _remote) = backed_up_engine(
            vec![order],
            vec![Err(SyncError::Network("connection refused".into()))],
        );

        let selection: HashSet<String> = [session].into();
        let report = engine.sync_selected(&selection).await.unwrap();
        assert!(!report.success);
        assert!(report.message.unwrap().contains("connection refused"));

        // No retry counters move on the manual path.
        let stored = store.backup_orders().unwrap();
        assert_eq!(stored[0].retry_count, 0);
        assert_eq!(stored[0].sync_status, SyncStatus::Pending);
    }
}
