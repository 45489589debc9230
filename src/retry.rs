//! Bounded retry policy for automatic order sync.
//!
//! Pure decision logic: no I/O, no clock reads. Callers pass `now` so the
//! transitions stay deterministic under test.

use chrono::{DateTime, Utc};

use crate::order::{Order, SyncStatus};

/// Automatic sync gives up on an order after this many failed attempts.
/// Exhausted orders can still be pushed through the manual resync path.
pub const MAX_SYNC_RETRIES: u32 = 5;

/// An order qualifies for automatic sync while it is still pending and has
/// retry budget left. Synced and failed are both terminal here.
pub fn is_eligible(order: &Order) -> bool {
    order.sync_status == SyncStatus::Pending && order.retry_count < MAX_SYNC_RETRIES
}

/// Transition after the order service accepted the order. The retry counter
/// is left alone; a synced order is simply never considered again.
pub fn on_success(mut order: Order, now: DateTime<Utc>) -> Order {
    order.sync_status = SyncStatus::Synced;
    order.synced_at = Some(now);
    order.updated_at = now;
    order
}

/// Transition after a failed attempt. The fifth failure is terminal for
/// automatic sync.
pub fn on_failure(mut order: Order, now: DateTime<Utc>) -> Order {
    order.retry_count += 1;
    order.last_retry_at = Some(now);
    order.updated_at = now;
    order.sync_status = if order.retry_count >= MAX_SYNC_RETRIES {
        SyncStatus::Failed
    } else {
        SyncStatus::Pending
    };
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_with(retry_count: u32, sync_status: SyncStatus) -> Order {
        let mut order = Order::new(vec![], 12.5);
        order.retry_count = retry_count;
        order.sync_status = sync_status;
        order
    }

    #[test]
    fn test_eligibility_bounds() {
        assert!(is_eligible(&order_with(0, SyncStatus::Pending)));
        assert!(is_eligible(&order_with(4, SyncStatus::Pending)));

        assert!(!is_eligible(&order_with(5, SyncStatus::Pending)));
        assert!(!is_eligible(&order_with(0, SyncStatus::Synced)));
        assert!(!is_eligible(&order_with(5, SyncStatus::Failed)));
    }

    #[test]
    fn test_retry_count_is_monotonic_until_terminal() {
        let now = Utc::now();
        let mut order = order_with(0, SyncStatus::Pending);

        for expected in 1..MAX_SYNC_RETRIES {
            order = on_failure(order, now);
            assert_eq!(order.retry_count, expected);
            assert_eq!(order.sync_status, SyncStatus::Pending);
            assert_eq!(order.last_retry_at, Some(now));
        }

        order = on_failure(order, now);
        assert_eq!(order.retry_count, MAX_SYNC_RETRIES);
        assert_eq!(order.sync_status, SyncStatus::Failed);
        assert!(!is_eligible(&order));
    }

    #[test]
    fn test_success_is_terminal_and_keeps_counter() {
        let now = Utc::now();
        let order = on_success(order_with(4, SyncStatus::Pending), now);

        assert_eq!(order.sync_status, SyncStatus::Synced);
        assert_eq!(order.synced_at, Some(now));
        assert_eq!(order.updated_at, now);
        // Counter untouched; the order just leaves the retry pool.
        assert_eq!(order.retry_count, 4);
        assert!(!is_eligible(&order));
    }

    #[test]
    fn test_transitions_leave_domain_fields_alone() {
        let now = Utc::now();
        let mut base = order_with(1, SyncStatus::Pending);
        base.customer_name = Some("Riley".into());
        base.total = 21.0;

        let failed = on_failure(base.clone(), now);
        assert_eq!(failed.customer_name, base.customer_name);
        assert_eq!(failed.total, base.total);
        assert_eq!(failed.order_status, base.order_status);
        assert_eq!(failed.created_at, base.created_at);
    }
}
