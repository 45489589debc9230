//! Order data model shared by the sync engine, the backup manager, and the
//! store adapters.
//!
//! Persisted JSON keeps snake_case field names; camelCase aliases are
//! accepted on read so records written by the previous Electron client
//! deserialize cleanly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Domain status assigned by the order-taking flow. The sync engine reads
/// it but never changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

/// Where an order sits in the sync pipeline.
///
/// Records written before the sync columns existed carry no status at all;
/// serde's default maps that to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Failed,
}

/// One line of an order. `quantity` counts identical units of the product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductLine {
    pub name: String,
    pub quantity: u32,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A locally created sale.
///
/// `session` is the natural key within the pending collection and within
/// the backup collection (the two are independent snapshots and may
/// diverge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub session: String,
    #[serde(
        default,
        alias = "displayID",
        alias = "displayId",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_id: Option<String>,
    #[serde(
        default,
        alias = "customerName",
        skip_serializing_if = "Option::is_none"
    )]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub products: Vec<ProductLine>,
    #[serde(alias = "totalAmount")]
    pub total: f64,
    #[serde(default, alias = "orderStatus")]
    pub order_status: OrderStatus,
    #[serde(default, alias = "syncStatus")]
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_retry_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Build a fresh order with a generated session token. The order-taking
    /// flow sets the domain fields; sync bookkeeping starts at zero.
    pub fn new(products: Vec<ProductLine>, total: f64) -> Self {
        let now = Utc::now();
        Order {
            session: Uuid::new_v4().to_string(),
            display_id: None,
            customer_name: None,
            products,
            total,
            order_status: OrderStatus::Pending,
            sync_status: SyncStatus::Pending,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            last_retry_at: None,
            synced_at: None,
        }
    }
}

/// Backup collection bookkeeping, refreshed on every snapshot write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub count: usize,
    pub last_backup: DateTime<Utc>,
}

/// Logical batch payload for the remote order service. Terminal identity is
/// attached at the wire layer, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub orders: Vec<Order>,
}

impl SyncRequest {
    pub fn new(orders: Vec<Order>) -> Self {
        SyncRequest { orders }
    }
}

/// Logical response from the remote order service: a success flag plus
/// either a result payload or an error message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SyncResponse {
    pub fn ok() -> Self {
        SyncResponse {
            success: true,
            result: None,
            message: None,
        }
    }

    /// Interpret a raw response body. A missing `success` flag on a 2xx
    /// response counts as accepted; the message falls back to `error`.
    pub fn from_body(body: Value) -> Self {
        let success = body
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let message = body
            .get("message")
            .or_else(|| body.get("error"))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        SyncResponse {
            success,
            result: body.get("result").cloned(),
            message,
        }
    }
}
