//! Ordervault - offline order backup & sync engine for Brewline POS
//! terminals.
//!
//! A terminal keeps every locally created order durable while the device
//! may be offline, pushes pending orders to the remote order service in the
//! background (or on demand), tracks per-order retry state with a bounded
//! policy, and lets an operator re-submit a hand-picked subset from a
//! backup snapshot. Screens, printing, and auth live in the host
//! application; it drives the engine through [`sync::SyncEngine`] and
//! consumes [`events::SyncEvent`]s.
//!
//! Typical wiring:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ordervault::{api::OrderServiceClient, db, sync::SyncEngine};
//!
//! # fn main() -> Result<(), ordervault::error::SyncError> {
//! ordervault::diagnostics::init_tracing(&ordervault::diagnostics::default_log_dir());
//!
//! let store = Arc::new(db::init(std::path::Path::new("/var/lib/brewline"))?);
//! let remote = Arc::new(OrderServiceClient::from_credentials()?);
//! let engine = Arc::new(SyncEngine::new(store, remote));
//!
//! // Background sync every 15 seconds; UI actions call
//! // engine.force_sync() / engine.sync_selected(..) directly.
//! SyncEngine::start_sync_loop(engine.clone(), 15);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backup;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod order;
pub mod resync;
pub mod retry;
pub mod storage;
pub mod store;
pub mod sync;

pub use api::{OrderServiceClient, RemoteSync};
pub use db::DbState;
pub use error::SyncError;
pub use events::SyncEvent;
pub use order::{
    BackupMetadata, Order, OrderStatus, ProductLine, SyncRequest, SyncResponse, SyncStatus,
};
pub use store::{MemoryOrderStore, OrderStore};
pub use sync::{StatusSnapshot, SyncEngine, SyncReport, SyncState};
