pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod inventory;
pub mod models;
pub mod reconciler;
pub mod reservations;

pub use error::CoreError;
pub use inventory::InventoryLedger;
pub use reconciler::{ReconcileSummary, Reconciler};
