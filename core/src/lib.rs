pub mod clock;
pub mod config;
pub mod correlator;
pub mod delta;
pub mod error;
pub mod inventory;
pub mod measurement;
pub mod overflow;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod store;
pub mod transfer_log;
pub mod types;
