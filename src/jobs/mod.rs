pub mod history_snapshot_sync;
pub mod price_sync;
pub mod supervisor;
