// Scheduler module: the sync engine and its background maintenance

pub mod engine;
pub mod maintenance;

pub use engine::{Scheduler, SyncConfig, SyncEngine};
pub use maintenance::RetentionPruner;
