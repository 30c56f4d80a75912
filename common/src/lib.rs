// Deferred task scheduler core: task model, storage contract, sync engine and workflow builder

pub mod config;
pub mod db;
pub mod errors;
pub mod executor;
pub mod lifecycle;
pub mod models;
pub mod retry;
pub mod scheduler;
pub mod selector;
pub mod storage;
pub mod telemetry;
pub mod workflow;
