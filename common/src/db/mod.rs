// Database layer module: PostgreSQL connection pool and shared SQL fragments

pub mod pool;
pub mod queries;

pub use pool::DbPool;
