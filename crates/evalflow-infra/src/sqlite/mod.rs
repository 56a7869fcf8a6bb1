//! SQLite storage: connection pool and checkpoint store.

pub mod checkpoint;
pub mod pool;
