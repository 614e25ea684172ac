//! Relational database gateway: connection pool, SQL statement builder,
//! and the per-problem table-prefixing facade the DP driver uses.

pub mod gateway;
pub mod pool;
pub mod sql;

pub use gateway::Gateway;
pub use pool::Pool;
