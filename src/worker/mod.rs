//! Worker system: bounded background execution and per-user locking.
//!
//! Core components:
//! - `pool`: `TaskPool`, a semaphore-gated pool with a bounded backlog
//! - `locks`: `UserLocks` (per-user async mutex) and `ActiveJobs`
//!   (one ingestion job per user)

pub mod locks;
pub mod pool;

pub use locks::{ActiveJobs, JobGuard, UserLocks};
pub use pool::TaskPool;
