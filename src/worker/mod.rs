//! Worker pool and single-attempt execution

mod executor;
mod pool;

pub(crate) use pool::{WorkerContext, join_workers, spawn_workers};
