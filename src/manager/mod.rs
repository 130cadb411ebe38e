//! Top-level façade owning queue, registry, limiter, and pool

mod core;

pub use core::{Target, TaskManager};
