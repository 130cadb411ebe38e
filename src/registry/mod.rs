//! Task state ownership: live records, terminal results, and stats

mod core;

pub use core::{Attempt, DependencyState, SystemStats, TaskRegistry};
