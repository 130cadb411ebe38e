//! Priority queue feeding ready tasks to the worker pool

mod core;
mod entry;

pub use core::PriorityTaskQueue;
pub use entry::QueueEntry;
