// src/tasks/mod.rs

pub mod snapshot_flush;

pub use snapshot_flush::spawn_snapshot_flush_task;
