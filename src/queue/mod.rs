//! Sequential task queue
//!
//! Tasks are nullary closures producing a future. Ordinary tasks run strictly one
//! after another; a contiguous run of point entries runs as one concurrent batch.
//! Entries may carry an id, which allows cancelling them until their body starts.

pub mod config;
mod job;
mod task_queue;

pub use config::QueueConfig;
pub use job::TaskHandle;
pub use task_queue::TaskQueue;
