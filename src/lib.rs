//! A fixed-size pool of OS worker threads with a bounded, fail-fast task
//! queue and a separate bounded buffer of completion records.
//!
//! Tasks are dequeued in FIFO order, but completion records are produced in
//! the order tasks finish. With more than one worker that order is unrelated
//! to submission order.

mod completion;
mod config;
mod error;
mod id;
mod manager;
mod ring;
mod task;
mod task_queue;
mod worker;

pub use completion::{CompletionRecord, CompletionStatus};
pub use config::{PoolConfig, MAX_QUEUE, MAX_THREADS};
pub use error::PoolError;
pub use id::{allocate_id, IdAllocator};
pub use manager::ThreadPoolManager;
pub use task::TaskId;
pub use worker::WorkerState;
