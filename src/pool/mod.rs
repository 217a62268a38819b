//! Worker Pool Module
//!
//! A fixed set of long-lived tokio tasks draining a bounded job queue.
//! Submitting a job waits for queue space and then for the job's response,
//! so the queue plus the workers cap how many requests are in the pipeline.

mod worker;

pub use worker::{HandlerFuture, Job, JobHandler, PoolError, WorkerPool, DEFAULT_WORKERS};
