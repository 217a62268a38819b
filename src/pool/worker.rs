//! Worker pool implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::Response;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Worker count used when a pool is asked for zero workers.
pub const DEFAULT_WORKERS: usize = 10;

/// Boxed future returned by a [`JobHandler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// The request-handling function a job runs. Carried inside the job itself.
pub type JobHandler = Arc<dyn Fn(Request) -> HandlerFuture + Send + Sync>;

/// Reasons a submitted job produced no response.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool is stopped")]
    Stopped,
    #[error("job was dropped before completion")]
    Dropped,
}

// == Job ==
/// A unit of pipeline work: the request, the handler to run on it and the
/// channel its response is delivered through.
pub struct Job {
    request: Request,
    handler: JobHandler,
    done: oneshot::Sender<Response>,
}

// == Worker Pool ==
pub struct WorkerPool {
    /// Taken out on `stop`, which closes the queue once in-flight submitters finish
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    /// Starts `size` workers behind a queue of `2 * size` slots.
    pub fn new(size: usize) -> Self {
        let size = if size == 0 { DEFAULT_WORKERS } else { size };
        Self::with_queue_capacity(size, size * 2)
    }

    /// Starts `size` workers behind a queue of `queue_capacity` slots.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_queue_capacity(size: usize, queue_capacity: usize) -> Self {
        let size = size.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|id| tokio::spawn(run_worker(id, Arc::clone(&receiver))))
            .collect();

        info!("Started {} workers in the pool", size);

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
            queue_capacity,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    // == Enqueue ==
    /// Queues `request` for `handler` and waits for its response.
    ///
    /// Waits for a free queue slot when the queue is full. Fails fast with
    /// [`PoolError::Stopped`] once `stop` has begun.
    pub async fn enqueue(
        &self,
        request: Request,
        handler: JobHandler,
    ) -> Result<Response, PoolError> {
        let sender = self
            .sender
            .lock()
            .await
            .clone()
            .ok_or(PoolError::Stopped)?;

        let (done, completion) = oneshot::channel();
        let job = Job {
            request,
            handler,
            done,
        };

        sender.send(job).await.map_err(|_| PoolError::Stopped)?;
        drop(sender);

        completion.await.map_err(|_| PoolError::Dropped)
    }

    // == Stop ==
    /// Stops accepting jobs, lets workers drain the queue and waits for them
    /// to exit.
    pub async fn stop(&self) {
        self.sender.lock().await.take();

        let workers: Vec<_> = self.workers.lock().await.drain(..).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                error!("Worker exited abnormally: {}", e);
            }
        }

        info!("Worker pool stopped");
    }

    /// True once every worker task has exited.
    pub async fn is_stopped(&self) -> bool {
        self.sender.lock().await.is_none()
            && self.workers.lock().await.iter().all(JoinHandle::is_finished)
    }
}

async fn run_worker(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        // Only the idle worker holding the lock waits on the queue
        let job = { receiver.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };

        let Job {
            request,
            handler,
            done,
        } = job;

        // Run on its own task so a panicking handler is reported, not fatal to the worker
        match tokio::spawn(handler(request)).await {
            Ok(response) => {
                if done.send(response).is_err() {
                    debug!("Worker {}: submitter went away before completion", id);
                }
            }
            Err(e) => {
                error!("Worker {}: job failed: {}", id, e);
                // Dropping `done` reports the failure to the submitter
            }
        }
    }

    debug!("Worker {} exiting", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::StatusCode;

    fn request() -> Request {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    fn handler_with_status(status: StatusCode) -> JobHandler {
        Arc::new(move |_req: Request| -> HandlerFuture {
            Box::pin(async move {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = status;
                response
            })
        })
    }

    #[tokio::test]
    async fn test_enqueue_returns_handler_response() {
        let pool = WorkerPool::new(2);

        let response = pool
            .enqueue(request(), handler_with_status(StatusCode::ACCEPTED))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_zero_size_falls_back_to_default() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.size(), DEFAULT_WORKERS);
        assert_eq!(pool.queue_capacity(), DEFAULT_WORKERS * 2);
        pool.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_backpressure_blocks_instead_of_dropping() {
        let pool = Arc::new(WorkerPool::with_queue_capacity(2, 1));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handler: JobHandler = {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            Arc::new(move |_req: Request| -> HandlerFuture {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                Box::pin(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Response::new(Body::empty())
                })
            })
        };

        // Far more submitters than workers + queue slots
        let submitters: Vec<_> = (0..12)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { pool.enqueue(request(), handler).await })
            })
            .collect();

        for submitter in submitters {
            let response = submitter.await.unwrap();
            assert!(response.is_ok(), "no submitter may be rejected");
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_stop_rejects_new_jobs_and_joins_workers() {
        let pool = WorkerPool::new(3);
        pool.stop().await;

        assert!(pool.is_stopped().await);
        let result = pool
            .enqueue(request(), handler_with_status(StatusCode::OK))
            .await;
        assert_eq!(result.unwrap_err(), PoolError::Stopped);
    }

    #[tokio::test]
    async fn test_stop_drains_queued_jobs() {
        let pool = Arc::new(WorkerPool::with_queue_capacity(1, 4));
        let completed = Arc::new(AtomicUsize::new(0));

        let handler: JobHandler = {
            let completed = Arc::clone(&completed);
            Arc::new(move |_req: Request| -> HandlerFuture {
                let completed = Arc::clone(&completed);
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    Response::new(Body::empty())
                })
            })
        };

        let submitters: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { pool.enqueue(request(), handler).await })
            })
            .collect();

        // Let the submitters reach the queue before stopping
        tokio::time::sleep(Duration::from_millis(5)).await;
        pool.stop().await;

        for submitter in submitters {
            let _ = submitter.await.unwrap();
        }
        assert!(pool.is_stopped().await);
    }

    #[tokio::test]
    async fn test_panicking_handler_reports_dropped_job() {
        let pool = WorkerPool::new(1);
        let handler: JobHandler = Arc::new(|_req: Request| -> HandlerFuture {
            Box::pin(async {
                if true {
                    panic!("boom");
                }
                Response::new(Body::empty())
            })
        });

        let result = pool.enqueue(request(), handler).await;
        assert_eq!(result.unwrap_err(), PoolError::Dropped);

        // The worker survives and keeps serving
        let response = pool
            .enqueue(request(), handler_with_status(StatusCode::OK))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        pool.stop().await;
    }
}
