/// Request Dispatcher: bounds how much sandboxed execution can happen
/// at once. A semaphore of `max_workers` permits gates concurrent
/// children; a bounded overflow queue of `max_requests` holds requests
/// waiting for a permit; anything past that is rejected immediately
/// rather than queued without limit.
///
/// Grounded on the teacher's old multiprocess/lock_manager pairing
/// (bound the number of live children, hold everything else behind a
/// counting primitive), rebuilt around `std::sync` instead of a
/// file-lock-backed manager since this service coordinates threads
/// inside a single process rather than cooperating OS processes.
use crate::config::SandboxConfig;
use crate::language_runner;
use crate::types::{Result, RunRequest, RunResult, SandboxError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

struct Semaphore {
    available: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    fn new(permits: usize) -> Self {
        Self {
            available: Mutex::new(permits),
            condvar: Condvar::new(),
        }
    }

    /// Blocks until a permit is available, returning a guard that
    /// releases it on drop.
    fn acquire(self: &Arc<Self>) -> SemaphoreGuard {
        let mut available = self.available.lock().unwrap();
        while *available == 0 {
            available = self.condvar.wait(available).unwrap();
        }
        *available -= 1;
        SemaphoreGuard { sem: Arc::clone(self) }
    }
}

struct SemaphoreGuard {
    sem: Arc<Semaphore>,
}

impl Drop for SemaphoreGuard {
    fn drop(&mut self) {
        let mut available = self.sem.available.lock().unwrap();
        *available += 1;
        self.sem.condvar.notify_one();
    }
}

/// Fronts the language runners with bounded concurrency. Cheap to
/// clone: internally `Arc`-backed, intended to be shared across every
/// transport connection handler.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<SandboxConfig>,
    workers: Arc<Semaphore>,
    max_requests: usize,
    queued: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(config: Arc<SandboxConfig>) -> Self {
        let workers = Arc::new(Semaphore::new(config.execution.max_workers.max(1)));
        let max_requests = config.execution.max_requests;
        Self {
            config,
            workers,
            max_requests,
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Submit a request for execution. Blocks the calling thread while
    /// queued behind the worker semaphore; returns `SandboxError::
    /// BadRequest` immediately, without blocking, if the overflow queue
    /// is already full.
    pub fn submit(&self, request: RunRequest) -> Result<RunResult> {
        let queued_now = self.queued.fetch_add(1, Ordering::SeqCst) + 1;
        if queued_now > self.max_requests {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(SandboxError::BadRequest(format!(
                "request queue full ({} requests already waiting)",
                self.max_requests
            )));
        }

        let _permit = self.workers.acquire();
        self.queued.fetch_sub(1, Ordering::SeqCst);

        language_runner::run(&self.config, &request)
    }

    pub fn config(&self) -> &Arc<SandboxConfig> {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config(max_workers: usize, max_requests: usize) -> Arc<SandboxConfig> {
        let mut config = SandboxConfig::default();
        config.execution.max_workers = max_workers;
        config.execution.max_requests = max_requests;
        Arc::new(config)
    }

    #[test]
    fn semaphore_serializes_access_to_n_permits() {
        let sem = Arc::new(Semaphore::new(2));
        let g1 = sem.acquire();
        let g2 = sem.acquire();
        assert_eq!(*sem.available.lock().unwrap(), 0);
        drop(g1);
        assert_eq!(*sem.available.lock().unwrap(), 1);
        drop(g2);
        assert_eq!(*sem.available.lock().unwrap(), 2);
    }

    #[test]
    fn dispatcher_rejects_past_queue_capacity() {
        // max_workers=0 normalizes to 1 permit, but it's held here so
        // every submission queues; max_requests=0 means anything that
        // would queue is rejected outright.
        let dispatcher = Dispatcher::new(test_config(1, 0));
        let sem = Arc::clone(&dispatcher.workers);
        let _held = sem.acquire();

        let request = RunRequest::new(crate::types::Language::Python, b"pass".to_vec(), Duration::from_secs(1));
        let result = dispatcher.submit(request);
        assert!(matches!(result, Err(SandboxError::BadRequest(_))));
    }
}
