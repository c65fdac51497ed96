//! Deadline-bounded execution of blocking model calls.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender, TrySendError};

/// Calls that may wait behind the one in progress on a worker.
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// How a bounded call failed to produce a value.
#[derive(Debug, PartialEq, Eq)]
pub enum BoundedCallError {
    /// The deadline passed; a call already running finishes on the worker
    /// and its result is discarded.
    TimedOut,
    /// The worker's queue is full, typically behind a hung call.
    Busy,
    /// The call panicked.
    Panicked(String),
}

struct Job {
    deadline: Instant,
    run: Box<dyn FnOnce() + Send>,
}

/// One long-lived thread that runs calls for a single model, in order.
///
/// A hung model call stalls only this worker. Further calls queue up to
/// the queue depth and are refused with [`BoundedCallError::Busy`] after
/// that, so no thread is spawned per call. Queued calls whose deadline
/// passed before the worker reached them are skipped.
pub struct BoundedWorker {
    timeout: Duration,
    jobs: Sender<Job>,
}

impl BoundedWorker {
    pub fn spawn(name: &str, timeout: Duration, queue_depth: usize) -> std::io::Result<Self> {
        let (jobs, queue) = crossbeam_channel::bounded::<Job>(queue_depth.max(1));
        thread::Builder::new()
            .name(format!("bounded-{name}"))
            .spawn(move || {
                for job in queue {
                    if Instant::now() < job.deadline {
                        (job.run)();
                    }
                }
            })?;
        Ok(Self { timeout, jobs })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `f` on the worker and waits at most the worker's timeout.
    pub fn call<T, F>(&self, f: F) -> Result<T, BoundedCallError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        let (tx, rx) = crossbeam_channel::bounded(1);
        let job = Job {
            deadline,
            run: Box::new(move || {
                let _ = tx.send(catch_panic(f));
            }),
        };
        match self.jobs.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(BoundedCallError::Busy),
            Err(TrySendError::Disconnected(_)) => {
                return Err(BoundedCallError::Panicked("worker has stopped".into()))
            }
        }

        match rx.recv_deadline(deadline) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(BoundedCallError::Panicked(message)),
            // Disconnected: the worker skipped the job after its deadline.
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                Err(BoundedCallError::TimedOut)
            }
        }
    }
}

/// Runs `f` on the current thread, converting a panic into an error message.
pub fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|p| panic_message(p.as_ref()))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn worker(timeout_ms: u64, depth: usize) -> BoundedWorker {
        BoundedWorker::spawn("test", Duration::from_millis(timeout_ms), depth).unwrap()
    }

    #[test]
    fn test_returns_value_within_deadline() {
        let worker = worker(1000, 4);
        assert_eq!(worker.call(|| 21 * 2), Ok(42));
        assert_eq!(worker.call(|| "again"), Ok("again"));
    }

    #[test]
    fn test_reports_timeout() {
        let worker = worker(10, 4);
        let result = worker.call(|| {
            thread::sleep(Duration::from_millis(300));
            1
        });
        assert_eq!(result, Err(BoundedCallError::TimedOut));
    }

    #[test]
    fn test_reports_panic_and_keeps_serving() {
        let worker = worker(1000, 4);
        let result: Result<(), _> = worker.call(|| panic!("model exploded"));
        assert_eq!(
            result,
            Err(BoundedCallError::Panicked("model exploded".into()))
        );
        assert_eq!(worker.call(|| 7), Ok(7));
    }

    #[test]
    fn test_hung_call_refuses_instead_of_piling_up() {
        let worker = worker(20, 1);
        let started = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&started);
        let hung = worker.call(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(300));
        });
        assert_eq!(hung, Err(BoundedCallError::TimedOut));

        // Fills the single queue slot behind the hung call.
        let counter = Arc::clone(&started);
        let queued = worker.call(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(queued, Err(BoundedCallError::TimedOut));

        assert_eq!(worker.call(|| ()), Err(BoundedCallError::Busy));

        thread::sleep(Duration::from_millis(400));
        assert_eq!(worker.call(|| 5), Ok(5));
        // The queued call expired before the worker reached it.
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_catch_panic_passes_values_through() {
        assert_eq!(catch_panic(|| "ok"), Ok("ok"));
        let err = catch_panic(|| -> u8 { panic!("boom {}", 1) }).unwrap_err();
        assert_eq!(err, "boom 1");
    }
}
