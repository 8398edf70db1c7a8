//! Task context on a host thread
//!
//! A [`Worker`] is one named thread that sleeps in `park()` until the edge
//! trigger unparks it, then drains the [`DeferredTask`]. Unpark tokens are
//! sticky, so a wake that lands between the end of a run and the next
//! `park()` is not lost.
//!
//! Stopping is cooperative: the shutdown flag is only checked after the
//! task is idle again, so a run that already started always completes
//! before [`Worker::stop`] returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

use crate::engine::{DeferredTask, DelayMs, ToggleOutput, ToggleSequence};
use crate::errors::InitError;
use crate::trigger::Wake;

/// Delay backed by `thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayMs for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

/// Wakes a parked worker thread
#[derive(Debug, Clone)]
pub struct ThreadWaker(Thread);

impl Wake for ThreadWaker {
    fn wake(&self) {
        self.0.unpark();
    }
}

/// Thread executing one deferred task
#[derive(Debug)]
pub struct Worker {
    shutdown: Arc<AtomicBool>,
    thread: Thread,
    handle: Option<JoinHandle<u32>>,
}

impl Worker {
    /// Start the thread; it parks immediately and waits for a wake
    pub fn spawn<O, D>(
        name: &str,
        task: Arc<DeferredTask>,
        sequence: ToggleSequence,
        output: Arc<O>,
        mut delay: D,
    ) -> Result<Self, InitError>
    where
        O: ToggleOutput + Send + Sync + 'static,
        D: DelayMs + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                let mut runs = 0;
                loop {
                    runs += task.run_until_idle(&sequence, &*output, &mut delay);
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    thread::park();
                }
                runs
            })
            .map_err(|e| {
                log_error!("worker: cannot start thread {}: {}", name, e);
                InitError::Worker
            })?;

        log_debug!("worker: thread {} started", name);
        Ok(Self {
            shutdown,
            thread: handle.thread().clone(),
            handle: Some(handle),
        })
    }

    /// Waker for the edge trigger
    pub fn waker(&self) -> ThreadWaker {
        ThreadWaker(self.thread.clone())
    }

    /// Let any pending run finish, then join the thread
    ///
    /// Returns the number of runs the thread executed.
    pub fn stop(mut self) -> u32 {
        self.join()
    }

    fn join(&mut self) -> u32 {
        let Some(handle) = self.handle.take() else {
            return 0;
        };

        self.shutdown.store(true, Ordering::Release);
        self.thread.unpark();

        match handle.join() {
            Ok(runs) => {
                log_debug!("worker: thread joined after {} runs", runs);
                runs
            }
            Err(_) => {
                log_error!("worker: thread panicked");
                0
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.join();
    }
}
