//! Bounded worker pool for asynchronous business methods.
//!
//! The pool starts threads on demand up to `max_threads`, queues work without
//! bound once every thread is busy, and lets threads above `min_threads` exit
//! after sitting idle for `keep_alive`. Each submission hands back an
//! [`AsyncResult`], which can be waited on from a thread or awaited.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::PoolConfig;
use crate::error::{ContainerError, ContainerResult, PanicError};
use crate::value::Value;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Lifecycle of an asynchronous call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncState {
    Submitted,
    Running,
    Completed,
    Failed,
}

impl AsyncState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AsyncState::Completed | AsyncState::Failed)
    }
}

struct Slot {
    state: AsyncState,
    result: Option<ContainerResult<Option<Value>>>,
    waker: Option<Waker>,
}

struct AsyncShared {
    slot: Mutex<Slot>,
    done: Condvar,
}

impl AsyncShared {
    fn finish(&self, result: ContainerResult<Option<Value>>) {
        let waker = {
            let mut slot = self.slot.lock();
            if slot.state.is_terminal() {
                return;
            }
            slot.state = if result.is_ok() {
                AsyncState::Completed
            } else {
                AsyncState::Failed
            };
            slot.result = Some(result);
            slot.waker.take()
        };
        self.done.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Handle to an asynchronous call's eventual result.
///
/// Failures surface only when the result is inspected. There is no
/// cancellation: dropping the handle does not stop the call.
pub struct AsyncResult {
    shared: Arc<AsyncShared>,
}

/// Pool-side half of an [`AsyncResult`].
///
/// Dropping it without completing fails the result with `PoolShutdown`.
pub(crate) struct AsyncCompleter {
    shared: Arc<AsyncShared>,
}

pub(crate) fn async_pair() -> (AsyncCompleter, AsyncResult) {
    let shared = Arc::new(AsyncShared {
        slot: Mutex::new(Slot {
            state: AsyncState::Submitted,
            result: None,
            waker: None,
        }),
        done: Condvar::new(),
    });
    (
        AsyncCompleter {
            shared: shared.clone(),
        },
        AsyncResult { shared },
    )
}

impl AsyncCompleter {
    pub(crate) fn running(&self) {
        let mut slot = self.shared.slot.lock();
        if slot.state == AsyncState::Submitted {
            slot.state = AsyncState::Running;
        }
    }

    pub(crate) fn complete(self, result: ContainerResult<Option<Value>>) {
        self.shared.finish(result);
    }
}

impl Drop for AsyncCompleter {
    fn drop(&mut self) {
        self.shared.finish(Err(ContainerError::PoolShutdown));
    }
}

impl AsyncResult {
    pub fn state(&self) -> AsyncState {
        self.shared.slot.lock().state
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Blocks until the call finishes.
    pub fn wait(self) -> ContainerResult<Option<Value>> {
        let mut slot = self.shared.slot.lock();
        while slot.result.is_none() && !slot.state.is_terminal() {
            self.shared.done.wait(&mut slot);
        }
        take_result(&mut slot)
    }

    /// Blocks for at most `timeout`; hands the handle back if the call is
    /// still running.
    pub fn wait_timeout(self, timeout: Duration) -> Result<ContainerResult<Option<Value>>, AsyncResult> {
        let deadline = Instant::now() + timeout;
        {
            let mut slot = self.shared.slot.lock();
            while !slot.state.is_terminal() {
                if self.shared.done.wait_until(&mut slot, deadline).timed_out() {
                    break;
                }
            }
            if slot.state.is_terminal() {
                return Ok(take_result(&mut slot));
            }
        }
        Err(self)
    }

    /// Waits and downcasts a returned value.
    pub fn wait_for<R: 'static>(self) -> ContainerResult<Option<R>> {
        match self.wait()? {
            Some(value) => value
                .downcast::<R>()
                .map(|boxed| Some(*boxed))
                .map_err(|_| ContainerError::ResultTypeMismatch {
                    expected: std::any::type_name::<R>(),
                }),
            None => Ok(None),
        }
    }
}

fn take_result(slot: &mut MutexGuard<'_, Slot>) -> ContainerResult<Option<Value>> {
    slot.result
        .take()
        .unwrap_or_else(|| Err(ContainerError::Config("asynchronous result already taken".to_string())))
}

impl Future for AsyncResult {
    type Output = ContainerResult<Option<Value>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.shared.slot.lock();
        if slot.state.is_terminal() {
            return Poll::Ready(take_result(&mut slot));
        }
        match &slot.waker {
            Some(existing) if existing.will_wake(cx.waker()) => {}
            _ => slot.waker = Some(cx.waker().clone()),
        }
        Poll::Pending
    }
}

impl fmt::Debug for AsyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResult").field("state", &self.state()).finish()
    }
}

struct PoolState {
    queue: VecDeque<Job>,
    threads: usize,
    idle: usize,
    spawned: usize,
    shutdown: bool,
}

struct PoolShared {
    config: PoolConfig,
    state: Mutex<PoolState>,
    work_available: Condvar,
    thread_exited: Condvar,
}

/// Threads for asynchronous business methods.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                config,
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    threads: 0,
                    idle: 0,
                    spawned: 0,
                    shutdown: false,
                }),
                work_available: Condvar::new(),
                thread_exited: Condvar::new(),
            }),
        }
    }

    /// Queues `job`, starting a thread when none is idle and the cap allows.
    pub fn execute<F>(&self, job: F) -> ContainerResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(ContainerError::PoolShutdown);
        }
        state.queue.push_back(Box::new(job));

        if state.idle > state.queue.len() - 1 {
            self.shared.work_available.notify_one();
            return Ok(());
        }
        if state.threads >= self.shared.config.max_threads {
            return Ok(());
        }

        state.spawned += 1;
        let name = format!("{}-{}", self.shared.config.thread_name, state.spawned);
        let shared = self.shared.clone();
        match thread::Builder::new().name(name).spawn(move || worker_loop(shared)) {
            Ok(_) => {
                state.threads += 1;
                Ok(())
            }
            Err(err) if state.threads == 0 => {
                state.queue.pop_back();
                Err(ContainerError::Config(format!("cannot start asynchronous worker: {}", err)))
            }
            Err(err) => {
                tracing::warn!(error = %err, threads = state.threads, "cannot grow asynchronous pool");
                Ok(())
            }
        }
    }

    /// Stops accepting work and waits up to `timeout` for queued work to drain.
    ///
    /// Returns true when every worker exited in time.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        self.shared.work_available.notify_all();
        while state.threads > 0 {
            if self.shared.thread_exited.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if state.threads > 0 {
            tracing::warn!(
                threads = state.threads,
                queued = state.queue.len(),
                "asynchronous pool still busy after close timeout"
            );
            false
        } else {
            true
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    pub fn threads(&self) -> usize {
        self.shared.state.lock().threads
    }

    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        self.shared.work_available.notify_all();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("WorkerPool")
            .field("threads", &state.threads)
            .field("idle", &state.idle)
            .field("queued", &state.queue.len())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

fn worker_loop(shared: Arc<PoolShared>) {
    let mut state = shared.state.lock();
    loop {
        if let Some(job) = state.queue.pop_front() {
            MutexGuard::unlocked(&mut state, || {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    let panic = PanicError::from_payload(payload);
                    tracing::error!(error = %panic, "asynchronous job panicked");
                }
            });
            continue;
        }
        if state.shutdown {
            break;
        }

        state.idle += 1;
        let growth_thread = state.threads > shared.config.min_threads;
        let timed_out = if growth_thread {
            shared
                .work_available
                .wait_for(&mut state, shared.config.keep_alive)
                .timed_out()
        } else {
            shared.work_available.wait(&mut state);
            false
        };
        state.idle -= 1;

        if timed_out && state.queue.is_empty() && state.threads > shared.config.min_threads {
            tracing::trace!(threads = state.threads, "idle asynchronous worker exiting");
            break;
        }
    }
    state.threads -= 1;
    shared.thread_exited.notify_all();
}
