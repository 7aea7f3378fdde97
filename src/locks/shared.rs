//! The public lock handle and its local queue.
//!
//! Requests made on one [`SharedLock`] are served one at a time, in
//! submission order, by a single drain task. Only the request at the head of
//! the queue takes part in the cross-process protocol, so callers within one
//! process never compete with each other through storage.

use super::guard::TicketGuard;
use super::keys::LockKeys;
use super::protocol;
use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::storage::Storage;
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;


/// Callback receiving acquisition failures of [`SharedLock::with_lock`].
pub type ErrorCallback = Box<dyn FnOnce(LockError) + Send + 'static>;

type CriticalSection = Box<dyn FnOnce() + Send + 'static>;

/// A lock shared between every process that can reach the same storage.
///
/// Cloning the handle shares the local queue.
///
/// # Example
///
/// ```no_run
/// use bakery_lock::{LockConfig, MemoryStorage, SharedLock};
/// use std::sync::Arc;
///
/// # async fn demo() -> bakery_lock::Result<()> {
/// let storage = Arc::new(MemoryStorage::new());
/// let lock = SharedLock::new("jobs", storage, LockConfig::with_timeout_ms(1000))?;
///
/// lock.with_lock(|| println!("exclusive"), None, None);
///
/// let total = lock.run(Some("worker-1"), || 40 + 2).await?;
/// assert_eq!(total, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SharedLock {
    inner: Arc<Inner>,
}

struct Inner {
    keys: LockKeys,
    storage: Arc<dyn Storage>,
    config: LockConfig,
    queue: Mutex<LocalQueue>,
}

#[derive(Default)]
struct LocalQueue {
    pending: VecDeque<Request>,
    /// Whether a drain task is currently serving the queue.
    draining: bool,
}

struct Request {
    identity: String,
    enqueued_at: Instant,
    action: Action,
}

enum Action {
    /// Run a critical section while holding the lock.
    Run {
        critical_section: CriticalSection,
        on_error: Option<ErrorCallback>,
    },
    /// Hand a guard to an async caller and wait for it to be dropped.
    Hold {
        reply: oneshot::Sender<Result<SharedLockGuard>>,
    },
}

/// A held lock obtained from [`SharedLock::lock`].
///
/// Dropping the guard releases the lock and lets the next queued request on
/// the same [`SharedLock`] proceed.
#[derive(Debug)]
pub struct SharedLockGuard {
    // Field order matters: the ticket is released before the queue resumes.
    ticket: TicketGuard,
    _done: oneshot::Sender<()>,
}

impl SharedLockGuard {
    /// The identity holding the lock.
    pub fn identity(&self) -> &str {
        self.ticket.identity()
    }

    /// Release the lock, reporting storage errors instead of logging them.
    pub fn release(self) -> Result<()> {
        let SharedLockGuard { ticket, _done } = self;
        ticket.release()
    }
}

impl SharedLock {
    /// Create a lock on `key` backed by `storage`.
    ///
    /// # Returns
    ///
    /// * `Err(LockError::UserError)` - Empty key or invalid config
    pub fn new(
        key: impl Into<String>,
        storage: Arc<dyn Storage>,
        config: LockConfig,
    ) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(LockError::UserError("lock key must not be empty".to_string()));
        }
        config.validate()?;

        Ok(Self {
            inner: Arc::new(Inner {
                keys: LockKeys::new(&key),
                storage,
                config,
                queue: Mutex::new(LocalQueue::default()),
            }),
        })
    }

    /// The lock key.
    pub fn key(&self) -> &str {
        self.inner.keys.lock()
    }

    /// The lock configuration.
    pub fn config(&self) -> &LockConfig {
        &self.inner.config
    }

    /// The storage the lock coordinates through.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    /// Number of requests waiting behind the one currently being served.
    pub fn pending(&self) -> usize {
        self.inner.queue().pending.len()
    }

    /// Run `critical_section` while holding the lock.
    ///
    /// Returns immediately. The critical section runs on the Tokio runtime
    /// once every earlier request on this handle has finished and the
    /// cross-process lock is held; the lock is released when it returns or
    /// panics.
    ///
    /// `identity` defaults to a fresh UUID. If storage verification fails,
    /// `on_error` is called instead of the critical section; without a
    /// callback the failure is logged.
    ///
    /// Requests are served on the current Tokio runtime. Outside one, or if
    /// that runtime shuts down first, `on_error` receives
    /// [`LockError::NoRuntime`] or [`LockError::Abandoned`].
    pub fn with_lock<F>(
        &self,
        critical_section: F,
        identity: Option<&str>,
        on_error: Option<ErrorCallback>,
    ) where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(
            identity,
            Action::Run {
                critical_section: Box::new(critical_section),
                on_error,
            },
        );
    }

    /// Wait for the lock and return a guard holding it.
    ///
    /// The request joins the local queue when the future is first polled.
    /// If the future is dropped before it resolves, a lock acquired on its
    /// behalf is released right away.
    pub async fn lock(&self, identity: Option<&str>) -> Result<SharedLockGuard> {
        let (reply, response) = oneshot::channel();
        self.enqueue(identity, Action::Hold { reply });
        response.await.map_err(|_| LockError::Abandoned)?
    }

    /// Run `f` while holding the lock and return its value.
    pub async fn run<T, F>(&self, identity: Option<&str>, f: F) -> Result<T>
    where
        F: FnOnce() -> T,
    {
        let guard = self.lock(identity).await?;
        let value = f();
        drop(guard);
        Ok(value)
    }

    fn enqueue(&self, identity: Option<&str>, action: Action) {
        let request = Request {
            identity: identity
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            enqueued_at: Instant::now(),
            action,
        };

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                request.reject(self.key(), LockError::NoRuntime(e.to_string()));
                return;
            }
        };

        let start_drain = {
            let mut queue = self.inner.queue();
            queue.pending.push_back(request);
            !std::mem::replace(&mut queue.draining, true)
        };

        if start_drain {
            runtime.spawn(Drainer::new(self.inner.clone()).run());
        }
    }
}

impl std::fmt::Debug for SharedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedLock")
            .field("key", &self.key())
            .field("config", &self.inner.config)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Serves queued requests until the queue is empty.
///
/// If the task is dropped early (its runtime shut down), the queue is reset
/// so a later request starts a new drain, and every request still waiting
/// is answered with [`LockError::Abandoned`].
struct Drainer {
    inner: Arc<Inner>,
    finished: bool,
}

impl Drainer {
    fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            finished: false,
        }
    }

    async fn run(mut self) {
        loop {
            let request = {
                let mut queue = self.inner.queue();
                match queue.pending.pop_front() {
                    Some(request) => request,
                    None => {
                        queue.draining = false;
                        self.finished = true;
                        return;
                    }
                }
            };

            let identity = request.identity.clone();
            let in_flight = InFlight {
                lock: self.inner.keys.lock().to_string(),
                request: Some(request),
            };
            if let Err(panic) = AssertUnwindSafe(self.inner.serve(in_flight))
                .catch_unwind()
                .await
            {
                error!(
                    lock = self.inner.keys.lock(),
                    identity = %identity,
                    panic = panic_message(panic.as_ref()),
                    "critical section panicked; lock released"
                );
            }
        }
    }
}

impl Drop for Drainer {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let orphaned: Vec<Request> = {
            let mut queue = self.inner.queue();
            queue.draining = false;
            queue.pending.drain(..).collect()
        };

        let lock = self.inner.keys.lock();
        if !orphaned.is_empty() {
            warn!(
                lock,
                abandoned = orphaned.len(),
                "lock queue stopped before serving every request"
            );
        }
        for request in orphaned {
            request.reject(lock, LockError::Abandoned);
        }
    }
}

/// The request being served. Dropped unserved, it is reported as abandoned.
struct InFlight {
    lock: String,
    request: Option<Request>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            request.reject(&self.lock, LockError::Abandoned);
        }
    }
}

impl Request {
    /// Answer the request with `err` without serving it.
    fn reject(self, lock: &str, err: LockError) {
        match self.action {
            Action::Run { on_error, .. } => report(lock, &self.identity, err, on_error),
            Action::Hold { reply } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

impl Inner {
    fn queue(&self) -> MutexGuard<'_, LocalQueue> {
        self.queue
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    async fn serve(&self, mut in_flight: InFlight) {
        let identity = match in_flight.request.as_ref() {
            Some(request) => {
                debug!(
                    lock = self.keys.lock(),
                    identity = %request.identity,
                    queued_ms = request.enqueued_at.elapsed().as_millis() as u64,
                    "acquiring"
                );
                request.identity.clone()
            }
            None => return,
        };

        let acquired =
            protocol::acquire(self.storage.clone(), &self.keys, &identity, &self.config).await;

        let Some(request) = in_flight.request.take() else {
            return;
        };

        match request.action {
            Action::Run {
                critical_section,
                on_error,
            } => match acquired {
                Ok(ticket) => {
                    critical_section();
                    drop(ticket);
                }
                Err(err) => report(self.keys.lock(), &identity, err, on_error),
            },
            Action::Hold { reply } => match acquired {
                Ok(ticket) => {
                    let (done, released) = oneshot::channel();
                    let guard = SharedLockGuard {
                        ticket,
                        _done: done,
                    };
                    // A closed reply hands the guard back, and dropping it releases.
                    if reply.send(Ok(guard)).is_ok() {
                        let _ = released.await;
                    }
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
        }
    }
}

fn report(lock: &str, identity: &str, err: LockError, on_error: Option<ErrorCallback>) {
    match on_error {
        Some(callback) => callback(err),
        None => error!(
            lock,
            identity,
            error = %err,
            "failed to acquire lock; critical section skipped"
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
