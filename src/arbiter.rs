//! Mutual exclusion over the shared controller session.
//!
//! Every transaction runs inside [`TransactionArbiter::run_exclusive`],
//! the only path to the session. Holding the lock across the whole
//! addressing + payload [+ read] sequence is what keeps one caller's lines
//! contiguous on the wire. Waiters queue in arrival order (tokio's mutex
//! is FIFO) and give up with [`GpibError::Busy`] once the configured wait
//! bound expires, rather than blocking indefinitely behind a stuck
//! transaction.

use crate::error::{GpibError, GpibResult};
use crate::session::ControllerSession;
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Serializes transactions against one controller session.
#[derive(Debug)]
pub struct TransactionArbiter {
    session: Mutex<ControllerSession>,
    lock_wait: Duration,
}

impl TransactionArbiter {
    /// Wrap `session`, bounding lock waits by `lock_wait`.
    pub fn new(session: ControllerSession, lock_wait: Duration) -> Self {
        Self {
            session: Mutex::new(session),
            lock_wait,
        }
    }

    /// Run `f` with exclusive access to the session.
    ///
    /// The lock is released when `f` completes or fails: the guard drops
    /// on every exit path, including timeouts inside `f`. A caller that
    /// cannot acquire the lock within the wait bound fails with
    /// [`GpibError::Busy`].
    pub async fn run_exclusive<T, F>(&self, f: F) -> GpibResult<T>
    where
        F: for<'a> FnOnce(&'a mut ControllerSession) -> BoxFuture<'a, GpibResult<T>>,
    {
        let mut session = timeout(self.lock_wait, self.session.lock())
            .await
            .map_err(|_| GpibError::Busy(self.lock_wait))?;
        f(&mut session).await
    }
}
