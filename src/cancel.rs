//! Cooperative cancellation for transfers.
//!
//! A [`CancellationToken`] is checked at chunk boundaries; it never
//! interrupts a request that is already in flight. Listeners registered on
//! the token run once when cancellation is requested.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio_util::sync::{CancellationToken as Signal, WaitForCancellationFuture};

use crate::error::{MegaError, Result};

type Action = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct State {
    closed: bool,
    next_id: u64,
    listeners: Vec<(u64, Action)>,
}

struct Inner {
    signal: Signal,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn closed_error() -> MegaError {
    MegaError::InvalidState("Object already closed".to_string())
}

/// Shared cancellation flag with listener callbacks.
///
/// Clones share the same state.
///
/// # Example
/// ```
/// use megafs::CancellationToken;
///
/// # fn example() -> megafs::Result<()> {
/// let token = CancellationToken::new();
/// token.cancel()?;
/// assert!(token.is_cancellation_requested()?);
/// assert!(token.throw_if_cancellation_requested().unwrap_err().is_cancelled());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.inner.signal.is_cancelled())
            .field("closed", &self.inner.lock().closed)
            .finish()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                signal: Signal::new(),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Request cancellation and run every registered listener.
    ///
    /// Listeners run on the calling thread, outside the token's lock. A
    /// second call is a no-op.
    pub fn cancel(&self) -> Result<()> {
        let listeners = {
            let mut st = self.inner.lock();
            if st.closed {
                return Err(closed_error());
            }
            if self.inner.signal.is_cancelled() {
                return Ok(());
            }
            self.inner.signal.cancel();
            std::mem::take(&mut st.listeners)
        };

        for (_, action) in listeners {
            action();
        }
        Ok(())
    }

    pub fn is_cancellation_requested(&self) -> Result<bool> {
        if self.inner.lock().closed {
            return Err(closed_error());
        }
        Ok(self.inner.signal.is_cancelled())
    }

    /// Fail with [`MegaError::Cancelled`] if cancellation was requested.
    pub fn throw_if_cancellation_requested(&self) -> Result<()> {
        if self.is_cancellation_requested()? {
            return Err(MegaError::Cancelled);
        }
        Ok(())
    }

    /// Register `action` to run on cancellation.
    ///
    /// If cancellation was already requested the action runs immediately.
    pub fn register<F>(&self, action: F) -> Result<CancellationListener>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut st = self.inner.lock();
        if st.closed {
            return Err(closed_error());
        }

        let id = st.next_id;
        st.next_id += 1;

        if self.inner.signal.is_cancelled() {
            drop(st);
            action();
        } else {
            st.listeners.push((id, Box::new(action)));
        }

        Ok(CancellationListener {
            id,
            token: Arc::downgrade(&self.inner),
        })
    }

    /// Detach all listeners without running them and mark the token closed.
    ///
    /// Pending listeners are dropped, not fired; call [`cancel`](Self::cancel)
    /// first if they should run. Every later call except `close` and
    /// `cancelled` fails.
    pub fn close(&self) {
        let mut st = self.inner.lock();
        if !st.closed {
            st.listeners.clear();
            st.closed = true;
        }
    }

    /// Future that resolves once cancellation is requested, for use in
    /// `tokio::select!`.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.signal.cancelled()
    }

    fn unregister(inner: &Inner, id: u64) {
        inner.lock().listeners.retain(|(lid, _)| *lid != id);
    }
}

/// Handle to a registered listener.
#[derive(Debug)]
pub struct CancellationListener {
    id: u64,
    token: Weak<Inner>,
}

impl CancellationListener {
    /// Remove the listener; it will not run.
    pub fn unregister(self) {
        if let Some(inner) = self.token.upgrade() {
            CancellationToken::unregister(&inner, self.id);
        }
    }
}
