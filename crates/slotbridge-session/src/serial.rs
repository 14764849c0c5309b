//! Single-outstanding-call discipline.
//!
//! The simplest upstream client keeps at most one call in flight: while a
//! response is awaited, further calls are rejected immediately with
//! [`SessionError::Busy`] instead of being queued. Callers wanting
//! concurrency use [`SessionHandle`] directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::error::SessionError;
use crate::message::Params;
use crate::session::SessionHandle;

/// Session wrapper enforcing one outstanding call at a time.
#[derive(Clone)]
pub struct SerialSession {
    inner: SessionHandle,
    busy: Arc<AtomicBool>,
}

impl SerialSession {
    pub fn new(inner: SessionHandle) -> Self {
        Self {
            inner,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Issue a call, or fail with [`SessionError::Busy`] if one is already
    /// awaiting its response.
    pub async fn call(&self, method: &str, params: Params) -> Result<Value, SessionError> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(SessionError::Busy);
        }
        // released on every exit path, including cancellation
        let _guard = BusyGuard(&self.busy);
        self.inner.call(method, params).await
    }

    /// Notifications carry no response and are never serialized.
    pub async fn notify(&self, name: &str, params: Params) -> Result<(), SessionError> {
        self.inner.notify(name, params).await
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.inner
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
