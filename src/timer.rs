//! Cancellable single-slot delay.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Holds at most one pending delayed action. Scheduling a new action aborts
/// the previous one; dropping the slot aborts whatever is pending.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Default)]
pub struct DelaySlot {
    handle: Option<JoinHandle<()>>,
}

impl DelaySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay` unless cancelled or replaced first.
    pub fn schedule<F, Fut>(&mut self, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action().await;
        }));
    }

    /// Abort the pending action. Returns true if one was still waiting.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DelaySlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
