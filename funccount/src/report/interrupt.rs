//! Ctrl-C handling for the reporting loop
//!
//! [`InterruptToken`] is a cancellation token with an explicit armed flag.
//! While armed, the first interrupt is recorded and wakes the loop; once
//! disarmed (right before the final report) interrupts are dropped.

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct Inner {
    armed: AtomicBool,
    pending: AtomicBool,
    notify: Notify,
}

/// Shared interrupt flag; clones observe the same state
#[derive(Debug, Clone)]
pub struct InterruptToken {
    inner: Arc<Inner>,
}

impl Default for InterruptToken {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                armed: AtomicBool::new(true),
                pending: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Record an interrupt. Returns `false` if the token was disarmed.
    pub fn interrupt(&self) -> bool {
        if !self.is_armed() {
            debug!("Interrupt ignored while draining");
            return false;
        }
        self.inner.pending.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
        true
    }

    /// Stop accepting interrupts
    pub fn disarm(&self) {
        self.inner.armed.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.inner.armed.load(Ordering::SeqCst)
    }

    /// Whether an interrupt has been recorded
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Resolve once an interrupt has been recorded (immediately if one already was)
    pub async fn interrupted(&self) {
        loop {
            // Registered before the check so a concurrent interrupt is not lost
            let notified = self.inner.notify.notified();
            if self.is_interrupted() {
                return;
            }
            notified.await;
        }
    }

    /// Forward every SIGINT to this token until the runtime shuts down
    #[must_use]
    pub fn listen_for_ctrl_c(&self) -> JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    debug!("Ctrl-C listener stopped: {e}");
                    return;
                }
                token.interrupt();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disarmed_token_ignores_interrupts() {
        let token = InterruptToken::new();
        token.disarm();
        assert!(!token.interrupt());
        assert!(!token.is_interrupted());
    }

    #[tokio::test]
    async fn test_interrupt_before_wait_is_remembered() {
        let token = InterruptToken::new();
        assert!(token.clone().interrupt());
        tokio::time::timeout(std::time::Duration::from_secs(1), token.interrupted())
            .await
            .expect("pending interrupt should resolve immediately");
    }

    #[tokio::test]
    async fn test_interrupt_wakes_waiter() {
        let token = InterruptToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.interrupted().await })
        };
        tokio::task::yield_now().await;
        token.interrupt();
        waiter.await.unwrap();
    }
}
