//! # Per-handler suspend/resume coordination.
//!
//! [`HandlerSync`] is the small synchronization object shared between the
//! event dispatch task and one running handler. It carries three bits:
//!
//! - **suspend-requested**: set by the dispatcher when a higher-priority
//!   event needs the handler out of the way,
//! - **suspended**: acknowledged by the handler at its next cooperative
//!   [`checkpoint`](HandlerSync::checkpoint),
//! - **syscall-origin**: marks that a runtime-affecting call (a `quit`) was
//!   initiated from inside this handler, so shutdown must not wait on it.
//!
//! Acknowledgement and resumption are signalled with [`tokio::sync::Notify`]
//! so neither side busy-waits. Once suspend-requested is set, the handler
//! eventually sets suspended or completes; the dispatcher never advances
//! past a preemption without observing one of the two. Resume clears both
//! suspend bits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time;

/// Suspend/resume coordination between the dispatcher and one handler.
pub struct HandlerSync {
    suspend_requested: AtomicBool,
    suspended: AtomicBool,
    syscall_origin: AtomicBool,
    /// Signalled by the handler when it parks in `checkpoint`.
    ack: Notify,
    /// Signalled by the dispatcher to wake a parked handler.
    resume: Notify,
}

impl HandlerSync {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            suspend_requested: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            syscall_origin: AtomicBool::new(false),
            ack: Notify::new(),
            resume: Notify::new(),
        })
    }

    /// Cooperative suspension point for handler bodies.
    ///
    /// Returns immediately when no suspension is requested. Otherwise parks
    /// until the dispatcher resumes this handler. Handlers must call this
    /// often enough that preemption latency meets their product's
    /// requirements; the runtime never interrupts a handler forcibly.
    pub async fn checkpoint(&self) {
        if !self.suspend_requested.load(Ordering::Acquire) {
            return;
        }
        self.suspended.store(true, Ordering::Release);
        self.ack.notify_one();
        while self.suspend_requested.load(Ordering::Acquire) {
            self.resume.notified().await;
        }
    }

    /// Returns true while the handler is parked in [`checkpoint`](Self::checkpoint).
    pub fn suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Asks the handler to park at its next checkpoint.
    pub(crate) fn request_suspend(&self) {
        self.suspend_requested.store(true, Ordering::Release);
    }

    /// Waits up to `window` for the handler to acknowledge suspension.
    ///
    /// Returns early on acknowledgement; the caller re-checks the bits.
    pub(crate) async fn acknowledged_within(&self, window: Duration) -> bool {
        time::timeout(window, self.ack.notified()).await.is_ok()
    }

    /// Clears both suspend bits and wakes the parked handler.
    pub(crate) fn resume(&self) {
        self.suspended.store(false, Ordering::Release);
        self.suspend_requested.store(false, Ordering::Release);
        self.resume.notify_one();
    }

    /// Marks that the current runtime-affecting call originated from inside
    /// this handler.
    pub(crate) fn mark_syscall_origin(&self) {
        self.syscall_origin.store(true, Ordering::Release);
    }

    pub(crate) fn syscall_origin(&self) -> bool {
        self.syscall_origin.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checkpoint_is_transparent_without_request() {
        let sync = HandlerSync::new();
        sync.checkpoint().await;
        assert!(!sync.suspended());
    }

    #[tokio::test]
    async fn suspend_ack_resume_round_trip() {
        let sync = HandlerSync::new();
        sync.request_suspend();

        let parked = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move {
                sync.checkpoint().await;
            })
        };

        while !sync.suspended() {
            tokio::task::yield_now().await;
        }
        sync.resume();
        parked.await.unwrap();
        assert!(!sync.suspended());
    }

    #[tokio::test]
    async fn origin_bit_is_sticky() {
        let sync = HandlerSync::new();
        assert!(!sync.syscall_origin());
        sync.mark_syscall_origin();
        assert!(sync.syscall_origin());
    }
}
