//! The process-wide write lock over mutating repository operations.
//!
//! Exactly one instance exists per engine. Acquisition is a single
//! compare-and-swap that never blocks and never queues; contention is
//! surfaced to the caller immediately so the UI can tell the user instead of
//! silently dropping the request. Read-only fetches never touch this lock:
//! status and diff views stay responsive during a long push.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Returned when a mutating operation is requested while another holds the
/// lock. Synchronous and immediate.
#[derive(Debug, thiserror::Error)]
#[error("Repository is busy: {holder}")]
pub struct LockBusy {
    /// Description of the operation currently holding the lock.
    pub holder: String,
}

#[derive(Debug)]
pub struct WriteLock {
    locked: AtomicBool,
    holder: Mutex<Option<String>>,
}

impl WriteLock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            locked: AtomicBool::new(false),
            holder: Mutex::new(None),
        })
    }

    /// Try to acquire the lock for the described operation.
    ///
    /// On contention returns [`LockBusy`] without blocking. On success the
    /// returned [`WriteGuard`] releases on drop, so every exit path of an
    /// operation (completion, cancellation, spawn failure, panic) releases
    /// exactly once.
    pub fn try_acquire(self: &Arc<Self>, description: &str) -> Result<WriteGuard, LockBusy> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            if let Ok(mut holder) = self.holder.lock() {
                *holder = Some(description.to_string());
            }
            Ok(WriteGuard {
                lock: Arc::clone(self),
            })
        } else {
            Err(LockBusy {
                holder: self
                    .busy()
                    .unwrap_or_else(|| "another operation".to_string()),
            })
        }
    }

    /// Description of the current holder, or `None` when the lock is free.
    /// The UI uses this to pre-emptively disable mutating actions.
    pub fn busy(&self) -> Option<String> {
        if !self.locked.load(Ordering::Acquire) {
            return None;
        }
        match self.holder.lock() {
            Ok(holder) => holder.clone().or_else(|| Some("another operation".to_string())),
            Err(_) => Some("another operation".to_string()),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

/// Held for the lifetime of one mutating operation.
#[derive(Debug)]
pub struct WriteGuard {
    lock: Arc<WriteLock>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if let Ok(mut holder) = self.lock.holder.lock() {
            *holder = None;
        }
        self.lock.locked.store(false, Ordering::Release);
    }
}
