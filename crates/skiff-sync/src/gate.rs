//! Per-category single-flight gates.
//!
//! Each refresh category owns one gate guaranteeing at most one in-flight
//! fetch. Losing the race is a deliberate drop, not a queued retry: the
//! periodic timers and the watcher bound staleness, and a fetch that starts
//! later always observes newer state anyway.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::events::UpdateEvent;

/// The three independently refreshed state domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshCategory {
    Branches,
    Files,
    Stashes,
}

impl RefreshCategory {
    pub const ALL: [RefreshCategory; 3] = [
        RefreshCategory::Branches,
        RefreshCategory::Files,
        RefreshCategory::Stashes,
    ];

    pub fn update_event(self) -> UpdateEvent {
        match self {
            RefreshCategory::Branches => UpdateEvent::BranchesUpdated,
            RefreshCategory::Files => UpdateEvent::FilesUpdated,
            RefreshCategory::Stashes => UpdateEvent::StashesUpdated,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RefreshCategory::Branches => "branches",
            RefreshCategory::Files => "files",
            RefreshCategory::Stashes => "stashes",
        }
    }
}

/// Compare-and-swap gate: at most one running fetch per category.
pub struct CategoryGate {
    category: RefreshCategory,
    running: AtomicBool,
}

impl CategoryGate {
    pub fn new(category: RefreshCategory) -> Arc<Self> {
        Arc::new(Self {
            category,
            running: AtomicBool::new(false),
        })
    }

    /// Try to claim the gate. `None` means a fetch is already in flight and
    /// the caller must drop the request without starting work or queueing.
    pub fn try_begin(self: &Arc<Self>) -> Option<GateGuard> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(GateGuard {
                gate: Arc::clone(self),
            })
        } else {
            debug!(
                event = "sync.gate.fetch_dropped",
                category = self.category.as_str()
            );
            None
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn category(&self) -> RefreshCategory {
        self.category
    }
}

/// Claim on a gate. Dropping releases the gate, so a panicking fetch worker
/// still resets the flag.
pub struct GateGuard {
    gate: Arc<CategoryGate>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::Release);
    }
}

/// One gate per category, created once at engine construction.
pub struct GateSet {
    branches: Arc<CategoryGate>,
    files: Arc<CategoryGate>,
    stashes: Arc<CategoryGate>,
}

impl GateSet {
    pub fn new() -> Self {
        Self {
            branches: CategoryGate::new(RefreshCategory::Branches),
            files: CategoryGate::new(RefreshCategory::Files),
            stashes: CategoryGate::new(RefreshCategory::Stashes),
        }
    }

    pub fn gate(&self, category: RefreshCategory) -> &Arc<CategoryGate> {
        match category {
            RefreshCategory::Branches => &self.branches,
            RefreshCategory::Files => &self.files,
            RefreshCategory::Stashes => &self.stashes,
        }
    }
}

impl Default for GateSet {
    fn default() -> Self {
        Self::new()
    }
}
