//! Per-controller MPSC action queue with a pending/working double buffer.
//!
//! Any thread may enqueue an action; only the owning controller drains it,
//! once per tick, by swapping `pending` into `working` under the lock. Actions
//! applied while draining `working` are never re-enqueued into the same
//! `working` buffer, so an action queued during application lands in the
//! *next* tick's `pending`.

use std::sync::Mutex;

use crate::motion::MotionAction;

/// One queued action addressed to a specific motion, identified by index into
/// the controller's motion list.
#[derive(Debug, Clone, Copy)]
pub struct QueuedAction {
    pub motion_index: usize,
    pub action: MotionAction,
}

#[derive(Default)]
struct Inner {
    pending: Vec<QueuedAction>,
}

pub struct ActionQueue {
    inner: Mutex<Inner>,
    working: Vec<QueuedAction>,
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            working: Vec::new(),
        }
    }

    /// Enqueue an action. Safe to call from any thread.
    pub fn push(&self, motion_index: usize, action: MotionAction) {
        self.inner
            .lock()
            .expect("action queue mutex poisoned")
            .pending
            .push(QueuedAction { motion_index, action });
    }

    /// Swap `pending` into `working`, clearing `pending`, then return the
    /// drained actions for the caller to apply in order.
    pub fn drain(&mut self) -> Vec<QueuedAction> {
        {
            let mut inner = self.inner.lock().expect("action queue mutex poisoned");
            std::mem::swap(&mut self.working, &mut inner.pending);
            inner.pending.clear();
        }
        std::mem::take(&mut self.working)
    }
}
