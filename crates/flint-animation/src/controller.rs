//! Per-entity aggregate: one skeleton reference, many motions, one action
//! queue, one blend queue, and the published bone matrix palette.

use std::sync::{Arc, RwLock};

use glam::Mat4;

use crate::action_queue::{ActionQueue, QueuedAction};
use crate::blend_queue::BlendQueue;
use crate::clip_store::ClipStore;
use crate::motion::{Motion, MotionAction};
use crate::skeleton::Skeleton;
use crate::state_machine::StateMachine;

/// Aggregates everything one animated entity needs to produce a bone palette.
///
/// `skeleton`, `state_machine`, and `clip_store` are shared, read-mostly
/// resources that may be used by many controllers at once; `motions`, the
/// action queue, and the blend queue are exclusively owned by this
/// controller. `palette` is the single cross-thread hand-off: the owning
/// worker writes it, renderers read it, both through the shared `RwLock`.
pub struct Controller {
    pub skeleton: Arc<Skeleton>,
    pub state_machine: Arc<StateMachine>,
    pub clip_store: Arc<RwLock<ClipStore>>,
    /// Slab of motions, slot-indexed like the state machine: a `Destroy`
    /// action frees a slot instead of shifting every later motion's index,
    /// so an index cached by an external caller never silently starts
    /// addressing a different motion after a destroy.
    motions: Vec<Option<Motion>>,
    erased_motions: Vec<usize>,
    action_queue: ActionQueue,
    blend_queue: BlendQueue,
    palette: Arc<RwLock<Vec<Mat4>>>,
}

impl Controller {
    pub fn new(skeleton: Arc<Skeleton>, state_machine: Arc<StateMachine>, clip_store: Arc<RwLock<ClipStore>>) -> Self {
        let mut palette = Vec::new();
        skeleton.identity_pose(&mut palette);
        Self {
            skeleton,
            state_machine,
            clip_store,
            motions: Vec::new(),
            erased_motions: Vec::new(),
            action_queue: ActionQueue::new(),
            blend_queue: BlendQueue::new(),
            palette: Arc::new(RwLock::new(palette)),
        }
    }

    /// Clone of the palette handle, for renderers to hold and read independently.
    pub fn palette_handle(&self) -> Arc<RwLock<Vec<Mat4>>> {
        Arc::clone(&self.palette)
    }

    /// Insert a motion, reusing a slot freed by an earlier `Destroy` if one exists.
    pub fn add_motion(&mut self, motion: Motion) -> usize {
        if let Some(idx) = self.erased_motions.pop() {
            self.motions[idx] = Some(motion);
            idx
        } else {
            self.motions.push(Some(motion));
            self.motions.len() - 1
        }
    }

    pub fn motion(&self, index: usize) -> Option<&Motion> {
        self.motions.get(index).and_then(|m| m.as_ref())
    }

    pub fn motions(&self) -> impl Iterator<Item = &Motion> {
        self.motions.iter().flatten()
    }

    /// Queue an action for a motion by index. Safe to call from any thread.
    pub fn queue_action(&self, motion_index: usize, action: MotionAction) {
        self.action_queue.push(motion_index, action);
    }

    /// Drives one tick of controller logic: implicit auto-move detection,
    /// draining the action queue, advancing motion timers, then refreshing
    /// the blend queue's active clip set and resolved weights. Does not
    /// sample clips or compose the hierarchy — callers (the worker) decide
    /// whether this tick is visible before paying for that cost.
    pub fn advance(&mut self, dt: f32) {
        {
            let store = self.clip_store.read().expect("clip store lock poisoned");
            for (i, motion) in self.motions.iter().enumerate().filter_map(|(i, m)| m.as_ref().map(|m| (i, m))) {
                if !motion.is_done(&self.state_machine, &store) {
                    continue;
                }
                if motion.behavior_flags.destroy_on_done {
                    self.action_queue.push(i, MotionAction::Destroy);
                } else if motion.behavior_flags.auto_play
                    || matches!(motion.current_state, crate::motion::StateId::Transition(_))
                {
                    self.action_queue.push(i, MotionAction::AutoMove);
                }
            }
        }

        let drained: Vec<QueuedAction> = self.action_queue.drain();
        for QueuedAction { motion_index, action } in drained {
            let Some(Some(motion)) = self.motions.get_mut(motion_index) else { continue };
            match action {
                MotionAction::Move(target) => motion.move_to(target, &self.state_machine),
                MotionAction::AutoMove => motion.auto_move(&self.state_machine),
                MotionAction::Destroy => motion.marked_for_destroy = true,
            }
        }

        for motion in self.motions.iter_mut().flatten() {
            if motion.is_playing() {
                motion.timer.advance(dt);
            }
        }

        for idx in 0..self.motions.len() {
            let destroy = matches!(&self.motions[idx], Some(m) if m.marked_for_destroy);
            if destroy {
                self.motions[idx] = None;
                self.erased_motions.push(idx);
            }
        }

        let store = self.clip_store.read().expect("clip store lock poisoned");
        self.blend_queue
            .refresh_active_clips(&self.motions, &self.state_machine, &self.skeleton, &store);
        drop(store);
        self.blend_queue.update_weights();
    }

    /// Samples every active clip, blends jointwise, and composes the
    /// hierarchy into `self.palette` under its write lock.
    pub fn sample_and_publish(&mut self) {
        let store = self.clip_store.read().expect("clip store lock poisoned");
        self.blend_queue.sample_and_blend(&store, &self.skeleton);
        drop(store);

        let mut palette = self.palette.write().expect("palette lock poisoned");
        self.blend_queue.compose_hierarchy(&self.skeleton, &mut palette);
    }
}
