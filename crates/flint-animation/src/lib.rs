//! Flint Animation — skeletal animation runtime
//!
//! Drives a rigged character through an animation state graph, blends
//! currently active clips, and publishes a per-bone world-space matrix
//! palette for the renderer's skinning shader. See each module for its
//! piece of the pipeline:
//!
//! - [`clip`] / [`clip_store`] / [`sampler`] — immutable clip data and keyframe sampling
//! - [`skeleton`] — immutable joint hierarchy shared by every controller using it
//! - [`state_machine`] — slab-indexed states, transitions, connections
//! - [`motion`] — per-entity cursor walking the state machine
//! - [`action_queue`] — the pending/working action buffer a controller drains each tick
//! - [`blend_queue`] — active-clip gathering, weight resolution, sampling, hierarchy composition
//! - [`controller`] — aggregates one entity's motions, queues, and published palette
//! - [`worker`] — one thread per controller, driving it at a fixed step
//! - [`persist`] — TOML load/save for state machines and controller documents

pub mod action_queue;
pub mod blend_queue;
pub mod clip;
pub mod clip_store;
pub mod controller;
pub mod motion;
pub mod persist;
pub mod sampler;
pub mod skeleton;
pub mod state_machine;
pub mod worker;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use flint_runtime::GameClock;

pub use clip::{Clip, ClipSettings, Keyframe, NodeTrack, PlaybackMode};
pub use clip_store::ClipStore;
pub use controller::Controller;
pub use motion::{BehaviorFlags, Motion, MotionAction, StateId, StatusFlags, Timer};
pub use skeleton::{Bone, Joint, Skeleton};
pub use state_machine::{
    AnimationState, ClipRef, Connection, StateMachine, TransitionKind, TransitionSettings, TransitionState,
};
pub use worker::{AlwaysVisible, AnimationWorker, VisibilityOracle};

/// Top-level aggregate owning every named `Controller` this process is
/// animating, the `AnimationWorker` driving each one, and the clip store
/// they share. A thin registry, not a runtime system in its own right —
/// callers tick nothing here directly, the workers tick themselves.
pub struct AnimationSystem {
    clip_store: Arc<RwLock<ClipStore>>,
    controllers: HashMap<String, Arc<Mutex<Controller>>>,
    workers: HashMap<String, AnimationWorker>,
}

impl AnimationSystem {
    pub fn new(clip_store: Arc<RwLock<ClipStore>>) -> Self {
        Self { clip_store, controllers: HashMap::new(), workers: HashMap::new() }
    }

    pub fn clip_store(&self) -> Arc<RwLock<ClipStore>> {
        Arc::clone(&self.clip_store)
    }

    /// Register a controller under `name` and start its worker thread.
    /// Replaces (stopping first) any controller already registered under
    /// that name.
    pub fn spawn_controller(
        &mut self,
        name: impl Into<String>,
        skeleton: Arc<Skeleton>,
        state_machine: Arc<StateMachine>,
        visibility: Arc<dyn VisibilityOracle>,
        clock: GameClock,
    ) -> Arc<Mutex<Controller>> {
        let name = name.into();
        self.despawn_controller(&name);

        let controller = Arc::new(Mutex::new(Controller::new(skeleton, state_machine, Arc::clone(&self.clip_store))));
        let worker = AnimationWorker::spawn(name.clone(), Arc::downgrade(&controller), visibility, clock);
        self.controllers.insert(name.clone(), Arc::clone(&controller));
        self.workers.insert(name, worker);
        controller
    }

    pub fn controller(&self, name: &str) -> Option<Arc<Mutex<Controller>>> {
        self.controllers.get(name).cloned()
    }

    /// Stops and joins a controller's worker, then drops the system's own
    /// strong reference to the controller. If another `Arc` to it survives
    /// elsewhere, the controller keeps existing untended; once the last
    /// strong reference drops, the (already-stopped) worker no longer
    /// matters since it already exited.
    pub fn despawn_controller(&mut self, name: &str) {
        if let Some(worker) = self.workers.remove(name) {
            worker.stop();
        }
        self.controllers.remove(name);
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    /// Logs the startup roster, matching the lifecycle logging every other
    /// Flint runtime system emits on initialize.
    pub fn initialize(&self) {
        let clip_count = self.clip_store.read().expect("clip store lock poisoned").clip_count();
        println!(
            "animation system initialized ({} controllers, {} clips loaded)",
            self.controllers.len(),
            clip_count
        );
    }

    /// Stops every worker and drops every controller.
    pub fn shutdown(&mut self) {
        let names: Vec<String> = self.workers.keys().cloned().collect();
        for name in names {
            self.despawn_controller(&name);
        }
        println!("animation system shut down");
    }
}
