//! Per-entity cursor walking the animation state machine.

use crate::blend_queue::clip_timing;
use crate::clip_store::ClipStore;
use crate::state_machine::StateMachine;

/// Monotonic stopwatch measuring elapsed seconds since the last restart.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    elapsed: f32,
    running: bool,
}

impl Default for Timer {
    fn default() -> Self {
        Self { elapsed: 0.0, running: true }
    }
}

impl Timer {
    pub fn restart(&mut self) {
        self.elapsed = 0.0;
        self.running = true;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn resume(&mut self) {
        self.running = true;
    }

    pub fn advance(&mut self, dt: f32) {
        if self.running {
            self.elapsed += dt;
        }
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn set_elapsed(&mut self, elapsed: f32) {
        self.elapsed = elapsed;
    }
}

/// Which kind of state a motion currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateId {
    None,
    Animation(u32),
    Transition(u32),
}

/// Runtime status of a motion. A plain struct rather than a bitset — the set
/// of flags is small and fixed, so named bools read more plainly than masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags {
    pub playing: bool,
}

/// Caller-configured behavior for a motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BehaviorFlags {
    pub auto_play: bool,
    pub destroy_on_done: bool,
}

/// An action waiting to be applied to a motion by the controller's action queue.
#[derive(Debug, Clone, Copy)]
pub enum MotionAction {
    Move(u32),
    AutoMove,
    Destroy,
}

/// Runtime cursor into the ASM for one entity.
pub struct Motion {
    pub name: String,
    pub current_state: StateId,
    pub timer: Timer,
    pub status_flags: StatusFlags,
    pub behavior_flags: BehaviorFlags,
    /// Set by `Controller::advance` when a queued `Destroy` action has been applied.
    pub marked_for_destroy: bool,
}

impl Motion {
    pub fn new(name: impl Into<String>, behavior_flags: BehaviorFlags) -> Self {
        Self {
            name: name.into(),
            current_state: StateId::None,
            timer: Timer::default(),
            status_flags: StatusFlags { playing: true },
            behavior_flags,
            marked_for_destroy: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status_flags.playing
    }

    pub fn pause(&mut self) {
        self.status_flags.playing = false;
        self.timer.pause();
    }

    pub fn play(&mut self) {
        self.status_flags.playing = true;
        self.timer.resume();
    }

    /// True once the current state has run its course: for a transition,
    /// once its total fade time has elapsed; for an animation state, once
    /// every one of its clips reports done (see [`clip_timing`]). A clip
    /// that hasn't resolved yet contributes nothing to the blend, so it
    /// can't block the state from completing either.
    pub fn is_done(&self, sm: &StateMachine, clip_store: &ClipStore) -> bool {
        match self.current_state {
            // Nothing is playing yet, so nothing has finished playing either —
            // a fresh motion must not be auto-moved out of a state it hasn't
            // entered.
            StateId::None => false,
            StateId::Transition(t) => sm
                .transition(t)
                .map(|t| self.timer.elapsed() >= t.settings.total_time())
                .unwrap_or(true),
            StateId::Animation(s) => {
                let Some(state) = sm.state(s) else { return true };
                state.clips.iter().all(|clip_ref| {
                    clip_store
                        .get(&clip_ref.clip_name)
                        .map(|clip| clip_timing(clip, clip_ref.settings, state.playback, self.timer.elapsed()).1)
                        .unwrap_or(true)
                })
            }
        }
    }

    /// Returns the elapsed phase to carry into the next state. Only a
    /// transition hands anything forward; leaving an animation state starts
    /// the next state's timer from zero.
    fn on_exit(&self) -> Option<f32> {
        match self.current_state {
            StateId::Transition(_) => Some(self.timer.elapsed()),
            _ => None,
        }
    }

    /// Apply the state-machine's move rules, transitioning `current_state` toward `target`.
    pub fn move_to(&mut self, target: u32, sm: &StateMachine) {
        match self.current_state {
            StateId::None => {
                self.current_state = StateId::Animation(target);
                self.timer.restart();
            }
            StateId::Animation(current) => {
                if current == target {
                    return;
                }
                let next = match sm.connects_to(current, target) {
                    Some(conn) => {
                        let t_idx = sm.connection(conn).and_then(|c| {
                            (c.transition_index >= 0).then_some(c.transition_index as u32)
                        });
                        match t_idx {
                            Some(t) => StateId::Transition(t),
                            None => StateId::Animation(target),
                        }
                    }
                    None => {
                        println!(
                            "motion '{}': no connection from state {} to {} — moving anyway",
                            self.name, current, target
                        );
                        StateId::Animation(target)
                    }
                };
                let carried = self.on_exit();
                self.current_state = next;
                self.timer.restart();
                if let Some(elapsed) = carried {
                    self.timer.set_elapsed(elapsed);
                }
            }
            StateId::Transition(t) => {
                let Some(transition) = sm.transition(t) else {
                    self.current_state = StateId::Animation(target);
                    self.timer.restart();
                    return;
                };
                let (start, end) = (transition.start_state_index as u32, transition.end_state_index as u32);
                if target == start {
                    // Reversal: requires a connection back from end to start.
                    match sm.connects_to(end, start) {
                        Some(conn) => {
                            let reverse_t = sm.connection(conn).and_then(|c| {
                                (c.transition_index >= 0).then_some(c.transition_index as u32)
                            });
                            // Carry the elapsed phase forward so the reverse
                            // transition picks up where this one left off,
                            // instead of popping back to a zero-weight start.
                            let carried = self.on_exit();
                            self.current_state = match reverse_t {
                                Some(rt) => StateId::Transition(rt),
                                None => StateId::Animation(start),
                            };
                            self.timer.restart();
                            if let Some(elapsed) = carried {
                                self.timer.set_elapsed(elapsed);
                            }
                        }
                        None => {
                            // No reverse path — drop the move, stay in the transition.
                        }
                    }
                } else {
                    // Moving anywhere else: the transition is considered complete.
                    self.current_state = StateId::Animation(target);
                    self.timer.restart();
                }
            }
        }
    }

    /// Automatically advance out of the current state along its canonical exit.
    pub fn auto_move(&mut self, sm: &StateMachine) {
        match self.current_state {
            StateId::Animation(s) => {
                if let Some(conn) = sm.first_outgoing(s) {
                    if let Some(conn) = sm.connection(conn) {
                        let target = conn.end_state_index as u32;
                        self.move_to(target, sm);
                    }
                }
            }
            StateId::Transition(t) => {
                if let Some(transition) = sm.transition(t) {
                    let end = transition.end_state_index as u32;
                    self.move_to(end, sm);
                }
            }
            StateId::None => {}
        }
    }
}
