//! Animation state machine — slab-indexed states, transitions, and connections
//! with free-list slot reuse.

use flint_core::{FlintError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clip::{ClipSettings, PlaybackMode};

/// A clip reference bound into an `AnimationState`. May be unresolved until the
/// clip store has loaded the named asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipRef {
    pub clip_name: String,
    pub settings: ClipSettings,
}

/// A non-transition animation state: plays one or more clips.
#[derive(Debug, Clone)]
pub struct AnimationState {
    pub name: String,
    pub uuid: Uuid,
    pub playback: PlaybackMode,
    pub clips: Vec<ClipRef>,
    pub connections: Vec<u32>,
    machine_index: i32,
}

/// How a transition blends its two endpoint states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    Smooth,
    /// Holds the start state's pose frozen at its entry-time snapshot while the
    /// end state fades in, instead of continuing to resample the start state.
    FirstFrozen,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransitionSettings {
    pub kind: TransitionKind,
    pub fade_in_sec: f32,
    pub fade_out_sec: f32,
    pub fade_in_weight: f32,
    pub fade_out_weight: f32,
}

impl TransitionSettings {
    pub fn total_time(&self) -> f32 {
        self.fade_in_sec.max(self.fade_out_sec)
    }
}

/// A state that interpolates between two `AnimationState`s over a fixed duration.
#[derive(Debug, Clone)]
pub struct TransitionState {
    pub name: String,
    pub uuid: Uuid,
    pub settings: TransitionSettings,
    pub connection_index: u32,
    pub start_state_index: i32,
    pub end_state_index: i32,
    machine_index: i32,
}

/// A directed edge between two non-transition states, optionally carrying a transition.
#[derive(Debug, Clone, Copy)]
pub struct Connection {
    pub start_state_index: i32,
    pub end_state_index: i32,
    pub transition_index: i32,
    machine_index: i32,
}

/// The graph of states, transitions, and connections for one skeleton/controller kind.
///
/// States, transitions, and connections live in parallel `Vec<Option<T>>` slabs;
/// deleting a slot pushes its index onto a free list so later inserts reuse it.
/// `machine_index` on each element tracks whether it still occupies a live slot
/// (-1 once erased), so stale handles can be detected.
#[derive(Default)]
pub struct StateMachine {
    pub name: String,
    states: Vec<Option<AnimationState>>,
    transitions: Vec<Option<TransitionState>>,
    connections: Vec<Option<Connection>>,
    erased_states: Vec<u32>,
    erased_transitions: Vec<u32>,
    erased_connections: Vec<u32>,
}

impl StateMachine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Insert a new animation state, reusing a freed slot if one exists.
    pub fn add_state(&mut self, name: impl Into<String>, playback: PlaybackMode, clips: Vec<ClipRef>) -> u32 {
        let state = AnimationState {
            name: name.into(),
            uuid: Uuid::new_v4(),
            playback,
            clips,
            connections: Vec::new(),
            machine_index: -1,
        };
        let idx = if let Some(idx) = self.erased_states.pop() {
            self.states[idx as usize] = Some(state);
            idx
        } else {
            self.states.push(Some(state));
            (self.states.len() - 1) as u32
        };
        self.states[idx as usize].as_mut().unwrap().machine_index = idx as i32;
        idx
    }

    /// Insert a new transition bound to `connection`. Fails if that connection
    /// already carries a transition.
    pub fn add_transition(
        &mut self,
        name: impl Into<String>,
        settings: TransitionSettings,
        connection: u32,
    ) -> Result<u32> {
        let conn = self
            .connections
            .get(connection as usize)
            .and_then(|c| c.as_ref())
            .ok_or(FlintError::ConnectionNotFound(connection))?;
        if conn.transition_index >= 0 {
            return Err(FlintError::TransitionAlreadyBound);
        }
        let (start, end) = (conn.start_state_index, conn.end_state_index);

        let transition = TransitionState {
            name: name.into(),
            uuid: Uuid::new_v4(),
            settings,
            connection_index: connection,
            start_state_index: start,
            end_state_index: end,
            machine_index: -1,
        };
        let idx = if let Some(idx) = self.erased_transitions.pop() {
            self.transitions[idx as usize] = Some(transition);
            idx
        } else {
            self.transitions.push(Some(transition));
            (self.transitions.len() - 1) as u32
        };
        self.transitions[idx as usize].as_mut().unwrap().machine_index = idx as i32;
        self.connections[connection as usize].as_mut().unwrap().transition_index = idx as i32;
        Ok(idx)
    }

    /// Connect two non-transition states, reusing a freed connection slot if any.
    pub fn add_connection(&mut self, start: u32, end: u32) -> Result<u32> {
        if !self.state_is_live(start) {
            return Err(FlintError::StateNotFound(start.to_string()));
        }
        if !self.state_is_live(end) {
            return Err(FlintError::StateNotFound(end.to_string()));
        }
        let conn = Connection {
            start_state_index: start as i32,
            end_state_index: end as i32,
            transition_index: -1,
            machine_index: -1,
        };
        let idx = if let Some(idx) = self.erased_connections.pop() {
            self.connections[idx as usize] = Some(conn);
            idx
        } else {
            self.connections.push(Some(conn));
            (self.connections.len() - 1) as u32
        };
        self.connections[idx as usize].as_mut().unwrap().machine_index = idx as i32;
        self.states[start as usize].as_mut().unwrap().connections.push(idx);
        self.states[end as usize].as_mut().unwrap().connections.push(idx);
        Ok(idx)
    }

    /// Detach and erase a connection's transition, if it has one.
    pub fn remove_transition(&mut self, connection: u32) {
        let Some(conn) = self.connections.get_mut(connection as usize).and_then(|c| c.as_mut()) else {
            return;
        };
        let t_idx = conn.transition_index;
        if t_idx < 0 {
            return;
        }
        conn.transition_index = -1;
        if let Some(slot) = self.transitions.get_mut(t_idx as usize) {
            *slot = None;
        }
        self.erased_transitions.push(t_idx as u32);
    }

    /// Remove a connection: detaches its transition (if any) and unlinks it from
    /// both endpoints' cached connection lists.
    pub fn remove_connection(&mut self, connection: u32) {
        self.remove_transition(connection);
        let Some(conn) = self.connections.get(connection as usize).and_then(|c| c.as_ref()).copied() else {
            return;
        };
        for end in [conn.start_state_index, conn.end_state_index] {
            if let Some(Some(state)) = self.states.get_mut(end as usize) {
                state.connections.retain(|&c| c != connection);
            }
        }
        self.connections[connection as usize] = None;
        self.erased_connections.push(connection);
    }

    /// Remove a state and every connection touching it.
    pub fn remove_state(&mut self, state: u32) {
        let Some(touched) = self.states.get(state as usize).and_then(|s| s.as_ref()).map(|s| s.connections.clone())
        else {
            return;
        };
        for conn in touched {
            self.remove_connection(conn);
        }
        self.states[state as usize] = None;
        self.erased_states.push(state);
    }

    fn state_is_live(&self, idx: u32) -> bool {
        matches!(self.states.get(idx as usize), Some(Some(_)))
    }

    pub fn state(&self, idx: u32) -> Option<&AnimationState> {
        self.states.get(idx as usize).and_then(|s| s.as_ref())
    }

    pub fn transition(&self, idx: u32) -> Option<&TransitionState> {
        self.transitions.get(idx as usize).and_then(|t| t.as_ref())
    }

    pub fn connection(&self, idx: u32) -> Option<&Connection> {
        self.connections.get(idx as usize).and_then(|c| c.as_ref())
    }

    pub fn state_by_name(&self, name: &str) -> Option<(u32, &AnimationState)> {
        self.states.iter().enumerate().find_map(|(i, s)| {
            s.as_ref().filter(|s| s.name == name).map(|s| (i as u32, s))
        })
    }

    pub fn state_by_uuid(&self, uuid: Uuid) -> Option<(u32, &AnimationState)> {
        self.states.iter().enumerate().find_map(|(i, s)| {
            s.as_ref().filter(|s| s.uuid == uuid).map(|s| (i as u32, s))
        })
    }

    /// Find the connection from `start` to `end`, if one exists.
    pub fn connects_to(&self, start: u32, end: u32) -> Option<u32> {
        let state = self.state(start)?;
        state.connections.iter().copied().find(|&c| {
            self.connection(c)
                .map(|conn| conn.start_state_index == start as i32 && conn.end_state_index == end as i32)
                .unwrap_or(false)
        })
    }

    /// Find the connection from `end` back to `start`, if one exists — the
    /// symmetric counterpart of [`connects_to`](Self::connects_to).
    pub fn connects_from(&self, end: u32, start: u32) -> Option<u32> {
        self.connects_to(start, end)
    }

    /// The first connection outgoing from `start`, used by `Motion::auto_move`.
    pub fn first_outgoing(&self, start: u32) -> Option<u32> {
        let state = self.state(start)?;
        state.connections.iter().copied().find(|&c| {
            self.connection(c)
                .map(|conn| conn.start_state_index == start as i32)
                .unwrap_or(false)
        })
    }

    /// Live (non-erased) states in slot order, for iteration and persistence.
    pub fn iter_states(&self) -> impl Iterator<Item = (u32, &AnimationState)> {
        self.states.iter().enumerate().filter_map(|(i, s)| s.as_ref().map(|s| (i as u32, s)))
    }

    /// Live (non-erased) transitions in slot order.
    pub fn iter_transitions(&self) -> impl Iterator<Item = (u32, &TransitionState)> {
        self.transitions.iter().enumerate().filter_map(|(i, t)| t.as_ref().map(|t| (i as u32, t)))
    }

    /// Live (non-erased) connections in slot order.
    pub fn iter_connections(&self) -> impl Iterator<Item = (u32, &Connection)> {
        self.connections.iter().enumerate().filter_map(|(i, c)| c.as_ref().map(|c| (i as u32, c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sm_with_two_states() -> (StateMachine, u32, u32) {
        let mut sm = StateMachine::new("test");
        let a = sm.add_state("A", PlaybackMode::Loop, vec![]);
        let b = sm.add_state("B", PlaybackMode::Loop, vec![]);
        (sm, a, b)
    }

    #[test]
    fn add_connection_links_both_endpoints() {
        let (mut sm, a, b) = sm_with_two_states();
        let c = sm.add_connection(a, b).unwrap();
        assert!(sm.state(a).unwrap().connections.contains(&c));
        assert!(sm.state(b).unwrap().connections.contains(&c));
        assert_eq!(sm.connects_to(a, b), Some(c));
    }

    #[test]
    fn add_transition_binds_connection() {
        let (mut sm, a, b) = sm_with_two_states();
        let c = sm.add_connection(a, b).unwrap();
        let settings = TransitionSettings {
            kind: TransitionKind::Smooth,
            fade_in_sec: 1.0,
            fade_out_sec: 1.0,
            fade_in_weight: 1.0,
            fade_out_weight: 1.0,
        };
        let t = sm.add_transition("A_to_B", settings, c).unwrap();
        assert_eq!(sm.connection(c).unwrap().transition_index, t as i32);
        assert_eq!(sm.transition(t).unwrap().start_state_index, a as i32);
        assert_eq!(sm.transition(t).unwrap().end_state_index, b as i32);
    }

    #[test]
    fn double_bind_transition_fails() {
        let (mut sm, a, b) = sm_with_two_states();
        let c = sm.add_connection(a, b).unwrap();
        let settings = TransitionSettings {
            kind: TransitionKind::Smooth,
            fade_in_sec: 1.0,
            fade_out_sec: 1.0,
            fade_in_weight: 1.0,
            fade_out_weight: 1.0,
        };
        sm.add_transition("t1", settings, c).unwrap();
        let err = sm.add_transition("t2", settings, c);
        assert!(matches!(err, Err(FlintError::TransitionAlreadyBound)));
    }

    #[test]
    fn remove_state_clears_dangling_connection_refs() {
        let (mut sm, a, b) = sm_with_two_states();
        let c = sm.add_connection(a, b).unwrap();
        sm.remove_state(a);
        assert!(sm.state(a).is_none());
        assert!(sm.connection(c).is_none());
        assert!(!sm.state(b).unwrap().connections.contains(&c));
    }

    #[test]
    fn slot_reuse_after_remove() {
        let mut sm = StateMachine::new("test");
        let a = sm.add_state("A", PlaybackMode::Loop, vec![]);
        let b = sm.add_state("B", PlaybackMode::Loop, vec![]);
        let c = sm.add_state("C", PlaybackMode::Loop, vec![]);
        sm.remove_state(b);
        let d = sm.add_state("D", PlaybackMode::Loop, vec![]);
        assert_eq!(d, b);
        assert_eq!(sm.state(d).unwrap().name, "D");
        // untouched states keep their slots
        assert_eq!(sm.state(a).unwrap().name, "A");
        assert_eq!(sm.state(c).unwrap().name, "C");
    }

    #[test]
    fn connects_from_is_symmetric_to_connects_to() {
        let (mut sm, a, b) = sm_with_two_states();
        let c = sm.add_connection(a, b).unwrap();
        assert_eq!(sm.connects_to(a, b), Some(c));
        assert_eq!(sm.connects_from(b, a), Some(c));
        assert_eq!(sm.connects_from(a, b), None);
    }

    #[test]
    fn iter_states_skips_erased_slots() {
        let mut sm = StateMachine::new("test");
        let a = sm.add_state("A", PlaybackMode::Loop, vec![]);
        let _b = sm.add_state("B", PlaybackMode::Loop, vec![]);
        sm.remove_state(a);
        let names: Vec<_> = sm.iter_states().map(|(_, s)| s.name.clone()).collect();
        assert_eq!(names, vec!["B".to_string()]);
    }

    #[test]
    fn first_outgoing_picks_earliest_added() {
        let mut sm = StateMachine::new("test");
        let a = sm.add_state("A", PlaybackMode::Loop, vec![]);
        let b = sm.add_state("B", PlaybackMode::Loop, vec![]);
        let c = sm.add_state("C", PlaybackMode::Loop, vec![]);
        let ab = sm.add_connection(a, b).unwrap();
        let _ac = sm.add_connection(a, c).unwrap();
        assert_eq!(sm.first_outgoing(a), Some(ab));
    }
}
