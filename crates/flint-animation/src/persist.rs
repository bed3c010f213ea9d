//! TOML persistence for controllers and state machines.
//!
//! Mirrors the schema the rest of the engine uses for every other asset and
//! scene document: nested `toml::Value`-shaped structs, deserialized with
//! `serde`, propagating `FlintError` on parse failure. `animationStates` has
//! a legacy quirk (states were once written as a map keyed by name instead
//! of an array) that both forms must still parse; writers always emit the
//! array form and only ever omit erased slots, since the slab's free lists
//! are a runtime-only concern.

use std::collections::HashMap;
use std::path::Path;

use flint_core::{FlintError, Result};
use serde::{Deserialize, Serialize};

use crate::clip::{ClipSettings, PlaybackMode};
use crate::motion::BehaviorFlags;
use crate::state_machine::{ClipRef, StateMachine, TransitionKind, TransitionSettings};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnimationStateDoc {
    name: String,
    #[serde(default = "default_state_type")]
    state_type: u32,
    #[serde(default)]
    playback_mode: u32,
    #[serde(default)]
    clips: HashMap<String, ClipRefDoc>,
}

fn default_state_type() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClipRefDoc {
    /// Local alias for this clip within the state. Not interpreted by the
    /// runtime `ClipRef` (which resolves clips by `animation` alone) — kept
    /// only so the document round-trips the schema's `name`/`animation` split.
    #[serde(default)]
    name: String,
    animation: String,
    #[serde(default)]
    settings: ClipSettingsDoc,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClipSettingsDoc {
    #[serde(default = "one")]
    speed_factor: f32,
    #[serde(default = "one")]
    blend_weight: f32,
    #[serde(default)]
    tick_offset: i32,
    #[serde(default)]
    time_offset_sec: f32,
    #[serde(default = "neg_one")]
    num_plays: i32,
}

fn one() -> f32 {
    1.0
}
fn neg_one() -> i32 {
    -1
}

impl Default for ClipSettingsDoc {
    fn default() -> Self {
        Self {
            speed_factor: 1.0,
            blend_weight: 1.0,
            tick_offset: 0,
            time_offset_sec: 0.0,
            num_plays: -1,
        }
    }
}

impl From<ClipSettingsDoc> for ClipSettings {
    fn from(d: ClipSettingsDoc) -> Self {
        Self {
            speed_factor: d.speed_factor,
            blend_weight: d.blend_weight,
            tick_offset: d.tick_offset,
            time_offset_sec: d.time_offset_sec,
            num_plays: d.num_plays,
        }
    }
}

impl From<ClipSettings> for ClipSettingsDoc {
    fn from(s: ClipSettings) -> Self {
        Self {
            speed_factor: s.speed_factor,
            blend_weight: s.blend_weight,
            tick_offset: s.tick_offset,
            time_offset_sec: s.time_offset_sec,
            num_plays: s.num_plays,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConnectionDoc {
    start: String,
    end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransitionDoc {
    name: String,
    start: String,
    end: String,
    #[serde(default)]
    kind: TransitionKindDoc,
    fade_in_sec: f32,
    fade_out_sec: f32,
    #[serde(default = "one")]
    fade_in_weight: f32,
    #[serde(default = "one")]
    fade_out_weight: f32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
enum TransitionKindDoc {
    #[default]
    Smooth,
    FirstFrozen,
}

impl From<TransitionKindDoc> for TransitionKind {
    fn from(k: TransitionKindDoc) -> Self {
        match k {
            TransitionKindDoc::Smooth => TransitionKind::Smooth,
            TransitionKindDoc::FirstFrozen => TransitionKind::FirstFrozen,
        }
    }
}

impl From<TransitionKind> for TransitionKindDoc {
    fn from(k: TransitionKind) -> Self {
        match k {
            TransitionKind::Smooth => TransitionKindDoc::Smooth,
            TransitionKind::FirstFrozen => TransitionKindDoc::FirstFrozen,
        }
    }
}

/// Accepts either the legacy object-of-states form or the current array form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum AnimationStatesField {
    Array(Vec<AnimationStateDoc>),
    Legacy(HashMap<String, AnimationStateDoc>),
}

impl AnimationStatesField {
    fn into_vec(self) -> Vec<AnimationStateDoc> {
        match self {
            AnimationStatesField::Array(v) => v,
            AnimationStatesField::Legacy(m) => m.into_values().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateMachineDoc {
    name: String,
    #[serde(rename = "animationStates")]
    animation_states: AnimationStatesField,
    #[serde(default)]
    transitions: Vec<TransitionDoc>,
    #[serde(default)]
    connections: Vec<ConnectionDoc>,
}

/// Either an embedded state-machine document (legacy, inline) or the name of
/// a machine held in an external registry — spec §6's `stateMachine` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StateMachineField {
    Named(String),
    Embedded(StateMachineDoc),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MotionDoc {
    name: String,
    state_name: String,
    #[serde(default)]
    behavior_flags: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControllerDoc {
    model: String,
    state_machine: StateMachineField,
    #[serde(default)]
    motions: Vec<MotionDoc>,
    #[serde(default = "default_true")]
    is_playing: bool,
}

fn default_true() -> bool {
    true
}

const AUTO_PLAY_BIT: u32 = 1 << 0;
const DESTROY_ON_DONE_BIT: u32 = 1 << 1;

fn behavior_flags_from_bits(bits: u32) -> BehaviorFlags {
    BehaviorFlags {
        auto_play: bits & AUTO_PLAY_BIT != 0,
        destroy_on_done: bits & DESTROY_ON_DONE_BIT != 0,
    }
}

fn behavior_flags_to_bits(flags: BehaviorFlags) -> u32 {
    (if flags.auto_play { AUTO_PLAY_BIT } else { 0 }) | (if flags.destroy_on_done { DESTROY_ON_DONE_BIT } else { 0 })
}

fn playback_mode_from_u32(v: u32) -> PlaybackMode {
    match v {
        1 => PlaybackMode::Loop,
        2 => PlaybackMode::PingPong,
        _ => PlaybackMode::Once,
    }
}

fn playback_mode_to_u32(m: PlaybackMode) -> u32 {
    match m {
        PlaybackMode::Once => 0,
        PlaybackMode::Loop => 1,
        PlaybackMode::PingPong => 2,
    }
}

/// Build a live `StateMachine` from a parsed document. Shared by the
/// standalone state-machine loader and the embedded form inside a controller
/// document.
fn state_machine_from_doc(doc: StateMachineDoc) -> Result<StateMachine> {
    let mut sm = StateMachine::new(doc.name);

    let states: Vec<AnimationStateDoc> =
        doc.animation_states.into_vec().into_iter().filter(|s| s.state_type != 2).collect();

    let mut name_to_index = HashMap::new();
    for state in &states {
        let clips: Vec<ClipRef> = state
            .clips
            .values()
            .map(|c| ClipRef { clip_name: c.animation.clone(), settings: c.settings.into() })
            .collect();
        let idx = sm.add_state(state.name.clone(), playback_mode_from_u32(state.playback_mode), clips);
        name_to_index.insert(state.name.clone(), idx);
    }

    let mut connection_index = HashMap::new();
    for conn in &doc.connections {
        let (Some(&start), Some(&end)) = (name_to_index.get(&conn.start), name_to_index.get(&conn.end)) else {
            return Err(FlintError::StateNotFound(format!("{} or {}", conn.start, conn.end)));
        };
        let idx = sm.add_connection(start, end)?;
        connection_index.insert((conn.start.clone(), conn.end.clone()), idx);
    }

    for t in doc.transitions {
        let Some(&conn) = connection_index.get(&(t.start.clone(), t.end.clone())) else {
            return Err(FlintError::StateNotConnected { from: t.start, to: t.end });
        };
        sm.add_transition(
            t.name,
            TransitionSettings {
                kind: t.kind.into(),
                fade_in_sec: t.fade_in_sec,
                fade_out_sec: t.fade_out_sec,
                fade_in_weight: t.fade_in_weight,
                fade_out_weight: t.fade_out_weight,
            },
            conn,
        )?;
    }

    Ok(sm)
}

/// Serialize a live `StateMachine` into its document form. Writes the array
/// encoding of `animationStates` (never the legacy map form) and naturally
/// omits erased slots, since only live states/transitions/connections are
/// iterated.
fn state_machine_to_doc(sm: &StateMachine) -> StateMachineDoc {
    let state_name = |idx: i32| -> String { sm.state(idx as u32).map(|s| s.name.clone()).unwrap_or_default() };

    let states: Vec<AnimationStateDoc> = sm
        .iter_states()
        .map(|(_, s)| AnimationStateDoc {
            name: s.name.clone(),
            state_type: 1,
            playback_mode: playback_mode_to_u32(s.playback),
            clips: s
                .clips
                .iter()
                .map(|c| {
                    (
                        c.clip_name.clone(),
                        ClipRefDoc { name: c.clip_name.clone(), animation: c.clip_name.clone(), settings: c.settings.into() },
                    )
                })
                .collect(),
        })
        .collect();

    let connections: Vec<ConnectionDoc> = sm
        .iter_connections()
        .map(|(_, c)| ConnectionDoc { start: state_name(c.start_state_index), end: state_name(c.end_state_index) })
        .collect();

    let transitions: Vec<TransitionDoc> = sm
        .iter_transitions()
        .map(|(_, t)| TransitionDoc {
            name: t.name.clone(),
            start: state_name(t.start_state_index),
            end: state_name(t.end_state_index),
            kind: t.settings.kind.into(),
            fade_in_sec: t.settings.fade_in_sec,
            fade_out_sec: t.settings.fade_out_sec,
            fade_in_weight: t.settings.fade_in_weight,
            fade_out_weight: t.settings.fade_out_weight,
        })
        .collect();

    StateMachineDoc {
        name: sm.name.clone(),
        animation_states: AnimationStatesField::Array(states),
        transitions,
        connections,
    }
}

/// Parse a state machine document from a TOML string. Accepts both the
/// array and legacy object encodings of `animationStates`; states whose
/// `stateType` is `2` (an old inline-transition form) are skipped — this
/// reader only loads transitions from the `transitions` array.
pub fn load_state_machine_from_str(content: &str) -> Result<StateMachine> {
    let doc: StateMachineDoc = toml::from_str(content)?;
    state_machine_from_doc(doc)
}

pub fn load_state_machine_from_file(path: &Path) -> Result<StateMachine> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        eprintln!("failed to read state machine document at {}: {}", path.display(), e);
        e
    })?;
    load_state_machine_from_str(&content)
}

/// Serialize a state machine to its TOML document form (array encoding).
pub fn save_state_machine_to_str(sm: &StateMachine) -> Result<String> {
    let doc = state_machine_to_doc(sm);
    toml::to_string_pretty(&doc).map_err(FlintError::from)
}

pub fn save_state_machine_to_file(path: &Path, sm: &StateMachine) -> Result<()> {
    let content = save_state_machine_to_str(sm)?;
    std::fs::write(path, content).map_err(|e| {
        eprintln!("failed to write state machine document to {}: {}", path.display(), e);
        e
    })?;
    Ok(())
}

/// Where a controller document's state machine lives: embedded inline
/// (legacy) or referenced by name in an external registry.
pub enum StateMachineSource {
    Named(String),
    Embedded(StateMachine),
}

/// One entry in a controller document's `motions` array.
pub struct MotionConfig {
    pub name: String,
    pub state_name: String,
    pub behavior_flags: BehaviorFlags,
}

/// Parsed form of spec §6's controller persistence document: `model`,
/// `stateMachine`, `motions`, `isPlaying`. Building a live `Controller` from
/// this still requires the skeleton and clip store — external collaborators
/// this crate doesn't own — so callers wire those up themselves.
pub struct ControllerConfig {
    pub model: String,
    pub state_machine: StateMachineSource,
    pub motions: Vec<MotionConfig>,
    pub is_playing: bool,
}

pub fn load_controller_from_str(content: &str) -> Result<ControllerConfig> {
    let doc: ControllerDoc = toml::from_str(content)?;
    let state_machine = match doc.state_machine {
        StateMachineField::Named(name) => StateMachineSource::Named(name),
        StateMachineField::Embedded(sm_doc) => StateMachineSource::Embedded(state_machine_from_doc(sm_doc)?),
    };
    let motions = doc
        .motions
        .into_iter()
        .map(|m| MotionConfig {
            name: m.name,
            state_name: m.state_name,
            behavior_flags: behavior_flags_from_bits(m.behavior_flags),
        })
        .collect();

    Ok(ControllerConfig { model: doc.model, state_machine, motions, is_playing: doc.is_playing })
}

pub fn load_controller_from_file(path: &Path) -> Result<ControllerConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        eprintln!("failed to read controller document at {}: {}", path.display(), e);
        e
    })?;
    load_controller_from_str(&content)
}

pub fn save_controller_to_str(cfg: &ControllerConfig) -> Result<String> {
    let state_machine = match &cfg.state_machine {
        StateMachineSource::Named(name) => StateMachineField::Named(name.clone()),
        StateMachineSource::Embedded(sm) => StateMachineField::Embedded(state_machine_to_doc(sm)),
    };
    let doc = ControllerDoc {
        model: cfg.model.clone(),
        state_machine,
        motions: cfg
            .motions
            .iter()
            .map(|m| MotionDoc {
                name: m.name.clone(),
                state_name: m.state_name.clone(),
                behavior_flags: behavior_flags_to_bits(m.behavior_flags),
            })
            .collect(),
        is_playing: cfg.is_playing,
    };
    toml::to_string_pretty(&doc).map_err(FlintError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_array_form() {
        let toml_str = r#"
name = "locomotion"

[[animationStates]]
name = "idle"
playbackMode = 1

[[animationStates]]
name = "walk"
playbackMode = 1

[[connections]]
start = "idle"
end = "walk"
"#;
        let sm = load_state_machine_from_str(toml_str).unwrap();
        let (_, idle) = sm.state_by_name("idle").unwrap();
        assert_eq!(idle.playback, PlaybackMode::Loop);
        assert!(sm.state_by_name("walk").is_some());
    }

    #[test]
    fn parse_legacy_object_form() {
        let toml_str = r#"
name = "locomotion"

[animationStates.idle]
name = "idle"
playbackMode = 1

[animationStates.walk]
name = "walk"
playbackMode = 2
"#;
        let sm = load_state_machine_from_str(toml_str).unwrap();
        assert!(sm.state_by_name("idle").is_some());
        let (_, walk) = sm.state_by_name("walk").unwrap();
        assert_eq!(walk.playback, PlaybackMode::PingPong);
    }

    #[test]
    fn parse_transition_binds_connection_with_camel_case_fields() {
        let toml_str = r#"
name = "locomotion"

[[animationStates]]
name = "idle"
playbackMode = 1

[[animationStates]]
name = "walk"
playbackMode = 1

[[connections]]
start = "idle"
end = "walk"

[[transitions]]
name = "idle_to_walk"
start = "idle"
end = "walk"
fadeInSec = 0.25
fadeOutSec = 0.5
fadeInWeight = 0.9
fadeOutWeight = 0.8
"#;
        let sm = load_state_machine_from_str(toml_str).unwrap();
        let (idle, _) = sm.state_by_name("idle").unwrap();
        let (walk, _) = sm.state_by_name("walk").unwrap();
        let conn = sm.connects_to(idle, walk).expect("connection must exist");
        let t_idx = sm.connection(conn).unwrap().transition_index;
        assert!(t_idx >= 0);
        let transition = sm.transition(t_idx as u32).unwrap();
        assert_eq!(transition.name, "idle_to_walk");
        assert!((transition.settings.fade_in_sec - 0.25).abs() < 1e-6);
        assert!((transition.settings.fade_out_sec - 0.5).abs() < 1e-6);
        assert!((transition.settings.fade_in_weight - 0.9).abs() < 1e-6);
    }

    #[test]
    fn playback_mode_round_trip() {
        assert_eq!(playback_mode_from_u32(playback_mode_to_u32(PlaybackMode::Loop)), PlaybackMode::Loop);
        assert_eq!(playback_mode_from_u32(playback_mode_to_u32(PlaybackMode::PingPong)), PlaybackMode::PingPong);
        assert_eq!(playback_mode_from_u32(playback_mode_to_u32(PlaybackMode::Once)), PlaybackMode::Once);
    }

    /// Spec §8: `load(write(SM))` must produce a machine with the same live
    /// states, transitions, and connections (equality modulo index numbering).
    #[test]
    fn state_machine_round_trips_through_save_and_load() {
        let mut sm = StateMachine::new("locomotion");
        let idle = sm.add_state(
            "idle",
            PlaybackMode::Loop,
            vec![ClipRef { clip_name: "idle_clip".into(), settings: ClipSettings::default() }],
        );
        let walk = sm.add_state("walk", PlaybackMode::Loop, vec![]);
        let conn = sm.add_connection(idle, walk).unwrap();
        sm.add_transition(
            "idle_to_walk",
            TransitionSettings {
                kind: TransitionKind::FirstFrozen,
                fade_in_sec: 0.3,
                fade_out_sec: 0.4,
                fade_in_weight: 1.0,
                fade_out_weight: 1.0,
            },
            conn,
        )
        .unwrap();

        let written = save_state_machine_to_str(&sm).unwrap();
        let loaded = load_state_machine_from_str(&written).unwrap();

        assert_eq!(loaded.name, sm.name);
        assert_eq!(loaded.iter_states().count(), sm.iter_states().count());
        assert_eq!(loaded.iter_connections().count(), sm.iter_connections().count());
        assert_eq!(loaded.iter_transitions().count(), sm.iter_transitions().count());

        let (l_idle, idle_state) = loaded.state_by_name("idle").unwrap();
        let (l_walk, _) = loaded.state_by_name("walk").unwrap();
        assert_eq!(idle_state.clips.len(), 1);
        assert_eq!(idle_state.clips[0].clip_name, "idle_clip");

        let l_conn = loaded.connects_to(l_idle, l_walk).expect("connection survives round-trip");
        let l_transition_idx = loaded.connection(l_conn).unwrap().transition_index;
        assert!(l_transition_idx >= 0);
        let l_transition = loaded.transition(l_transition_idx as u32).unwrap();
        assert_eq!(l_transition.settings.kind, TransitionKind::FirstFrozen);
        assert!((l_transition.settings.fade_in_sec - 0.3).abs() < 1e-6);
        assert!((l_transition.settings.fade_out_sec - 0.4).abs() < 1e-6);
    }

    #[test]
    fn state_machine_round_trip_omits_erased_slots() {
        let mut sm = StateMachine::new("sm");
        let a = sm.add_state("a", PlaybackMode::Once, vec![]);
        let b = sm.add_state("b", PlaybackMode::Once, vec![]);
        sm.add_connection(a, b).unwrap();
        sm.remove_state(a);

        let written = save_state_machine_to_str(&sm).unwrap();
        let loaded = load_state_machine_from_str(&written).unwrap();
        assert_eq!(loaded.iter_states().count(), 1);
        assert!(loaded.state_by_name("a").is_none());
        assert!(loaded.state_by_name("b").is_some());
    }

    #[test]
    fn controller_document_round_trips_named_state_machine() {
        let cfg = ControllerConfig {
            model: "hero.model".into(),
            state_machine: StateMachineSource::Named("locomotion".into()),
            motions: vec![MotionConfig {
                name: "legs".into(),
                state_name: "idle".into(),
                behavior_flags: BehaviorFlags { auto_play: true, destroy_on_done: false },
            }],
            is_playing: true,
        };
        let written = save_controller_to_str(&cfg).unwrap();
        let loaded = load_controller_from_str(&written).unwrap();

        assert_eq!(loaded.model, "hero.model");
        assert!(matches!(loaded.state_machine, StateMachineSource::Named(n) if n == "locomotion"));
        assert_eq!(loaded.motions.len(), 1);
        assert_eq!(loaded.motions[0].state_name, "idle");
        assert!(loaded.motions[0].behavior_flags.auto_play);
        assert!(!loaded.motions[0].behavior_flags.destroy_on_done);
        assert!(loaded.is_playing);
    }

    #[test]
    fn behavior_flags_bit_round_trip() {
        let flags = BehaviorFlags { auto_play: true, destroy_on_done: true };
        let bits = behavior_flags_to_bits(flags);
        let back = behavior_flags_from_bits(bits);
        assert_eq!(flags, back);
    }
}
