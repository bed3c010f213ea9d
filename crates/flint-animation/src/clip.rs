//! Animation clip data — per-joint keyframe tracks, immutable after load

use serde::{Deserialize, Serialize};

/// An immutable keyframe track for a single joint's translation, rotation, or scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTrack {
    /// Index into the skeleton's joint array this track drives.
    pub joint_index: u32,
    #[serde(default)]
    pub translations: Vec<Keyframe<[f32; 3]>>,
    #[serde(default)]
    pub rotations: Vec<Keyframe<[f32; 4]>>,
    #[serde(default)]
    pub scales: Vec<Keyframe<[f32; 3]>>,
}

/// A single sample at a point in time, in clip ticks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
}

/// A complete, immutable animation clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub name: String,
    pub ticks_per_second: f64,
    pub duration_ticks: f64,
    /// Sorted, deduplicated key times shared by this clip's tracks (informational —
    /// individual tracks may sample a subset of these).
    #[serde(default)]
    pub key_times: Vec<f32>,
    pub node_tracks: Vec<NodeTrack>,
    /// Count of tracks that drive nodes with no attached bone. Reporting only.
    #[serde(default)]
    pub num_non_bones: u32,
}

impl Clip {
    /// Ticks-per-second, defaulting to 25 when the source clip didn't specify one.
    pub fn effective_tps(&self) -> f64 {
        if self.ticks_per_second > 0.0 {
            self.ticks_per_second
        } else {
            25.0
        }
    }

    pub fn track_for_joint(&self, joint_index: u32) -> Option<&NodeTrack> {
        self.node_tracks.iter().find(|t| t.joint_index == joint_index)
    }
}

/// Per-use playback parameters for a clip, independent of the clip asset itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClipSettings {
    pub speed_factor: f32,
    pub blend_weight: f32,
    pub tick_offset: i32,
    pub time_offset_sec: f32,
    /// -1 means infinite.
    pub num_plays: i32,
}

impl Default for ClipSettings {
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

/// How a clip's local time wraps once it reaches its duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackMode {
    Once,
    Loop,
    PingPong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_tps_defaults_when_zero() {
        let clip = Clip {
            name: "t".into(),
            ticks_per_second: 0.0,
            duration_ticks: 10.0,
            key_times: vec![],
            node_tracks: vec![],
            num_non_bones: 0,
        };
        assert_eq!(clip.effective_tps(), 25.0);
    }

    #[test]
    fn clip_settings_default_is_infinite_plays() {
        let s = ClipSettings::default();
        assert_eq!(s.num_plays, -1);
        assert_eq!(s.speed_factor, 1.0);
    }

    #[test]
    fn track_for_joint_finds_match() {
        let clip = Clip {
            name: "t".into(),
            ticks_per_second: 25.0,
            duration_ticks: 25.0,
            key_times: vec![],
            node_tracks: vec![NodeTrack {
                joint_index: 3,
                translations: vec![],
                rotations: vec![],
                scales: vec![],
            }],
            num_non_bones: 0,
        };
        assert!(clip.track_for_joint(3).is_some());
        assert!(clip.track_for_joint(4).is_none());
    }
}
