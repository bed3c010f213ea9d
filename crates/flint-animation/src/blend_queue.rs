//! Per-frame gathering of active clips, weight resolution, sampling, jointwise
//! blend, and hierarchy composition into a bone matrix palette.

use glam::{Mat4, Quat, Vec3};

use crate::clip::{Clip, ClipSettings, PlaybackMode};
use crate::clip_store::ClipStore;
use crate::motion::{Motion, StateId};
use crate::sampler::{sample_quat, sample_vec3};
use crate::skeleton::Skeleton;
use crate::state_machine::{StateMachine, TransitionKind};

/// Fade direction applied to one clip's contribution this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeStatus {
    None,
    FadingIn,
    FadingOut,
}

/// Transient per-frame record of one playing clip, gathered fresh each tick.
#[derive(Clone)]
pub struct ClipPlayData {
    pub clip_name: String,
    pub settings: ClipSettings,
    pub playback_mode: PlaybackMode,
    pub motion_elapsed: f32,
    pub status: FadeStatus,
    pub transition_elapsed: f32,
    pub transition_total: f32,
    pub transition_fade_in: f32,
    pub transition_fade_out: f32,
    /// When `FirstFrozen` freezes a fading-out clip's pose, this holds the
    /// elapsed time snapshot to sample at instead of `motion_elapsed`.
    pub frozen_elapsed: Option<f32>,
}

/// Transient per-frame S x J (active clips x animated joints) sample buffer.
#[derive(Default)]
pub struct BlendSet {
    stride: usize,
    joints: usize,
    pub translations: Vec<Vec3>,
    pub rotations: Vec<Quat>,
    pub scales: Vec<Vec3>,
}

impl BlendSet {
    fn resize(&mut self, stride: usize, joints: usize) {
        self.stride = stride;
        self.joints = joints;
        let len = stride * joints;
        self.translations = vec![Vec3::ZERO; len];
        self.rotations = vec![Quat::IDENTITY; len];
        self.scales = vec![Vec3::ONE; len];
    }

    fn index(&self, joint: usize, clip: usize) -> usize {
        joint * self.stride + clip
    }
}

/// Per-controller blend pipeline state, rebuilt (mostly) fresh each tick.
#[derive(Default)]
pub struct BlendQueue {
    current_play_data: Vec<ClipPlayData>,
    untimed_weights: Vec<f32>,
    clip_weights: Vec<f32>,
    slerp_weights: Vec<f32>,
    blend_set: BlendSet,
    /// Local TRS per animated joint, indexed by `skeleton_transform_index`.
    local_translations: Vec<Vec3>,
    local_rotations: Vec<Quat>,
    local_scales: Vec<Vec3>,
}

impl BlendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step 1: gather every active clip from the motions' current states.
    /// Only clips that currently resolve in `clip_store` are gathered — a
    /// still-loading clip contributes no weight and no BlendSet column,
    /// matching `Motion::is_done`'s treatment of an unresolved clip as
    /// absent rather than stalled.
    pub fn refresh_active_clips(
        &mut self,
        motions: &[Option<Motion>],
        sm: &StateMachine,
        skeleton: &Skeleton,
        clip_store: &ClipStore,
    ) {
        self.current_play_data.clear();
        self.untimed_weights.clear();

        for motion in motions.iter().flatten() {
            match motion.current_state {
                StateId::Animation(s) => {
                    let Some(state) = sm.state(s) else { continue };
                    for clip_ref in &state.clips {
                        if clip_store.resolve(&clip_ref.clip_name).is_none() {
                            continue;
                        }
                        self.current_play_data.push(ClipPlayData {
                            clip_name: clip_ref.clip_name.clone(),
                            settings: clip_ref.settings,
                            playback_mode: state.playback,
                            motion_elapsed: motion.timer.elapsed(),
                            status: FadeStatus::None,
                            transition_elapsed: 0.0,
                            transition_total: 0.0,
                            transition_fade_in: 0.0,
                            transition_fade_out: 0.0,
                            frozen_elapsed: None,
                        });
                        self.untimed_weights.push(clip_ref.settings.blend_weight);
                    }
                }
                StateId::Transition(t) => {
                    let Some(transition) = sm.transition(t) else { continue };
                    let total = transition.settings.total_time();
                    let t_elapsed = motion.timer.elapsed();

                    if let Some(start) = sm.state(transition.start_state_index as u32) {
                        let freeze = transition.settings.kind == TransitionKind::FirstFrozen;
                        for clip_ref in &start.clips {
                            if clip_store.resolve(&clip_ref.clip_name).is_none() {
                                continue;
                            }
                            self.current_play_data.push(ClipPlayData {
                                clip_name: clip_ref.clip_name.clone(),
                                settings: clip_ref.settings,
                                playback_mode: start.playback,
                                motion_elapsed: motion.timer.elapsed(),
                                status: FadeStatus::FadingOut,
                                transition_elapsed: t_elapsed,
                                transition_total: total,
                                transition_fade_in: transition.settings.fade_in_sec,
                                transition_fade_out: transition.settings.fade_out_sec,
                                frozen_elapsed: freeze.then_some(0.0),
                            });
                            self.untimed_weights
                                .push(clip_ref.settings.blend_weight * transition.settings.fade_out_weight);
                        }
                    }
                    if let Some(end) = sm.state(transition.end_state_index as u32) {
                        for clip_ref in &end.clips {
                            if clip_store.resolve(&clip_ref.clip_name).is_none() {
                                continue;
                            }
                            self.current_play_data.push(ClipPlayData {
                                clip_name: clip_ref.clip_name.clone(),
                                settings: clip_ref.settings,
                                playback_mode: end.playback,
                                motion_elapsed: motion.timer.elapsed(),
                                status: FadeStatus::FadingIn,
                                transition_elapsed: t_elapsed,
                                transition_total: total,
                                transition_fade_in: transition.settings.fade_in_sec,
                                transition_fade_out: transition.settings.fade_out_sec,
                                frozen_elapsed: None,
                            });
                            self.untimed_weights
                                .push(clip_ref.settings.blend_weight * transition.settings.fade_in_weight);
                        }
                    }
                }
                StateId::None => {}
            }
        }

        if !self.current_play_data.is_empty() {
            self.blend_set
                .resize(self.current_play_data.len(), skeleton.num_animated_joints());
            self.local_translations = vec![Vec3::ZERO; skeleton.num_animated_joints()];
            self.local_rotations = vec![Quat::IDENTITY; skeleton.num_animated_joints()];
            self.local_scales = vec![Vec3::ONE; skeleton.num_animated_joints()];
        }
    }

    /// Step 2: resolve fade-in/fade-out scaling, then normalize to sum 1.0.
    pub fn update_weights(&mut self) {
        self.clip_weights = self.untimed_weights.clone();

        for (w, data) in self.clip_weights.iter_mut().zip(self.current_play_data.iter()) {
            match data.status {
                FadeStatus::FadingIn => {
                    if data.transition_fade_in > 0.0 {
                        let scale = ((data.transition_elapsed - data.transition_total
                            + data.transition_fade_in)
                            / data.transition_fade_in)
                            .max(0.0);
                        *w *= scale;
                    }
                }
                FadeStatus::FadingOut => {
                    if data.transition_fade_out > 0.0 {
                        let scale = (1.0 - data.transition_elapsed / data.transition_fade_out).max(0.0);
                        *w *= scale;
                    }
                }
                FadeStatus::None => {}
            }
        }

        let sum: f32 = self.clip_weights.iter().sum();
        if sum > 1e-8 {
            for w in &mut self.clip_weights {
                *w /= sum;
            }
        }

        // Successive-slerp pair weights: s[0] unused, s[i] = w[i] / (w[0..=i] sum).
        self.slerp_weights = vec![0.0; self.clip_weights.len()];
        let mut denom = self.clip_weights.first().copied().unwrap_or(0.0);
        for i in 1..self.clip_weights.len() {
            denom += self.clip_weights[i];
            self.slerp_weights[i] = if denom > 1e-8 { self.clip_weights[i] / denom } else { 0.0 };
        }
    }

    /// Sum of resolved clip weights; ~1.0 whenever any clip is active (see tests).
    pub fn weight_sum(&self) -> f32 {
        self.clip_weights.iter().sum()
    }

    /// Step 3: sample every active clip and blend jointwise into local TRS.
    pub fn sample_and_blend(&mut self, clip_store: &ClipStore, skeleton: &Skeleton) {
        if self.current_play_data.is_empty() {
            return;
        }

        for (c, data) in self.current_play_data.iter().enumerate() {
            let Some(clip) = clip_store.resolve(&data.clip_name) else {
                continue;
            };
            let sample_time = data.frozen_elapsed.unwrap_or(data.motion_elapsed);
            let anim_time = animation_time(clip, data.settings, data.playback_mode, sample_time);

            for (joint_index, joint) in skeleton.nodes.iter().enumerate() {
                let Some(ti) = joint.skeleton_transform_index else { continue };
                let Some(track) = clip.track_for_joint(joint_index as u32) else {
                    continue;
                };
                let idx = self.blend_set.index(ti as usize, c);
                self.blend_set.translations[idx] = sample_vec3(&track.translations, anim_time);
                self.blend_set.rotations[idx] = sample_quat(&track.rotations, anim_time);
                self.blend_set.scales[idx] = sample_vec3(&track.scales, anim_time);
            }
        }

        let stride = self.current_play_data.len();
        if stride == 1 {
            for j in 0..skeleton.num_animated_joints() {
                self.local_translations[j] = self.blend_set.translations[j * stride];
                self.local_rotations[j] = self.blend_set.rotations[j * stride];
                self.local_scales[j] = self.blend_set.scales[j * stride];
            }
            return;
        }

        for j in 0..skeleton.num_animated_joints() {
            let mut t = Vec3::ZERO;
            let mut s = Vec3::ZERO;
            for c in 0..stride {
                let idx = self.blend_set.index(j, c);
                let w = self.clip_weights[c];
                t += self.blend_set.translations[idx] * w;
                s += self.blend_set.scales[idx] * w;
            }
            self.local_translations[j] = t;
            self.local_scales[j] = s;

            let mut r = self.blend_set.rotations[self.blend_set.index(j, 0)];
            for c in 1..stride {
                let next = self.blend_set.rotations[self.blend_set.index(j, c)];
                r = r.slerp(next, self.slerp_weights[c]);
            }
            self.local_rotations[j] = r;
        }
    }

    /// Step 4: compose the skeleton hierarchy depth-first into a bone palette.
    pub fn compose_hierarchy(&self, skeleton: &Skeleton, out: &mut Vec<Mat4>) {
        if out.len() != skeleton.bone_count() {
            out.resize(skeleton.bone_count(), Mat4::IDENTITY);
        }

        let mut world = vec![Mat4::IDENTITY; skeleton.joint_count()];
        let mut stack = vec![skeleton.root_index];
        let mut order = Vec::with_capacity(skeleton.joint_count());
        while let Some(idx) = stack.pop() {
            order.push(idx);
            if let Some(joint) = skeleton.node(idx) {
                stack.extend(joint.children.iter().copied());
            }
        }

        for idx in order {
            let joint = skeleton.node(idx).expect("traversal index must be valid");
            let local = if let Some(ti) = joint.skeleton_transform_index {
                let (scale, rotation, translation) =
                    (self.local_scales[ti as usize], self.local_rotations[ti as usize], self.local_translations[ti as usize]);
                if rotation_and_scale_are_finite(rotation, scale) {
                    Mat4::from_scale_rotation_translation(scale, rotation, translation)
                } else {
                    eprintln!(
                        "{}",
                        flint_core::FlintError::NumericError(format!(
                            "joint '{}' produced a non-finite rotation or zero-length scale this frame, falling back to bind pose",
                            joint.name
                        ))
                    );
                    joint.local_bind
                }
            } else {
                joint.local_bind
            };

            world[idx as usize] = match joint.parent_index {
                Some(p) => world[p as usize] * local,
                None => local,
            };

            if let Some(bone) = joint.bone {
                out[bone.index as usize] = world[idx as usize];
            }
        }
    }
}

/// Resolve a clip's local animation time (in ticks), apply the clip's
/// playback-mode wrap, and report whether it has finished playing —
/// following the clip-store's speed/offset parameters (spec §4.4.3).
///
/// `Once` is done after its single play-through; `Loop`/`PingPong` are
/// additionally done once `settings.num_plays > 0` counted plays are used up
/// (the "Counted" case), regardless of which mode wraps the sample time.
pub fn clip_timing(clip: &Clip, settings: ClipSettings, mode: PlaybackMode, motion_elapsed: f32) -> (f32, bool) {
    let tps = clip.effective_tps() * settings.speed_factor as f64;
    let t_ticks =
        (motion_elapsed as f64 + settings.time_offset_sec as f64) * tps + settings.tick_offset as f64;
    let duration = clip.duration_ticks.max(1e-6);

    let mut anim_time = t_ticks.rem_euclid(duration);
    let plays = (t_ticks / duration).floor() as i64;

    let mut done = settings.num_plays > 0 && plays >= settings.num_plays as i64;

    match mode {
        PlaybackMode::Once => {
            if plays >= 1 {
                done = true;
            }
        }
        PlaybackMode::Loop => {}
        PlaybackMode::PingPong => {
            if plays.rem_euclid(2) == 1 {
                anim_time = duration - anim_time;
            }
        }
    }

    (anim_time as f32, done)
}

/// Sampling-only convenience over [`clip_timing`] for callers that don't need
/// the done flag.
fn animation_time(clip: &Clip, settings: ClipSettings, mode: PlaybackMode, motion_elapsed: f32) -> f32 {
    clip_timing(clip, settings, mode, motion_elapsed).0
}

/// Spec §7 numeric-error gate: a joint whose blended rotation is non-finite
/// (NaN/infinite from a degenerate successive-slerp) or whose blended scale
/// has collapsed to zero length must fall back to its bind pose for this
/// frame rather than propagate a singular matrix into the palette.
fn rotation_and_scale_are_finite(rotation: Quat, scale: Vec3) -> bool {
    rotation.is_finite() && scale.is_finite() && scale.length_squared() > 1e-12
}
