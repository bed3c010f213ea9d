//! Pure keyframe evaluation — binary search + interpolation
//!
//! Mirrors the clip-store's sampling shape but works in `glam` types so the
//! blend queue can feed its results straight into weighted sums and slerps.

use crate::clip::Keyframe;
use glam::{Quat, Vec3};

/// Sample a translation/scale track at `time`, clamping outside its key range.
pub fn sample_vec3(keys: &[Keyframe<[f32; 3]>], time: f32) -> Vec3 {
    if keys.is_empty() {
        return Vec3::ZERO;
    }
    if keys.len() == 1 || time <= keys[0].time {
        return Vec3::from(keys[0].value);
    }
    let last = keys.last().unwrap();
    if time >= last.time {
        return Vec3::from(last.value);
    }

    let idx = match keys.binary_search_by(|k| k.time.partial_cmp(&time).unwrap()) {
        Ok(i) => return Vec3::from(keys[i].value),
        Err(i) => i,
    };
    let prev = &keys[idx - 1];
    let next = &keys[idx];
    let span = next.time - prev.time;
    if span <= 0.0 {
        return Vec3::from(prev.value);
    }
    let t = (time - prev.time) / span;
    Vec3::from(prev.value).lerp(Vec3::from(next.value), t)
}

/// Sample a rotation track at `time` using spherical interpolation between neighbors.
pub fn sample_quat(keys: &[Keyframe<[f32; 4]>], time: f32) -> Quat {
    if keys.is_empty() {
        return Quat::IDENTITY;
    }
    if keys.len() == 1 || time <= keys[0].time {
        return to_quat(keys[0].value);
    }
    let last = keys.last().unwrap();
    if time >= last.time {
        return to_quat(last.value);
    }

    let idx = match keys.binary_search_by(|k| k.time.partial_cmp(&time).unwrap()) {
        Ok(i) => return to_quat(keys[i].value),
        Err(i) => i,
    };
    let prev = &keys[idx - 1];
    let next = &keys[idx];
    let span = next.time - prev.time;
    if span <= 0.0 {
        return to_quat(prev.value);
    }
    let t = (time - prev.time) / span;
    to_quat(prev.value).slerp(to_quat(next.value), t)
}

fn to_quat(v: [f32; 4]) -> Quat {
    Quat::from_xyzw(v[0], v[1], v[2], v[3]).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kf3(time: f32, value: [f32; 3]) -> Keyframe<[f32; 3]> {
        Keyframe { time, value }
    }

    fn kf4(time: f32, value: [f32; 4]) -> Keyframe<[f32; 4]> {
        Keyframe { time, value }
    }

    #[test]
    fn sample_vec3_empty_is_zero() {
        assert_eq!(sample_vec3(&[], 1.0), Vec3::ZERO);
    }

    #[test]
    fn sample_vec3_clamps_before_and_after() {
        let keys = vec![kf3(0.0, [1.0, 2.0, 3.0]), kf3(1.0, [4.0, 5.0, 6.0])];
        assert_eq!(sample_vec3(&keys, -1.0), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(sample_vec3(&keys, 5.0), Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn sample_vec3_linear_midpoint() {
        let keys = vec![kf3(0.0, [0.0, 0.0, 0.0]), kf3(2.0, [10.0, 20.0, 30.0])];
        let v = sample_vec3(&keys, 1.0);
        assert!((v.x - 5.0).abs() < 1e-5);
        assert!((v.y - 10.0).abs() < 1e-5);
        assert!((v.z - 15.0).abs() < 1e-5);
    }

    #[test]
    fn sample_quat_endpoints_exact() {
        let a = [0.0, 0.0, 0.0, 1.0];
        let b = [0.0, std::f32::consts::FRAC_1_SQRT_2, 0.0, std::f32::consts::FRAC_1_SQRT_2];
        let keys = vec![kf4(0.0, a), kf4(1.0, b)];
        let q0 = sample_quat(&keys, 0.0);
        assert!((q0.w - 1.0).abs() < 1e-4);
        let q1 = sample_quat(&keys, 1.0);
        assert!((q1.y - b[1]).abs() < 1e-3);
    }

    #[test]
    fn sample_quat_midpoint_is_normalized() {
        let keys = vec![kf4(0.0, [0.0, 0.0, 0.0, 1.0]), kf4(1.0, [0.0, 1.0, 0.0, 0.0])];
        let q = sample_quat(&keys, 0.5);
        assert!((q.length() - 1.0).abs() < 1e-5);
    }
}
