//! Small vector helpers used across the mover.
//!
//! All of them are total: zero-length inputs produce zero (or the input unchanged)
//! instead of NaN.

use crate::collision::types::{Quat, Vec3};
use crate::constants::SMALL_NUMBER;

/// World up axis.
#[inline]
pub fn up() -> Vec3 {
    Vec3::y()
}

/// Normalize `v`, or return zero when it is too short to have a direction.
#[inline]
pub fn safe_normalize(v: Vec3) -> Vec3 {
    v.try_normalize(1.0e-8).unwrap_or_else(Vec3::zeros)
}

/// Drop the vertical component.
#[inline]
pub fn planar(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Remove the component of `v` along `normal`. A zero normal leaves `v` untouched.
#[inline]
pub fn project_on_plane(v: Vec3, normal: Vec3) -> Vec3 {
    let sq = normal.norm_squared();
    if sq < 1.0e-12 {
        return v;
    }
    v - normal * (v.dot(&normal) / sq)
}

/// Component of `v` along `onto`. A zero `onto` yields zero.
#[inline]
pub fn project_onto(v: Vec3, onto: Vec3) -> Vec3 {
    let sq = onto.norm_squared();
    if sq < 1.0e-12 {
        return Vec3::zeros();
    }
    onto * (v.dot(&onto) / sq)
}

#[inline]
pub fn clamp_magnitude(v: Vec3, max_length: f32) -> Vec3 {
    let len = v.norm();
    if len > max_length && len > 0.0 {
        v * (max_length / len)
    } else {
        v
    }
}

/// Turn `from` toward `to` by at most `max_radians`.
pub fn rotate_towards(from: Quat, to: Quat, max_radians: f32) -> Quat {
    let angle = from.angle_to(&to);
    if angle <= max_radians.max(0.0) || angle <= f32::EPSILON {
        return to;
    }
    let t = (max_radians.max(0.0) / angle).clamp(0.0, 1.0);
    from.try_slerp(&to, t, 1.0e-6).unwrap_or(to)
}

/// True when `v` is too short to carry a direction.
#[inline]
pub fn is_nearly_zero(v: Vec3) -> bool {
    v.norm_squared() <= SMALL_NUMBER * SMALL_NUMBER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_normalize_handles_zero() {
        assert_eq!(safe_normalize(Vec3::zeros()), Vec3::zeros());
        let n = safe_normalize(Vec3::new(3.0, 0.0, 4.0));
        assert!((n.norm() - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn project_on_plane_removes_normal_component() {
        let v = Vec3::new(1.0, -2.0, 0.5);
        let p = project_on_plane(v, Vec3::y());
        assert!((p - Vec3::new(1.0, 0.0, 0.5)).norm() < 1.0e-6);
        assert_eq!(project_on_plane(v, Vec3::zeros()), v);
    }

    #[test]
    fn project_onto_uses_unnormalized_axis() {
        let p = project_onto(Vec3::new(2.0, 3.0, 0.0), Vec3::new(5.0, 0.0, 0.0));
        assert!((p - Vec3::new(2.0, 0.0, 0.0)).norm() < 1.0e-6);
        assert_eq!(project_onto(Vec3::x(), Vec3::zeros()), Vec3::zeros());
    }

    #[test]
    fn clamp_magnitude_caps_length() {
        let v = clamp_magnitude(Vec3::new(0.0, 0.0, 10.0), 2.0);
        assert!((v.norm() - 2.0).abs() < 1.0e-6);
        let short = Vec3::new(0.1, 0.0, 0.0);
        assert_eq!(clamp_magnitude(short, 2.0), short);
    }

    #[test]
    fn rotate_towards_is_bounded() {
        let from = Quat::identity();
        let to = Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2);
        let step = rotate_towards(from, to, 0.1);
        assert!((from.angle_to(&step) - 0.1).abs() < 1.0e-4);
        assert_eq!(rotate_towards(from, to, 10.0), to);
    }
}
