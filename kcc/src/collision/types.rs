/*!
Core collision types and math aliases shared by the collision submodules.

This module intentionally contains no algorithms. It defines the data types
exchanged between:
- the collision world backend (overlaps, sweeps, penetration, rays)
- the capsule queries built on top of it
- the movement loops (hit records consumed by walking, falling and stepping)

Notes
- Everything is world space, meters.
- Colliders are referenced through the opaque [`ColliderId`]; the mover never
  sees backend shape types.
*/

use nalgebra as na;

/// Common math aliases for clarity and consistency.
pub type Vec3 = na::Vector3<f32>;
pub type Quat = na::UnitQuaternion<f32>;
pub type Iso = na::Isometry3<f32>;

/// Opaque collider handle issued by a [`CollisionWorld`](super::CollisionWorld) backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColliderId(pub u64);

/// World-space capsule given by the centers of its two hemispheres.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CapsuleSegment {
    /// Lower hemisphere center.
    pub a: Vec3,
    /// Upper hemisphere center.
    pub b: Vec3,
    pub radius: f32,
}

impl CapsuleSegment {
    #[inline]
    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            a: self.a + offset,
            b: self.b + offset,
            radius: self.radius,
        }
    }
}

/// One hit reported by a capsule sweep or a line trace.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeHit {
    pub collider: ColliderId,
    /// Distance travelled along the cast direction before contact.
    pub distance: f32,
    /// World-space contact point on the hit collider.
    pub point: Vec3,
    /// World-space surface normal, pointing back toward the caster.
    pub normal: Vec3,
}

/// Minimum translation that separates the capsule from a collider.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Penetration {
    /// Unit push-out direction.
    pub direction: Vec3,
    /// Depth along `direction`.
    pub distance: f32,
}

/// Result of one swept move, floor sweep or line trace.
///
/// `time` is in [0, 1] and only meaningful when `blocking` is set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitRecord {
    pub blocking: bool,
    pub start_penetrating: bool,
    pub time: f32,
    /// Capsule location at the time of impact.
    pub location: Vec3,
    pub point: Vec3,
    pub normal: Vec3,
    pub trace_start: Vec3,
    pub trace_end: Vec3,
    pub collider: Option<ColliderId>,
}

impl HitRecord {
    /// A non-blocking record for a trace from `start` to `end`, positioned at `time`.
    pub fn miss(start: Vec3, end: Vec3, time: f32) -> Self {
        Self {
            blocking: false,
            start_penetrating: false,
            time,
            location: start + (end - start) * time,
            point: Vec3::zeros(),
            normal: Vec3::zeros(),
            trace_start: start,
            trace_end: end,
            collider: None,
        }
    }

    /// Blocking and not penetrating at the start of the trace.
    #[inline]
    pub fn is_valid_blocking_hit(&self) -> bool {
        self.blocking && !self.start_penetrating
    }
}

impl Default for HitRecord {
    fn default() -> Self {
        Self::miss(Vec3::zeros(), Vec3::zeros(), 1.0)
    }
}
