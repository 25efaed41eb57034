/*!
Character capsule shape and the swept queries built on it.

The capsule is described in the character's local frame with its origin at the
feet: `center_offset` is the height of the capsule center above the origin.

Queries
- `overlap`: colliders touching the (optionally inflated) capsule at a pose.
- `sweep`: every hit along a translation, sorted by distance. The cast starts
  `sweep_back_offset` behind the start pose so touching contacts are still reported.
- `floor_sweep`: closest hit of a downward sweep, as a [`HitRecord`].
- `line_trace`: closest hit along a segment, as a [`HitRecord`].
*/

use thiserror::Error;

use super::types::{CapsuleSegment, ColliderId, HitRecord, Quat, ShapeHit, Vec3};
use super::world::CollisionWorld;
use crate::constants::CAPSULE_HEIGHT_MARGIN;
use crate::settings::Tolerances;
use crate::utils::{planar, up};

#[derive(Debug, Error, PartialEq)]
pub enum CapsuleError {
    #[error("capsule radius must be positive and finite, got {0}")]
    InvalidRadius(f32),
    #[error("capsule height {height} must be at least twice the radius plus {margin} (radius {radius})")]
    TooShort { height: f32, radius: f32, margin: f32 },
    #[error("capsule center offset must be finite, got {0}")]
    InvalidCenterOffset(f32),
}

/// Upright capsule with its local origin at the feet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Capsule {
    radius: f32,
    height: f32,
    center_offset: f32,
}

impl Capsule {
    /// Build a capsule, clamping the height to at least `2 * radius + 0.01`.
    pub fn new(radius: f32, height: f32, center_offset: f32) -> Self {
        let radius = radius.max(0.0);
        Self {
            radius,
            height: height.max(radius * 2.0 + CAPSULE_HEIGHT_MARGIN),
            center_offset,
        }
    }

    /// Build a capsule, refusing dimensions `new` would have to clamp.
    pub fn try_new(radius: f32, height: f32, center_offset: f32) -> Result<Self, CapsuleError> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(CapsuleError::InvalidRadius(radius));
        }
        if !height.is_finite() || height < radius * 2.0 + CAPSULE_HEIGHT_MARGIN {
            return Err(CapsuleError::TooShort {
                height,
                radius,
                margin: CAPSULE_HEIGHT_MARGIN,
            });
        }
        if !center_offset.is_finite() {
            return Err(CapsuleError::InvalidCenterOffset(center_offset));
        }
        Ok(Self::new(radius, height, center_offset))
    }

    /// Change the dimensions; the same clamp as [`Capsule::new`] applies.
    pub fn resize(&mut self, radius: f32, height: f32, center_offset: f32) {
        *self = Self::new(radius, height, center_offset);
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.height
    }

    #[inline]
    pub fn center_offset(&self) -> f32 {
        self.center_offset
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        Vec3::new(0.0, self.center_offset, 0.0)
    }

    #[inline]
    pub fn bottom(&self) -> Vec3 {
        Vec3::new(0.0, self.center_offset - self.height * 0.5, 0.0)
    }

    #[inline]
    pub fn top(&self) -> Vec3 {
        Vec3::new(0.0, self.center_offset + self.height * 0.5, 0.0)
    }

    /// Center of the lower hemisphere.
    #[inline]
    pub fn inner_bottom(&self) -> Vec3 {
        self.bottom() + Vec3::new(0.0, self.radius, 0.0)
    }

    /// Center of the upper hemisphere.
    #[inline]
    pub fn inner_top(&self) -> Vec3 {
        self.top() - Vec3::new(0.0, self.radius, 0.0)
    }

    /// World-space segment at a pose, grown by `inflate` in every direction.
    pub fn segment(&self, position: Vec3, rotation: Quat, inflate: f32) -> CapsuleSegment {
        let axis = rotation * up();
        CapsuleSegment {
            a: position + rotation * self.inner_bottom() - axis * inflate,
            b: position + rotation * self.inner_top() + axis * inflate,
            radius: self.radius + inflate,
        }
    }

    /// Colliders overlapping the capsule at the given pose.
    pub fn overlap<W: CollisionWorld + ?Sized>(
        &self,
        world: &mut W,
        position: Vec3,
        rotation: Quat,
        inflate: f32,
    ) -> Vec<ColliderId> {
        world.overlap_capsule(&self.segment(position, rotation, inflate))
    }

    /// Hits along `start..end`, sorted by ascending distance.
    ///
    /// Distances are measured from the backed-off start, so a contact exactly at
    /// `start` reports `sweep_back_offset`. Zero-distance hits overlap before the
    /// backed-off start and are dropped.
    pub fn sweep<W: CollisionWorld + ?Sized>(
        &self,
        world: &mut W,
        start: Vec3,
        end: Vec3,
        rotation: Quat,
        inflate: f32,
        tolerances: &Tolerances,
    ) -> Vec<ShapeHit> {
        let delta = end - start;
        let distance = delta.norm();
        let Some(direction) = delta.try_normalize(1.0e-8) else {
            return Vec::new();
        };
        let back = tolerances.sweep_back_offset;
        let segment = self.segment(start - direction * back, rotation, inflate);

        let mut hits: Vec<ShapeHit> = world
            .sweep_capsule(&segment, direction, distance + back)
            .into_iter()
            .filter(|h| h.distance > 0.0)
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    /// Closest hit of a sweep from `start` to `end`, or `None` when nothing is in the way.
    ///
    /// The returned record is start-penetrating when the contact lies within the back offset.
    pub fn floor_sweep<W: CollisionWorld + ?Sized>(
        &self,
        world: &mut W,
        start: Vec3,
        end: Vec3,
        rotation: Quat,
        tolerances: &Tolerances,
    ) -> Option<HitRecord> {
        let delta = end - start;
        let total = delta.norm();
        let direction = delta.try_normalize(1.0e-8)?;
        let back = tolerances.sweep_back_offset;
        let segment = self.segment(start - direction * back, rotation, 0.0);

        let closest = world
            .sweep_capsule(&segment, direction, total + back)
            .into_iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))?;

        let distance = (closest.distance - back).max(0.0);
        let time = if total > 0.0 { (distance / total).min(1.0) } else { 0.0 };
        Some(HitRecord {
            blocking: true,
            start_penetrating: distance <= 0.0,
            time,
            location: start + delta * time,
            point: closest.point,
            normal: closest.normal,
            trace_start: start,
            trace_end: end,
            collider: Some(closest.collider),
        })
    }
}

/// Closest hit along `start..end`.
pub fn line_trace<W: CollisionWorld + ?Sized>(world: &W, start: Vec3, end: Vec3) -> Option<HitRecord> {
    let total = (end - start).norm();
    let hit = world.line_trace(start, end)?;
    let time = if total > 0.0 { (hit.distance / total).clamp(0.0, 1.0) } else { 0.0 };
    Some(HitRecord {
        blocking: true,
        start_penetrating: false,
        time,
        location: start + (end - start) * time,
        point: hit.point,
        normal: hit.normal,
        trace_start: start,
        trace_end: end,
        collider: Some(hit.collider),
    })
}

/// Horizontal distance between a hit's contact point and the capsule axis.
#[inline]
pub fn planar_contact_offset(hit: &HitRecord) -> f32 {
    planar(hit.point - hit.location).norm()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_follow_dimensions() {
        let c = Capsule::new(0.5, 2.0, 1.0);
        assert!((c.bottom().y - 0.0).abs() < 1.0e-6);
        assert!((c.top().y - 2.0).abs() < 1.0e-6);
        assert!(((c.bottom() + Vec3::new(0.0, c.radius(), 0.0)) - c.inner_bottom()).norm() < 1.0e-6);
        assert!(((c.top() - Vec3::new(0.0, c.radius(), 0.0)) - c.inner_top()).norm() < 1.0e-6);
    }

    #[test]
    fn resize_clamps_height() {
        let mut c = Capsule::new(0.5, 2.0, 1.0);
        c.resize(0.6, 0.5, 0.6);
        assert!((c.height() - 1.21).abs() < 1.0e-6);
        assert!((c.inner_top().y - c.inner_bottom().y - 0.01).abs() < 1.0e-5);
    }

    #[test]
    fn try_new_rejects_bad_dimensions() {
        assert_eq!(Capsule::try_new(0.0, 2.0, 1.0), Err(CapsuleError::InvalidRadius(0.0)));
        assert!(matches!(
            Capsule::try_new(0.5, 1.0, 0.5),
            Err(CapsuleError::TooShort { .. })
        ));
        assert!(Capsule::try_new(0.5, 2.0, f32::NAN).is_err());
        assert!(Capsule::try_new(0.5, 2.0, 1.0).is_ok());
    }

    #[test]
    fn segment_is_inflated_along_axis() {
        let c = Capsule::new(0.5, 2.0, 1.0);
        let seg = c.segment(Vec3::new(1.0, 0.0, 0.0), Quat::identity(), 0.1);
        assert!((seg.a - Vec3::new(1.0, 0.4, 0.0)).norm() < 1.0e-6);
        assert!((seg.b - Vec3::new(1.0, 1.6, 0.0)).norm() < 1.0e-6);
        assert!((seg.radius - 0.6).abs() < 1.0e-6);
    }
}
