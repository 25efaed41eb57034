//! Query bounds handed to the BVH broad phase: capsule and swept-capsule AABBs.

use nalgebra as na;
use rapier3d::parry::bounding_volume::{Aabb, BoundingVolume};

use super::types::{CapsuleSegment, Vec3};

/// Bounds of a world-space capsule segment.
pub fn capsule_aabb(capsule: &CapsuleSegment) -> Aabb {
    let r = Vec3::repeat(capsule.radius.max(0.0));
    let lo = capsule.a.inf(&capsule.b) - r;
    let hi = capsule.a.sup(&capsule.b) + r;
    Aabb {
        mins: na::Point3::from(lo),
        maxs: na::Point3::from(hi),
    }
}

/// Bounds covering `capsule` over the whole translation `motion`, inflated by `skin`.
pub fn swept_capsule_aabb(capsule: &CapsuleSegment, motion: Vec3, skin: f32) -> Aabb {
    let start = capsule_aabb(capsule);
    let end = capsule_aabb(&capsule.translated(motion));
    aabb_inflate(&aabb_union(&start, &end), skin)
}

/// Union of two AABBs.
pub fn aabb_union(a: &Aabb, b: &Aabb) -> Aabb {
    a.merged(b)
}

/// Inflate an AABB by `margin` on all sides; non-positive margins leave it unchanged.
pub fn aabb_inflate(a: &Aabb, margin: f32) -> Aabb {
    if margin <= 0.0 {
        *a
    } else {
        a.loosened(margin)
    }
}
