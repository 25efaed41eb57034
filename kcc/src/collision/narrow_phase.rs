//! Thin wrappers over parry narrow-phase queries for a world-space capsule segment.
//!
//! Every wrapper treats an unsupported shape pair as "no contact".

use nalgebra as na;
use rapier3d::parry::{
    query::{self, ShapeCastOptions},
    shape::{self as pshape, Shape},
};

use super::types::{CapsuleSegment, Iso, Penetration, Vec3};

/// Contact found by [`cast_capsule`], in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepContact {
    pub distance: f32,
    pub point: Vec3,
    pub normal: Vec3,
}

/// Build a parry capsule centered on the segment midpoint, plus its pose.
///
/// Keeping the shape local to its midpoint avoids losing precision far from the origin.
fn capsule_shape(capsule: &CapsuleSegment) -> (Iso, pshape::Capsule) {
    let center = (capsule.a + capsule.b) * 0.5;
    let shape = pshape::Capsule::new(
        na::Point3::from(capsule.a - center),
        na::Point3::from(capsule.b - center),
        capsule.radius,
    );
    (Iso::translation(center.x, center.y, center.z), shape)
}

/// Cast `capsule` along the unit `direction` against a shape at `shape_iso`.
///
/// Shapes already overlapping at the start report a zero distance.
pub fn cast_capsule(
    capsule: &CapsuleSegment,
    direction: Vec3,
    max_distance: f32,
    shape: &dyn Shape,
    shape_iso: &Iso,
) -> Option<SweepContact> {
    let (capsule_iso, capsule_shape) = capsule_shape(capsule);

    let mut opts = ShapeCastOptions::with_max_time_of_impact(max_distance);
    opts.stop_at_penetration = true;
    opts.compute_impact_geometry_on_penetration = true;

    let hit = query::cast_shapes(
        &capsule_iso,
        &direction,
        &capsule_shape as &dyn Shape,
        shape_iso,
        &Vec3::zeros(),
        shape,
        opts,
    )
    .ok()??;

    // Surface normal of the obstacle, facing the capsule.
    let normal = -(capsule_iso * hit.normal1.into_inner());
    let point = shape_iso * hit.witness2;
    Some(SweepContact {
        distance: hit.time_of_impact,
        point: point.coords,
        normal,
    })
}

/// Minimum translation separating `capsule` from the shape, if they overlap.
pub fn capsule_penetration(
    capsule: &CapsuleSegment,
    shape: &dyn Shape,
    shape_iso: &Iso,
) -> Option<Penetration> {
    if let Some(half_space) = shape.as_shape::<pshape::HalfSpace>() {
        return half_space_penetration(capsule, half_space, shape_iso);
    }

    let (capsule_iso, capsule_shape) = capsule_shape(capsule);
    let contact = query::contact(&capsule_iso, &capsule_shape, shape_iso, shape, 0.0).ok()??;
    if contact.dist >= 0.0 {
        return None;
    }
    Some(Penetration {
        direction: -contact.normal1.into_inner(),
        distance: -contact.dist,
    })
}

/// Depth of the capsule's lowest point below the plane, pushed out along the plane normal.
fn half_space_penetration(
    capsule: &CapsuleSegment,
    half_space: &pshape::HalfSpace,
    shape_iso: &Iso,
) -> Option<Penetration> {
    let normal = shape_iso * half_space.normal.into_inner();
    let origin = shape_iso.translation.vector;
    let deepest = (capsule.a - origin)
        .dot(&normal)
        .min((capsule.b - origin).dot(&normal))
        - capsule.radius;
    (deepest < 0.0).then(|| Penetration {
        direction: normal,
        distance: -deepest,
    })
}

/// Whether `capsule` intersects the shape.
pub fn capsule_intersects(capsule: &CapsuleSegment, shape: &dyn Shape, shape_iso: &Iso) -> bool {
    let (capsule_iso, capsule_shape) = capsule_shape(capsule);
    query::intersection_test(&capsule_iso, &capsule_shape, shape_iso, shape).unwrap_or(false)
}
