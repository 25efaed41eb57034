use super::types::{CapsuleSegment, ColliderId, Penetration, ShapeHit, Vec3};

/// Query surface the mover needs from a collision backend.
///
/// Implementations decide which colliders are eligible. The mover expects:
/// - its own collider (if the backend has one) is never reported,
/// - colliders attached to non-kinematic dynamic bodies are woken up and skipped
///   by `overlap_capsule` and `sweep_capsule`,
/// - a failed or unsupported narrow-phase query reports "no obstruction".
pub trait CollisionWorld {
    /// Colliders intersecting `capsule`.
    fn overlap_capsule(&mut self, capsule: &CapsuleSegment) -> Vec<ColliderId>;

    /// Every collider `capsule` touches while translating along the unit `direction`
    /// for at most `max_distance`, in no particular order.
    fn sweep_capsule(
        &mut self,
        capsule: &CapsuleSegment,
        direction: Vec3,
        max_distance: f32,
    ) -> Vec<ShapeHit>;

    /// Push-out needed to separate `capsule` from `collider`, if they overlap.
    fn compute_penetration(
        &self,
        capsule: &CapsuleSegment,
        collider: ColliderId,
    ) -> Option<Penetration>;

    /// Closest collider hit by the segment `start..end`.
    fn line_trace(&self, start: Vec3, end: Vec3) -> Option<ShapeHit>;
}
