use crate::collision::{ColliderId, CollisionWorld, Penetration, Quat, Vec3};
use crate::utils::{is_nearly_zero, safe_normalize, up};

use super::CharacterMovement;

/// One push-out applied by penetration resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Overlap {
    /// Direction the capsule was pushed.
    pub normal: Vec3,
    pub collider: ColliderId,
}

/// Bounded list of the overlaps resolved during the last resolution pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlapSet {
    entries: Vec<Overlap>,
    capacity: usize,
}

impl OverlapSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Overlap> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Overlap] {
        &self.entries
    }

    pub(crate) fn reset(&mut self) {
        self.entries.clear();
    }

    /// Record an overlap; returns false once the set is full.
    pub(crate) fn push(&mut self, overlap: Overlap) -> bool {
        if self.entries.len() >= self.capacity {
            return false;
        }
        self.entries.push(overlap);
        true
    }
}

impl CharacterMovement {
    /// Direction to resolve an obstruction along.
    ///
    /// While standing on walkable ground, an unwalkable push is redirected along the
    /// ground plane so the character is not lifted onto walls.
    pub(crate) fn obstruction_normal(&self, normal: Vec3, stable: bool) -> Vec3 {
        if stable || !self.is_moving_on_ground() || !self.current_ground.is_walkable() {
            return normal;
        }
        let ground_normal = self.current_ground.hit.normal;
        let redirected = safe_normalize(ground_normal.cross(&normal).cross(&up()));
        if is_nearly_zero(redirected) {
            normal
        } else {
            redirected
        }
    }

    /// Offset that moves the capsule at `position` out of everything it overlaps.
    ///
    /// Each pass resolves the first overlapping collider that actually penetrates;
    /// colliders that only touch are skipped. Overlap that persists after
    /// `max_depenetration_iterations` passes is accepted.
    pub fn resolve_penetration<W: CollisionWorld + ?Sized>(
        &mut self,
        world: &mut W,
        position: Vec3,
        rotation: Quat,
    ) -> Vec3 {
        self.overlaps.reset();
        let collision_offset = self.settings.tolerances.collision_offset;
        let mut resolved = position;

        for _ in 0..self.settings.max_depenetration_iterations {
            let Some((collider, penetration)) = self.first_penetration(world, resolved, rotation)
            else {
                return resolved - position;
            };

            let stable = self.is_stable_on_normal(penetration.direction);
            let direction = self.obstruction_normal(penetration.direction, stable);
            resolved += direction * (penetration.distance + collision_offset);
            self.overlaps.push(Overlap {
                normal: direction,
                collider,
            });
        }

        if self.first_penetration(world, resolved, rotation).is_some() {
            log::warn!(
                "penetration unresolved after {} passes at {:?}",
                self.settings.max_depenetration_iterations,
                resolved
            );
        }
        resolved - position
    }

    fn first_penetration<W: CollisionWorld + ?Sized>(
        &self,
        world: &mut W,
        position: Vec3,
        rotation: Quat,
    ) -> Option<(ColliderId, Penetration)> {
        let overlapping = self.capsule.overlap(world, position, rotation, 0.0);
        let segment = self.capsule.segment(position, rotation, 0.0);
        overlapping
            .into_iter()
            .find_map(|collider| Some((collider, world.compute_penetration(&segment, collider)?)))
    }
}
