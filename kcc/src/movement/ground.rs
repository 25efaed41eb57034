/*!
Ground finding.

The floor under the character is found with a downward sweep of a slightly
shrunk capsule, falling back to a line trace from the capsule center when the
sweep only touches an unwalkable edge. A walkable result keeps the capsule
hovering inside the `[min_floor_distance, max_floor_distance]` band.

Notes
- A contact is "within edge tolerance" when its horizontal offset from the
  capsule axis is below `max(edge_reject, radius - edge_reject)`. Contacts on the
  very rim of the hemisphere report unreliable normals.
- Distances are measured from the capsule bottom to the floor.
*/

use crate::collision::capsule::{line_trace, planar_contact_offset};
use crate::collision::{Capsule, CollisionWorld, HitRecord, Vec3};
use crate::constants::SMALL_NUMBER;
use crate::utils::{planar, safe_normalize, up};

use super::CharacterMovement;

/// Height of the shrunk capsule relative to the half-cylinder for the first sweep.
const SHRINK_SCALE: f32 = 0.9;
/// Same, for the retry after an edge or penetrating contact.
const SHRINK_SCALE_OVERLAP: f32 = 0.1;

/// Floor under the character.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GroundResult {
    pub is_blocking_hit: bool,
    pub is_walkable_floor: bool,
    /// The walkable verdict came from the line trace, not the sweep.
    pub is_line_trace: bool,
    /// Swept distance from the capsule bottom to the floor.
    pub floor_distance: f32,
    /// Line-traced distance from the capsule bottom to the floor.
    pub line_distance: f32,
    pub hit: HitRecord,
    /// Location this result was computed for.
    pub sampled_location: Vec3,
}

impl GroundResult {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn is_walkable(&self) -> bool {
        self.is_blocking_hit && self.is_walkable_floor
    }

    /// Distance that matters for hovering: the line distance when the line trace decided.
    #[inline]
    pub fn distance_to_floor(&self) -> f32 {
        if self.is_line_trace {
            self.line_distance
        } else {
            self.floor_distance
        }
    }

    pub(crate) fn set_from_sweep(&mut self, hit: HitRecord, floor_distance: f32, walkable: bool) {
        self.is_blocking_hit = hit.is_valid_blocking_hit();
        self.is_walkable_floor = walkable;
        self.is_line_trace = false;
        self.floor_distance = floor_distance;
        self.line_distance = 0.0;
        self.hit = hit;
    }

    /// Let a line hit decide walkability while keeping the sweep's contact data.
    pub(crate) fn set_from_line_trace(
        &mut self,
        line_hit: &HitRecord,
        floor_distance: f32,
        line_distance: f32,
        walkable: bool,
    ) {
        if !(self.hit.blocking && line_hit.blocking) {
            return;
        }
        self.hit.blocking = line_hit.blocking;
        self.hit.start_penetrating = line_hit.start_penetrating;
        self.is_blocking_hit = true;
        self.is_line_trace = true;
        self.is_walkable_floor = walkable;
        self.floor_distance = floor_distance;
        self.line_distance = line_distance;
    }
}

impl CharacterMovement {
    /// Whether a surface with this normal can be stood on (inclusive of the limit angle).
    pub fn is_stable_on_normal(&self, normal: Vec3) -> bool {
        let n = safe_normalize(normal);
        if n == Vec3::zeros() {
            return false;
        }
        n.dot(&up()) >= self.settings.walkable_floor_y() - self.settings.tolerances.walkable_epsilon
    }

    /// Whether the contact lies far enough from the rim of a capsule of `radius`.
    pub fn is_within_edge_tolerance(&self, hit: &HitRecord, radius: f32) -> bool {
        let reject = self.settings.sweep_edge_reject_distance;
        let reduced = (radius - reject).max(reject);
        planar_contact_offset(hit) < reduced
    }

    /// Find the floor below `position`.
    ///
    /// `allow_cached` reuses the current ground when it is walkable and was computed at
    /// exactly this position. A valid downward `down_sweep` that barely drifted
    /// horizontally is reused instead of sweeping again.
    pub fn find_ground<W: CollisionWorld + ?Sized>(
        &self,
        world: &mut W,
        position: Vec3,
        allow_cached: bool,
        down_sweep: Option<&HitRecord>,
    ) -> GroundResult {
        if allow_cached
            && self.current_ground.is_walkable()
            && self.current_ground.sampled_location == position
        {
            return self.current_ground;
        }

        let max_floor = self.settings.max_floor_distance;
        let height_check_adjust = if self.is_moving_on_ground() {
            max_floor + SMALL_NUMBER
        } else {
            -max_floor
        };
        let sweep_distance = max_floor.max(self.settings.max_step_height + height_check_adjust);
        let line_distance = sweep_distance;

        self.compute_ground_dist(
            world,
            position,
            line_distance,
            sweep_distance,
            self.capsule.radius(),
            down_sweep,
        )
    }

    pub(crate) fn compute_ground_dist<W: CollisionWorld + ?Sized>(
        &self,
        world: &mut W,
        location: Vec3,
        line_distance: f32,
        sweep_distance: f32,
        sweep_radius: f32,
        down_sweep: Option<&HitRecord>,
    ) -> GroundResult {
        let mut out = GroundResult {
            sampled_location: location,
            ..Default::default()
        };
        let tolerances = &self.settings.tolerances;
        let rotation = self.transient_rotation;
        let max_penetration_adjust = self.settings.max_floor_distance.max(self.capsule.radius());
        let mut skip_sweep = false;

        if let Some(down) = down_sweep.filter(|h| h.is_valid_blocking_hit()) {
            let downward = down.trace_start.y > down.trace_end.y;
            let drift = planar(down.trace_start - down.trace_end).norm();
            if downward
                && drift <= tolerances.max_planar_drift
                && self.is_within_edge_tolerance(down, self.capsule.radius())
            {
                skip_sweep = true;
                let walkable = self.is_stable_on_normal(down.normal);
                let floor_distance = (location.y - down.location.y).max(0.0);
                out.set_from_sweep(*down, floor_distance, walkable);
                if walkable {
                    return out;
                }
            }
        }

        if !skip_sweep && sweep_distance > 0.0 && sweep_radius > 0.0 {
            let half_cylinder = self.capsule.height() * 0.5 - self.capsule.radius();
            let mut shrink_height = half_cylinder * (1.0 - SHRINK_SCALE);
            let mut trace_distance = sweep_distance + shrink_height;
            let mut shrunk = Capsule::new(
                sweep_radius,
                self.capsule.height() - shrink_height * 2.0,
                self.capsule.center_offset(),
            );
            let mut hit = shrunk.floor_sweep(
                world,
                location,
                location - up() * trace_distance,
                rotation,
                tolerances,
            );

            if let Some(first) = &hit {
                if first.start_penetrating || !self.is_within_edge_tolerance(first, shrunk.radius()) {
                    let radius = (sweep_radius
                        - self.settings.sweep_edge_reject_distance
                        - SMALL_NUMBER)
                        .max(0.0);
                    if radius > SMALL_NUMBER {
                        shrink_height = half_cylinder * (1.0 - SHRINK_SCALE_OVERLAP);
                        trace_distance = sweep_distance + shrink_height;
                        shrunk.resize(
                            radius,
                            (radius * 2.0).max(self.capsule.height() - shrink_height * 2.0),
                            self.capsule.center_offset(),
                        );
                        hit = shrunk.floor_sweep(
                            world,
                            location,
                            location - up() * trace_distance,
                            rotation,
                            tolerances,
                        );
                    }
                }
            }

            if let Some(hit) = hit {
                let swept = (hit.time * trace_distance - shrink_height).max(-max_penetration_adjust);
                out.set_from_sweep(hit, swept, false);
                if hit.is_valid_blocking_hit()
                    && self.is_stable_on_normal(hit.normal)
                    && swept <= sweep_distance
                {
                    out.is_walkable_floor = true;
                    return out;
                }
            }
        }

        if !out.hit.blocking {
            out.floor_distance = sweep_distance;
            return out;
        }

        if line_distance > 0.0 {
            let shrink_height = self.capsule.height() * 0.5;
            let start = location + rotation * self.capsule.center();
            let trace_distance = line_distance + shrink_height;
            if let Some(line_hit) = line_trace(world, start, start - up() * trace_distance) {
                if line_hit.time > 0.0 {
                    let line_result =
                        (line_hit.time * trace_distance - shrink_height).max(-max_penetration_adjust);
                    out.is_blocking_hit = true;
                    if line_result <= line_distance && self.is_stable_on_normal(line_hit.normal) {
                        let floor_distance = out.floor_distance;
                        out.set_from_line_trace(&line_hit, floor_distance, line_result, true);
                        return out;
                    }
                }
            }
        }

        out.is_walkable_floor = false;
        out
    }

    /// Move vertically so the floor distance returns to the middle of the hover band.
    pub(crate) fn adjust_floor_height<W: CollisionWorld + ?Sized>(&mut self, world: &mut W) {
        if !self.current_ground.is_walkable() {
            return;
        }
        let min = self.settings.min_floor_distance;
        let max = self.settings.max_floor_distance;

        let mut old_distance = self.current_ground.floor_distance;
        if self.current_ground.is_line_trace {
            if old_distance < min && self.current_ground.line_distance >= min {
                return;
            }
            old_distance = self.current_ground.line_distance;
        }
        if (min..=max).contains(&old_distance) {
            return;
        }

        let initial_y = self.transient_position.y;
        let move_distance = 0.5 * (min + max) - old_distance;
        let rotation = self.transient_rotation;
        let hit = self.safe_move(world, up() * move_distance, rotation, true);
        let achieved = self.transient_position.y - initial_y;
        let new_distance = old_distance + achieved;

        if hit.is_valid_blocking_hit() && move_distance < 0.0 && self.is_stable_on_normal(hit.normal) {
            self.current_ground.set_from_sweep(hit, new_distance.max(0.0), true);
        } else if self.current_ground.is_line_trace {
            self.current_ground.line_distance = new_distance;
            self.current_ground.floor_distance += achieved;
        } else {
            self.current_ground.floor_distance = new_distance;
        }
        self.current_ground.sampled_location = self.transient_position;
    }
}
