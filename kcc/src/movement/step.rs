/*!
Step-up: climb a low obstacle in three swept moves (up, forward, down).

The attempt runs as a transaction over the transient pose and the current ground.
Any rejection after the first move rolls all three back to the snapshot taken
before it.
*/

use std::fmt;

use crate::collision::{CollisionWorld, HitRecord, Quat, Vec3};
use crate::utils::{is_nearly_zero, planar, safe_normalize};

use super::{CharacterMovement, GroundResult};

/// Normals whose vertical component along the step side exceed this count as floors.
const MAX_STEP_SIDE_Y: f32 = 0.08;

/// Why a step-up attempt was abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepRejection {
    InvalidGravity,
    /// The obstacle touches the upper part of the capsule.
    HitAboveCapsule,
    /// The obstacle is at or below the floor the character stands on.
    HitBelowFloor,
    PenetratingUp,
    PenetratingForward,
    NoForwardProgress,
    PenetratingDown,
    /// The surface found when stepping down is higher than a step.
    TooHigh,
    /// The step-down contact lies on the rim of the capsule.
    LandingOnEdge,
    UnsteppableSurface,
    /// Stepping up onto something that is not ground.
    NoGroundAfterStep,
}

impl fmt::Display for StepRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            StepRejection::InvalidGravity => "gravity direction is zero",
            StepRejection::HitAboveCapsule => "obstacle above the lower hemisphere",
            StepRejection::HitBelowFloor => "obstacle below the floor",
            StepRejection::PenetratingUp => "penetrating while stepping up",
            StepRejection::PenetratingForward => "penetrating while stepping forward",
            StepRejection::NoForwardProgress => "no forward progress",
            StepRejection::PenetratingDown => "penetrating while stepping down",
            StepRejection::TooHigh => "step too high",
            StepRejection::LandingOnEdge => "landing on an edge",
            StepRejection::UnsteppableSurface => "surface cannot be stepped on",
            StepRejection::NoGroundAfterStep => "no ground after stepping",
        };
        f.write_str(reason)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepOutcome {
    /// The step was taken. `ground` is the floor validated by the step-down, if any.
    Stepped { ground: Option<GroundResult> },
    Rejected(StepRejection),
}

impl StepOutcome {
    #[inline]
    pub fn is_stepped(&self) -> bool {
        matches!(self, StepOutcome::Stepped { .. })
    }
}

/// State restored when a step-up is rolled back.
#[derive(Clone, Copy, Debug)]
struct StepSnapshot {
    position: Vec3,
    rotation: Quat,
    ground: GroundResult,
}

impl CharacterMovement {
    /// Whether a blocking hit is worth a step-up attempt.
    pub fn can_step_up(&self, hit: &HitRecord) -> bool {
        hit.is_valid_blocking_hit() && !self.is_falling()
    }

    fn snapshot(&self) -> StepSnapshot {
        StepSnapshot {
            position: self.transient_position,
            rotation: self.transient_rotation,
            ground: self.current_ground,
        }
    }

    fn rollback(&mut self, snapshot: StepSnapshot, reason: StepRejection) -> StepOutcome {
        self.transient_position = snapshot.position;
        self.transient_rotation = snapshot.rotation;
        self.current_ground = snapshot.ground;
        log::debug!("step-up rolled back: {reason}");
        StepOutcome::Rejected(reason)
    }

    /// Try to move `delta` over the obstacle that produced `hit`.
    pub fn step_up<W: CollisionWorld + ?Sized>(
        &mut self,
        world: &mut W,
        gravity_dir: Vec3,
        delta: Vec3,
        hit: &HitRecord,
    ) -> StepOutcome {
        let gravity_dir = safe_normalize(gravity_dir);
        if is_nearly_zero(gravity_dir) {
            return StepOutcome::Rejected(StepRejection::InvalidGravity);
        }

        let max_step = self.settings.max_step_height;
        let max_floor = self.settings.max_floor_distance;
        let radius = self.capsule.radius();
        let old_location = self.transient_position;
        let rotation = self.transient_rotation;

        let impact_y = hit.point.y;
        let hemisphere_top = old_location.y + (rotation * self.capsule.inner_top()).y;
        if impact_y > hemisphere_top {
            return StepOutcome::Rejected(StepRejection::HitAboveCapsule);
        }

        let mut initial_floor_base_y = old_location.y;
        let mut floor_point_y = initial_floor_base_y;
        let mut travel_up = max_step;
        let mut travel_down = max_step;
        if self.is_moving_on_ground() && self.current_ground.is_walkable() {
            let floor_distance = self.current_ground.distance_to_floor().max(0.0);
            initial_floor_base_y -= floor_distance;
            travel_up = (travel_up - floor_distance).max(0.0);
            travel_down = max_step + max_floor * 2.0;

            let hit_vertical_face = !self.is_within_edge_tolerance(hit, radius);
            if !self.current_ground.is_line_trace && !hit_vertical_face {
                floor_point_y = self.current_ground.hit.point.y;
            } else {
                floor_point_y -= self.current_ground.floor_distance;
            }
        }
        if impact_y <= initial_floor_base_y {
            return StepOutcome::Rejected(StepRejection::HitBelowFloor);
        }

        let step_side_y = -hit.normal.dot(&gravity_dir);
        let snapshot = self.snapshot();

        let up_hit = self.safe_move(world, -gravity_dir * travel_up, rotation, true);
        if up_hit.start_penetrating {
            return self.rollback(snapshot, StepRejection::PenetratingUp);
        }

        let before_forward = self.transient_position;
        let forward_hit = self.safe_move(world, delta, rotation, true);
        if forward_hit.blocking {
            if forward_hit.start_penetrating {
                return self.rollback(snapshot, StepRejection::PenetratingForward);
            }
            let forward_time = forward_hit.time;
            let slide = self.slide_along_surface(
                world,
                delta,
                1.0 - forward_time,
                forward_hit.normal,
                &forward_hit,
            );
            if forward_time == 0.0 && slide.percent == 0.0 {
                return self.rollback(snapshot, StepRejection::NoForwardProgress);
            }
        }
        let progress = planar(self.transient_position - before_forward).norm();
        if progress <= self.settings.tolerances.min_step_progress {
            return self.rollback(snapshot, StepRejection::NoForwardProgress);
        }

        let down_hit = self.safe_move(world, gravity_dir * travel_down, rotation, true);
        if down_hit.start_penetrating {
            return self.rollback(snapshot, StepRejection::PenetratingDown);
        }

        let mut ground = None;
        if down_hit.is_valid_blocking_hit() {
            let delta_y = down_hit.point.y - floor_point_y;
            if delta_y > max_step {
                return self.rollback(snapshot, StepRejection::TooHigh);
            }

            if !self.is_within_edge_tolerance(&down_hit, radius) {
                return self.rollback(snapshot, StepRejection::LandingOnEdge);
            }

            if delta_y > 0.0 && !self.can_step_up(&down_hit) {
                return self.rollback(snapshot, StepRejection::UnsteppableSurface);
            }

            let found = self.find_ground(world, self.transient_position, false, Some(&down_hit));
            if down_hit.location.y > old_location.y
                && !found.is_blocking_hit
                && step_side_y < MAX_STEP_SIDE_Y
            {
                return self.rollback(snapshot, StepRejection::NoGroundAfterStep);
            }
            ground = Some(found);
        }

        log::trace!(
            "stepped from {:?} to {:?}",
            old_location,
            self.transient_position
        );
        StepOutcome::Stepped { ground }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::Capsule;
    use crate::movement::MovementMode;
    use crate::rapier_world::{ColliderShapeDef, RapierQueryWorld, WorldStaticDef};
    use crate::settings::MovementSettings;
    use crate::utils::up;
    use rapier3d::na::{UnitQuaternion, Vector3};

    fn floor() -> WorldStaticDef {
        WorldStaticDef {
            id: 0,
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            shape: ColliderShapeDef::Plane {
                offset_along_normal: 0.0,
            },
        }
    }

    /// A box whose near face is at x = 1 and whose top is at `height`.
    fn block(height: f32) -> WorldStaticDef {
        WorldStaticDef {
            id: 1,
            translation: Vector3::new(3.0, height * 0.5, 0.0),
            rotation: UnitQuaternion::identity(),
            shape: ColliderShapeDef::Cuboid {
                half_extents: Vector3::new(2.0, height * 0.5, 5.0),
            },
        }
    }

    fn grounded_walker(world: &mut RapierQueryWorld) -> CharacterMovement {
        let mut mover = CharacterMovement::new(MovementSettings::default(), Capsule::new(0.3, 1.8, 0.9));
        mover.mode = MovementMode::Walking;
        mover.set_position(Vec3::new(0.0, 0.02, 0.0));
        mover.current_ground = mover.find_ground(world, mover.transient_position(), false, None);
        assert!(mover.current_ground.is_walkable());
        mover
    }

    fn walk_into_block(mover: &mut CharacterMovement, world: &mut RapierQueryWorld) -> (Vec3, HitRecord) {
        let delta = Vec3::new(1.5, 0.0, 0.0);
        let hit = mover.safe_move(world, delta, Quat::identity(), true);
        assert!(hit.is_valid_blocking_hit());
        (delta * (1.0 - hit.time), hit)
    }

    #[test]
    fn climbs_a_low_step() {
        let mut world = RapierQueryWorld::build(vec![floor(), block(0.25)]);
        let mut mover = grounded_walker(&mut world);
        let (remaining, hit) = walk_into_block(&mut mover, &mut world);

        let outcome = mover.step_up(&mut world, -up(), remaining, &hit);
        let StepOutcome::Stepped { ground } = outcome else {
            panic!("expected a step, got {outcome:?}");
        };
        let ground = ground.expect("step-down should land on the block");
        assert!(ground.is_walkable());
        let y = mover.transient_position().y;
        assert!(y > 0.25 && y < 0.25 + 0.05, "y = {y}");
        assert!(mover.transient_position().x > 0.7);
    }

    #[test]
    fn steps_down_onto_a_rounded_curb_corner() {
        let mut world = RapierQueryWorld::build(vec![floor(), block(0.3)]);
        let mut mover = CharacterMovement::new(MovementSettings::default(), Capsule::new(0.5, 2.0, 1.0));
        mover.mode = MovementMode::Walking;
        mover.set_position(Vec3::new(0.0, 0.02, 0.0));
        mover.current_ground = mover.find_ground(&mut world, mover.transient_position(), false, None);

        // Stop just short of the corner so only a sliver of the move is left for the step.
        let delta = Vec3::new(0.56, 0.0, 0.0);
        let hit = mover.safe_move(&mut world, delta, Quat::identity(), true);
        assert!(hit.is_valid_blocking_hit());
        let remaining = delta * (1.0 - hit.time);
        let before = mover.transient_position();

        // The step-down rests the hemisphere on the corner, where the contact normal
        // is steeper than a walkable floor and faces back against the move.
        let outcome = mover.step_up(&mut world, -up(), remaining, &hit);
        let StepOutcome::Stepped { ground } = outcome else {
            panic!("expected a step, got {outcome:?}");
        };
        assert!(ground.is_some_and(|g| g.is_walkable()));
        assert!(mover.transient_position().x > before.x);
        assert!(mover.transient_position().y > before.y);
    }

    #[test]
    fn rejects_a_wall_and_restores_pose() {
        let mut world = RapierQueryWorld::build(vec![floor(), block(2.0)]);
        let mut mover = grounded_walker(&mut world);
        let (remaining, hit) = walk_into_block(&mut mover, &mut world);
        let before = mover.transient_position();
        let ground_before = mover.current_ground;

        let outcome = mover.step_up(&mut world, -up(), remaining, &hit);
        assert!(!outcome.is_stepped());
        assert_eq!(mover.transient_position(), before);
        assert_eq!(mover.current_ground, ground_before);
    }

    #[test]
    fn rejects_a_ledge_higher_than_a_step() {
        let mut world = RapierQueryWorld::build(vec![floor(), block(0.7)]);
        let mut mover = grounded_walker(&mut world);
        let (remaining, hit) = walk_into_block(&mut mover, &mut world);
        let before = mover.transient_position();

        let outcome = mover.step_up(&mut world, -up(), remaining, &hit);
        assert!(!outcome.is_stepped());
        assert_eq!(mover.transient_position(), before);
    }

    #[test]
    fn zero_gravity_is_rejected_without_moving() {
        let mut world = RapierQueryWorld::build(vec![floor(), block(0.25)]);
        let mut mover = grounded_walker(&mut world);
        let (remaining, hit) = walk_into_block(&mut mover, &mut world);
        let before = mover.transient_position();
        assert_eq!(
            mover.step_up(&mut world, Vec3::zeros(), remaining, &hit),
            StepOutcome::Rejected(StepRejection::InvalidGravity)
        );
        assert_eq!(mover.transient_position(), before);
    }

    #[test]
    fn falling_characters_do_not_step() {
        let mut mover = CharacterMovement::new(MovementSettings::default(), Capsule::new(0.3, 1.8, 0.9));
        let hit = HitRecord {
            blocking: true,
            ..Default::default()
        };
        mover.mode = MovementMode::Walking;
        assert!(mover.can_step_up(&hit));
        mover.mode = MovementMode::Falling;
        assert!(!mover.can_step_up(&hit));
    }
}
