/*!
Walking mode.

Each sub-step asks the provider for a planar velocity, moves along the current
ground (re-projecting onto ramps, stepping up or sliding on blocking hits), then
refreshes the ground. Losing walkable ground either starts a fall or, when
walking off ledges is disabled, reverts the sub-step.
*/

use crate::collision::{CollisionWorld, Vec3};
use crate::constants::SMALL_NUMBER;
use crate::intent::VelocityProvider;
use crate::utils::{planar, safe_normalize, up};

use super::{CharacterMovement, GroundResult, MovementMode, StepOutcome};

/// Squared length below which a sub-step delta is treated as no movement.
const ZERO_DELTA_SQUARED: f32 = 1.0e-16;

/// What [`CharacterMovement::move_along_ground`] found out on the way.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct GroundMove {
    /// A step-up succeeded and already set the velocity.
    pub stepped: bool,
    /// Ground validated by the step-up, if it computed one.
    pub ground: Option<GroundResult>,
}

impl CharacterMovement {
    /// Length of the next sub-step.
    ///
    /// Large remainders are halved (and capped at `max_simulation_time_step`) until the
    /// final iteration, which takes whatever is left.
    pub fn simulation_time_step(&self, remaining: f32, iterations: u32) -> f32 {
        let mut remaining = remaining;
        let max_step = self.settings.max_simulation_time_step;
        if remaining > max_step && iterations < self.settings.max_simulation_iterations {
            remaining = max_step.min(remaining * 0.5);
        }
        remaining.max(self.settings.tolerances.min_tick_time)
    }

    pub(crate) fn walking<W, P>(&mut self, world: &mut W, provider: &mut P, dt: f32, iterations: u32)
    where
        W: CollisionWorld + ?Sized,
        P: VelocityProvider + ?Sized,
    {
        let min_tick = self.settings.tolerances.min_tick_time;
        if dt < min_tick {
            return;
        }

        let mut iterations = iterations;
        let mut remaining = dt;
        while remaining >= min_tick
            && iterations < self.settings.max_simulation_iterations
            && self.is_moving_on_ground()
        {
            iterations += 1;
            let time_tick = self.simulation_time_step(remaining, iterations);
            remaining -= time_tick;

            let old_location = self.transient_position;
            let old_ground = self.current_ground;

            self.velocity.y = 0.0;
            self.velocity = provider.calc_velocity(
                self.velocity,
                time_tick,
                self.settings.ground_friction,
                false,
                self.settings.braking_deceleration_walking,
            );
            self.velocity.y = 0.0;

            let move_velocity = self.velocity;
            let delta = move_velocity * time_tick;
            let zero_delta = delta.norm_squared() < ZERO_DELTA_SQUARED;
            let mut ground_move = GroundMove::default();

            if zero_delta {
                remaining = 0.0;
            } else {
                ground_move = self.move_along_ground(world, move_velocity, time_tick);
            }

            self.current_ground = match ground_move.ground {
                Some(ground) => ground,
                None => self.find_ground(world, self.transient_position, zero_delta, None),
            };

            if !self.settings.can_walk_off_ledges && !self.current_ground.is_walkable() {
                let must_jump = zero_delta || provider.wants_jump();
                if must_jump
                    && self.check_fall(world, provider, delta, old_location, remaining, time_tick, iterations, true)
                {
                    return;
                }
                log::trace!("ledge at {:?}, reverting sub-step", self.transient_position);
                self.transient_position = old_location;
                self.current_ground = old_ground;
                remaining = 0.0;
                break;
            }

            if self.current_ground.is_walkable() {
                self.adjust_floor_height(world);
            } else if self.current_ground.hit.start_penetrating && remaining <= 0.0 {
                let offset = self.resolve_penetration(
                    world,
                    self.transient_position,
                    self.transient_rotation,
                );
                self.transient_position += offset;
            }

            if !self.current_ground.is_walkable() && !self.current_ground.hit.start_penetrating {
                let must_jump = zero_delta || provider.wants_jump();
                if self.check_fall(world, provider, delta, old_location, remaining, time_tick, iterations, must_jump) {
                    return;
                }
            }

            if self.is_moving_on_ground() && !ground_move.stepped && time_tick >= min_tick {
                self.velocity = (self.transient_position - old_location) / time_tick;
                self.maintain_horizontal_ground_velocity();
            }

            if (self.transient_position - old_location).norm() < SMALL_NUMBER {
                break;
            }
        }

        if self.is_moving_on_ground() {
            self.maintain_horizontal_ground_velocity();
        }
    }

    /// Keep the walking velocity horizontal, preserving speed unless configured otherwise.
    fn maintain_horizontal_ground_velocity(&mut self) {
        if self.velocity.y == 0.0 {
            return;
        }
        if self.settings.maintain_horizontal_ground_velocity {
            self.velocity.y = 0.0;
        } else {
            let speed = self.velocity.norm();
            self.velocity = safe_normalize(planar(self.velocity)) * speed;
        }
    }

    /// Move along the current ground with `velocity` for `dt` seconds.
    pub(crate) fn move_along_ground<W: CollisionWorld + ?Sized>(
        &mut self,
        world: &mut W,
        velocity: Vec3,
        dt: f32,
    ) -> GroundMove {
        let mut out = GroundMove::default();
        if !self.current_ground.is_walkable() {
            return out;
        }

        let delta = planar(velocity) * dt;
        let rotation = self.transient_rotation;
        let ground_hit = self.current_ground.hit;
        let along = self.ground_movement_delta(delta, &ground_hit, self.current_ground.is_line_trace);
        let mut hit = self.safe_move(world, along, rotation, true);

        if hit.start_penetrating {
            self.slide_along_surface(world, delta, 1.0, hit.normal, &hit);
            return out;
        }
        if !hit.is_valid_blocking_hit() {
            return out;
        }

        let mut percent_applied = hit.time;
        if hit.time > 0.0 && hit.normal.y > SMALL_NUMBER && self.is_stable_on_normal(hit.normal) {
            let initial_remaining = 1.0 - percent_applied;
            let ramp = self.ground_movement_delta(delta * initial_remaining, &hit, false);
            hit = self.safe_move(world, ramp, rotation, true);
            percent_applied = (percent_applied + hit.time * initial_remaining).clamp(0.0, 1.0);
        }

        if !hit.is_valid_blocking_hit() {
            return out;
        }

        if !self.can_step_up(&hit) {
            self.slide_along_surface(world, delta, 1.0 - percent_applied, hit.normal, &hit);
            return out;
        }

        let pre_step = self.transient_position;
        match self.step_up(world, -up(), delta * (1.0 - percent_applied), &hit) {
            StepOutcome::Rejected(_) => {
                self.slide_along_surface(world, delta, 1.0 - percent_applied, hit.normal, &hit);
            }
            StepOutcome::Stepped { ground } => {
                out.ground = ground;
                if !self.settings.maintain_horizontal_ground_velocity {
                    out.stepped = true;
                    let step_time = (1.0 - percent_applied) * dt;
                    if step_time >= SMALL_NUMBER {
                        self.velocity = (self.transient_position - pre_step) / step_time;
                        self.velocity.y = 0.0;
                    }
                }
            }
        }
        out
    }

    /// Leave the ground when allowed. Returns true when the character started falling.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn check_fall<W, P>(
        &mut self,
        world: &mut W,
        provider: &mut P,
        delta: Vec3,
        old_location: Vec3,
        remaining: f32,
        time_tick: f32,
        iterations: u32,
        must_jump: bool,
    ) -> bool
    where
        W: CollisionWorld + ?Sized,
        P: VelocityProvider + ?Sized,
    {
        if !(must_jump || self.settings.can_walk_off_ledges) {
            return false;
        }
        self.start_falling(world, provider, iterations, remaining, time_tick, delta, old_location);
        true
    }

    /// Switch to falling and spend the unused part of the sub-step in the air.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn start_falling<W, P>(
        &mut self,
        world: &mut W,
        provider: &mut P,
        iterations: u32,
        remaining: f32,
        time_tick: f32,
        delta: Vec3,
        sub_location: Vec3,
    ) where
        W: CollisionWorld + ?Sized,
        P: VelocityProvider + ?Sized,
    {
        let desired = delta.norm();
        let actual = planar(self.transient_position - sub_location).norm();
        let mut remaining = remaining;
        if desired >= SMALL_NUMBER {
            remaining += time_tick * (1.0 - (actual / desired).min(1.0));
        }

        log::debug!("walked off ground at {:?}", self.transient_position);
        if self.is_moving_on_ground() {
            self.set_movement_mode(world, provider, MovementMode::Falling);
        }
        self.start_new_physics(world, provider, remaining, iterations);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{Capsule, Quat};
    use crate::intent::InputVelocityProvider;
    use crate::rapier_world::{ColliderShapeDef, RapierQueryWorld, WorldStaticDef};
    use crate::settings::MovementSettings;
    use rapier3d::na::{UnitQuaternion, Vector3};

    fn platform() -> RapierQueryWorld {
        RapierQueryWorld::build(vec![WorldStaticDef {
            id: 0,
            translation: Vector3::new(0.0, -0.5, 0.0),
            rotation: UnitQuaternion::identity(),
            shape: ColliderShapeDef::Cuboid {
                half_extents: Vector3::new(2.0, 0.5, 2.0),
            },
        }])
    }

    fn walker(settings: MovementSettings, world: &mut RapierQueryWorld, provider: &mut InputVelocityProvider) -> CharacterMovement {
        let mut mover = CharacterMovement::new(settings, Capsule::new(0.4, 1.8, 0.9));
        mover.set_position(Vec3::new(0.0, 0.02, 0.0));
        mover.set_movement_mode(world, provider, MovementMode::Walking);
        mover
    }

    #[test]
    fn time_step_is_halved_until_the_last_iteration() {
        let mover = CharacterMovement::new(MovementSettings::default(), Capsule::new(0.4, 1.8, 0.9));
        assert!((mover.simulation_time_step(0.2, 1) - 0.05).abs() < 1.0e-6);
        assert!((mover.simulation_time_step(0.06, 1) - 0.03).abs() < 1.0e-6);
        assert!((mover.simulation_time_step(0.2, 8) - 0.2).abs() < 1.0e-6);
        assert!((mover.simulation_time_step(0.01, 1) - 0.01).abs() < 1.0e-6);
        assert!(mover.simulation_time_step(0.0, 1) > 0.0);
    }

    #[test]
    fn idle_walker_stays_put() {
        let mut world = platform();
        let mut provider = InputVelocityProvider::default();
        let mut mover = walker(MovementSettings::default(), &mut world, &mut provider);
        let start = mover.position();
        for _ in 0..30 {
            mover.tick(&mut world, &mut provider, 1.0 / 60.0);
        }
        assert!((mover.position() - start).norm() < 1.0e-4);
        assert_eq!(mover.movement_mode(), MovementMode::Walking);
        assert!(mover.velocity().norm() < 1.0e-4);
    }

    #[test]
    fn walks_forward_on_flat_ground() {
        let mut world = platform();
        let mut provider = InputVelocityProvider::default().with_input(Vec3::new(0.0, 0.0, 1.0));
        let mut mover = walker(MovementSettings::default(), &mut world, &mut provider);
        for _ in 0..30 {
            mover.tick(&mut world, &mut provider, 1.0 / 60.0);
        }
        let position = mover.position();
        assert!(position.z > 0.3, "z = {}", position.z);
        assert!(position.x.abs() < 1.0e-3);
        assert!((0.015..=0.03).contains(&position.y), "y = {}", position.y);
        assert_eq!(mover.velocity().y, 0.0);
        assert_eq!(mover.movement_mode(), MovementMode::Walking);
    }

    #[test]
    fn walks_off_the_edge_and_falls() {
        let mut world = platform();
        let mut provider = InputVelocityProvider::default().with_input(Vec3::new(1.0, 0.0, 0.0));
        let mut mover = walker(MovementSettings::default(), &mut world, &mut provider);
        mover.set_velocity(Vec3::new(4.0, 0.0, 0.0));
        for _ in 0..60 {
            mover.tick(&mut world, &mut provider, 1.0 / 60.0);
        }
        assert_eq!(mover.movement_mode(), MovementMode::Falling);
        assert!(mover.position().y < 0.0);
        assert_eq!(provider.falls(), 1);
    }

    #[test]
    fn ledge_guard_keeps_the_walker_on_the_platform() {
        let mut world = platform();
        let settings = MovementSettings {
            can_walk_off_ledges: false,
            ..Default::default()
        };
        let mut provider = InputVelocityProvider::default().with_input(Vec3::new(1.0, 0.0, 0.0));
        let mut mover = walker(settings, &mut world, &mut provider);
        mover.set_velocity(Vec3::new(4.0, 0.0, 0.0));
        for _ in 0..90 {
            mover.tick(&mut world, &mut provider, 1.0 / 60.0);
        }
        assert_eq!(mover.movement_mode(), MovementMode::Walking);
        assert!(mover.position().x < 2.0 + 0.4);
        assert!(mover.position().y > -0.4);
        assert_eq!(provider.falls(), 0);
    }

    #[test]
    fn rotation_follows_input() {
        let mut world = platform();
        let mut provider = InputVelocityProvider::default().with_input(Vec3::new(1.0, 0.0, 0.0));
        let mut mover = walker(MovementSettings::default(), &mut world, &mut provider);
        mover.tick(&mut world, &mut provider, 0.1);
        let turned = mover.rotation().angle_to(&Quat::identity());
        assert!(turned > 0.0);
        assert!(turned <= 3.0_f32.to_radians() + 1.0e-4);
    }
}
