/*!
Falling mode.

Lateral velocity comes from the provider with air friction; gravity is integrated
separately (suspended while the provider's jump-force window is open) and the
vertical speed along gravity is capped at the terminal velocity. Positions use
the average of the velocities at the start and end of the sub-step.

A blocking hit lands the character when it is a valid landing spot. Otherwise the
move is deflected along the surface, and a second hit is handled with a two-wall
adjustment. Two opposing slopes that leave no vertical motion (a ditch) also land.
*/

use crate::collision::{CollisionWorld, HitRecord, Vec3};
use crate::constants::SMALL_NUMBER;
use crate::intent::VelocityProvider;
use crate::utils::{planar, project_on_plane, safe_normalize, up};

use super::{CharacterMovement, MovementMode};

impl CharacterMovement {
    pub(crate) fn falling<W, P>(&mut self, world: &mut W, provider: &mut P, dt: f32, iterations: u32)
    where
        W: CollisionWorld + ?Sized,
        P: VelocityProvider + ?Sized,
    {
        let min_tick = self.settings.tolerances.min_tick_time;
        if dt < min_tick {
            return;
        }

        let gravity = -up() * self.settings.gravity;
        let terminal = provider
            .terminal_falling_velocity()
            .unwrap_or(self.settings.terminal_falling_velocity);

        let mut iterations = iterations;
        let mut remaining = dt;
        while remaining >= min_tick && iterations < self.settings.max_simulation_iterations {
            iterations += 1;
            let time_tick = self.simulation_time_step(remaining, iterations);
            remaining -= time_tick;

            let rotation = self.transient_rotation;
            let old_velocity = self.velocity;

            let mut lateral = planar(self.velocity);
            lateral = provider.calc_velocity(
                lateral,
                time_tick,
                self.settings.falling_lateral_friction,
                false,
                self.settings.braking_deceleration_falling,
            );
            self.velocity = Vec3::new(lateral.x, old_velocity.y, lateral.z);

            let mut gravity_time = time_tick;
            let jump_force_remaining = provider.jump_force_time_remaining();
            if jump_force_remaining > 0.0 {
                let jump_force_time = jump_force_remaining.min(time_tick);
                gravity_time = time_tick - jump_force_time;
                provider.set_jump_force_time_remaining(jump_force_remaining - jump_force_time);
            }

            self.velocity = new_fall_velocity(self.velocity, gravity, gravity_time, terminal);

            let mut adjusted = (old_velocity + self.velocity) * 0.5 * time_tick;
            let hit = self.safe_move(world, adjusted, rotation, true);
            let mut sub_time_remaining = time_tick * (1.0 - hit.time);

            if !hit.blocking {
                continue;
            }

            if self.is_valid_landing_spot(world, self.transient_position, &hit) {
                remaining += sub_time_remaining;
                self.process_landed(world, provider, &hit, remaining, iterations);
                return;
            }

            adjusted = self.velocity * time_tick;

            if !hit.start_penetrating && self.should_check_for_valid_landing_spot(&hit) {
                let location = self.transient_position;
                let ground = self.find_ground(world, location, false, None);
                if ground.is_walkable() && self.is_valid_landing_spot(world, location, &ground.hit) {
                    remaining += sub_time_remaining;
                    self.process_landed(world, provider, &ground.hit, remaining, iterations);
                    return;
                }
            }

            let old_hit_normal = hit.normal;
            let mut delta = self.compute_slide_vector(adjusted, 1.0 - hit.time, old_hit_normal);
            if sub_time_remaining > SMALL_NUMBER {
                self.velocity = delta / sub_time_remaining;
            }

            if sub_time_remaining > SMALL_NUMBER && delta.dot(&adjusted) > 0.0 {
                let second = self.safe_move(world, delta, rotation, true);
                if second.blocking {
                    sub_time_remaining *= 1.0 - second.time;

                    if self.is_valid_landing_spot(world, self.transient_position, &second) {
                        remaining += sub_time_remaining;
                        self.process_landed(world, provider, &second, remaining, iterations);
                        return;
                    }

                    delta = self.two_wall_adjust(delta, &second, old_hit_normal);
                    if sub_time_remaining > SMALL_NUMBER {
                        self.velocity = delta / sub_time_remaining;
                    }

                    let ditch = old_hit_normal.y > 0.0
                        && second.normal.y > 0.0
                        && delta.y.abs() <= SMALL_NUMBER
                        && second.normal.dot(&old_hit_normal) < 0.0;

                    let mut third = self.safe_move(world, delta, rotation, true);
                    if third.time == 0.0 {
                        let mut side = safe_normalize(planar(old_hit_normal + third.normal));
                        if side == Vec3::zeros() {
                            side = safe_normalize(Vec3::new(old_hit_normal.z, 0.0, -old_hit_normal.x));
                        }
                        third = self.safe_move(world, side, rotation, true);
                    }

                    if ditch
                        || self.is_valid_landing_spot(world, self.transient_position, &third)
                        || third.time == 0.0
                    {
                        log::trace!("landing in a crease at {:?}", self.transient_position);
                        self.process_landed(world, provider, &third, 0.0, iterations);
                        return;
                    }
                }
            }

            if planar(self.velocity).norm_squared() <= SMALL_NUMBER * 10.0 {
                self.velocity.x = 0.0;
                self.velocity.z = 0.0;
            }
        }
    }

    /// Whether `hit` is something the character at `location` can land on.
    pub fn is_valid_landing_spot<W: CollisionWorld + ?Sized>(
        &self,
        world: &mut W,
        location: Vec3,
        hit: &HitRecord,
    ) -> bool {
        if !hit.blocking {
            return false;
        }

        if !hit.start_penetrating {
            if !self.is_stable_on_normal(hit.normal) {
                return false;
            }
            // Contacts above the lower hemisphere center come from sliding down a wall.
            let lower_hemisphere_y = location.y + (self.transient_rotation * self.capsule.inner_bottom()).y;
            if hit.point.y >= lower_hemisphere_y {
                return false;
            }
            if !self.is_within_edge_tolerance(hit, self.capsule.radius()) {
                return false;
            }
        } else if hit.normal.y < SMALL_NUMBER {
            return false;
        }

        self.find_ground(world, location, false, Some(hit)).is_walkable()
    }

    /// An unwalkable hit close to the axis may still be a ledge worth re-checking.
    pub fn should_check_for_valid_landing_spot(&self, hit: &HitRecord) -> bool {
        hit.normal.y > SMALL_NUMBER && self.is_within_edge_tolerance(hit, self.capsule.radius())
    }

    /// Land on `hit` and continue walking for the rest of the time.
    pub(crate) fn process_landed<W, P>(
        &mut self,
        world: &mut W,
        provider: &mut P,
        hit: &HitRecord,
        remaining: f32,
        iterations: u32,
    ) where
        W: CollisionWorld + ?Sized,
        P: VelocityProvider + ?Sized,
    {
        log::debug!(
            "landed at {:?} on {:?} with velocity {:?}",
            self.transient_position,
            hit.collider,
            self.velocity
        );
        if self.is_falling() {
            self.set_movement_mode(world, provider, MovementMode::Walking);
        }
        self.start_new_physics(world, provider, remaining, iterations);
    }
}

/// Velocity after `dt` seconds of `gravity`, capped at `terminal` along the gravity direction.
pub fn new_fall_velocity(initial: Vec3, gravity: Vec3, dt: f32, terminal: f32) -> Vec3 {
    if dt <= 0.0 {
        return initial;
    }
    let mut result = initial + gravity * dt;
    let gravity_dir = safe_normalize(gravity);
    if gravity_dir != Vec3::zeros() && result.dot(&gravity_dir) > terminal {
        result = project_on_plane(result, gravity_dir) + gravity_dir * terminal;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{Capsule, Quat};
    use crate::intent::{InputTuning, InputVelocityProvider};
    use crate::rapier_world::{ColliderShapeDef, RapierQueryWorld, WorldStaticDef};
    use crate::settings::MovementSettings;
    use rapier3d::na::{UnitQuaternion, Vector3};

    fn ground_plane() -> RapierQueryWorld {
        RapierQueryWorld::build(vec![WorldStaticDef {
            id: 0,
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            shape: ColliderShapeDef::Plane {
                offset_along_normal: 0.0,
            },
        }])
    }

    fn faller(settings: MovementSettings, height: f32) -> CharacterMovement {
        let mut mover = CharacterMovement::new(settings, Capsule::new(0.5, 2.0, 1.0));
        mover.set_position(Vec3::new(0.0, height, 0.0));
        mover.mode = MovementMode::Falling;
        mover
    }

    #[test]
    fn fall_velocity_accelerates_and_caps() {
        let g = Vec3::new(0.0, -10.0, 0.0);
        let v = new_fall_velocity(Vec3::zeros(), g, 0.5, 10.0);
        assert!((v.y + 5.0).abs() < 1.0e-5);

        let capped = new_fall_velocity(Vec3::new(1.0, -9.0, 0.0), g, 0.5, 10.0);
        assert!((capped.y + 10.0).abs() < 1.0e-5);
        assert!((capped.x - 1.0).abs() < 1.0e-6);

        let rising = Vec3::new(0.0, 20.0, 0.0);
        assert!((new_fall_velocity(rising, g, 0.5, 10.0).y - 15.0).abs() < 1.0e-5);
        assert_eq!(new_fall_velocity(rising, g, 0.0, 10.0), rising);
    }

    #[test]
    fn lands_on_flat_ground() {
        let mut world = ground_plane();
        let mut provider = InputVelocityProvider::default();
        let mut mover = faller(MovementSettings::default(), 1.0);
        for _ in 0..120 {
            mover.tick(&mut world, &mut provider, 1.0 / 60.0);
        }
        assert_eq!(mover.movement_mode(), MovementMode::Walking);
        assert_eq!(provider.landings(), 1);
        assert!(mover.current_ground().is_walkable());
        let y = mover.position().y;
        assert!((0.015..=0.03).contains(&y), "y = {y}");
        assert_eq!(mover.velocity().y, 0.0);
    }

    #[test]
    fn never_exceeds_terminal_velocity() {
        let mut world = RapierQueryWorld::new();
        let mut provider = InputVelocityProvider::default();
        let mut mover = faller(MovementSettings::default(), 100.0);
        for _ in 0..240 {
            mover.tick(&mut world, &mut provider, 1.0 / 60.0);
            assert!(mover.velocity().y >= -mover.settings().terminal_falling_velocity - 1.0e-4);
        }
        assert!((mover.velocity().y + mover.settings().terminal_falling_velocity).abs() < 1.0e-3);
    }

    #[test]
    fn provider_terminal_velocity_overrides_settings() {
        let mut world = RapierQueryWorld::new();
        let mut provider = InputVelocityProvider::with_tuning(InputTuning {
            terminal_falling_velocity: Some(2.0),
            ..Default::default()
        });
        let mut mover = faller(MovementSettings::default(), 100.0);
        for _ in 0..60 {
            mover.tick(&mut world, &mut provider, 1.0 / 60.0);
        }
        assert!((mover.velocity().y + 2.0).abs() < 1.0e-4);
    }

    #[test]
    fn jump_force_window_suspends_gravity() {
        let mut world = RapierQueryWorld::new();
        let mut provider = InputVelocityProvider::with_tuning(InputTuning {
            max_jump_hold_time: 0.1,
            ..Default::default()
        });
        provider.start_jump();
        let mut mover = faller(MovementSettings::default(), 10.0);
        mover.set_velocity(Vec3::new(0.0, 3.0, 0.0));

        mover.tick(&mut world, &mut provider, 0.05);
        assert!((mover.velocity().y - 3.0).abs() < 1.0e-5);
        assert!((provider.jump_force_time_remaining() - 0.05).abs() < 1.0e-5);

        mover.tick(&mut world, &mut provider, 0.1);
        assert_eq!(provider.jump_force_time_remaining(), 0.0);
        let expected = 3.0 - mover.settings().gravity * 0.05;
        assert!((mover.velocity().y - expected).abs() < 1.0e-4);
    }

    /// Two 65 degree slopes meeting in a V along the z axis.
    fn ditch() -> RapierQueryWorld {
        let slope = |id, angle: f32| WorldStaticDef {
            id,
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle.to_radians()),
            shape: ColliderShapeDef::Plane {
                offset_along_normal: 0.0,
            },
        };
        RapierQueryWorld::build(vec![slope(0, 65.0), slope(1, -65.0)])
    }

    /// Walls facing -x at `x = 1` and -z at `z = 1`, with nothing underneath.
    fn inner_corner() -> RapierQueryWorld {
        let wall = |id, translation, half_extents| WorldStaticDef {
            id,
            translation,
            rotation: UnitQuaternion::identity(),
            shape: ColliderShapeDef::Cuboid { half_extents },
        };
        RapierQueryWorld::build(vec![
            wall(0, Vector3::new(1.5, 5.0, 0.0), Vector3::new(0.5, 10.0, 10.0)),
            wall(1, Vector3::new(0.0, 5.0, 1.5), Vector3::new(10.0, 10.0, 0.5)),
        ])
    }

    #[test]
    fn lands_between_two_steep_slopes() {
        let mut world = ditch();
        let mut provider = InputVelocityProvider::default();
        let mut mover = faller(MovementSettings::default(), 1.0);
        mover.set_position(Vec3::new(0.05, 1.0, 0.0));
        mover.set_velocity(Vec3::new(0.0, -8.0, 0.0));

        mover.tick(&mut world, &mut provider, 0.05);
        assert_eq!(provider.landings(), 1);
        assert_eq!(mover.movement_mode(), MovementMode::Walking);
        let p = mover.position();
        assert!(p.x.abs() < 0.2, "p = {p:?}");
        assert!(p.y > 0.5, "p = {p:?}");
    }

    #[test]
    fn keeps_falling_down_an_inner_corner() {
        let mut world = inner_corner();
        let mut provider = InputVelocityProvider::default();
        let mut mover = faller(MovementSettings::default(), 5.0);
        mover.set_position(Vec3::new(0.4, 5.0, 0.35));
        mover.set_velocity(Vec3::new(4.0, -4.0, 4.0));

        mover.tick(&mut world, &mut provider, 0.05);
        assert_eq!(mover.movement_mode(), MovementMode::Falling);
        assert_eq!(provider.landings(), 0);
        let p = mover.position();
        assert!(p.x <= 0.5 && p.x > 0.45, "p = {p:?}");
        assert!(p.z <= 0.5 && p.z > 0.45, "p = {p:?}");
        // The last leg follows the crease straight down instead of stalling.
        assert!(p.y < 5.0 - 0.19, "p = {p:?}");
    }

    #[test]
    fn landing_spot_rejects_steep_and_high_contacts() {
        let mut world = ground_plane();
        let mover = faller(MovementSettings::default(), 0.01);
        let location = mover.transient_position();
        let flat = HitRecord {
            blocking: true,
            time: 0.5,
            location,
            point: location,
            normal: Vec3::y(),
            trace_start: location + Vec3::y() * 0.1,
            trace_end: location - Vec3::y() * 0.1,
            ..Default::default()
        };
        assert!(mover.is_valid_landing_spot(&mut world, location, &flat));

        let steep = HitRecord {
            normal: safe_normalize(Vec3::new(1.0, 0.2, 0.0)),
            ..flat
        };
        assert!(!mover.is_valid_landing_spot(&mut world, location, &steep));

        let high = HitRecord {
            point: location + Vec3::y(),
            ..flat
        };
        assert!(!mover.is_valid_landing_spot(&mut world, location, &high));
        assert!(!mover.is_valid_landing_spot(&mut world, location, &HitRecord::default()));
    }

    #[test]
    fn falling_keeps_rotation_when_idle() {
        let mut world = ground_plane();
        let mut provider = InputVelocityProvider::default();
        let mut mover = faller(MovementSettings::default(), 2.0);
        let rotation = Quat::from_axis_angle(&Vector3::y_axis(), 0.5);
        mover.set_rotation(rotation);
        mover.tick(&mut world, &mut provider, 1.0 / 60.0);
        assert_eq!(mover.rotation(), rotation);
    }
}
