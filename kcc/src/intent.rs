/*!
Velocity providers: where movement intent enters the mover.

The mover owns the character's velocity but never decides how intent turns into
acceleration. Each sub-step it hands the current velocity to a [`VelocityProvider`]
and integrates whatever comes back.

Notes
- `InputVelocityProvider` is the reference implementation: a normalized input
  direction scaled by a maximum acceleration, friction-based steering while
  accelerating, and sub-stepped braking when there is no input.
- Providers also own the jump-force window (gravity is suspended while it lasts)
  and may override the terminal falling speed.
*/

use serde::{Deserialize, Serialize};

use crate::collision::types::{Quat, Vec3};
use crate::constants::{
    BRAKING_STOP_SPEED, BRAKING_SUB_STEP_TIME, MAX_BRAKING_SUB_STEP_TIME, MIN_BRAKING_SUB_STEP_TIME,
    MIN_TICK_TIME, SMALL_NUMBER,
};
use crate::utils::{clamp_magnitude, planar, rotate_towards, safe_normalize, up};

pub trait VelocityProvider {
    /// New velocity after `dt` seconds, starting from `current`.
    fn calc_velocity(
        &mut self,
        current: Vec3,
        dt: f32,
        friction: f32,
        is_fluid: bool,
        braking_deceleration: f32,
    ) -> Vec3;

    /// Acceleration applied by the last `calc_velocity` call.
    fn acceleration(&self) -> Vec3;

    /// Whether the provider currently wants the character to move.
    fn has_intent(&self) -> bool;

    /// Seconds of gravity-free ascent left from the current jump.
    fn jump_force_time_remaining(&self) -> f32 {
        0.0
    }

    fn set_jump_force_time_remaining(&mut self, _remaining: f32) {}

    /// Override for the settings' terminal falling speed.
    fn terminal_falling_velocity(&self) -> Option<f32> {
        None
    }

    /// A jump is requested; walking off a ledge is then always allowed.
    fn wants_jump(&self) -> bool {
        false
    }

    /// Rotation the character should have after `dt` seconds.
    fn delta_rotation(&mut self, current: Quat, _dt: f32) -> Quat {
        current
    }

    /// The character switched from falling to walking.
    fn on_land(&mut self) {}

    /// The character left the ground.
    fn on_falling(&mut self) {}
}

/// Tuning of the reference provider, loadable from config.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputTuning {
    pub max_speed: f32,
    pub max_acceleration: f32,
    /// Scales the friction passed in while braking.
    pub braking_friction_factor: f32,
    /// Preferred braking sub-step, clamped to [1/75, 1/20] s.
    pub braking_sub_step_time: f32,
    /// Turn rate toward the input direction (degrees per second).
    pub angular_speed: f32,
    /// Gravity-free time granted by [`InputVelocityProvider::start_jump`].
    pub max_jump_hold_time: f32,
    pub terminal_falling_velocity: Option<f32>,
}

impl Default for InputTuning {
    fn default() -> Self {
        Self {
            max_speed: 4.0,
            max_acceleration: 7.0,
            braking_friction_factor: 2.0,
            braking_sub_step_time: BRAKING_SUB_STEP_TIME,
            angular_speed: 30.0,
            max_jump_hold_time: 0.0,
            terminal_falling_velocity: None,
        }
    }
}

/// Reference provider driven by a desired horizontal direction.
#[derive(Clone, Debug)]
pub struct InputVelocityProvider {
    /// Desired direction; its length is clamped to 1.
    pub input: Vec3,
    pub tuning: InputTuning,
    pub wants_jump: bool,
    jump_force_time_remaining: f32,
    acceleration: Vec3,
    landings: u32,
    falls: u32,
}

impl Default for InputVelocityProvider {
    fn default() -> Self {
        Self::with_tuning(InputTuning::default())
    }
}

impl InputVelocityProvider {
    pub fn with_tuning(tuning: InputTuning) -> Self {
        Self {
            input: Vec3::zeros(),
            tuning,
            wants_jump: false,
            jump_force_time_remaining: 0.0,
            acceleration: Vec3::zeros(),
            landings: 0,
            falls: 0,
        }
    }

    pub fn with_input(mut self, input: Vec3) -> Self {
        self.input = input;
        self
    }

    pub fn set_input(&mut self, input: Vec3) {
        self.input = input;
    }

    /// Open the jump-force window.
    pub fn start_jump(&mut self) {
        self.jump_force_time_remaining = self.tuning.max_jump_hold_time;
    }

    /// Times `on_land` was called.
    pub fn landings(&self) -> u32 {
        self.landings
    }

    /// Times `on_falling` was called.
    pub fn falls(&self) -> u32 {
        self.falls
    }

    /// Decelerate `velocity` with friction plus a constant braking deceleration.
    ///
    /// Sub-stepped to keep high friction stable; never reverses the direction of travel
    /// and snaps to zero below `BRAKING_STOP_SPEED`.
    pub fn apply_velocity_braking(
        &self,
        velocity: Vec3,
        dt: f32,
        friction: f32,
        braking_deceleration: f32,
    ) -> Vec3 {
        if velocity.norm_squared() == 0.0 || dt < MIN_TICK_TIME {
            return velocity;
        }
        let friction = (friction * self.tuning.braking_friction_factor.max(0.0)).max(0.0);
        let braking_deceleration = braking_deceleration.max(0.0);
        if friction == 0.0 && braking_deceleration == 0.0 {
            return velocity;
        }

        let old = velocity;
        let max_step = self
            .tuning
            .braking_sub_step_time
            .clamp(MIN_BRAKING_SUB_STEP_TIME, MAX_BRAKING_SUB_STEP_TIME);
        let reverse_accel = -safe_normalize(velocity) * braking_deceleration;

        let mut v = velocity;
        let mut remaining = dt;
        while remaining >= MIN_TICK_TIME {
            let step = if remaining > max_step {
                max_step.min(remaining * 0.5)
            } else {
                remaining
            };
            remaining -= step;

            v += (-friction * v + reverse_accel) * step;

            if v.dot(&old) <= 0.0 {
                return Vec3::zeros();
            }
        }

        if v.norm() < BRAKING_STOP_SPEED {
            return Vec3::zeros();
        }
        v
    }
}

impl VelocityProvider for InputVelocityProvider {
    fn calc_velocity(
        &mut self,
        current: Vec3,
        dt: f32,
        friction: f32,
        _is_fluid: bool,
        braking_deceleration: f32,
    ) -> Vec3 {
        self.acceleration = clamp_magnitude(self.input, 1.0) * self.tuning.max_acceleration;

        if self.acceleration.norm() < 1.0e-3 {
            return self.apply_velocity_braking(current, dt, friction, braking_deceleration);
        }

        // Steer toward the acceleration direction, keeping the current speed.
        let friction = friction.max(0.0);
        let direction = safe_normalize(self.acceleration);
        let speed = current.norm();
        let mut v = current - (current - direction * speed) * (friction * dt).min(1.0);

        v += self.acceleration * dt;
        clamp_magnitude(v, self.tuning.max_speed)
    }

    fn acceleration(&self) -> Vec3 {
        self.acceleration
    }

    fn has_intent(&self) -> bool {
        self.input.norm_squared() > 0.0 || self.wants_jump
    }

    fn jump_force_time_remaining(&self) -> f32 {
        self.jump_force_time_remaining
    }

    fn set_jump_force_time_remaining(&mut self, remaining: f32) {
        self.jump_force_time_remaining = remaining.max(0.0);
    }

    fn terminal_falling_velocity(&self) -> Option<f32> {
        self.tuning.terminal_falling_velocity
    }

    fn wants_jump(&self) -> bool {
        self.wants_jump
    }

    fn delta_rotation(&mut self, current: Quat, dt: f32) -> Quat {
        let forward = planar(self.input);
        if forward.norm() < SMALL_NUMBER {
            return current;
        }
        let target = Quat::face_towards(&forward, &up());
        rotate_towards(current, target, self.tuning.angular_speed.to_radians() * dt)
    }

    fn on_land(&mut self) {
        self.landings += 1;
        self.jump_force_time_remaining = 0.0;
    }

    fn on_falling(&mut self) {
        self.falls += 1;
    }
}
