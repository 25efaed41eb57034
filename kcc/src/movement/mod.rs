/*!
Character mover: the per-tick movement state machine.

A [`CharacterMovement`] owns the capsule, its committed and transient poses, the
velocity, the current ground and the movement mode. Each [`CharacterMovement::tick`]
borrows a [`CollisionWorld`] and a [`VelocityProvider`] for its duration:

1. the transient pose starts from the committed pose,
2. the active mode loop (walking or falling) advances it in bounded sub-steps,
   switching modes on landing or leaving the ground,
3. the provider's rotation is applied,
4. the transient pose is committed.

Submodules
- ground:      ground finding, walkability and floor-height adjustment
- penetration: iterative push-out of overlapping shapes
- resolver:    the swept-move primitive, sliding and two-wall adjustment
- step:        step-up as a rollback transaction
- walking:     the walking sub-step loop
- falling:     the falling sub-step loop and landing
*/

pub mod falling;
pub mod ground;
pub mod mode;
pub mod penetration;
pub mod resolver;
pub mod step;
pub mod walking;

pub use ground::GroundResult;
pub use mode::MovementMode;
pub use penetration::{Overlap, OverlapSet};
pub use resolver::SlideResult;
pub use step::{StepOutcome, StepRejection};

use crate::collision::{Capsule, CollisionWorld, Quat, Vec3};
use crate::intent::VelocityProvider;
use crate::settings::{MovementSettings, SettingsError};

#[derive(Clone, Debug)]
pub struct CharacterMovement {
    pub(crate) settings: MovementSettings,
    pub(crate) capsule: Capsule,
    position: Vec3,
    rotation: Quat,
    pub(crate) transient_position: Vec3,
    pub(crate) transient_rotation: Quat,
    pub(crate) velocity: Vec3,
    pub(crate) mode: MovementMode,
    pub(crate) current_ground: GroundResult,
    pub(crate) overlaps: OverlapSet,
}

impl CharacterMovement {
    /// A mover at the origin in [`MovementMode::None`].
    pub fn new(settings: MovementSettings, capsule: Capsule) -> Self {
        let overlaps = OverlapSet::with_capacity(settings.max_overlaps);
        Self {
            settings,
            capsule,
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            transient_position: Vec3::zeros(),
            transient_rotation: Quat::identity(),
            velocity: Vec3::zeros(),
            mode: MovementMode::None,
            current_ground: GroundResult::default(),
            overlaps,
        }
    }

    /// Like [`CharacterMovement::new`], rejecting invalid settings.
    pub fn try_new(settings: MovementSettings, capsule: Capsule) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self::new(settings, capsule))
    }

    pub fn settings(&self) -> &MovementSettings {
        &self.settings
    }

    pub fn capsule(&self) -> &Capsule {
        &self.capsule
    }

    /// Replace the capsule. The current ground is no longer meaningful.
    pub fn set_capsule(&mut self, capsule: Capsule) {
        self.capsule = capsule;
        self.current_ground.clear();
    }

    /// Pose committed at the end of the last tick.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn transient_position(&self) -> Vec3 {
        self.transient_position
    }

    pub fn transient_rotation(&self) -> Quat {
        self.transient_rotation
    }

    /// Teleport: sets both the committed and transient position.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.transient_position = position;
        self.current_ground.clear();
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.transient_rotation = rotation;
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }

    pub fn movement_mode(&self) -> MovementMode {
        self.mode
    }

    pub fn current_ground(&self) -> &GroundResult {
        &self.current_ground
    }

    /// Overlaps recorded by the most recent penetration resolution.
    pub fn overlaps(&self) -> &OverlapSet {
        &self.overlaps
    }

    #[inline]
    pub fn is_moving_on_ground(&self) -> bool {
        self.mode.is_moving_on_ground()
    }

    #[inline]
    pub fn is_falling(&self) -> bool {
        self.mode.is_falling()
    }

    /// Advance the character by `dt` seconds and commit the resulting pose.
    pub fn tick<W, P>(&mut self, world: &mut W, provider: &mut P, dt: f32)
    where
        W: CollisionWorld + ?Sized,
        P: VelocityProvider + ?Sized,
    {
        self.transient_position = self.position;
        self.transient_rotation = self.rotation;

        if self.mode == MovementMode::None && provider.has_intent() {
            self.set_movement_mode(world, provider, MovementMode::Walking);
        }

        self.start_new_physics(world, provider, dt, 0);
        self.rotate(world, provider, dt);

        self.position = self.transient_position;
        self.rotation = self.transient_rotation;
    }

    /// Switch modes, running the enter/leave hook and notifying the provider.
    pub fn set_movement_mode<W, P>(&mut self, world: &mut W, provider: &mut P, mode: MovementMode)
    where
        W: CollisionWorld + ?Sized,
        P: VelocityProvider + ?Sized,
    {
        if mode == self.mode {
            return;
        }
        let previous = self.mode;
        self.mode = mode;
        log::debug!("movement mode {previous:?} -> {mode:?}");

        if mode.is_moving_on_ground() {
            self.velocity.y = 0.0;
            self.current_ground =
                self.find_ground(world, self.transient_position, false, None);
            self.adjust_floor_height(world);
            if previous.is_falling() {
                provider.on_land();
            }
        } else {
            self.current_ground.clear();
            if mode.is_falling() {
                provider.on_falling();
            }
        }
    }

    /// Leave the ground with an upward speed. Returns false when not grounded.
    pub fn jump<W, P>(&mut self, world: &mut W, provider: &mut P, speed: f32) -> bool
    where
        W: CollisionWorld + ?Sized,
        P: VelocityProvider + ?Sized,
    {
        if !self.is_moving_on_ground() {
            return false;
        }
        self.velocity.y = speed;
        self.set_movement_mode(world, provider, MovementMode::Falling);
        true
    }

    /// Run the active mode loop for `dt`, continuing the iteration count of the caller.
    pub(crate) fn start_new_physics<W, P>(
        &mut self,
        world: &mut W,
        provider: &mut P,
        dt: f32,
        iterations: u32,
    ) where
        W: CollisionWorld + ?Sized,
        P: VelocityProvider + ?Sized,
    {
        if dt < self.settings.tolerances.min_tick_time
            || iterations >= self.settings.max_simulation_iterations
        {
            return;
        }
        match self.mode {
            MovementMode::Walking => self.walking(world, provider, dt, iterations),
            MovementMode::Falling => self.falling(world, provider, dt, iterations),
            MovementMode::None | MovementMode::NavWalking => {}
        }
    }

    fn rotate<W, P>(&mut self, world: &mut W, provider: &mut P, dt: f32)
    where
        W: CollisionWorld + ?Sized,
        P: VelocityProvider + ?Sized,
    {
        let rotation = provider.delta_rotation(self.transient_rotation, dt);
        self.move_updated(world, Vec3::zeros(), rotation, false);
    }
}
