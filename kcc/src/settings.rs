use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::*;

/// Character movement configuration.
///
/// Notes
/// - Values are expressed in meters, seconds, and degrees (converted to radians at runtime).
/// - Every field has a default, so partial JSON documents deserialize cleanly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementSettings {
    /// Tallest obstruction walked over without jumping (meters).
    pub max_step_height: f32,

    /// Steepest walkable surface, measured from world up (degrees).
    pub max_stable_angle: f32,

    /// Lower bound of the hover band kept above walkable ground (meters).
    pub min_floor_distance: f32,

    /// Upper bound of the hover band kept above walkable ground (meters).
    pub max_floor_distance: f32,

    /// Sub-step budget for one mode loop within a tick.
    pub max_simulation_iterations: u32,

    /// Longest sub-step the walking and falling loops simulate at once (seconds).
    pub max_simulation_time_step: f32,

    /// Gravity magnitude (m/s²), applied along world -Y.
    pub gravity: f32,

    /// Downward speed cap while falling (m/s). A provider may override it.
    pub terminal_falling_velocity: f32,

    /// When false, walking stops at ledges instead of falling off them.
    pub can_walk_off_ledges: bool,

    /// Push-out passes attempted per penetration resolution.
    pub max_depenetration_iterations: u32,

    /// Capacity of the overlap set filled by penetration resolution.
    pub max_overlaps: usize,

    /// Contacts within this distance of the capsule rim are treated as edge contacts (meters).
    pub sweep_edge_reject_distance: f32,

    pub ground_friction: f32,
    pub falling_lateral_friction: f32,
    pub braking_deceleration_walking: f32,
    pub braking_deceleration_falling: f32,

    /// Keep the horizontal speed after ramps and steps instead of deriving it from the displacement.
    pub maintain_horizontal_ground_velocity: bool,

    pub tolerances: Tolerances,
}

impl Default for MovementSettings {
    fn default() -> Self {
        Self {
            max_step_height: DEFAULT_MAX_STEP_HEIGHT,
            max_stable_angle: DEFAULT_MAX_STABLE_ANGLE_DEG,
            min_floor_distance: DEFAULT_MIN_FLOOR_DISTANCE,
            max_floor_distance: DEFAULT_MAX_FLOOR_DISTANCE,
            max_simulation_iterations: DEFAULT_MAX_SIMULATION_ITERATIONS,
            max_simulation_time_step: DEFAULT_MAX_SIMULATION_TIME_STEP,
            gravity: GRAVITY_MPS2,
            terminal_falling_velocity: TERMINAL_FALL_SPEED_MPS,
            can_walk_off_ledges: true,
            max_depenetration_iterations: DEFAULT_MAX_DEPENETRATION_ITERATIONS,
            max_overlaps: DEFAULT_MAX_OVERLAPS,
            sweep_edge_reject_distance: DEFAULT_SWEEP_EDGE_REJECT_DISTANCE,
            ground_friction: DEFAULT_GROUND_FRICTION,
            falling_lateral_friction: DEFAULT_FALLING_LATERAL_FRICTION,
            braking_deceleration_walking: DEFAULT_BRAKING_DECELERATION_WALKING,
            braking_deceleration_falling: DEFAULT_BRAKING_DECELERATION_FALLING,
            maintain_horizontal_ground_velocity: false,
            tolerances: Tolerances::default(),
        }
    }
}

/// Numeric thresholds used by the queries and loops.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    pub min_tick_time: f32,
    pub sweep_back_offset: f32,
    pub collision_offset: f32,
    pub contact_skin: f32,
    pub min_move_distance: f32,
    pub min_step_progress: f32,
    pub walkable_epsilon: f32,
    pub max_planar_drift: f32,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            min_tick_time: MIN_TICK_TIME,
            sweep_back_offset: SWEEP_BACK_OFFSET,
            collision_offset: COLLISION_OFFSET,
            contact_skin: CONTACT_SKIN,
            min_move_distance: MIN_MOVE_DISTANCE,
            min_step_progress: MIN_STEP_PROGRESS,
            walkable_epsilon: WALKABLE_EPSILON,
            max_planar_drift: MAX_PLANAR_DRIFT,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("`{field}` must be finite, got {value}")]
    NotFinite { field: &'static str, value: f32 },
    #[error("`{field}` must not be negative, got {value}")]
    Negative { field: &'static str, value: f32 },
    #[error("max_stable_angle must be within [0, 90) degrees, got {0}")]
    StableAngleOutOfRange(f32),
    #[error("floor band is inverted: min {min} > max {max}")]
    InvertedFloorBand { min: f32, max: f32 },
    #[error("`{0}` must be at least 1")]
    ZeroBudget(&'static str),
    #[error("max_simulation_time_step must be positive, got {0}")]
    NonPositiveTimeStep(f32),
}

impl MovementSettings {
    /// Reject configurations the movement loops cannot run with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let t = &self.tolerances;
        let non_negative = [
            ("max_step_height", self.max_step_height),
            ("min_floor_distance", self.min_floor_distance),
            ("max_floor_distance", self.max_floor_distance),
            ("gravity", self.gravity),
            ("terminal_falling_velocity", self.terminal_falling_velocity),
            ("sweep_edge_reject_distance", self.sweep_edge_reject_distance),
            ("ground_friction", self.ground_friction),
            ("falling_lateral_friction", self.falling_lateral_friction),
            ("braking_deceleration_walking", self.braking_deceleration_walking),
            ("braking_deceleration_falling", self.braking_deceleration_falling),
            ("tolerances.min_tick_time", t.min_tick_time),
            ("tolerances.sweep_back_offset", t.sweep_back_offset),
            ("tolerances.collision_offset", t.collision_offset),
            ("tolerances.contact_skin", t.contact_skin),
            ("tolerances.min_move_distance", t.min_move_distance),
            ("tolerances.min_step_progress", t.min_step_progress),
            ("tolerances.walkable_epsilon", t.walkable_epsilon),
            ("tolerances.max_planar_drift", t.max_planar_drift),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() {
                return Err(SettingsError::NotFinite { field, value });
            }
            if value < 0.0 {
                return Err(SettingsError::Negative { field, value });
            }
        }

        if !self.max_stable_angle.is_finite() || !(0.0..90.0).contains(&self.max_stable_angle) {
            return Err(SettingsError::StableAngleOutOfRange(self.max_stable_angle));
        }
        if self.min_floor_distance > self.max_floor_distance {
            return Err(SettingsError::InvertedFloorBand {
                min: self.min_floor_distance,
                max: self.max_floor_distance,
            });
        }
        if self.max_simulation_iterations == 0 {
            return Err(SettingsError::ZeroBudget("max_simulation_iterations"));
        }
        if self.max_depenetration_iterations == 0 {
            return Err(SettingsError::ZeroBudget("max_depenetration_iterations"));
        }
        if self.max_overlaps == 0 {
            return Err(SettingsError::ZeroBudget("max_overlaps"));
        }
        if !self.max_simulation_time_step.is_finite() || self.max_simulation_time_step <= 0.0 {
            return Err(SettingsError::NonPositiveTimeStep(self.max_simulation_time_step));
        }
        Ok(())
    }

    /// Cosine of the stable angle; normals with `n.y` at or above it are walkable.
    #[inline]
    pub fn walkable_floor_y(&self) -> f32 {
        self.max_stable_angle.to_radians().cos()
    }
}
