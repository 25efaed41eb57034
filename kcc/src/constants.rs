/*!
Default tuning values for the kinematic character mover.

These constants centralize the parameters used by the walking/falling loops,
ground finding and the swept-move primitive. `MovementSettings::default()` and
`Tolerances::default()` are built from them.

Notes
- Distances are in meters, time in seconds, angles in degrees.
- Favor practical world-space tolerances over machine epsilon for robust behavior.
*/

/// Gravity magnitude in meters per second squared (positive value).
pub const GRAVITY_MPS2: f32 = 9.81;

/// Maximum downward speed while falling (m/s).
pub const TERMINAL_FALL_SPEED_MPS: f32 = 10.0;

/// Tallest obstruction the character walks up without jumping.
pub const DEFAULT_MAX_STEP_HEIGHT: f32 = 0.5;

/// Steepest walkable surface.
pub const DEFAULT_MAX_STABLE_ANGLE_DEG: f32 = 60.0;

/// Hover band kept between the capsule bottom and walkable ground.
pub const DEFAULT_MIN_FLOOR_DISTANCE: f32 = 0.019;
pub const DEFAULT_MAX_FLOOR_DISTANCE: f32 = 0.024;

pub const DEFAULT_MAX_SIMULATION_ITERATIONS: u32 = 8;
pub const DEFAULT_MAX_SIMULATION_TIME_STEP: f32 = 0.05;

pub const DEFAULT_MAX_DEPENETRATION_ITERATIONS: u32 = 4;
pub const DEFAULT_MAX_OVERLAPS: usize = 16;

/// Contact points further than this from the capsule rim count as "on the edge".
pub const DEFAULT_SWEEP_EDGE_REJECT_DISTANCE: f32 = 0.015;

pub const DEFAULT_GROUND_FRICTION: f32 = 8.0;
pub const DEFAULT_FALLING_LATERAL_FRICTION: f32 = 0.1;
pub const DEFAULT_BRAKING_DECELERATION_WALKING: f32 = 20.0;
pub const DEFAULT_BRAKING_DECELERATION_FALLING: f32 = 0.0;

/// Smallest simulated slice of time.
pub const MIN_TICK_TIME: f32 = 1.0e-6;

/// Distance swept queries start behind the capsule.
pub const SWEEP_BACK_OFFSET: f32 = 0.002;

/// Extra push applied past the penetration depth.
pub const COLLISION_OFFSET: f32 = 0.01;

/// Gap a swept move keeps from the surface it stopped against.
pub const CONTACT_SKIN: f32 = 0.005;

/// Moves shorter than this are treated as no movement at all.
pub const MIN_MOVE_DISTANCE: f32 = 1.0e-5;

/// A step-up whose forward phase advances less than this is refused.
pub const MIN_STEP_PROGRESS: f32 = 1.0e-4;

/// Slack on the stable-angle cosine comparison.
pub const WALKABLE_EPSILON: f32 = 1.0e-6;

/// Horizontal drift allowed when reusing a downward sweep as the ground result.
pub const MAX_PLANAR_DRIFT: f32 = 1.0e-4;

/// Preferred braking sub-step and its hard bounds.
pub const BRAKING_SUB_STEP_TIME: f32 = 1.0 / 33.0;
pub const MIN_BRAKING_SUB_STEP_TIME: f32 = 1.0 / 75.0;
pub const MAX_BRAKING_SUB_STEP_TIME: f32 = 1.0 / 20.0;

/// Speeds below this snap to zero after braking.
pub const BRAKING_STOP_SPEED: f32 = 0.01;

/// Generic "small number" used for direction and normal guards.
pub const SMALL_NUMBER: f32 = 1.0e-4;

/// Capsule height must exceed its diameter by at least this much.
pub const CAPSULE_HEIGHT_MARGIN: f32 = 0.01;

/// Nudge away from a wall when two hits share the same normal.
pub const TWO_WALL_NUDGE: f32 = 0.01;
