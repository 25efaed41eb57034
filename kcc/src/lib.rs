pub mod collision;
pub mod constants;
pub mod intent;
pub mod movement;
pub mod rapier_world;
pub mod settings;
pub mod utils;

pub use collision::{
    Capsule, CapsuleError, ColliderId, CollisionWorld, HitRecord, Penetration, Quat, ShapeHit, Vec3,
};
pub use intent::{InputTuning, InputVelocityProvider, VelocityProvider};
pub use movement::falling::new_fall_velocity;
pub use movement::{
    CharacterMovement, GroundResult, MovementMode, Overlap, OverlapSet, SlideResult, StepOutcome,
    StepRejection,
};
pub use rapier_world::{BodyKind, ColliderShapeDef, RapierQueryWorld, WorldStaticDef, collider_from_def};
pub use settings::{MovementSettings, SettingsError, Tolerances};
