/*!
Collision root module.

The mover talks to geometry only through the [`CollisionWorld`] trait. The code
is split for clarity:

- types:        shared data types (segments, hits, penetration, hit records)
- world:        the backend capability trait
- capsule:      character capsule shape and the swept queries built on the trait
- broad:        broad-phase helpers (swept AABBs, AABB tests)
- narrow_phase: thin wrappers over parry queries (TOI, contact, intersection, rays)
*/

pub mod broad;
pub mod capsule;
pub mod narrow_phase;
pub mod types;
pub mod world;

pub use capsule::{Capsule, CapsuleError, line_trace};
pub use types::{
    CapsuleSegment, ColliderId, HitRecord, Iso, Penetration, Quat, ShapeHit, Vec3,
};
pub use world::CollisionWorld;
