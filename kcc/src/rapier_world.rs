//! Rapier-backed collision world for the character mover.
//!
//! The world stores plain Rapier `RigidBodySet`/`ColliderSet`s with a `BroadPhaseBvh`
//! kept current by a collision-only pipeline step. Queries go through a borrowed
//! `QueryPipeline`: its `QueryFilter` drops sensors, disabled colliders and the
//! excluded collider, then parry narrow-phase calls decide the actual contact.
//!
//! Design goals
//! - Deterministic: given the same inputs (sorted by `id`), build identical in-memory sets.
//! - Query-focused: no dynamics pipeline is stepped here. Dynamic bodies only get woken
//!   when the character touches them.

// Re-export Rapier so downstream crates can build bodies without depending on `rapier3d` directly.
pub use rapier3d;

use rapier3d::na::{Translation3, UnitQuaternion};
use rapier3d::prelude::*;

use crate::collision::broad::{capsule_aabb, swept_capsule_aabb};
use crate::collision::narrow_phase::{capsule_intersects, capsule_penetration, cast_capsule};
use crate::collision::{CapsuleSegment, ColliderId, CollisionWorld, Penetration, ShapeHit, Vec3};

/// Margin added around swept bounds before the narrow phase.
const BROAD_PHASE_MARGIN: f32 = 0.01;

/// Canonical, schema-agnostic definition of a world collider.
///
/// Callers map their own scene description to this type, then call
/// [`RapierQueryWorld::build`] or [`RapierQueryWorld::add_static`].
///
/// Conventions
/// - Units are meters.
/// - Rotation is a unit quaternion.
/// - For planes, the normal is derived from the pose: `normal = rotation * +Y`,
///   and `dist = dot(normal, translation) + offset_along_normal`.
#[derive(Clone, Debug)]
pub struct WorldStaticDef {
    /// Stable unique identifier used to ensure deterministic insertion order.
    pub id: u32,
    /// World-space translation.
    pub translation: Vector<f32>,
    /// World-space rotation (unit quaternion).
    pub rotation: UnitQuaternion<f32>,
    /// Collider shape parameters.
    pub shape: ColliderShapeDef,
}

/// Supported collider shapes.
#[derive(Clone, Debug, PartialEq)]
pub enum ColliderShapeDef {
    /// Infinite plane (half-space), offset along its pose-derived normal.
    Plane { offset_along_normal: f32 },

    /// Oriented cuboid with given half-extents (meters).
    Cuboid { half_extents: Vector<f32> },

    /// Sphere/ball (meters).
    Sphere { radius: f32 },

    /// Y-aligned capsule (meters).
    CapsuleY { radius: f32, half_height: f32 },

    /// Y-aligned cylinder (meters).
    CylinderY { radius: f32, half_height: f32 },

    /// Y-aligned cone (meters).
    ConeY { radius: f32, half_height: f32 },

    /// Rounded cuboid; `border_radius` rounds all edges/corners.
    RoundCuboid {
        half_extents: Vector<f32>,
        border_radius: f32,
    },

    RoundCylinderY {
        radius: f32,
        half_height: f32,
        border_radius: f32,
    },

    RoundConeY {
        radius: f32,
        half_height: f32,
        border_radius: f32,
    },
}

/// Motion type of a body added with [`RapierQueryWorld::add_body`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    Fixed,
    Kinematic,
    Dynamic,
}

impl From<BodyKind> for RigidBodyType {
    fn from(kind: BodyKind) -> Self {
        match kind {
            BodyKind::Fixed => RigidBodyType::Fixed,
            BodyKind::Kinematic => RigidBodyType::KinematicPositionBased,
            BodyKind::Dynamic => RigidBodyType::Dynamic,
        }
    }
}

impl From<ColliderHandle> for ColliderId {
    fn from(handle: ColliderHandle) -> Self {
        let (index, generation) = handle.into_raw_parts();
        ColliderId(((generation as u64) << 32) | index as u64)
    }
}

impl From<ColliderId> for ColliderHandle {
    fn from(id: ColliderId) -> Self {
        ColliderHandle::from_raw_parts(id.0 as u32, (id.0 >> 32) as u32)
    }
}

/// Rapier sets queried by the mover, plus the BVH broad phase that indexes them.
pub struct RapierQueryWorld {
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub broad_phase: BroadPhaseBvh,
    pub narrow_phase: NarrowPhase,
    /// Collider never reported by any query (typically the character's own).
    excluded: Option<ColliderHandle>,
}

impl Default for RapierQueryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl RapierQueryWorld {
    pub fn new() -> Self {
        Self {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            excluded: None,
        }
    }

    /// Build a query world from a list of static collider definitions.
    ///
    /// Determinism
    /// - The input is sorted by `id` before insertion.
    /// - Any NaN/invalid values should be filtered/validated by the caller.
    pub fn build(mut defs: Vec<WorldStaticDef>) -> Self {
        defs.sort_by_key(|d| d.id);
        let mut world = Self::new();
        for def in &defs {
            world.insert_static(def);
        }
        world.refresh();
        world
    }

    /// Insert a parentless static collider.
    pub fn add_static(&mut self, def: &WorldStaticDef) -> ColliderId {
        let id = self.insert_static(def);
        self.refresh();
        id
    }

    /// Insert a rigid body of the given kind carrying one collider.
    pub fn add_body(&mut self, kind: BodyKind, def: &WorldStaticDef) -> (RigidBodyHandle, ColliderId) {
        let body = RigidBodyBuilder::new(kind.into())
            .pose(collider_pose(def))
            .build();
        let body_handle = self.bodies.insert(body);
        let handle =
            self.colliders
                .insert_with_parent(collider_from_def(def), body_handle, &mut self.bodies);
        self.refresh();
        (body_handle, handle.into())
    }

    /// Exclude one collider (usually the character's own) from every query.
    pub fn set_excluded(&mut self, collider: Option<ColliderId>) {
        self.excluded = collider.map(ColliderHandle::from);
    }

    /// Borrowed query view over the current broad phase.
    pub fn query_pipeline<'a>(&'a self, filter: QueryFilter<'a>) -> QueryPipeline<'a> {
        self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.bodies,
            &self.colliders,
            filter,
        )
    }

    fn insert_static(&mut self, def: &WorldStaticDef) -> ColliderId {
        let mut collider = collider_from_def(def);
        collider.set_position(collider_pose(def));
        self.colliders.insert(collider).into()
    }

    /// Bring the broad phase up to date with inserted or moved colliders.
    fn refresh(&mut self) {
        let mut collision_pipeline = CollisionPipeline::new();
        collision_pipeline.step(
            0.0,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &(),
            &(),
        );
    }

    /// Sensors, disabled colliders and the excluded collider never reach the mover.
    fn filter(&self, base: QueryFilter<'static>) -> QueryFilter<'static> {
        let filter = base.exclude_sensors();
        match self.excluded {
            Some(handle) => filter.exclude_collider(handle),
            None => filter,
        }
    }

    fn wake(&mut self, bodies: Vec<RigidBodyHandle>) {
        for handle in bodies {
            if let Some(body) = self.bodies.get_mut(handle) {
                body.wake_up(true);
            }
        }
    }
}

/// Parent body of a collider the mover must not collide with but should wake.
fn dynamic_parent(bodies: &RigidBodySet, collider: &Collider) -> Option<RigidBodyHandle> {
    collider
        .parent()
        .filter(|parent| bodies.get(*parent).is_some_and(|b| b.is_dynamic()))
}

impl CollisionWorld for RapierQueryWorld {
    fn overlap_capsule(&mut self, capsule: &CapsuleSegment) -> Vec<ColliderId> {
        let mut found = Vec::new();
        let mut to_wake = Vec::new();
        {
            let pipeline = self.query_pipeline(self.filter(QueryFilter::default()));
            for (handle, collider) in pipeline.intersect_aabb_conservative(capsule_aabb(capsule)) {
                if !capsule_intersects(capsule, collider.shape(), collider.position()) {
                    continue;
                }
                match dynamic_parent(&self.bodies, collider) {
                    Some(body) => to_wake.push(body),
                    None => found.push(handle.into()),
                }
            }
        }
        self.wake(to_wake);
        found
    }

    fn sweep_capsule(
        &mut self,
        capsule: &CapsuleSegment,
        direction: Vec3,
        max_distance: f32,
    ) -> Vec<ShapeHit> {
        let bounds = swept_capsule_aabb(capsule, direction * max_distance, BROAD_PHASE_MARGIN);
        let mut hits = Vec::new();
        let mut to_wake = Vec::new();
        {
            let pipeline = self.query_pipeline(self.filter(QueryFilter::default()));
            for (handle, collider) in pipeline.intersect_aabb_conservative(bounds) {
                let Some(contact) = cast_capsule(
                    capsule,
                    direction,
                    max_distance,
                    collider.shape(),
                    collider.position(),
                ) else {
                    continue;
                };
                match dynamic_parent(&self.bodies, collider) {
                    Some(body) => to_wake.push(body),
                    None => hits.push(ShapeHit {
                        collider: handle.into(),
                        distance: contact.distance,
                        point: contact.point,
                        normal: contact.normal,
                    }),
                }
            }
        }
        self.wake(to_wake);
        hits
    }

    fn compute_penetration(
        &self,
        capsule: &CapsuleSegment,
        collider: ColliderId,
    ) -> Option<Penetration> {
        let collider = self.colliders.get(collider.into())?;
        capsule_penetration(capsule, collider.shape(), collider.position())
    }

    fn line_trace(&self, start: Vec3, end: Vec3) -> Option<ShapeHit> {
        let delta = end - start;
        let direction = delta.try_normalize(1.0e-8)?;
        let ray = Ray::new(Point::from(start), direction);

        let pipeline = self.query_pipeline(self.filter(QueryFilter::exclude_dynamic()));
        let (handle, hit) = pipeline.cast_ray_and_get_normal(&ray, delta.norm(), true)?;
        Some(ShapeHit {
            collider: handle.into(),
            distance: hit.time_of_impact,
            point: start + direction * hit.time_of_impact,
            normal: hit.normal,
        })
    }
}

/// World pose of the collider built for `def`.
///
/// Planes carry their world normal in the half-space itself, so they are only translated.
fn collider_pose(def: &WorldStaticDef) -> Isometry<f32> {
    match &def.shape {
        ColliderShapeDef::Plane {
            offset_along_normal,
        } => {
            let n = def.rotation * Vector::y();
            let dist = n.dot(&def.translation) + *offset_along_normal;
            Isometry::from_parts(Translation3::from(n * dist), UnitQuaternion::identity())
        }
        _ => Isometry::from_parts(Translation3::from(def.translation), def.rotation),
    }
}

/// Build a Rapier collider from a `WorldStaticDef`, in its local frame.
pub fn collider_from_def(def: &WorldStaticDef) -> Collider {
    match &def.shape {
        ColliderShapeDef::Plane { .. } => {
            // World-space normal n = R * +Y; the pose from `collider_pose` puts the
            // boundary at `n * dist`.
            let unit_n = UnitVector::new_normalize(def.rotation * Vector::y());
            ColliderBuilder::new(SharedShape::new(HalfSpace::new(unit_n))).build()
        }

        ColliderShapeDef::Cuboid { half_extents } => {
            ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z).build()
        }

        ColliderShapeDef::Sphere { radius } => ColliderBuilder::ball(*radius).build(),

        ColliderShapeDef::CapsuleY {
            radius,
            half_height,
        } => ColliderBuilder::capsule_y(*half_height, *radius).build(),

        ColliderShapeDef::CylinderY {
            radius,
            half_height,
        } => ColliderBuilder::cylinder(*half_height, *radius).build(),

        ColliderShapeDef::ConeY {
            radius,
            half_height,
        } => ColliderBuilder::cone(*half_height, *radius).build(),

        ColliderShapeDef::RoundCuboid {
            half_extents,
            border_radius,
        } => ColliderBuilder::round_cuboid(
            half_extents.x,
            half_extents.y,
            half_extents.z,
            *border_radius,
        )
        .build(),

        ColliderShapeDef::RoundCylinderY {
            radius,
            half_height,
            border_radius,
        } => ColliderBuilder::round_cylinder(*half_height, *radius, *border_radius).build(),

        ColliderShapeDef::RoundConeY {
            radius,
            half_height,
            border_radius,
        } => ColliderBuilder::round_cone(*half_height, *radius, *border_radius).build(),
    }
}
