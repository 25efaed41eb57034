/*!
Swept-move primitive and slide response.

`move_updated` is the only place that changes the transient pose along a delta.
In swept mode it stops short of the first blocking surface, keeping the contact
skin between the capsule and the obstacle. Everything else (sliding, two-wall
adjustment, ramp re-projection) composes on top of it.
*/

use crate::collision::{CollisionWorld, HitRecord, Quat, ShapeHit, Vec3};
use crate::constants::{SMALL_NUMBER, TWO_WALL_NUDGE};
use crate::utils::{planar, project_on_plane, project_onto, safe_normalize};

use super::CharacterMovement;

/// Outcome of [`CharacterMovement::slide_along_surface`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlideResult {
    /// Fraction of the requested slide that was applied, in [0, 1].
    pub percent: f32,
    /// Hit of the last move attempted while sliding (the input hit if none ran).
    pub hit: HitRecord,
}

impl CharacterMovement {
    /// Move the transient pose by `delta` and set its rotation.
    ///
    /// Without `sweep` the pose is overwritten. With `sweep` the capsule is cast along
    /// `delta`; among start-penetrating candidates the one whose push-out most opposes
    /// the move wins, otherwise the first hit in time order does.
    pub fn move_updated<W: CollisionWorld + ?Sized>(
        &mut self,
        world: &mut W,
        delta: Vec3,
        rotation: Quat,
        sweep: bool,
    ) -> HitRecord {
        let start = self.transient_position;
        let end = start + delta;
        let min_move = if sweep {
            self.settings.tolerances.min_move_distance
        } else {
            0.0
        };

        if delta.norm_squared() <= min_move * min_move {
            self.transient_rotation = rotation;
            return HitRecord::miss(start, start, 1.0);
        }
        if !sweep {
            self.transient_position = end;
            self.transient_rotation = rotation;
            return HitRecord::miss(start, end, 1.0);
        }

        let tolerances = &self.settings.tolerances;
        let hits = self
            .capsule
            .sweep(world, start, end, rotation, 0.0, tolerances);

        let segment = self.capsule.segment(start, rotation, 0.0);
        let mut chosen: Option<ShapeHit> = None;
        let mut start_penetrating = false;
        let mut best_dot = f32::MAX;
        for candidate in hits {
            if let Some(penetration) = world.compute_penetration(&segment, candidate.collider) {
                let dot = penetration.direction.dot(&delta);
                if dot < best_dot {
                    best_dot = dot;
                    chosen = Some(candidate);
                    start_penetrating = true;
                }
            } else if chosen.is_none() {
                chosen = Some(candidate);
                break;
            }
        }

        let mut hit = HitRecord::miss(start, end, 1.0);
        if let Some(blocking) = chosen {
            let distance = delta.norm();
            let moved = if start_penetrating {
                0.0
            } else {
                (blocking.distance - tolerances.sweep_back_offset - tolerances.contact_skin).max(0.0)
            };
            // A gap within one skin of the obstacle is residue of the previous stop.
            let negligible = tolerances.contact_skin.max(tolerances.min_move_distance);
            let time = if moved <= negligible {
                0.0
            } else {
                (moved / distance).min(1.0)
            };
            hit = HitRecord {
                blocking: true,
                start_penetrating,
                time,
                location: start + delta * time,
                point: blocking.point,
                normal: blocking.normal,
                trace_start: start,
                trace_end: end,
                collider: Some(blocking.collider),
            };
            if start_penetrating {
                log::trace!(
                    "move of {:?} starts penetrating {:?}",
                    delta,
                    blocking.collider
                );
            }
        }

        self.transient_position = hit.location;
        self.transient_rotation = rotation;
        hit
    }

    /// Resolve penetration at the current pose, then [`move_updated`](Self::move_updated).
    pub fn safe_move<W: CollisionWorld + ?Sized>(
        &mut self,
        world: &mut W,
        delta: Vec3,
        rotation: Quat,
        sweep: bool,
    ) -> HitRecord {
        let adjustment =
            self.resolve_penetration(world, self.transient_position, self.transient_rotation);
        self.transient_position += adjustment;
        self.move_updated(world, delta, rotation, sweep)
    }

    /// Slide the remaining `time` of `delta` along the surface that produced `hit`.
    ///
    /// On the ground, unwalkable upward normals are flattened so the character does not
    /// climb walls. In the air, downward normals close to the floor are flattened (or
    /// replaced by the floor normal) so the character is not pushed into the ground.
    pub fn slide_along_surface<W: CollisionWorld + ?Sized>(
        &mut self,
        world: &mut W,
        delta: Vec3,
        time: f32,
        normal: Vec3,
        hit: &HitRecord,
    ) -> SlideResult {
        let unchanged = SlideResult {
            percent: 0.0,
            hit: *hit,
        };
        if !hit.blocking {
            return unchanged;
        }

        let mut normal = normal;
        if self.is_moving_on_ground() {
            if normal.y > 0.0 && !self.is_stable_on_normal(normal) {
                normal.y = 0.0;
            }
        } else if normal.y < -SMALL_NUMBER
            && self.current_ground.floor_distance < self.settings.min_floor_distance
            && self.current_ground.is_blocking_hit
        {
            let floor_normal = self.current_ground.hit.normal;
            let opposed = delta.dot(&floor_normal) < 0.0 && floor_normal.y < 1.0 - SMALL_NUMBER;
            if opposed {
                normal = floor_normal;
            }
            normal.y = 0.0;
        }

        let normal = safe_normalize(normal);
        if normal == Vec3::zeros() {
            return unchanged;
        }

        let slide = self.compute_slide_vector(delta, time, normal);
        if slide.dot(&delta) <= 0.0 {
            return unchanged;
        }

        let rotation = self.transient_rotation;
        let mut last = self.safe_move(world, slide, rotation, true);
        let first_percent = last.time;
        let mut percent = first_percent;

        if last.is_valid_blocking_hit() {
            let adjusted = self.two_wall_adjust(slide, &last, normal);
            if adjusted.norm() > SMALL_NUMBER && adjusted.dot(&delta) > 0.0 {
                last = self.safe_move(world, adjusted, rotation, true);
                percent += last.time * (1.0 - first_percent);
            }
        }

        SlideResult {
            percent: percent.clamp(0.0, 1.0),
            hit: last,
        }
    }

    /// `delta` projected onto the surface plane and scaled by `time`.
    pub fn compute_slide_vector(&self, delta: Vec3, time: f32, normal: Vec3) -> Vec3 {
        let slide = project_on_plane(delta, normal) * time;
        if self.is_falling() {
            self.handle_slope_boosting(slide, delta, time, normal)
        } else {
            slide
        }
    }

    /// Keep a falling slide from gaining more height than the move it came from.
    fn handle_slope_boosting(&self, slide: Vec3, delta: Vec3, time: f32, normal: Vec3) -> Vec3 {
        let mut result = slide;
        if result.y > 0.0 {
            let y_limit = delta.y * time;
            if result.y - y_limit > SMALL_NUMBER {
                if y_limit > 0.0 {
                    result *= y_limit / result.y;
                } else {
                    result = Vec3::zeros();
                }

                // Spend the removed part horizontally along the surface.
                let remainder = planar(slide - result);
                let planar_normal = safe_normalize(planar(normal));
                result += project_on_plane(remainder, planar_normal);
            }
        }
        result
    }

    /// Adjust `delta` after hitting a second surface while sliding along the first.
    ///
    /// Opposing surfaces form a crease: the move follows their intersection line.
    /// Otherwise the move slides along the new surface, limited on the ground so that
    /// it never climbs more than a step.
    pub fn two_wall_adjust(&self, delta: Vec3, hit: &HitRecord, old_hit_normal: Vec3) -> Vec3 {
        let hit_normal = hit.normal;
        let desired = delta;
        let mut delta = delta;

        if old_hit_normal.dot(&hit_normal) <= 0.0 {
            let crease = safe_normalize(hit_normal.cross(&old_hit_normal));
            delta = crease * delta.dot(&crease) * (1.0 - hit.time);
            if desired.dot(&delta) < 0.0 {
                delta = -delta;
            }
        } else {
            delta = self.compute_slide_vector(delta, 1.0 - hit.time, hit_normal);
            if delta.dot(&desired) <= 0.0 {
                delta = Vec3::zeros();
            } else if (hit_normal.dot(&old_hit_normal) - 1.0).abs() < SMALL_NUMBER {
                delta += hit_normal * TWO_WALL_NUDGE;
            }
        }

        if self.is_moving_on_ground() {
            if delta.y > 0.0 {
                if self.is_stable_on_normal(hit_normal) && hit_normal.y > SMALL_NUMBER {
                    let time = 1.0 - hit.time;
                    let scaled = safe_normalize(delta) * desired.norm();
                    delta = Vec3::new(desired.x, scaled.y / hit_normal.y, desired.z) * time;
                    let max_step = self.settings.max_step_height;
                    if delta.y > max_step && delta.y > 0.0 {
                        delta *= max_step / delta.y;
                    }
                } else {
                    delta.y = 0.0;
                }
            } else if delta.y < 0.0
                && self.current_ground.floor_distance < self.settings.min_floor_distance
                && self.current_ground.is_blocking_hit
            {
                delta.y = 0.0;
            }
        }
        delta
    }

    /// Re-project a horizontal move along a walkable surface.
    ///
    /// Line-trace ground carries an unreliable normal and is left alone.
    pub fn ground_movement_delta(&self, delta: Vec3, hit: &HitRecord, line_trace: bool) -> Vec3 {
        let normal = hit.normal;
        if line_trace || !self.is_stable_on_normal(normal) {
            return delta;
        }
        let right = delta.cross(&normal);
        let forward = safe_normalize(normal.cross(&right));
        if forward == Vec3::zeros() {
            return delta;
        }
        if self.settings.maintain_horizontal_ground_velocity {
            forward * delta.norm()
        } else {
            project_onto(delta, forward)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{Capsule, CapsuleSegment, ColliderId, Penetration};
    use crate::movement::MovementMode;
    use crate::rapier_world::{ColliderShapeDef, RapierQueryWorld, WorldStaticDef};
    use crate::settings::MovementSettings;
    use rapier3d::na::{UnitQuaternion, Vector3};

    fn wall_world() -> RapierQueryWorld {
        RapierQueryWorld::build(vec![
            WorldStaticDef {
                id: 0,
                translation: Vector3::zeros(),
                rotation: UnitQuaternion::identity(),
                shape: ColliderShapeDef::Plane {
                    offset_along_normal: 0.0,
                },
            },
            WorldStaticDef {
                id: 1,
                translation: Vector3::new(3.0, 1.0, 0.0),
                rotation: UnitQuaternion::identity(),
                shape: ColliderShapeDef::Cuboid {
                    half_extents: Vector3::new(0.5, 1.0, 5.0),
                },
            },
        ])
    }

    fn walker_at(position: Vec3) -> CharacterMovement {
        let mut mover = CharacterMovement::new(MovementSettings::default(), Capsule::new(0.5, 2.0, 1.0));
        mover.mode = MovementMode::Walking;
        mover.set_position(position);
        mover
    }

    #[test]
    fn unswept_move_overwrites_pose() {
        let mut world = wall_world();
        let mut mover = walker_at(Vec3::new(0.0, 0.02, 0.0));
        let rot = Quat::from_axis_angle(&Vector3::y_axis(), 1.0);
        let hit = mover.move_updated(&mut world, Vec3::new(10.0, 0.0, 0.0), rot, false);
        assert!(!hit.blocking);
        assert!((mover.transient_position().x - 10.0).abs() < 1.0e-6);
        assert_eq!(mover.transient_rotation(), rot);
    }

    #[test]
    fn swept_move_stops_before_wall() {
        let mut world = wall_world();
        let mut mover = walker_at(Vec3::new(0.0, 0.02, 0.0));
        let hit = mover.move_updated(&mut world, Vec3::new(4.0, 0.0, 0.0), Quat::identity(), true);
        assert!(hit.is_valid_blocking_hit());
        assert!((hit.normal + Vec3::x()).norm() < 1.0e-3);

        let skin = mover.settings().tolerances.contact_skin;
        let x = mover.transient_position().x;
        assert!((x - (2.0 - skin)).abs() < 1.0e-3, "x = {x}");
        assert!((hit.time - x / 4.0).abs() < 1.0e-4);
    }

    #[test]
    fn free_move_reaches_target() {
        let mut world = wall_world();
        let mut mover = walker_at(Vec3::new(0.0, 0.02, 0.0));
        let hit = mover.move_updated(&mut world, Vec3::new(0.0, 0.0, 1.0), Quat::identity(), true);
        assert!(!hit.blocking);
        assert_eq!(hit.time, 1.0);
        assert!((mover.transient_position().z - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn touching_wall_reports_zero_time() {
        let mut world = wall_world();
        let mut mover = walker_at(Vec3::new(0.0, 0.02, 0.0));
        mover.move_updated(&mut world, Vec3::new(4.0, 0.0, 0.0), Quat::identity(), true);
        let before = mover.transient_position();
        let hit = mover.move_updated(&mut world, Vec3::new(0.1, 0.0, 0.0), Quat::identity(), true);
        assert!(hit.blocking);
        assert_eq!(hit.time, 0.0);
        assert_eq!(mover.transient_position(), before);
    }

    #[test]
    fn gap_wider_than_the_skin_is_closed() {
        let mut world = wall_world();
        let mut mover = walker_at(Vec3::new(1.95, 0.02, 0.0));
        let hit = mover.move_updated(&mut world, Vec3::new(0.1, 0.0, 0.0), Quat::identity(), true);
        assert!(hit.is_valid_blocking_hit());
        assert!(hit.time > 0.0);
        let skin = mover.settings().tolerances.contact_skin;
        let x = mover.transient_position().x;
        assert!((x - (2.0 - skin)).abs() < 2.0e-3, "x = {x}");

        let again = mover.move_updated(&mut world, Vec3::new(0.1, 0.0, 0.0), Quat::identity(), true);
        assert_eq!(again.time, 0.0);
        assert_eq!(mover.transient_position().x, x);
    }

    const FLOOR: ColliderId = ColliderId(1);
    const LEDGE: ColliderId = ColliderId(2);
    const WALL: ColliderId = ColliderId(3);

    /// Sweep reports the floor and the wall as already overlapping, with a clear ledge
    /// between them in time order.
    struct SunkAgainstWall;

    impl CollisionWorld for SunkAgainstWall {
        fn overlap_capsule(&mut self, _: &CapsuleSegment) -> Vec<ColliderId> {
            Vec::new()
        }

        fn sweep_capsule(&mut self, _: &CapsuleSegment, _: Vec3, _: f32) -> Vec<ShapeHit> {
            let hit = |collider, distance, normal| ShapeHit {
                collider,
                distance,
                point: Vec3::zeros(),
                normal,
            };
            vec![
                hit(WALL, 0.3, -Vec3::x()),
                hit(FLOOR, 0.05, Vec3::y()),
                hit(LEDGE, 0.1, -Vec3::x()),
            ]
        }

        fn compute_penetration(
            &self,
            _: &CapsuleSegment,
            collider: ColliderId,
        ) -> Option<Penetration> {
            match collider {
                FLOOR => Some(Penetration {
                    direction: Vec3::y(),
                    distance: 0.01,
                }),
                WALL => Some(Penetration {
                    direction: -Vec3::x(),
                    distance: 0.02,
                }),
                _ => None,
            }
        }

        fn line_trace(&self, _: Vec3, _: Vec3) -> Option<ShapeHit> {
            None
        }
    }

    #[test]
    fn penetration_opposing_the_move_blocks_it() {
        let mut mover = walker_at(Vec3::zeros());
        let hit = mover.move_updated(&mut SunkAgainstWall, Vec3::x(), Quat::identity(), true);
        assert!(hit.blocking);
        assert!(hit.start_penetrating);
        assert_eq!(hit.collider, Some(WALL));
        assert_eq!(hit.normal, -Vec3::x());
        assert_eq!(hit.time, 0.0);
        assert_eq!(mover.transient_position(), Vec3::zeros());
    }

    #[test]
    fn slide_keeps_tangential_motion() {
        let mut world = wall_world();
        let mut mover = walker_at(Vec3::new(1.9, 0.02, 0.0));
        let delta = Vec3::new(1.0, 0.0, 1.0);
        let hit = mover.move_updated(&mut world, delta, Quat::identity(), true);
        assert!(hit.is_valid_blocking_hit());

        let before = mover.transient_position();
        let slide = mover.slide_along_surface(&mut world, delta, 1.0 - hit.time, hit.normal, &hit);
        let after = mover.transient_position();
        assert!(slide.percent > 0.99);
        assert!(after.z - before.z > 0.9 * (1.0 - hit.time));
        assert!(after.x <= 2.0 + 1.0e-4);
    }

    #[test]
    fn head_on_slide_goes_nowhere() {
        let mut world = wall_world();
        let mut mover = walker_at(Vec3::new(1.9, 0.02, 0.0));
        let delta = Vec3::new(1.0, 0.0, 0.0);
        let hit = mover.move_updated(&mut world, delta, Quat::identity(), true);
        let before = mover.transient_position();
        let slide = mover.slide_along_surface(&mut world, delta, 1.0 - hit.time, hit.normal, &hit);
        assert_eq!(slide.percent, 0.0);
        assert_eq!(mover.transient_position(), before);
    }

    #[test]
    fn crease_follows_wall_intersection() {
        let mover = walker_at(Vec3::zeros());
        let hit = HitRecord {
            blocking: true,
            normal: Vec3::new(0.0, 0.0, -1.0),
            time: 0.0,
            ..Default::default()
        };
        let old = Vec3::new(-1.0, 0.0, 0.0);
        let adjusted = mover.two_wall_adjust(Vec3::new(1.0, 0.0, 1.0), &hit, old);
        assert!(adjusted.norm() < 1.0e-6);

        let opposing = HitRecord {
            normal: Vec3::new(0.7071, 0.0, -0.7071),
            ..hit
        };
        let adjusted = mover.two_wall_adjust(Vec3::new(0.0, 0.0, 1.0), &opposing, old);
        assert!(adjusted.x.abs() < 1.0e-5);
        assert!(adjusted.y.abs() < 1.0e-5);
    }

    #[test]
    fn falling_slide_does_not_boost_upward() {
        let mut mover = walker_at(Vec3::zeros());
        mover.mode = MovementMode::Falling;
        let normal = safe_normalize(Vec3::new(-1.0, 1.0, 0.0));
        let delta = Vec3::new(1.0, 0.0, 0.0);
        let slide = mover.compute_slide_vector(delta, 1.0, normal);
        assert!(slide.y <= 1.0e-6);
    }

    #[test]
    fn ground_delta_follows_ramp() {
        let mover = walker_at(Vec3::zeros());
        let ramp = HitRecord {
            blocking: true,
            normal: safe_normalize(Vec3::new(-0.5, 1.0, 0.0)),
            ..Default::default()
        };
        let delta = mover.ground_movement_delta(Vec3::new(1.0, 0.0, 0.0), &ramp, false);
        assert!(delta.y > 0.0);
        assert!(delta.dot(&ramp.normal).abs() < 1.0e-5);
        assert_eq!(mover.ground_movement_delta(Vec3::x(), &ramp, true), Vec3::x());
    }
}
