//! Fixed-step driver.
//!
//! Each tick applies the scene's intent keyframe, runs one mover tick and records
//! what happened. The mover commits its pose once per tick, so the driver only ever
//! observes committed state.

use kcc::{CharacterMovement, InputVelocityProvider, MovementMode, RapierQueryWorld, Vec3};
use serde::Serialize;
use tracing::{debug, info};

use crate::scene::Scene;

/// End-of-run report.
#[derive(Clone, Debug, Serialize)]
pub struct Summary {
    pub ticks: u32,
    pub simulated_seconds: f32,
    pub final_position: [f32; 3],
    pub final_velocity: [f32; 3],
    pub final_mode: MovementMode,
    /// Planar distance between the spawn and the final position.
    pub planar_distance: f32,
    pub max_height: f32,
    pub min_height: f32,
    pub landings: u32,
    pub falls: u32,
    pub mode_changes: u32,
}

pub struct Driver {
    scene: Scene,
    world: RapierQueryWorld,
    provider: InputVelocityProvider,
    mover: CharacterMovement,
}

impl Driver {
    pub fn new(scene: Scene) -> anyhow::Result<Self> {
        let mut world = scene.world();
        let mut provider = scene.provider();
        let mover = scene.mover(&mut world, &mut provider)?;
        Ok(Self {
            scene,
            world,
            provider,
            mover,
        })
    }

    pub fn mover(&self) -> &CharacterMovement {
        &self.mover
    }

    /// Run `ticks` ticks of `dt` seconds, logging every `log_every` ticks (0 disables).
    pub fn run(&mut self, ticks: u32, dt: f32, log_every: u32) -> Summary {
        let start = self.mover.position();
        let mut max_height = start.y;
        let mut min_height = start.y;
        let mut mode_changes = 0;

        for tick in 0..ticks {
            let before = self.mover.movement_mode();
            self.apply_intent(tick);
            self.mover.tick(&mut self.world, &mut self.provider, dt);
            let after = self.mover.movement_mode();
            if before != after {
                mode_changes += 1;
                info!(tick, ?before, ?after, "mode change");
            }

            let p = self.mover.position();
            max_height = max_height.max(p.y);
            min_height = min_height.min(p.y);

            if log_every > 0 && tick % log_every == 0 {
                let v = self.mover.velocity();
                debug!(
                    tick,
                    x = p.x,
                    y = p.y,
                    z = p.z,
                    speed = v.norm(),
                    mode = ?after,
                    walkable = self.mover.current_ground().is_walkable(),
                    "tick"
                );
            }
        }

        let end = self.mover.position();
        let planar = Vec3::new(end.x - start.x, 0.0, end.z - start.z);
        let velocity = self.mover.velocity();
        Summary {
            ticks,
            simulated_seconds: ticks as f32 * dt,
            final_position: [end.x, end.y, end.z],
            final_velocity: [velocity.x, velocity.y, velocity.z],
            final_mode: self.mover.movement_mode(),
            planar_distance: planar.norm(),
            max_height,
            min_height,
            landings: self.provider.landings(),
            falls: self.provider.falls(),
            mode_changes,
        }
    }

    fn apply_intent(&mut self, tick: u32) {
        let Some(key) = self.scene.intent_at(tick).copied() else {
            return;
        };
        let [x, y, z] = key.input;
        self.provider.set_input(Vec3::new(x, y, z));

        if let Some(speed) = key.jump.filter(|_| key.from_tick == tick) {
            if self.mover.jump(&mut self.world, &mut self.provider, speed) {
                self.provider.start_jump();
                info!(tick, speed, "jump");
            } else {
                debug!(tick, "jump ignored while airborne");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(json: &str) -> Summary {
        let scene = Scene::from_json(json).unwrap();
        let (ticks, dt) = (scene.ticks, scene.dt);
        let mut driver = Driver::new(scene).unwrap();
        driver.run(ticks, dt, 0)
    }

    #[test]
    fn idle_scene_keeps_still() {
        let summary = run(r#"{ "statics": [ { "id": 0, "shape": { "type": "plane" } } ], "ticks": 60 }"#);
        assert_eq!(summary.final_mode, MovementMode::Walking);
        assert!(summary.planar_distance < 1.0e-4);
        assert_eq!(summary.mode_changes, 0);
        assert!((summary.simulated_seconds - 1.0).abs() < 1.0e-4);
    }

    #[test]
    fn scripted_jump_lands_again() {
        let summary = run(
            r#"{
                "statics": [ { "id": 0, "shape": { "type": "plane" } } ],
                "intents": [ { "from_tick": 5, "jump": 4.0 } ],
                "ticks": 90
            }"#,
        );
        assert_eq!(summary.final_mode, MovementMode::Walking);
        assert_eq!(summary.falls, 1);
        assert_eq!(summary.landings, 1);
        assert_eq!(summary.mode_changes, 2);
        assert!(summary.max_height > 0.7);
    }

    #[test]
    fn scripted_walk_moves_forward() {
        let summary = run(
            r#"{
                "statics": [ { "id": 0, "shape": { "type": "plane" } } ],
                "intents": [ { "from_tick": 0, "input": [0.0, 0.0, 1.0] } ],
                "ticks": 60
            }"#,
        );
        assert!(summary.final_position[2] > 1.0);
        assert!(summary.final_velocity[2] > 0.0);
    }
}
