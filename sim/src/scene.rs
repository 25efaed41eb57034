//! JSON scene files.
//!
//! A scene carries everything a headless run needs: mover settings, the capsule,
//! the spawn pose, the reference provider's tuning, static world geometry and a
//! tick-indexed intent schedule.
//!
//! Statics are mapped to `WorldStaticDef`s and built in `id` order, so two runs of
//! the same file produce identical worlds.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use kcc::rapier_world::rapier3d::na::{UnitQuaternion, Vector3};
use kcc::{
    Capsule, CharacterMovement, ColliderShapeDef, InputTuning, InputVelocityProvider, MovementMode,
    MovementSettings, Quat, RapierQueryWorld, Vec3, WorldStaticDef,
};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scene {
    #[serde(default)]
    pub settings: MovementSettings,
    #[serde(default)]
    pub capsule: CapsuleDesc,
    #[serde(default)]
    pub spawn: Spawn,
    #[serde(default)]
    pub provider: InputTuning,
    #[serde(default)]
    pub statics: Vec<StaticDesc>,
    /// Keyframes sorted by `from_tick`; each one holds until the next.
    #[serde(default)]
    pub intents: Vec<IntentKey>,
    #[serde(default = "default_ticks")]
    pub ticks: u32,
    #[serde(default = "default_dt")]
    pub dt: f32,
}

fn default_ticks() -> u32 {
    120
}

fn default_dt() -> f32 {
    1.0 / 60.0
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapsuleDesc {
    pub radius: f32,
    pub height: f32,
    /// Height of the capsule center above the character position.
    pub center_offset: f32,
}

impl Default for CapsuleDesc {
    fn default() -> Self {
        Self {
            radius: 0.5,
            height: 2.0,
            center_offset: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Spawn {
    pub position: [f32; 3],
    #[serde(default)]
    pub yaw_deg: f32,
    #[serde(default = "default_spawn_mode")]
    pub mode: MovementMode,
}

fn default_spawn_mode() -> MovementMode {
    MovementMode::Walking
}

impl Default for Spawn {
    fn default() -> Self {
        Self {
            position: [0.0, 0.02, 0.0],
            yaw_deg: 0.0,
            mode: default_spawn_mode(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticDesc {
    pub id: u32,
    #[serde(default)]
    pub translation: [f32; 3],
    /// Euler angles (roll about X, pitch about Y, yaw about Z), in degrees.
    #[serde(default)]
    pub rotation_deg: [f32; 3],
    pub shape: ShapeDesc,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ShapeDesc {
    Plane {
        #[serde(default)]
        offset: f32,
    },
    Cuboid {
        half_extents: [f32; 3],
    },
    Sphere {
        radius: f32,
    },
    Capsule {
        radius: f32,
        half_height: f32,
    },
    Cylinder {
        radius: f32,
        half_height: f32,
    },
    Cone {
        radius: f32,
        half_height: f32,
    },
    RoundCuboid {
        half_extents: [f32; 3],
        border_radius: f32,
    },
    RoundCylinder {
        radius: f32,
        half_height: f32,
        border_radius: f32,
    },
    RoundCone {
        radius: f32,
        half_height: f32,
        border_radius: f32,
    },
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentKey {
    pub from_tick: u32,
    #[serde(default)]
    pub input: [f32; 3],
    /// Jump with this vertical speed on `from_tick`.
    #[serde(default)]
    pub jump: Option<f32>,
}

impl Scene {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading scene file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("loading scene {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let scene: Scene = serde_json::from_str(text).context("parsing scene JSON")?;
        scene.validate()?;
        Ok(scene)
    }

    pub fn validate(&self) -> Result<()> {
        self.settings.validate().context("invalid movement settings")?;
        if !self.dt.is_finite() || self.dt <= 0.0 {
            bail!("dt must be positive, got {}", self.dt);
        }
        if self.intents.windows(2).any(|w| w[0].from_tick > w[1].from_tick) {
            bail!("intent keyframes must be sorted by from_tick");
        }
        let mut ids: Vec<u32> = self.statics.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|w| w[0] == w[1]) {
            bail!("duplicate static id {}", pair[0]);
        }
        Ok(())
    }

    pub fn world(&self) -> RapierQueryWorld {
        RapierQueryWorld::build(self.statics.iter().map(static_to_def).collect())
    }

    pub fn capsule(&self) -> Result<Capsule> {
        let c = self.capsule;
        Capsule::try_new(c.radius, c.height, c.center_offset).context("invalid capsule")
    }

    pub fn provider(&self) -> InputVelocityProvider {
        InputVelocityProvider::with_tuning(self.provider)
    }

    /// A mover at the spawn pose. The spawn mode is entered through the regular mode hook.
    pub fn mover(
        &self,
        world: &mut RapierQueryWorld,
        provider: &mut InputVelocityProvider,
    ) -> Result<CharacterMovement> {
        let mut mover = CharacterMovement::try_new(self.settings.clone(), self.capsule()?)
            .context("invalid movement settings")?;
        let [x, y, z] = self.spawn.position;
        mover.set_position(Vec3::new(x, y, z));
        mover.set_rotation(Quat::from_axis_angle(&Vector3::y_axis(), self.spawn.yaw_deg.to_radians()));
        mover.set_movement_mode(world, provider, self.spawn.mode);
        Ok(mover)
    }

    /// The keyframe in effect at `tick`, if any.
    pub fn intent_at(&self, tick: u32) -> Option<&IntentKey> {
        self.intents.iter().take_while(|k| k.from_tick <= tick).last()
    }
}

/// Convert a scene static to the collider definition the world is built from.
pub fn static_to_def(desc: &StaticDesc) -> WorldStaticDef {
    let [tx, ty, tz] = desc.translation;
    let [rx, ry, rz] = desc.rotation_deg;
    let rotation = UnitQuaternion::from_euler_angles(rx.to_radians(), ry.to_radians(), rz.to_radians());

    let shape = match desc.shape {
        ShapeDesc::Plane { offset } => ColliderShapeDef::Plane {
            offset_along_normal: offset,
        },
        ShapeDesc::Cuboid { half_extents: [x, y, z] } => ColliderShapeDef::Cuboid {
            half_extents: Vector3::new(x, y, z),
        },
        ShapeDesc::Sphere { radius } => ColliderShapeDef::Sphere { radius },
        ShapeDesc::Capsule { radius, half_height } => ColliderShapeDef::CapsuleY { radius, half_height },
        ShapeDesc::Cylinder { radius, half_height } => ColliderShapeDef::CylinderY { radius, half_height },
        ShapeDesc::Cone { radius, half_height } => ColliderShapeDef::ConeY { radius, half_height },
        ShapeDesc::RoundCuboid {
            half_extents: [x, y, z],
            border_radius,
        } => ColliderShapeDef::RoundCuboid {
            half_extents: Vector3::new(x, y, z),
            border_radius,
        },
        ShapeDesc::RoundCylinder {
            radius,
            half_height,
            border_radius,
        } => ColliderShapeDef::RoundCylinderY {
            radius,
            half_height,
            border_radius,
        },
        ShapeDesc::RoundCone {
            radius,
            half_height,
            border_radius,
        } => ColliderShapeDef::RoundConeY {
            radius,
            half_height,
            border_radius,
        },
    };

    WorldStaticDef {
        id: desc.id,
        translation: Vector3::new(tx, ty, tz),
        rotation,
        shape,
    }
}
