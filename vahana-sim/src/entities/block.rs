//! Polygonal block: the basic movable (or fixed) obstacle.

use super::{parse_params, EntityBuildContext};
use crate::core::simulable::{
    sync_body_kinematics, EntityId, EntityState, EntityView, Simulable, TeleopInput,
    TeleopOutput,
};
use crate::core::snapshot::{PoseCell, PoseGuard};
use crate::core::types::{KeyCode, Pose2D, SimulContext, Twist2D};
use crate::error::{Error, Result};
use crate::physics::body::validate_outline;
use crate::physics::{BodyParams, PhysicsWorld, RigidBody};
use crate::sensors::depth::SceneObject;
use serde::Deserialize;
use std::sync::Arc;

/// Teleop push increment, as an acceleration (m/s²)
const TELEOP_ACCEL_STEP: f32 = 0.5;

/// `[[entities]]` table of `type = "block"` (after class merge)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockConfig {
    /// Entity name (default: block001, block002, ...)
    #[serde(default)]
    pub name: Option<String>,

    /// Initial pose `[x, y, yaw_deg]`
    #[serde(default)]
    pub pose: [f32; 3],

    /// Initial body-frame velocity `[vx, vy, omega_deg_s]`
    #[serde(default)]
    pub twist: [f32; 3],

    /// Mass (kg)
    #[serde(default = "default_mass")]
    pub mass: f32,

    #[serde(default = "default_ground_friction")]
    pub ground_friction: f32,

    #[serde(default = "default_lateral_friction")]
    pub lateral_friction: f32,

    #[serde(default = "default_restitution")]
    pub restitution: f32,

    /// Bottom of the prism (meters)
    #[serde(default)]
    pub z_min: f32,

    /// Top of the prism (meters)
    #[serde(default = "default_z_max")]
    pub z_max: f32,

    /// Visible to sensors but not part of the physics world
    #[serde(default)]
    pub intangible: bool,

    #[serde(rename = "static", default)]
    pub is_static: bool,

    /// Convex outline in the body frame
    #[serde(default = "default_shape")]
    pub shape: Vec<[f32; 2]>,
}

fn default_mass() -> f32 {
    1.0
}
fn default_ground_friction() -> f32 {
    0.5
}
fn default_lateral_friction() -> f32 {
    0.5
}
fn default_restitution() -> f32 {
    0.01
}
fn default_z_max() -> f32 {
    1.0
}
fn default_shape() -> Vec<[f32; 2]> {
    vec![[-0.5, -0.5], [-0.5, 0.5], [0.5, 0.5], [0.5, -0.5]]
}

impl BlockConfig {
    pub fn initial_pose(&self) -> Pose2D {
        Pose2D::new(self.pose[0], self.pose[1], self.pose[2].to_radians())
    }

    pub fn initial_twist(&self) -> Twist2D {
        Twist2D::new(self.twist[0], self.twist[1], self.twist[2].to_radians())
    }

    pub fn validate(&self) -> Result<()> {
        validate_outline(&self.shape)?;
        if !(self.z_min < self.z_max) {
            return Err(Error::Config(format!(
                "block needs z_min < z_max, got [{}, {}]",
                self.z_min, self.z_max
            )));
        }
        if !(self.mass > 0.0) {
            return Err(Error::Config(format!("block mass must be positive, got {}", self.mass)));
        }
        if self.ground_friction < 0.0 || self.lateral_friction < 0.0 || self.restitution < 0.0 {
            return Err(Error::Config(
                "block friction and restitution must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Force and torque held by the block's teleoperation
#[derive(Debug, Clone, Copy, Default)]
struct HeldPush {
    /// Body-frame force (N)
    force: [f32; 2],
    /// Torque (N·m)
    torque: f32,
}

/// A convex prism with an optional rigid body
pub struct Block {
    id: EntityId,
    name: String,
    state: EntityState,
    body: RigidBody,
    mass: f32,
    z_min: f32,
    z_max: f32,
    kinematics: Arc<PoseCell>,
    /// Outline in world coordinates, refreshed on every pose change
    world_outline: Vec<[f32; 2]>,
    push: HeldPush,
}

impl Block {
    pub fn new(id: EntityId, name: String, config: &BlockConfig, physics: &mut PhysicsWorld) -> Result<Self> {
        config.validate()?;
        let pose = config.initial_pose();
        let twist = config.initial_twist();

        let body = if config.intangible {
            RigidBody::intangible(config.shape.clone())
        } else {
            let params = BodyParams {
                mass: config.mass,
                ground_friction: config.ground_friction,
                lateral_friction: config.lateral_friction,
                restitution: config.restitution,
                is_static: config.is_static,
                pose,
                twist,
                ..BodyParams::new(config.shape.clone())
            };
            RigidBody::create(physics, &params)?
        };

        let world_outline = config.shape.iter().map(|p| pose.transform_point(*p)).collect();

        Ok(Self {
            id,
            name,
            state: EntityState::Registered,
            body,
            mass: config.mass,
            z_min: config.z_min,
            z_max: config.z_max,
            kinematics: Arc::new(PoseCell::new(pose, twist)),
            world_outline,
            push: HeldPush::default(),
        })
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Intangible blocks report static
    pub fn is_static(&self, physics: &PhysicsWorld) -> bool {
        self.body.is_static(physics)
    }

    pub fn set_static(&self, physics: &mut PhysicsWorld, is_static: bool) {
        self.body.set_static(physics, is_static);
    }

    /// Held teleop force (body frame) and torque
    pub fn held_push(&self) -> ([f32; 2], f32) {
        (self.push.force, self.push.torque)
    }

    fn apply_held_push(&self, physics: &mut PhysicsWorld) {
        let HeldPush { force, torque } = self.push;
        if force == [0.0, 0.0] && torque == 0.0 {
            return;
        }
        let Some(pose) = self.body.handle().and_then(|h| physics.body_pose(h)) else {
            return;
        };

        if force != [0.0, 0.0] {
            self.body.apply_force(physics, pose.rotate_vector(force), [0.0, 0.0]);
        }
        if torque != 0.0 {
            // Force couple across the body
            let r = self.body.max_radius();
            let f = torque / (2.0 * r);
            self.body.apply_force(physics, pose.rotate_vector([0.0, f]), [r, 0.0]);
            self.body.apply_force(physics, pose.rotate_vector([0.0, -f]), [-r, 0.0]);
        }
    }
}

impl Simulable for Block {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> EntityState {
        self.state
    }

    fn kinematics(&self) -> &Arc<PoseCell> {
        &self.kinematics
    }

    fn pre_step(&mut self, _ctx: &SimulContext, physics: &mut PhysicsWorld) -> Result<()> {
        self.apply_held_push(physics);
        Ok(())
    }

    fn post_step(&mut self, _ctx: &SimulContext, physics: &PhysicsWorld) -> Result<()> {
        sync_body_kinematics(self, physics);
        self.state = EntityState::Active;
        Ok(())
    }

    fn body(&self) -> Option<&RigidBody> {
        Some(&self.body)
    }

    fn scene_object(&self) -> Option<SceneObject> {
        Some(SceneObject {
            owner: self.id,
            polygon: self.world_outline.clone(),
            z_min: self.z_min,
            z_max: self.z_max,
        })
    }

    fn on_pose_changed(&mut self, guard: &PoseGuard<'_>) {
        let pose = guard.pose();
        self.world_outline.clear();
        self.world_outline
            .extend(self.body.outline().iter().map(|p| pose.transform_point(*p)));
    }

    fn destroy(&mut self, physics: &mut PhysicsWorld) {
        self.body.destroy(physics);
        self.state = EntityState::Destroyed;
    }

    fn gui_view(&self) -> EntityView {
        EntityView {
            name: self.name.clone(),
            outline: self.body.outline().to_vec(),
            kinematics: Arc::clone(&self.kinematics),
        }
    }

    fn teleop(&mut self, input: &TeleopInput) -> TeleopOutput {
        let step = self.mass * TELEOP_ACCEL_STEP;
        let torque_step = step * self.body.max_radius();

        if let Some(key) = input.key {
            match key.code {
                KeyCode::Char('w') => self.push.force[0] += step,
                KeyCode::Char('s') => self.push.force[0] -= step,
                KeyCode::Char('a') => self.push.force[1] += step,
                KeyCode::Char('d') => self.push.force[1] -= step,
                KeyCode::Char('q') => self.push.torque += torque_step,
                KeyCode::Char('e') => self.push.torque -= torque_step,
                KeyCode::Char(' ') => self.push = HeldPush::default(),
                _ => {}
            }
        }

        TeleopOutput {
            lines: vec![
                "Block teleop: [w/s] push x  [a/d] push y  [q/e] torque  [space] release"
                    .to_string(),
                format!(
                    "Push force=({:.1}, {:.1}) N torque={:.2} N·m",
                    self.push.force[0], self.push.force[1], self.push.torque
                ),
            ],
        }
    }
}

/// Registry factory for `type = "block"`
pub(crate) fn build(params: &toml::Table, ctx: &mut EntityBuildContext<'_>) -> Result<Box<dyn Simulable>> {
    let merged = ctx.world.resolve_class(params)?;
    let config: BlockConfig = parse_params("block", &merged)?;
    let name = config
        .name
        .clone()
        .unwrap_or_else(|| format!("block{:03}", ctx.kind_index + 1));
    let label = name.clone();
    let block = Block::new(ctx.id, name, &config, ctx.physics).map_err(|e| match e {
        Error::Config(msg) => Error::Config(format!("block '{}': {}", label, msg)),
        other => other,
    })?;
    Ok(Box::new(block))
}
