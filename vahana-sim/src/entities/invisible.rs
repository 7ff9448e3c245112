//! Invisible dummy entity: a fixed pose that only carries sensors.

use super::{parse_params, EntityBuildContext};
use crate::core::simulable::{EntityState, EntityView, Simulable};
use crate::core::snapshot::PoseCell;
use crate::core::types::{Pose2D, SimulContext, Twist2D};
use crate::error::Result;
use crate::physics::PhysicsWorld;
use serde::Deserialize;
use std::sync::Arc;

/// `[[entities]]` table of `type = "invisible"`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvisibleConfig {
    #[serde(default)]
    pub name: Option<String>,

    /// Pose `[x, y, yaw_deg]`
    #[serde(default)]
    pub pose: [f32; 3],
}

/// Entity without body or geometry
pub struct InvisibleEntity {
    name: String,
    state: EntityState,
    kinematics: Arc<PoseCell>,
}

impl InvisibleEntity {
    pub fn new(name: String, pose: Pose2D) -> Self {
        Self {
            name,
            state: EntityState::Registered,
            kinematics: Arc::new(PoseCell::new(pose, Twist2D::default())),
        }
    }
}

impl Simulable for InvisibleEntity {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> EntityState {
        self.state
    }

    fn kinematics(&self) -> &Arc<PoseCell> {
        &self.kinematics
    }

    fn pre_step(&mut self, _ctx: &SimulContext, _physics: &mut PhysicsWorld) -> Result<()> {
        Ok(())
    }

    fn post_step(&mut self, _ctx: &SimulContext, _physics: &PhysicsWorld) -> Result<()> {
        self.state = EntityState::Active;
        Ok(())
    }

    fn destroy(&mut self, _physics: &mut PhysicsWorld) {
        self.state = EntityState::Destroyed;
    }

    fn gui_view(&self) -> EntityView {
        EntityView {
            name: self.name.clone(),
            outline: Vec::new(),
            kinematics: Arc::clone(&self.kinematics),
        }
    }
}

/// Registry factory for `type = "invisible"`
pub(crate) fn build(params: &toml::Table, ctx: &mut EntityBuildContext<'_>) -> Result<Box<dyn Simulable>> {
    let config: InvisibleConfig = parse_params("invisible", params)?;
    let name = config
        .name
        .unwrap_or_else(|| format!("invisible{:03}", ctx.kind_index + 1));
    let pose = Pose2D::new(config.pose[0], config.pose[1], config.pose[2].to_radians());
    Ok(Box::new(InvisibleEntity::new(name, pose)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::DEFAULT_GRAVITY;

    #[test]
    fn test_invisible_keeps_pose() {
        let mut physics = PhysicsWorld::new(0.01, DEFAULT_GRAVITY, [0.0, 0.0]);
        let mut entity = InvisibleEntity::new("dummy".to_string(), Pose2D::new(1.0, 1.0, 0.0));
        let ctx = SimulContext {
            simul_time: 0.01,
            dt: 0.01,
            step_count: 1,
        };

        entity.pre_step(&ctx, &mut physics).unwrap();
        physics.step().unwrap();
        entity.post_step(&ctx, &physics).unwrap();

        assert_eq!(entity.state(), EntityState::Active);
        assert_eq!(entity.pose(), Pose2D::new(1.0, 1.0, 0.0));
        assert!(entity.scene_object().is_none());
        assert!(entity.body().is_none());

        entity.set_pose(&mut physics, Pose2D::new(2.0, 0.0, 0.0));
        assert_eq!(entity.pose().x, 2.0);
    }
}
