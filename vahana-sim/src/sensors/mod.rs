//! Sensors attached to simulated entities.
//!
//! # Module Structure
//!
//! - [`depth`]: depth buffer rendering of the scene prisms
//! - [`lidar3d`]: 3D lidar reading ranges from depth buffers through a per-ray LUT
//! - [`noise`]: seeded Gaussian range error
//!
//! Sensors are built from `[[entities.sensors]]` tables through a
//! [`SensorRegistry`] keyed by the table's `type` tag.

pub mod depth;
pub mod lidar3d;
mod noise;

pub use depth::{DepthRenderer, NoRenderer, PrismRaycaster, SceneGeometry, SceneObject};
pub use lidar3d::{Lidar3D, Lidar3DConfig, LidarReturn, LidarScan};
pub use noise::RangeNoise;

use crate::core::simulable::EntityId;
use crate::core::snapshot::SnapshotCell;
use crate::core::types::{Pose2D, SimulContext};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// World state handed to sensors after the physics step
pub struct SensorEnv<'a> {
    /// Pose of the entity carrying the sensor
    pub parent_pose: Pose2D,
    /// Scene prisms as of this sub-step
    pub scene: &'a SceneGeometry,
    pub renderer: &'a dyn DepthRenderer,
}

/// What the viewer needs to draw one sensor
#[derive(Debug, Clone)]
pub struct SensorView {
    pub name: String,
    pub parent: EntityId,
    /// Latest completed scan, if the sensor produces point clouds
    pub scan: Option<Arc<SnapshotCell<LidarScan>>>,
}

/// A sensor driven by the step scheduler
pub trait Sensor: Send {
    fn name(&self) -> &str;

    /// Entity the sensor is mounted on
    fn parent(&self) -> EntityId;

    /// Called before the physics step
    fn pre_step(&mut self, _ctx: &SimulContext) -> Result<()> {
        Ok(())
    }

    /// Called after all entities refreshed their pose
    fn post_step(&mut self, ctx: &SimulContext, env: &SensorEnv<'_>) -> Result<()>;

    fn gui_view(&self) -> SensorView;
}

/// Information available while building a sensor
#[derive(Debug, Clone, Copy)]
pub struct SensorBuildContext<'a> {
    pub parent: EntityId,
    pub parent_name: &'a str,
    /// Position of this sensor among all sensors of the world
    pub index: usize,
    /// World random seed (0 = entropy)
    pub random_seed: u64,
}

impl SensorBuildContext<'_> {
    /// Per-sensor noise seed derived from the world seed
    pub fn noise_seed(&self) -> u64 {
        if self.random_seed == 0 {
            0
        } else {
            self.random_seed.wrapping_add(self.index as u64 + 1).max(1)
        }
    }
}

/// Builds a sensor from its configuration table
pub type SensorFactory = fn(&toml::Table, &SensorBuildContext<'_>) -> Result<Box<dyn Sensor>>;

/// Sensor factories keyed by `type` tag
#[derive(Clone)]
pub struct SensorRegistry {
    factories: HashMap<String, SensorFactory>,
}

impl SensorRegistry {
    /// Registry without any sensor kind
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory, replacing any previous one for the same tag
    pub fn register(&mut self, tag: &str, factory: SensorFactory) {
        self.factories.insert(tag.to_string(), factory);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Build a sensor of kind `tag`
    pub fn create(
        &self,
        tag: &str,
        params: &toml::Table,
        ctx: &SensorBuildContext<'_>,
    ) -> Result<Box<dyn Sensor>> {
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| Error::UnknownSensorType(tag.to_string()))?;
        factory(params, ctx)
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("lidar3d", lidar3d::build);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_sensor_type() {
        let registry = SensorRegistry::default();
        let ctx = SensorBuildContext {
            parent: 0,
            parent_name: "r1",
            index: 0,
            random_seed: 0,
        };
        let result = registry.create("sonar", &toml::Table::new(), &ctx);
        assert!(matches!(result, Err(Error::UnknownSensorType(t)) if t == "sonar"));
        assert!(registry.contains("lidar3d"));
    }

    #[test]
    fn test_noise_seed_derivation() {
        let mut ctx = SensorBuildContext {
            parent: 0,
            parent_name: "r1",
            index: 2,
            random_seed: 0,
        };
        assert_eq!(ctx.noise_seed(), 0);
        ctx.random_seed = 10;
        assert_eq!(ctx.noise_seed(), 13);
    }
}
