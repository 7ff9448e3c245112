//! The simulated world: physics, entities, sensors and the step scheduler.
//!
//! # Sub-step
//!
//! ```text
//! pre_step   every entity, then every sensor
//! physics    one fixed-step integration (failure is fatal)
//! post_step  every entity (pose/twist refresh)
//! scene      prisms of all entities rebuilt for depth rendering
//! post_step  every sensor (reading refresh)
//! ```
//!
//! A failing entity callback is logged and skips that entity's remaining
//! callbacks and those of its sensors for the current sub-step only. A
//! failing sensor callback skips that sensor alone.

pub mod profiler;
pub mod scheduler;

pub use profiler::TimeLogger;
pub use scheduler::StepScheduler;

use crate::config::WorldConfig;
use crate::core::simulable::{EntityId, EntityView, Simulable, TeleopInput, TeleopOutput};
use crate::core::types::{Pose2D, Twist2D};
use crate::entities::{EntityBuildContext, EntityRegistry};
use crate::error::{Error, Result};
use crate::physics::PhysicsWorld;
use crate::sensors::{
    DepthRenderer, NoRenderer, PrismRaycaster, SceneGeometry, Sensor, SensorBuildContext,
    SensorEnv, SensorRegistry, SensorView,
};
use std::collections::HashMap;
use std::time::Instant;

/// Everything that gets stepped
pub struct World {
    physics: PhysicsWorld,
    scheduler: StepScheduler,
    entities: Vec<Box<dyn Simulable>>,
    sensors: Vec<Box<dyn Sensor>>,
    renderer: Box<dyn DepthRenderer>,
    scene: SceneGeometry,
    profiler: TimeLogger,
    /// Per-callback failures since creation
    step_errors: u64,
    // Per-sub-step scratch
    entity_failed: Vec<bool>,
    sensor_failed: Vec<bool>,
}

impl World {
    /// Empty world stepping with `dt` seconds
    pub fn new(dt: f64, gravity: f32, planar_gravity: [f32; 2]) -> Result<Self> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(Error::Config(format!("time step must be positive, got {}", dt)));
        }
        Ok(Self {
            physics: PhysicsWorld::new(dt as f32, gravity, planar_gravity),
            scheduler: StepScheduler::new(dt),
            entities: Vec::new(),
            sensors: Vec::new(),
            renderer: Box::new(PrismRaycaster::default()),
            scene: SceneGeometry::default(),
            profiler: TimeLogger::new(false),
            step_errors: 0,
            entity_failed: Vec::new(),
            sensor_failed: Vec::new(),
        })
    }

    /// Build a world with the default entity and sensor kinds
    pub fn from_config(config: &WorldConfig) -> Result<Self> {
        Self::from_config_with(config, &EntityRegistry::default(), &SensorRegistry::default())
    }

    /// Build a world resolving `type` tags through the given registries
    pub fn from_config_with(
        config: &WorldConfig,
        entity_registry: &EntityRegistry,
        sensor_registry: &SensorRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let params = &config.world;
        let mut world = Self::new(params.simul_timestep, params.gravity, params.planar_gravity)?;
        if params.depth_renderer == "none" {
            world.set_renderer(Box::new(NoRenderer));
        }

        let mut kind_counts: HashMap<&str, usize> = HashMap::new();
        let mut sensor_index = 0;

        for (n, entry) in config.entities.iter().enumerate() {
            let kind_index = kind_counts.get(entry.kind.as_str()).copied().unwrap_or(0);
            let built = {
                let mut ctx = EntityBuildContext {
                    physics: &mut world.physics,
                    world: config,
                    id: world.entities.len(),
                    kind_index,
                };
                entity_registry.create(&entry.kind, &entry.params, &mut ctx)
            };
            let id = match built.and_then(|entity| world.add_entity(entity)) {
                Ok(id) => id,
                Err(e) if params.partial_load => {
                    log::warn!("Skipping entity #{} ({}): {}", n, entry.kind, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            *kind_counts.entry(entry.kind.as_str()).or_insert(0) += 1;

            for sensor_entry in &entry.sensors {
                let parent_name = world.entities[id].name().to_string();
                let ctx = SensorBuildContext {
                    parent: id,
                    parent_name: &parent_name,
                    index: sensor_index,
                    random_seed: params.random_seed,
                };
                let built = sensor_registry
                    .create(&sensor_entry.kind, &sensor_entry.params, &ctx)
                    .and_then(|sensor| world.add_sensor(sensor));
                match built {
                    Ok(()) => sensor_index += 1,
                    Err(e) if params.partial_load => {
                        log::warn!(
                            "Skipping sensor {} on '{}': {}",
                            sensor_entry.kind,
                            parent_name,
                            e
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        log::info!(
            "World loaded: {} entities, {} sensors, dt = {} s",
            world.entities.len(),
            world.sensors.len(),
            params.simul_timestep
        );
        Ok(world)
    }

    /// Register an entity; names must be unique
    pub fn add_entity(&mut self, mut entity: Box<dyn Simulable>) -> Result<EntityId> {
        if self.entities.iter().any(|e| e.name() == entity.name()) {
            let name = entity.name().to_string();
            entity.destroy(&mut self.physics);
            return Err(Error::Config(format!("duplicate entity name '{}'", name)));
        }
        log::debug!("Registered entity '{}'", entity.name());
        self.entities.push(entity);
        Ok(self.entities.len() - 1)
    }

    /// Attach a sensor to the entity it names as parent
    pub fn add_sensor(&mut self, sensor: Box<dyn Sensor>) -> Result<()> {
        let parent = sensor.parent();
        let Some(entity) = self.entities.get(parent) else {
            return Err(Error::Config(format!(
                "sensor '{}' refers to unknown entity #{}",
                sensor.name(),
                parent
            )));
        };
        log::debug!("Attached sensor '{}' to '{}'", sensor.name(), entity.name());
        self.sensors.push(sensor);
        Ok(())
    }

    pub fn set_renderer(&mut self, renderer: Box<dyn DepthRenderer>) {
        self.renderer = renderer;
    }

    pub fn set_profiler(&mut self, profiler: TimeLogger) {
        self.profiler = profiler;
    }

    #[inline]
    pub fn profiler(&self) -> &TimeLogger {
        &self.profiler
    }

    #[inline]
    pub fn dt(&self) -> f64 {
        self.scheduler.dt()
    }

    #[inline]
    pub fn simul_time(&self) -> f64 {
        self.scheduler.simul_time()
    }

    #[inline]
    pub fn step_count(&self) -> u64 {
        self.scheduler.step_count()
    }

    /// Entity and sensor callback failures so far
    #[inline]
    pub fn step_errors(&self) -> u64 {
        self.step_errors
    }

    #[inline]
    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    #[inline]
    pub fn physics_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.physics
    }

    pub fn entities(&self) -> &[Box<dyn Simulable>] {
        &self.entities
    }

    pub fn sensors(&self) -> &[Box<dyn Sensor>] {
        &self.sensors
    }

    pub fn entity_id(&self, name: &str) -> Option<EntityId> {
        self.entities.iter().position(|e| e.name() == name)
    }

    pub fn entity(&self, name: &str) -> Option<&dyn Simulable> {
        self.entity_id(name).map(|id| self.entities[id].as_ref())
    }

    /// Prisms rendered by depth sensors during the last sub-step
    pub fn scene(&self) -> &SceneGeometry {
        &self.scene
    }

    /// Teleport an entity
    pub fn set_entity_pose(&mut self, id: EntityId, pose: Pose2D) -> Result<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| Error::Other(format!("no entity #{}", id)))?;
        entity.set_pose(&mut self.physics, pose);
        Ok(())
    }

    /// Overwrite an entity's body-frame velocity
    pub fn set_entity_twist(&mut self, id: EntityId, twist: Twist2D) -> Result<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| Error::Other(format!("no entity #{}", id)))?;
        entity.set_twist(&mut self.physics, twist);
        Ok(())
    }

    /// Forward a key to one entity's teleoperation handler
    pub fn teleop(&mut self, id: EntityId, input: &TeleopInput) -> Option<TeleopOutput> {
        self.entities.get_mut(id).map(|e| e.teleop(input))
    }

    /// Handles the viewer thread copies from
    pub fn gui_views(&self) -> (Vec<EntityView>, Vec<SensorView>) {
        (
            self.entities.iter().map(|e| e.gui_view()).collect(),
            self.sensors.iter().map(|s| s.gui_view()).collect(),
        )
    }

    /// Run `floor(elapsed / dt)` sub-steps; returns how many ran
    pub fn advance(&mut self, elapsed: f64) -> Result<u64> {
        let n = self.scheduler.substeps_for(elapsed);
        for _ in 0..n {
            self.step_once()?;
        }
        Ok(n)
    }

    /// One complete sub-step
    pub fn step_once(&mut self) -> Result<()> {
        self.entity_failed.clear();
        self.entity_failed.resize(self.entities.len(), false);
        self.sensor_failed.clear();
        self.sensor_failed.resize(self.sensors.len(), false);

        let pre = self.scheduler.pre_context();

        let t = Instant::now();
        for (i, entity) in self.entities.iter_mut().enumerate() {
            if let Err(e) = entity.pre_step(&pre, &mut self.physics) {
                log::warn!("{}: pre_step failed at t={:.3}: {}", entity.name(), pre.simul_time, e);
                self.entity_failed[i] = true;
                self.step_errors += 1;
            }
        }
        for (j, sensor) in self.sensors.iter_mut().enumerate() {
            if self.entity_failed[sensor.parent()] {
                self.sensor_failed[j] = true;
                continue;
            }
            if let Err(e) = sensor.pre_step(&pre) {
                log::warn!("{}: pre_step failed at t={:.3}: {}", sensor.name(), pre.simul_time, e);
                self.sensor_failed[j] = true;
                self.step_errors += 1;
            }
        }
        self.profiler.record("pre_step", t.elapsed());

        let t = Instant::now();
        self.physics.step()?;
        let post = self.scheduler.complete_step();
        self.profiler.record("physics", t.elapsed());

        let t = Instant::now();
        for (i, entity) in self.entities.iter_mut().enumerate() {
            if self.entity_failed[i] {
                continue;
            }
            if let Err(e) = entity.post_step(&post, &self.physics) {
                log::warn!("{}: post_step failed at t={:.3}: {}", entity.name(), post.simul_time, e);
                self.entity_failed[i] = true;
                self.step_errors += 1;
            }
        }

        self.scene.clear();
        for entity in &self.entities {
            if let Some(object) = entity.scene_object() {
                self.scene.push(object);
            }
        }
        self.profiler.record("post_step", t.elapsed());

        let t = Instant::now();
        for (j, sensor) in self.sensors.iter_mut().enumerate() {
            let parent = sensor.parent();
            if self.sensor_failed[j] || self.entity_failed[parent] {
                continue;
            }
            let env = SensorEnv {
                parent_pose: self.entities[parent].pose(),
                scene: &self.scene,
                renderer: &*self.renderer,
            };
            if let Err(e) = sensor.post_step(&post, &env) {
                log::warn!("{}: post_step failed at t={:.3}: {}", sensor.name(), post.simul_time, e);
                self.step_errors += 1;
            }
        }
        self.profiler.record("sensors", t.elapsed());

        Ok(())
    }
}

impl Drop for World {
    fn drop(&mut self) {
        for entity in &mut self.entities {
            entity.destroy(&mut self.physics);
        }
    }
}
