//! World description loaded from TOML.
//!
//! ```toml
//! [world]
//! simul_timestep = 0.005
//! gravity = 9.81
//!
//! [gui]
//! refresh_period_ms = 25
//!
//! [block_classes.crate]
//! mass = 5.0
//!
//! [[entities]]
//! type = "block"
//! class = "crate"
//! pose = [1.0, 2.0, 45.0]
//!
//! [[entities.sensors]]
//! type = "lidar3d"
//! ```
//!
//! Entity and sensor tables keep every key except `type` (and `sensors`)
//! as a raw table; the factory registered for the tag parses the rest.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Top-level world file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorldConfig {
    #[serde(default)]
    pub world: WorldParams,

    #[serde(default)]
    pub gui: GuiParams,

    /// Named parameter sets referenced by `class = "..."`
    #[serde(default)]
    pub block_classes: HashMap<String, toml::Table>,

    #[serde(default)]
    pub entities: Vec<EntityEntry>,
}

/// `[world]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorldParams {
    /// Fixed physics sub-step (seconds)
    #[serde(default = "default_simul_timestep")]
    pub simul_timestep: f64,

    /// Gravity magnitude sizing ground friction (m/s²)
    #[serde(default = "default_gravity")]
    pub gravity: f32,

    /// In-plane gravity vector, zero for a top-down world
    #[serde(default)]
    pub planar_gravity: [f32; 2],

    /// Skip entities that fail to build instead of aborting the load
    #[serde(default)]
    pub partial_load: bool,

    /// Sensor noise seed (0 = entropy)
    #[serde(default)]
    pub random_seed: u64,

    /// Depth renderer for range sensors: "raycast" or "none"
    #[serde(default = "default_depth_renderer")]
    pub depth_renderer: String,
}

fn default_simul_timestep() -> f64 {
    0.005
}

fn default_gravity() -> f32 {
    9.81
}

fn default_depth_renderer() -> String {
    "raycast".to_string()
}

impl Default for WorldParams {
    fn default() -> Self {
        Self {
            simul_timestep: default_simul_timestep(),
            gravity: default_gravity(),
            planar_gravity: [0.0, 0.0],
            partial_load: false,
            random_seed: 0,
            depth_renderer: default_depth_renderer(),
        }
    }
}

/// `[gui]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuiParams {
    /// Viewer redraw period (milliseconds)
    #[serde(default = "default_refresh_period_ms")]
    pub refresh_period_ms: u64,
}

fn default_refresh_period_ms() -> u64 {
    25
}

impl Default for GuiParams {
    fn default() -> Self {
        Self {
            refresh_period_ms: default_refresh_period_ms(),
        }
    }
}

/// One `[[entities]]` table
#[derive(Debug, Clone, Deserialize)]
pub struct EntityEntry {
    /// Registry tag
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub sensors: Vec<SensorEntry>,

    /// Remaining keys, parsed by the entity factory
    #[serde(flatten)]
    pub params: toml::Table,
}

/// One `[[entities.sensors]]` table
#[derive(Debug, Clone, Deserialize)]
pub struct SensorEntry {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub params: toml::Table,
}

impl WorldConfig {
    /// Load and validate a world file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read world file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a world description
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: WorldConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that do not depend on entity kinds
    pub fn validate(&self) -> Result<()> {
        let w = &self.world;
        if !(w.simul_timestep > 0.0 && w.simul_timestep.is_finite()) {
            return Err(Error::Config(format!(
                "simul_timestep must be positive, got {}",
                w.simul_timestep
            )));
        }
        if !(w.gravity >= 0.0 && w.gravity.is_finite()) {
            return Err(Error::Config(format!(
                "gravity must be a non-negative number, got {}",
                w.gravity
            )));
        }
        if !matches!(w.depth_renderer.as_str(), "raycast" | "none") {
            return Err(Error::Config(format!(
                "depth_renderer must be \"raycast\" or \"none\", got \"{}\"",
                w.depth_renderer
            )));
        }
        if self.gui.refresh_period_ms == 0 {
            return Err(Error::Config("gui.refresh_period_ms must be > 0".to_string()));
        }
        Ok(())
    }

    /// Class table merged under an entity's own keys.
    ///
    /// Keys present in `params` win over the class; `class` itself is removed.
    pub fn resolve_class(&self, params: &toml::Table) -> Result<toml::Table> {
        let Some(class) = params.get("class") else {
            return Ok(params.clone());
        };
        let name = class
            .as_str()
            .ok_or_else(|| Error::Config("entity 'class' must be a string".to_string()))?;
        let class_params = self
            .block_classes
            .get(name)
            .ok_or_else(|| Error::Config(format!("unknown block class '{}'", name)))?;

        let mut merged = class_params.clone();
        for (key, value) in params {
            if key != "class" {
                merged.insert(key.clone(), value.clone());
            }
        }
        Ok(merged)
    }
}
