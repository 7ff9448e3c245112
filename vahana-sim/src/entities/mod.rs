//! Entity kinds and the registry that builds them from configuration.
//!
//! | Tag | Type | Body |
//! |-----|------|------|
//! | `block` | [`Block`] | polygon prism, dynamic or static |
//! | `invisible` | [`InvisibleEntity`] | none (sensor carrier) |
//!
//! New kinds are added with [`EntityRegistry::register`].

mod block;
mod invisible;

pub use block::{Block, BlockConfig};
pub use invisible::{InvisibleConfig, InvisibleEntity};

use crate::config::WorldConfig;
use crate::core::simulable::{EntityId, Simulable};
use crate::error::{Error, Result};
use crate::physics::PhysicsWorld;
use std::collections::HashMap;

/// Everything a factory may touch while building one entity
pub struct EntityBuildContext<'a> {
    pub physics: &'a mut PhysicsWorld,
    pub world: &'a WorldConfig,
    /// Id the entity will get in the world
    pub id: EntityId,
    /// How many entities of the same tag were built before this one
    pub kind_index: usize,
}

/// Builds an entity from its configuration table (`type` and `sensors` removed)
pub type EntityFactory =
    fn(&toml::Table, &mut EntityBuildContext<'_>) -> Result<Box<dyn Simulable>>;

/// Entity factories keyed by `type` tag
#[derive(Clone)]
pub struct EntityRegistry {
    factories: HashMap<String, EntityFactory>,
}

impl EntityRegistry {
    /// Registry without any entity kind
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory, replacing any previous one for the same tag
    pub fn register(&mut self, tag: &str, factory: EntityFactory) {
        self.factories.insert(tag.to_string(), factory);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    pub fn create(
        &self,
        tag: &str,
        params: &toml::Table,
        ctx: &mut EntityBuildContext<'_>,
    ) -> Result<Box<dyn Simulable>> {
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| Error::UnknownEntityType(tag.to_string()))?;
        factory(params, ctx)
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("block", block::build);
        registry.register("invisible", invisible::build);
        registry
    }
}

/// Parse a factory's parameter table, naming the entity in errors
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(
    kind: &str,
    params: &toml::Table,
) -> Result<T> {
    toml::Value::Table(params.clone())
        .try_into()
        .map_err(|e| {
            let name = params
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("<unnamed>");
            Error::Config(format!("{} '{}': {}", kind, name, e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::DEFAULT_GRAVITY;

    #[test]
    fn test_unknown_entity_type() {
        let registry = EntityRegistry::default();
        let world = WorldConfig::default();
        let mut physics = PhysicsWorld::new(0.01, DEFAULT_GRAVITY, [0.0, 0.0]);
        let mut ctx = EntityBuildContext {
            physics: &mut physics,
            world: &world,
            id: 0,
            kind_index: 0,
        };
        let result = registry.create("car", &toml::Table::new(), &mut ctx);
        assert!(matches!(result, Err(Error::UnknownEntityType(t)) if t == "car"));
    }

    #[test]
    fn test_custom_registration() {
        fn dummy(
            params: &toml::Table,
            ctx: &mut EntityBuildContext<'_>,
        ) -> Result<Box<dyn Simulable>> {
            invisible::build(params, ctx)
        }

        let mut registry = EntityRegistry::empty();
        assert!(!registry.contains("marker"));
        registry.register("marker", dummy);

        let world = WorldConfig::default();
        let mut physics = PhysicsWorld::new(0.01, DEFAULT_GRAVITY, [0.0, 0.0]);
        let mut ctx = EntityBuildContext {
            physics: &mut physics,
            world: &world,
            id: 3,
            kind_index: 1,
        };
        let entity = registry.create("marker", &toml::Table::new(), &mut ctx).unwrap();
        assert_eq!(entity.name(), "invisible002");
    }
}
