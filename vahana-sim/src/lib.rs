//! VahanaSim - multi-vehicle 2D physics simulator with 3D lidar
//!
//! Rigid bodies move on a plane under `rapier2d` dynamics with a ground
//! friction model. Lidars read ranges from depth buffers through a per-ray
//! lookup table. A viewer thread draws the latest snapshots and sends key
//! presses back to the simulation thread.
//!
//! ## Modules
//!
//! - [`world`]: fixed-step scheduler driving entities, physics and sensors
//! - [`entities`]: blocks and other simulated objects
//! - [`sensors`]: depth rendering and the 3D lidar
//! - [`physics`]: bodies, fixtures and ground friction over `rapier2d`
//! - [`gui`]: viewer thread and its shared context
//! - [`launch`]: the real-time loop behind the `vahana-sim` binary

pub mod config;
pub mod core;
pub mod entities;
pub mod error;
pub mod gui;
pub mod launch;
pub mod physics;
pub mod sensors;
pub mod world;

// Re-export commonly used types
pub use config::WorldConfig;
pub use error::{Error, Result};
pub use world::World;
