//! Core abstractions shared by the whole simulator.
//!
//! - [`types`]: poses, twists, step context and key events
//! - [`snapshot`]: lock-guarded cells handed to the viewer thread
//! - [`simulable::Simulable`]: trait to implement for new entity kinds

pub mod simulable;
pub mod snapshot;
pub mod types;
