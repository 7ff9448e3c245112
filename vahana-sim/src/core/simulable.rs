//! The interface every simulated object implements.
//!
//! The world owns a list of `Box<dyn Simulable>` and drives them from the
//! step scheduler:
//!
//! ```text
//! pre_step(ctx, &mut physics)   apply controller forces
//!        physics.step()
//! post_step(ctx, &physics)      copy body pose/twist into the PoseCell
//! ```
//!
//! Pose and twist live in an `Arc<PoseCell>` shared with the viewer thread.
//! External writers (teleoperation, scripted resets) go through
//! [`Simulable::set_pose`] / [`Simulable::set_twist`], which take the same
//! lock as the stepping loop.

use crate::core::snapshot::{PoseCell, PoseGuard};
use crate::core::types::{KeyEvent, Pose2D, SimulContext, Twist2D};
use crate::error::Result;
use crate::physics::{PhysicsWorld, RigidBody};
use crate::sensors::depth::SceneObject;
use std::sync::Arc;

/// Index of an entity inside its world
pub type EntityId = usize;

/// Lifecycle of a simulated object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Not yet registered in a physics world
    Uninitialized,
    /// Built from configuration, no sub-step run yet
    Registered,
    /// At least one sub-step completed
    Active,
    /// Removed from the physics world
    Destroyed,
}

/// What the viewer needs to draw one entity
#[derive(Debug, Clone)]
pub struct EntityView {
    pub name: String,
    /// Outline in the body frame (empty for invisible entities)
    pub outline: Vec<[f32; 2]>,
    /// Shared pose/twist cell, copied by the viewer when dirty
    pub kinematics: Arc<PoseCell>,
}

/// A key forwarded to the selected entity
#[derive(Debug, Clone, Copy, Default)]
pub struct TeleopInput {
    pub key: Option<KeyEvent>,
}

/// Status lines returned by an entity's teleoperation handler
#[derive(Debug, Clone, Default)]
pub struct TeleopOutput {
    pub lines: Vec<String>,
}

/// A simulated object advanced by the step scheduler
pub trait Simulable: Send {
    /// Unique name within the world
    fn name(&self) -> &str;

    /// Lifecycle state
    fn state(&self) -> EntityState;

    /// Shared pose/twist cell
    fn kinematics(&self) -> &Arc<PoseCell>;

    /// Called before the physics step
    fn pre_step(&mut self, ctx: &SimulContext, physics: &mut PhysicsWorld) -> Result<()>;

    /// Called after the physics step
    fn post_step(&mut self, ctx: &SimulContext, physics: &PhysicsWorld) -> Result<()>;

    /// Physical body, if any
    fn body(&self) -> Option<&RigidBody> {
        None
    }

    /// Prism seen by depth sensors, in world coordinates
    fn scene_object(&self) -> Option<SceneObject> {
        None
    }

    /// Hook run while the stepping loop still holds the pose lock
    fn on_pose_changed(&mut self, _guard: &PoseGuard<'_>) {}

    /// Release physics resources; the entity stays readable afterwards
    fn destroy(&mut self, physics: &mut PhysicsWorld);

    /// Snapshot handles for the viewer
    fn gui_view(&self) -> EntityView;

    /// React to a key press; returns status lines for the viewer
    fn teleop(&mut self, _input: &TeleopInput) -> TeleopOutput {
        TeleopOutput::default()
    }

    /// Current pose (locks)
    fn pose(&self) -> Pose2D {
        self.kinematics().pose()
    }

    /// Current body-frame twist (locks)
    fn twist(&self) -> Twist2D {
        self.kinematics().twist()
    }

    /// Teleport the entity, moving its body along
    fn set_pose(&mut self, physics: &mut PhysicsWorld, pose: Pose2D) {
        let cell = Arc::clone(self.kinematics());
        let mut guard = cell.lock();
        guard.set_pose(pose);
        if let Some(handle) = self.body().and_then(RigidBody::handle) {
            physics.set_body_pose(handle, pose);
        }
        self.on_pose_changed(&guard);
    }

    /// Overwrite the body-frame velocity
    fn set_twist(&mut self, physics: &mut PhysicsWorld, twist: Twist2D) {
        let cell = Arc::clone(self.kinematics());
        let mut guard = cell.lock();
        guard.set_twist(twist);
        if let Some(handle) = self.body().and_then(RigidBody::handle) {
            physics.set_body_twist(handle, twist);
        }
    }
}

/// Copy a body's pose and twist out of the physics world under the pose lock.
///
/// Shared by every body-backed entity's `post_step`. Intangible bodies keep
/// whatever pose was last set.
pub fn sync_body_kinematics<S: Simulable + ?Sized>(entity: &mut S, physics: &PhysicsWorld) {
    let Some(handle) = entity.body().and_then(RigidBody::handle) else {
        return;
    };
    let (Some(pose), Some(twist)) = (physics.body_pose(handle), physics.body_twist(handle)) else {
        return;
    };

    let cell = Arc::clone(entity.kinematics());
    let mut guard = cell.lock();
    guard.set_pose(pose);
    guard.set_twist(twist);
    entity.on_pose_changed(&guard);
}
