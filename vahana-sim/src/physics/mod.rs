//! Rigid-body dynamics for the simulated world.
//!
//! [`PhysicsWorld`] owns the `rapier2d` pipeline and exposes the handful of
//! capabilities the rest of the simulator needs:
//!
//! | Capability | Method |
//! |------------|--------|
//! | Create body + fixture from polygon | [`RigidBody::create`] |
//! | Ground friction constraints | [`PhysicsWorld::add_ground_anchors`] |
//! | Fixed-step integration | [`PhysicsWorld::step`] |
//! | Pose / velocity queries | [`PhysicsWorld::body_pose`], [`PhysicsWorld::body_twist`] |
//! | Force at a point | [`PhysicsWorld::apply_force`] |
//!
//! The world is viewed from above: by default there is no in-plane gravity,
//! and `gravity` is only used to size ground friction. Scenes that need
//! in-plane gravity (a side view) set `planar_gravity`.
//!
//! # Forces
//!
//! User forces are cleared after every [`step`](PhysicsWorld::step), so
//! controllers must re-apply them in each pre-step callback.

pub mod body;
mod friction;

pub use body::{BodyParams, RigidBody};
pub use rapier2d::prelude::RigidBodyHandle as BodyHandle;

use crate::core::types::{Pose2D, Twist2D};
use crate::error::{Error, Result};
use friction::GroundAnchor;
use rapier2d::prelude::*;

/// Standard gravity (m/s²)
pub const DEFAULT_GRAVITY: f32 = 9.81;

/// Physics world wrapping the rapier2d pipeline
pub struct PhysicsWorld {
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    ccd_solver: CCDSolver,
    params: IntegrationParameters,
    planar_gravity: Vector<Real>,
    gravity: f32,
    /// Fixed body standing for the floor. Anchors treat it as their
    /// immovable partner, so friction impulses only land on the sliding body.
    ground: RigidBodyHandle,
    anchors: Vec<GroundAnchor>,
    /// Bodies with user forces to clear after the next step
    forced: Vec<RigidBodyHandle>,
}

impl PhysicsWorld {
    /// Create an empty world integrating with fixed step `dt` (seconds)
    pub fn new(dt: f32, gravity: f32, planar_gravity: [f32; 2]) -> Self {
        let mut bodies = RigidBodySet::new();
        let ground = bodies.insert(RigidBodyBuilder::fixed().build());

        let params = IntegrationParameters {
            dt,
            ..IntegrationParameters::default()
        };

        Self {
            bodies,
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            params,
            planar_gravity: vector![planar_gravity[0], planar_gravity[1]],
            gravity,
            ground,
            anchors: Vec::new(),
            forced: Vec::new(),
        }
    }

    /// Fixed integration step (seconds)
    #[inline]
    pub fn dt(&self) -> f32 {
        self.params.dt
    }

    /// Gravity magnitude used for ground friction (m/s²)
    #[inline]
    pub fn gravity(&self) -> f32 {
        self.gravity
    }

    /// Shared static ground reference
    #[inline]
    pub fn ground_body(&self) -> BodyHandle {
        self.ground
    }

    /// Number of bodies, including the ground reference
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of ground friction anchors attached to `handle`
    pub fn anchor_count(&self, handle: BodyHandle) -> usize {
        self.anchors.iter().filter(|a| a.body == handle).count()
    }

    /// Number of colliders attached to `handle`
    pub fn collider_count(&self, handle: BodyHandle) -> usize {
        self.bodies.get(handle).map_or(0, |b| b.colliders().len())
    }

    /// Maximum friction force of each anchor attached to `handle`
    pub fn anchor_max_forces(&self, handle: BodyHandle) -> Vec<f32> {
        self.anchors
            .iter()
            .filter(|a| a.body == handle)
            .map(|a| a.max_force)
            .collect()
    }

    pub(crate) fn insert_body(&mut self, body: rapier2d::dynamics::RigidBody) -> BodyHandle {
        self.bodies.insert(body)
    }

    pub(crate) fn insert_collider(&mut self, collider: Collider, parent: BodyHandle) {
        self.colliders
            .insert_with_parent(collider, parent, &mut self.bodies);
    }

    /// Drop every collider attached to `handle` (shape reset)
    pub(crate) fn remove_colliders(&mut self, handle: BodyHandle) {
        let attached: Vec<ColliderHandle> = match self.bodies.get(handle) {
            Some(body) => body.colliders().to_vec(),
            None => return,
        };
        for collider in attached {
            self.colliders
                .remove(collider, &mut self.islands, &mut self.bodies, true);
        }
    }

    /// Tie `handle` to the ground at the given body-frame points.
    ///
    /// Each anchor resists sliding at its point with at most `max_force`
    /// newtons and no torque of its own. Replaces any previous anchors of
    /// the same body.
    pub fn add_ground_anchors(&mut self, handle: BodyHandle, points: &[[f32; 2]], max_force: f32) {
        self.anchors.retain(|a| a.body != handle);
        let share = 1.0 / points.len().max(1) as f32;
        for p in points {
            self.anchors.push(GroundAnchor {
                body: handle,
                local_point: point![p[0], p[1]],
                max_force,
                mass_share: share,
            });
        }
    }

    /// Advance the world by one fixed step.
    ///
    /// Fails with [`Error::Solver`] if any body ends up in a non-finite
    /// state; the run cannot continue from there.
    pub fn step(&mut self) -> Result<()> {
        friction::apply_ground_friction(&mut self.bodies, &self.anchors, self.params.dt);

        self.pipeline.step(
            &self.planar_gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );

        for handle in self.forced.drain(..) {
            if let Some(body) = self.bodies.get_mut(handle) {
                body.reset_forces(false);
                body.reset_torques(false);
            }
        }

        for (handle, body) in self.bodies.iter() {
            let t = body.translation();
            let v = body.linvel();
            let finite = t.x.is_finite()
                && t.y.is_finite()
                && body.rotation().angle().is_finite()
                && v.x.is_finite()
                && v.y.is_finite()
                && body.angvel().is_finite();
            if !finite {
                return Err(Error::Solver(format!(
                    "body {:?} diverged to a non-finite state",
                    handle
                )));
            }
        }

        Ok(())
    }

    /// World pose of a body
    pub fn body_pose(&self, handle: BodyHandle) -> Option<Pose2D> {
        self.bodies.get(handle).map(|b| {
            let t = b.translation();
            Pose2D::new(t.x, t.y, b.rotation().angle())
        })
    }

    /// Velocity of a body in its own frame
    pub fn body_twist(&self, handle: BodyHandle) -> Option<Twist2D> {
        self.bodies.get(handle).map(|b| {
            let v = b.linvel();
            Twist2D::from_world([v.x, v.y], b.angvel(), b.rotation().angle())
        })
    }

    /// Teleport a body
    pub fn set_body_pose(&mut self, handle: BodyHandle, pose: Pose2D) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_position(Isometry::new(vector![pose.x, pose.y], pose.yaw), true);
        }
    }

    /// Overwrite a body's velocity (given in the body frame)
    pub fn set_body_twist(&mut self, handle: BodyHandle, twist: Twist2D) {
        if let Some(body) = self.bodies.get_mut(handle) {
            let yaw = body.rotation().angle();
            let [vx, vy] = twist.to_world(yaw);
            body.set_linvel(vector![vx, vy], true);
            body.set_angvel(twist.omega, true);
        }
    }

    /// Apply `force` (world frame, N) at `local_point` (body frame, m) until the next step
    pub fn apply_force(&mut self, handle: BodyHandle, force: [f32; 2], local_point: [f32; 2]) {
        if let Some(body) = self.bodies.get_mut(handle) {
            let world_point = body.position() * point![local_point[0], local_point[1]];
            body.add_force_at_point(vector![force[0], force[1]], world_point, true);
            self.forced.push(handle);
        }
    }

    /// Whether a body is static (fixed in place)
    pub fn is_static(&self, handle: BodyHandle) -> bool {
        self.bodies
            .get(handle)
            .map(|b| b.body_type() == RigidBodyType::Fixed)
            .unwrap_or(true)
    }

    /// Switch a body between static and dynamic
    pub fn set_static(&mut self, handle: BodyHandle, is_static: bool) {
        if let Some(body) = self.bodies.get_mut(handle) {
            let body_type = if is_static {
                RigidBodyType::Fixed
            } else {
                RigidBodyType::Dynamic
            };
            body.set_body_type(body_type, true);
        }
    }

    /// Body mass (kg); zero for unknown handles
    pub fn body_mass(&self, handle: BodyHandle) -> f32 {
        self.bodies.get(handle).map(|b| b.mass()).unwrap_or(0.0)
    }

    /// Remove a body with its colliders and anchors
    pub fn remove_body(&mut self, handle: BodyHandle) {
        self.anchors.retain(|a| a.body != handle);
        self.forced.retain(|h| *h != handle);
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_box() -> Vec<[f32; 2]> {
        vec![[-0.5, -0.5], [-0.5, 0.5], [0.5, 0.5], [0.5, -0.5]]
    }

    #[test]
    fn test_free_body_keeps_velocity_without_friction() {
        let mut world = PhysicsWorld::new(0.01, DEFAULT_GRAVITY, [0.0, 0.0]);
        let params = BodyParams {
            ground_friction: 0.0,
            twist: Twist2D::new(1.0, 0.0, 0.0),
            ..BodyParams::new(unit_box())
        };
        let body = RigidBody::create(&mut world, &params).unwrap();
        let handle = body.handle().unwrap();

        for _ in 0..100 {
            world.step().unwrap();
        }
        let pose = world.body_pose(handle).unwrap();
        assert_relative_eq!(pose.x, 1.0, epsilon = 0.02);
        assert_relative_eq!(world.body_twist(handle).unwrap().vx, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_ground_friction_stops_sliding_body() {
        let mut world = PhysicsWorld::new(0.01, DEFAULT_GRAVITY, [0.0, 0.0]);
        let params = BodyParams {
            ground_friction: 0.5,
            twist: Twist2D::new(1.0, 0.0, 0.0),
            ..BodyParams::new(unit_box())
        };
        let body = RigidBody::create(&mut world, &params).unwrap();
        let handle = body.handle().unwrap();

        // mu * g = 4.9 m/s² deceleration -> stops in ~0.2 s
        for _ in 0..100 {
            world.step().unwrap();
        }
        let twist = world.body_twist(handle).unwrap();
        assert!(twist.vx.abs() < 0.05, "vx = {}", twist.vx);
        let pose = world.body_pose(handle).unwrap();
        assert!(pose.x > 0.05 && pose.x < 0.3, "x = {}", pose.x);
    }

    #[test]
    fn test_forces_cleared_after_step() {
        let mut world = PhysicsWorld::new(0.01, DEFAULT_GRAVITY, [0.0, 0.0]);
        let params = BodyParams {
            ground_friction: 0.0,
            ..BodyParams::new(unit_box())
        };
        let body = RigidBody::create(&mut world, &params).unwrap();
        let handle = body.handle().unwrap();

        world.apply_force(handle, [10.0, 0.0], [0.0, 0.0]);
        world.step().unwrap();
        let v1 = world.body_twist(handle).unwrap().vx;
        assert!(v1 > 0.0);

        world.step().unwrap();
        let v2 = world.body_twist(handle).unwrap().vx;
        assert_relative_eq!(v1, v2, epsilon = 1e-5);
    }

    #[test]
    fn test_non_finite_state_is_solver_error() {
        let mut world = PhysicsWorld::new(0.01, DEFAULT_GRAVITY, [0.0, 0.0]);
        let body = RigidBody::create(&mut world, &BodyParams::new(unit_box())).unwrap();
        let handle = body.handle().unwrap();

        world.apply_force(handle, [f32::NAN, 0.0], [0.0, 0.0]);
        assert!(matches!(world.step(), Err(Error::Solver(_))));
    }

    #[test]
    fn test_ground_reference_stays_fixed() {
        let mut world = PhysicsWorld::new(0.01, DEFAULT_GRAVITY, [0.0, -9.81]);
        let ground = world.ground_body();
        assert!(world.is_static(ground));
        assert_eq!(world.collider_count(ground), 0);

        let params = BodyParams {
            twist: Twist2D::new(2.0, 0.0, 0.0),
            ..BodyParams::new(unit_box())
        };
        RigidBody::create(&mut world, &params).unwrap();
        for _ in 0..50 {
            world.step().unwrap();
        }
        assert_eq!(world.body_pose(ground), Some(Pose2D::default()));
    }

    #[test]
    fn test_static_toggle() {
        let mut world = PhysicsWorld::new(0.01, DEFAULT_GRAVITY, [0.0, 0.0]);
        let body = RigidBody::create(&mut world, &BodyParams::new(unit_box())).unwrap();
        let handle = body.handle().unwrap();

        assert!(!world.is_static(handle));
        world.set_static(handle, true);
        assert!(world.is_static(handle));
        world.set_static(handle, false);
        assert!(!world.is_static(handle));
    }
}
