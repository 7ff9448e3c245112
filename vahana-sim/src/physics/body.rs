//! Body and fixture assembly for one simulated object.
//!
//! Each tangible object becomes one rapier body with a single convex
//! polygon collider, plus two ground anchors on the body's x axis at
//! `±max_radius` sharing the friction budget `mu * m * g`.

use super::{BodyHandle, PhysicsWorld};
use crate::core::types::{
    update_max_radius_from_poly, Pose2D, Twist2D, MAX_POLYGON_VERTICES,
};
use crate::error::{Error, Result};
use rapier2d::prelude::*;

/// Number of ground contact points per body
pub const GROUND_CONTACT_POINTS: usize = 2;

/// Physical parameters of one body
#[derive(Debug, Clone)]
pub struct BodyParams {
    /// Convex outline in the body frame (meters)
    pub outline: Vec<[f32; 2]>,
    /// Total mass (kg)
    pub mass: f32,
    /// Floor friction coefficient
    pub ground_friction: f32,
    /// Body-to-body friction coefficient
    pub lateral_friction: f32,
    /// Body-to-body restitution
    pub restitution: f32,
    /// Fixed in place
    pub is_static: bool,
    /// Initial pose
    pub pose: Pose2D,
    /// Initial velocity (body frame)
    pub twist: Twist2D,
}

impl BodyParams {
    pub fn new(outline: Vec<[f32; 2]>) -> Self {
        Self {
            outline,
            mass: 1.0,
            ground_friction: 0.5,
            lateral_friction: 0.5,
            restitution: 0.01,
            is_static: false,
            pose: Pose2D::default(),
            twist: Twist2D::default(),
        }
    }
}

/// Check vertex count and mass before touching the physics engine
pub fn validate_outline(outline: &[[f32; 2]]) -> Result<()> {
    let n = outline.len();
    if n < 3 {
        return Err(Error::Config(format!(
            "body outline needs at least 3 vertices, got {}",
            n
        )));
    }
    if n > MAX_POLYGON_VERTICES {
        return Err(Error::Config(format!(
            "body outline has {} vertices, maximum is {}",
            n, MAX_POLYGON_VERTICES
        )));
    }
    if outline.iter().flatten().any(|c| !c.is_finite()) {
        return Err(Error::Config("body outline has non-finite vertices".to_string()));
    }
    Ok(())
}

/// Physical representation of one entity.
///
/// `handle` is `None` for intangible objects; every operation on those is a
/// no-op.
#[derive(Debug, Clone)]
pub struct RigidBody {
    handle: Option<BodyHandle>,
    outline: Vec<[f32; 2]>,
    max_radius: f32,
    mass: f32,
    ground_friction: f32,
    lateral_friction: f32,
    restitution: f32,
}

impl RigidBody {
    /// A body with geometry but no physics representation
    pub fn intangible(outline: Vec<[f32; 2]>) -> Self {
        let max_radius = update_max_radius_from_poly(&outline);
        Self {
            handle: None,
            outline,
            max_radius,
            mass: 0.0,
            ground_friction: 0.0,
            lateral_friction: 0.0,
            restitution: 0.0,
        }
    }

    /// Register body, fixture and ground anchors in the physics world
    pub fn create(world: &mut PhysicsWorld, params: &BodyParams) -> Result<Self> {
        validate_outline(&params.outline)?;
        if !(params.mass > 0.0) {
            return Err(Error::Config(format!(
                "body mass must be positive, got {}",
                params.mass
            )));
        }

        let builder = if params.is_static {
            RigidBodyBuilder::fixed()
        } else {
            RigidBodyBuilder::dynamic()
        };
        let [vx, vy] = params.twist.to_world(params.pose.yaw);
        let body = builder
            .translation(vector![params.pose.x, params.pose.y])
            .rotation(params.pose.yaw)
            .linvel(vector![vx, vy])
            .angvel(params.twist.omega)
            .build();
        let handle = world.insert_body(body);

        let mut rigid = Self {
            handle: Some(handle),
            outline: Vec::new(),
            max_radius: 0.0,
            mass: params.mass,
            ground_friction: params.ground_friction,
            lateral_friction: params.lateral_friction,
            restitution: params.restitution,
        };
        let collider = match rigid.build_collider(&params.outline) {
            Ok(collider) => collider,
            Err(e) => {
                world.remove_body(handle);
                return Err(e);
            }
        };
        rigid.install_shape(world, handle, collider, params.outline.clone());
        Ok(rigid)
    }

    /// Replace the outline, rebuilding the fixture and ground anchors.
    ///
    /// On error the body keeps its previous fixture, mass and anchors.
    pub fn reset_shape(&mut self, world: &mut PhysicsWorld, outline: Vec<[f32; 2]>) -> Result<()> {
        validate_outline(&outline)?;
        match self.handle {
            Some(handle) => {
                let collider = self.build_collider(&outline)?;
                world.remove_colliders(handle);
                self.install_shape(world, handle, collider, outline);
            }
            None => {
                self.max_radius = update_max_radius_from_poly(&outline);
                self.outline = outline;
            }
        }
        Ok(())
    }

    fn build_collider(&self, outline: &[[f32; 2]]) -> Result<Collider> {
        let points: Vec<Point<Real>> = outline.iter().map(|p| point![p[0], p[1]]).collect();
        let collider = ColliderBuilder::convex_hull(&points)
            .ok_or_else(|| Error::Config("body outline is degenerate".to_string()))?
            .mass(self.mass)
            .friction(self.lateral_friction)
            .restitution(self.restitution)
            .build();
        Ok(collider)
    }

    fn install_shape(
        &mut self,
        world: &mut PhysicsWorld,
        handle: BodyHandle,
        collider: Collider,
        outline: Vec<[f32; 2]>,
    ) {
        world.insert_collider(collider, handle);
        self.max_radius = update_max_radius_from_poly(&outline);
        self.outline = outline;

        let weight_per_contact_point =
            self.mass * world.gravity() / GROUND_CONTACT_POINTS as f32;
        let max_friction = self.ground_friction * weight_per_contact_point;
        let contact_points = [[self.max_radius, 0.0], [-self.max_radius, 0.0]];
        world.add_ground_anchors(handle, &contact_points, max_friction);
    }

    #[inline]
    pub fn handle(&self) -> Option<BodyHandle> {
        self.handle
    }

    #[inline]
    pub fn is_intangible(&self) -> bool {
        self.handle.is_none()
    }

    /// Outline in the body frame
    #[inline]
    pub fn outline(&self) -> &[[f32; 2]] {
        &self.outline
    }

    /// Radius enclosing the outline
    #[inline]
    pub fn max_radius(&self) -> f32 {
        self.max_radius
    }

    /// Apply a world-frame force at a body-frame point
    pub fn apply_force(&self, world: &mut PhysicsWorld, force: [f32; 2], local_point: [f32; 2]) {
        if let Some(handle) = self.handle {
            world.apply_force(handle, force, local_point);
        }
    }

    /// Intangible bodies report static
    pub fn is_static(&self, world: &PhysicsWorld) -> bool {
        match self.handle {
            Some(handle) => world.is_static(handle),
            None => true,
        }
    }

    pub fn set_static(&self, world: &mut PhysicsWorld, is_static: bool) {
        if let Some(handle) = self.handle {
            world.set_static(handle, is_static);
        }
    }

    /// Remove the body from the world; the outline stays readable
    pub fn destroy(&mut self, world: &mut PhysicsWorld) {
        if let Some(handle) = self.handle.take() {
            world.remove_body(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::DEFAULT_GRAVITY;
    use approx::assert_relative_eq;

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(0.01, DEFAULT_GRAVITY, [0.0, 0.0])
    }

    fn square(half: f32) -> Vec<[f32; 2]> {
        vec![[-half, -half], [-half, half], [half, half], [half, -half]]
    }

    #[test]
    fn test_vertex_count_limits() {
        let mut w = world();
        let two = BodyParams::new(vec![[0.0, 0.0], [1.0, 0.0]]);
        assert!(matches!(RigidBody::create(&mut w, &two), Err(Error::Config(_))));

        let nine: Vec<[f32; 2]> = (0..9)
            .map(|i| {
                let a = i as f32 * std::f32::consts::TAU / 9.0;
                [a.cos(), a.sin()]
            })
            .collect();
        let too_many = BodyParams::new(nine);
        assert!(matches!(RigidBody::create(&mut w, &too_many), Err(Error::Config(_))));
        assert_eq!(w.body_count(), 1);
    }

    #[test]
    fn test_anchor_friction_cap() {
        let mut w = world();
        let params = BodyParams {
            mass: 20.0,
            ground_friction: 0.4,
            ..BodyParams::new(square(0.5))
        };
        let body = RigidBody::create(&mut w, &params).unwrap();
        let handle = body.handle().unwrap();

        assert_eq!(w.anchor_count(handle), GROUND_CONTACT_POINTS);
        for cap in w.anchor_max_forces(handle) {
            assert_relative_eq!(cap, 0.4 * 20.0 * DEFAULT_GRAVITY / 2.0, epsilon = 1e-4);
        }
        assert_relative_eq!(body.max_radius(), 0.5f32.hypot(0.5), epsilon = 1e-6);
        assert_relative_eq!(w.body_mass(handle), 20.0, epsilon = 1e-3);
    }

    #[test]
    fn test_intangible_is_noop() {
        let mut w = world();
        let body = RigidBody::intangible(square(0.2));
        body.apply_force(&mut w, [10.0, 0.0], [0.0, 0.0]);
        body.set_static(&mut w, false);
        assert!(body.is_static(&w));
        assert!(body.is_intangible());
        assert_eq!(w.body_count(), 1);
    }

    #[test]
    fn test_reset_shape_updates_radius() {
        let mut w = world();
        let mut body = RigidBody::create(&mut w, &BodyParams::new(square(0.5))).unwrap();
        body.reset_shape(&mut w, square(1.0)).unwrap();
        assert_relative_eq!(body.max_radius(), 2.0f32.sqrt(), epsilon = 1e-6);
        assert_eq!(w.anchor_count(body.handle().unwrap()), GROUND_CONTACT_POINTS);

        assert!(body.reset_shape(&mut w, vec![[0.0, 0.0]]).is_err());
    }

    #[test]
    fn test_rejected_reset_keeps_previous_shape() {
        let mut w = world();
        let params = BodyParams {
            mass: 3.0,
            ..BodyParams::new(square(0.5))
        };
        let mut body = RigidBody::create(&mut w, &params).unwrap();
        let handle = body.handle().unwrap();
        let caps = w.anchor_max_forces(handle);

        let collinear = vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]];
        assert!(matches!(
            body.reset_shape(&mut w, collinear),
            Err(Error::Config(_))
        ));

        assert_eq!(w.collider_count(handle), 1);
        assert_eq!(body.outline(), square(0.5).as_slice());
        assert_relative_eq!(body.max_radius(), 0.5f32.hypot(0.5), epsilon = 1e-6);
        assert_eq!(w.anchor_max_forces(handle), caps);

        w.step().unwrap();
        assert_relative_eq!(w.body_mass(handle), 3.0, epsilon = 1e-3);
    }

    #[test]
    fn test_destroy_removes_body() {
        let mut w = world();
        let mut body = RigidBody::create(&mut w, &BodyParams::new(square(0.5))).unwrap();
        let handle = body.handle().unwrap();
        assert_eq!(w.body_count(), 2);

        body.destroy(&mut w);
        assert_eq!(w.body_count(), 1);
        assert_eq!(w.anchor_count(handle), 0);
        assert!(body.is_intangible());
        assert_eq!(body.outline().len(), 4);
    }

    #[test]
    fn test_force_at_offset_point_spins_body() {
        let mut w = world();
        let params = BodyParams {
            ground_friction: 0.0,
            ..BodyParams::new(square(0.5))
        };
        let body = RigidBody::create(&mut w, &params).unwrap();
        let handle = body.handle().unwrap();

        body.apply_force(&mut w, [0.0, 10.0], [0.5, 0.0]);
        w.step().unwrap();
        let twist = w.body_twist(handle).unwrap();
        assert!(twist.omega > 0.0);
        assert!(twist.vy > 0.0);
    }
}
