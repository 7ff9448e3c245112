//! Ground friction approximation for top-down bodies.
//!
//! A body sliding on the floor is tied to the static ground reference at a
//! few contact points. At each point an impulse opposes the local sliding
//! velocity, capped by `max_force * dt`: a Coulomb friction budget of
//! `mu * m * g / n` per point. No angular impulse is applied directly; the
//! spread of the points is what resists spinning.

use rapier2d::prelude::*;

/// One body-to-ground friction constraint
#[derive(Debug, Clone)]
pub(crate) struct GroundAnchor {
    pub body: RigidBodyHandle,
    /// Contact point in the body frame
    pub local_point: Point<Real>,
    /// Friction force cap (N)
    pub max_force: f32,
    /// Fraction of the body mass carried by this point
    pub mass_share: f32,
}

/// Apply one step worth of ground friction impulses
pub(crate) fn apply_ground_friction(bodies: &mut RigidBodySet, anchors: &[GroundAnchor], dt: f32) {
    for anchor in anchors {
        if anchor.max_force <= 0.0 {
            continue;
        }
        let Some(body) = bodies.get_mut(anchor.body) else {
            continue;
        };
        if !body.is_dynamic() {
            continue;
        }

        let world_point = body.position() * anchor.local_point;
        let slip = body.velocity_at_point(&world_point);
        let speed = slip.norm();
        if speed < 1e-6 {
            continue;
        }

        let wanted = body.mass() * anchor.mass_share * speed;
        let budget = anchor.max_force * dt;
        let magnitude = wanted.min(budget);
        let impulse = -slip * (magnitude / speed);
        body.apply_impulse_at_point(impulse, world_point, true);
    }
}
