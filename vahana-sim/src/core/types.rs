//! Core data types shared by entities, sensors, the scheduler and the viewer.
//!
//! Key types:
//! - [`Pose2D`] / [`Twist2D`]: planar placement and body-frame velocity
//! - [`SimulContext`]: read-only timestamp handed to every step callback
//! - [`KeyEvent`]: a single key press captured by the viewer

use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

/// Maximum number of vertices of a body outline (matches common 2D engines)
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Smallest radius reported for any body outline (meters)
pub const MIN_BODY_RADIUS: f32 = 0.001;

/// Rigid-body placement in the world plane
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2D {
    /// X position (meters)
    pub x: f32,
    /// Y position (meters)
    pub y: f32,
    /// Heading (radians, CCW from +X)
    pub yaw: f32,
}

impl Pose2D {
    pub fn new(x: f32, y: f32, yaw: f32) -> Self {
        Self { x, y, yaw }
    }

    /// Transform a point from this pose's local frame into the parent frame
    #[inline]
    pub fn transform_point(&self, local: [f32; 2]) -> [f32; 2] {
        let (s, c) = self.yaw.sin_cos();
        [
            self.x + c * local[0] - s * local[1],
            self.y + s * local[0] + c * local[1],
        ]
    }

    /// Rotate a vector from this pose's local frame into the parent frame
    #[inline]
    pub fn rotate_vector(&self, local: [f32; 2]) -> [f32; 2] {
        let (s, c) = self.yaw.sin_cos();
        [c * local[0] - s * local[1], s * local[0] + c * local[1]]
    }

    /// Compose `self ⊕ other` (other expressed in self's frame)
    pub fn compose(&self, other: &Pose2D) -> Pose2D {
        let [x, y] = self.transform_point([other.x, other.y]);
        Pose2D::new(x, y, normalize_angle(self.yaw + other.yaw))
    }
}

/// Linear and angular velocity in the body's local frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist2D {
    /// Forward velocity (m/s)
    pub vx: f32,
    /// Leftward velocity (m/s)
    pub vy: f32,
    /// Angular velocity (rad/s, CCW positive)
    pub omega: f32,
}

impl Twist2D {
    pub fn new(vx: f32, vy: f32, omega: f32) -> Self {
        Self { vx, vy, omega }
    }

    /// Express a world-frame linear velocity in the frame of a body with heading `yaw`
    pub fn from_world(world_vel: [f32; 2], omega: f32, yaw: f32) -> Self {
        let (s, c) = yaw.sin_cos();
        Self {
            vx: c * world_vel[0] + s * world_vel[1],
            vy: -s * world_vel[0] + c * world_vel[1],
            omega,
        }
    }

    /// Linear velocity rotated into the world frame for a body with heading `yaw`
    pub fn to_world(&self, yaw: f32) -> [f32; 2] {
        let (s, c) = yaw.sin_cos();
        [c * self.vx - s * self.vy, s * self.vx + c * self.vy]
    }
}

/// Timestamp and step identity passed to every pre/post-step callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulContext {
    /// Simulated time (seconds) at which this callback runs
    pub simul_time: f64,
    /// Fixed sub-step length (seconds)
    pub dt: f64,
    /// Number of sub-steps completed before this one
    pub step_count: u64,
}

/// Keys the simulation reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// Quit the simulation
    Escape,
    /// Printable character (lowercase for letters)
    Char(char),
}

/// A key press captured by the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
}

impl KeyEvent {
    pub fn new(code: KeyCode) -> Self {
        Self { code }
    }

    pub fn char(c: char) -> Self {
        Self::new(KeyCode::Char(c.to_ascii_lowercase()))
    }

    /// Parse a line of terminal input ("esc", "q!", "w", "3", ...)
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "esc" | "escape" | "exit" | "quit" => Some(Self::new(KeyCode::Escape)),
            "space" => Some(Self::char(' ')),
            "" if input.contains(' ') => Some(Self::char(' ')),
            s => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Self::char(c)),
                    _ => None,
                }
            }
        }
    }

    /// Vehicle index selected by a digit key `1`..`6` (zero-based)
    pub fn vehicle_index(&self) -> Option<usize> {
        match self.code {
            KeyCode::Char(c @ '1'..='6') => Some(c as usize - '1' as usize),
            _ => None,
        }
    }
}

/// Radius of the smallest origin-centered circle enclosing a body outline.
///
/// Never smaller than [`MIN_BODY_RADIUS`], even for degenerate outlines.
pub fn update_max_radius_from_poly(poly: &[[f32; 2]]) -> f32 {
    poly.iter()
        .map(|p| p[0].hypot(p[1]))
        .fold(MIN_BODY_RADIUS, f32::max)
}

/// Signed area of a polygon (positive when counter-clockwise)
pub fn polygon_signed_area(poly: &[[f32; 2]]) -> f32 {
    let n = poly.len();
    let mut acc = 0.0;
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        acc += a[0] * b[1] - b[0] * a[1];
    }
    acc * 0.5
}

/// Normalize angle to [-π, π)
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a >= PI {
        a -= TAU;
    } else if a < -PI {
        a += TAU;
    }
    a
}
