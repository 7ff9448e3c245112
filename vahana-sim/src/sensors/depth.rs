//! Depth buffer rendering for range sensors.
//!
//! A [`DepthRenderer`] draws the scene as seen by one pinhole camera into a
//! [`DepthImage`] holding, per pixel, the distance along the camera's optical
//! axis to the first surface. Pixels with no surface before the far plane
//! hold [`CameraSpec::far`].
//!
//! The scene is a set of vertical prisms (an entity's outline extruded
//! between `z_min` and `z_max`) standing on the ground plane `z = 0`.
//!
//! # Camera frame
//!
//! ```text
//!          +z
//!           │   optical axis (yaw)
//!           │  ╱
//!           │ ╱
//!  +left ───●
//! ```
//!
//! Pixel `(u, v)` looks along `forward + left * (cx - u - 0.5) / fx`, rising
//! `(cy - v - 0.5) / fy` meters per meter of depth.

use crate::core::simulable::EntityId;
use crate::error::{Error, Result};

/// One extruded polygon in world coordinates
#[derive(Debug, Clone)]
pub struct SceneObject {
    /// Entity the prism belongs to
    pub owner: EntityId,
    /// Convex outline in world coordinates
    pub polygon: Vec<[f32; 2]>,
    pub z_min: f32,
    pub z_max: f32,
}

/// Everything a depth sensor can see during one sub-step
#[derive(Debug, Clone, Default)]
pub struct SceneGeometry {
    pub objects: Vec<SceneObject>,
}

impl SceneGeometry {
    pub fn clear(&mut self) {
        self.objects.clear();
    }

    pub fn push(&mut self, object: SceneObject) {
        self.objects.push(object);
    }
}

/// Placement and intrinsics of one virtual camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSpec {
    /// Optical centre in world coordinates
    pub origin: [f32; 3],
    /// Optical axis heading (radians)
    pub yaw: f32,
    pub ncols: usize,
    pub nrows: usize,
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    /// Near clipping distance
    pub near: f32,
    /// Far clipping distance; also the "no return" value
    pub far: f32,
}

/// Row-major depth buffer
#[derive(Debug, Clone)]
pub struct DepthImage {
    ncols: usize,
    nrows: usize,
    data: Vec<f32>,
}

impl DepthImage {
    /// Buffer filled with a single depth value
    pub fn filled(ncols: usize, nrows: usize, depth: f32) -> Self {
        Self {
            ncols,
            nrows,
            data: vec![depth; ncols * nrows],
        }
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Depth at column `u`, row `v`
    #[inline]
    pub fn get(&self, u: usize, v: usize) -> Option<f32> {
        if u >= self.ncols || v >= self.nrows {
            return None;
        }
        self.data.get(v * self.ncols + u).copied()
    }

    #[inline]
    pub fn set(&mut self, u: usize, v: usize, depth: f32) {
        if u < self.ncols && v < self.nrows {
            self.data[v * self.ncols + u] = depth;
        }
    }
}

/// Off-screen depth rendering capability
pub trait DepthRenderer: Send + Sync {
    /// Render `scene` from `camera`, skipping every object owned by `exclude`
    fn render(
        &self,
        scene: &SceneGeometry,
        camera: &CameraSpec,
        exclude: Option<EntityId>,
    ) -> Result<DepthImage>;
}

/// Renderer for runs without any rendering context
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRenderer;

impl DepthRenderer for NoRenderer {
    fn render(&self, _: &SceneGeometry, _: &CameraSpec, _: Option<EntityId>) -> Result<DepthImage> {
        Err(Error::RenderUnavailable(
            "no rendering context in this run".to_string(),
        ))
    }
}

/// Software renderer casting one ray per pixel against scene prisms.
///
/// Each column is intersected with every polygon once (Cyrus-Beck clipping);
/// rows then only need the z interval of each hit span.
#[derive(Debug, Clone, Copy)]
pub struct PrismRaycaster {
    /// Whether the ground plane `z = 0` returns hits
    pub ground_plane: bool,
}

impl Default for PrismRaycaster {
    fn default() -> Self {
        Self { ground_plane: true }
    }
}

/// Depth span `[t_in, t_out]` where a column ray is inside one prism footprint
struct Span {
    t_in: f32,
    t_out: f32,
    z_min: f32,
    z_max: f32,
}

impl DepthRenderer for PrismRaycaster {
    fn render(
        &self,
        scene: &SceneGeometry,
        camera: &CameraSpec,
        exclude: Option<EntityId>,
    ) -> Result<DepthImage> {
        let mut image = DepthImage::filled(camera.ncols, camera.nrows, camera.far);
        let (s, c) = camera.yaw.sin_cos();
        let forward = [c, s];
        let left = [-s, c];
        let origin = [camera.origin[0], camera.origin[1]];
        let oz = camera.origin[2];

        let slopes: Vec<f32> = (0..camera.nrows)
            .map(|v| (camera.cy - v as f32 - 0.5) / camera.fy)
            .collect();
        let mut spans = Vec::new();

        for u in 0..camera.ncols {
            let lateral = (camera.cx - u as f32 - 0.5) / camera.fx;
            // Unnormalized: the ray parameter equals depth along the optical axis.
            let dir = [
                forward[0] + lateral * left[0],
                forward[1] + lateral * left[1],
            ];

            spans.clear();
            for object in &scene.objects {
                if Some(object.owner) == exclude {
                    continue;
                }
                if let Some((t_in, t_out)) = clip_ray_convex(origin, dir, &object.polygon) {
                    if t_out >= camera.near && t_in <= camera.far {
                        spans.push(Span {
                            t_in,
                            t_out,
                            z_min: object.z_min,
                            z_max: object.z_max,
                        });
                    }
                }
            }

            for (v, &slope) in slopes.iter().enumerate() {
                let mut best = camera.far;

                if self.ground_plane && slope < 0.0 && oz > 0.0 {
                    let t = -oz / slope;
                    if t >= camera.near && t < best {
                        best = t;
                    }
                }

                for span in &spans {
                    if let Some(t) = first_hit_in_span(span, oz, slope, camera.near) {
                        if t < best {
                            best = t;
                        }
                    }
                }

                image.set(u, v, best);
            }
        }

        Ok(image)
    }
}

/// Smallest `t >= near` inside the span where the ray's height lies in the prism
fn first_hit_in_span(span: &Span, oz: f32, slope: f32, near: f32) -> Option<f32> {
    let (z_lo, z_hi) = if slope.abs() < 1e-9 {
        if oz < span.z_min || oz > span.z_max {
            return None;
        }
        (f32::NEG_INFINITY, f32::INFINITY)
    } else {
        let a = (span.z_min - oz) / slope;
        let b = (span.z_max - oz) / slope;
        (a.min(b), a.max(b))
    };

    let lo = span.t_in.max(z_lo).max(near);
    let hi = span.t_out.min(z_hi);
    (lo <= hi).then_some(lo)
}

/// Parametric interval of `origin + t * dir` inside a convex polygon.
///
/// Works for either winding order. Returns `None` when the ray misses or the
/// polygon is degenerate.
pub fn clip_ray_convex(origin: [f32; 2], dir: [f32; 2], polygon: &[[f32; 2]]) -> Option<(f32, f32)> {
    let n = polygon.len();
    if n < 3 {
        return None;
    }
    let area = crate::core::types::polygon_signed_area(polygon);
    if area.abs() < 1e-9 {
        return None;
    }
    let orientation = area.signum();

    let mut t_in = f32::NEG_INFINITY;
    let mut t_out = f32::INFINITY;

    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        // Inward normal for this winding
        let edge = [b[0] - a[0], b[1] - a[1]];
        let normal = [-edge[1] * orientation, edge[0] * orientation];

        let dist = normal[0] * (origin[0] - a[0]) + normal[1] * (origin[1] - a[1]);
        let rate = normal[0] * dir[0] + normal[1] * dir[1];

        if rate.abs() < 1e-12 {
            if dist < 0.0 {
                return None;
            }
            continue;
        }

        let t = -dist / rate;
        if rate > 0.0 {
            t_in = t_in.max(t);
        } else {
            t_out = t_out.min(t);
        }
        if t_in > t_out {
            return None;
        }
    }

    Some((t_in, t_out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera(origin: [f32; 3], yaw: f32) -> CameraSpec {
        CameraSpec {
            origin,
            yaw,
            ncols: 8,
            nrows: 8,
            fx: 4.0,
            fy: 4.0,
            cx: 4.0,
            cy: 4.0,
            near: 0.01,
            far: 50.0,
        }
    }

    fn wall(x: f32) -> SceneObject {
        SceneObject {
            owner: 1,
            polygon: vec![[x, -10.0], [x + 1.0, -10.0], [x + 1.0, 10.0], [x, 10.0]],
            z_min: 0.0,
            z_max: 5.0,
        }
    }

    #[test]
    fn test_clip_ray_square() {
        let square = [[1.0, -1.0], [3.0, -1.0], [3.0, 1.0], [1.0, 1.0]];
        let (t_in, t_out) = clip_ray_convex([0.0, 0.0], [1.0, 0.0], &square).unwrap();
        assert_relative_eq!(t_in, 1.0, epsilon = 1e-6);
        assert_relative_eq!(t_out, 3.0, epsilon = 1e-6);

        let cw: Vec<_> = square.iter().rev().copied().collect();
        let (t_in, _) = clip_ray_convex([0.0, 0.0], [1.0, 0.0], &cw).unwrap();
        assert_relative_eq!(t_in, 1.0, epsilon = 1e-6);

        assert!(clip_ray_convex([0.0, 5.0], [1.0, 0.0], &square).is_none());
    }

    #[test]
    fn test_wall_depth_is_planar() {
        let scene = SceneGeometry {
            objects: vec![wall(4.0)],
        };
        let image = PrismRaycaster { ground_plane: false }
            .render(&scene, &camera([0.0, 0.0, 1.0], 0.0), None)
            .unwrap();

        // A wall facing the camera has the same optical-axis depth in every column.
        for u in 0..8 {
            assert_relative_eq!(image.get(u, 4).unwrap(), 4.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_exclude_owner_and_far_sentinel() {
        let scene = SceneGeometry {
            objects: vec![wall(4.0)],
        };
        let cam = camera([0.0, 0.0, 1.0], 0.0);
        let image = PrismRaycaster { ground_plane: false }
            .render(&scene, &cam, Some(1))
            .unwrap();
        assert_eq!(image.get(3, 3), Some(cam.far));
    }

    #[test]
    fn test_ground_plane_hit_below_horizon() {
        let scene = SceneGeometry::default();
        let cam = camera([0.0, 0.0, 1.0], 0.0);
        let image = PrismRaycaster::default().render(&scene, &cam, None).unwrap();

        // Bottom row: slope = (4 - 7.5) / 4 = -0.875
        assert_relative_eq!(image.get(4, 7).unwrap(), 1.0 / 0.875, epsilon = 1e-4);
        // Above the horizon nothing is hit
        assert_eq!(image.get(4, 0), Some(cam.far));
    }

    #[test]
    fn test_rays_pass_over_low_prism() {
        let scene = SceneGeometry {
            objects: vec![SceneObject {
                owner: 2,
                polygon: vec![[2.0, -1.0], [3.0, -1.0], [3.0, 1.0], [2.0, 1.0]],
                z_min: 0.0,
                z_max: 0.5,
            }],
        };
        let cam = camera([0.0, 0.0, 3.0], 0.0);
        let image = PrismRaycaster { ground_plane: false }
            .render(&scene, &cam, None)
            .unwrap();

        // Rows near the horizon pass over a box lower than the camera
        assert_eq!(image.get(4, 2), Some(cam.far));
        assert_eq!(image.get(4, 4), Some(cam.far));
        // Bottom row (slope -0.875) comes down onto the top face at z = 0.5
        assert_relative_eq!(image.get(4, 7).unwrap(), 2.5 / 0.875, epsilon = 1e-4);
    }

    #[test]
    fn test_no_renderer_is_unavailable() {
        let result = NoRenderer.render(&SceneGeometry::default(), &camera([0.0; 3], 0.0), None);
        assert!(matches!(result, Err(Error::RenderUnavailable(_))));
    }
}
