//! 3D lidar simulated from depth buffers.
//!
//! The full 360° horizontal fan is split into three sectors of 120°, each
//! rendered by one virtual pinhole camera pointing at the sector centre.
//! A per-ray lookup table built once per sensor geometry tells, for every
//! (vertical ray, horizontal ray) pair, which pixel of which sector buffer to
//! sample and how to turn the optical-axis depth stored there into a range
//! along the ray.
//!
//! # Camera model
//!
//! For sector width `w`, `hfov = w + 0.02°`, `V` vertical and `H` horizontal
//! rays:
//!
//! | Quantity | Value |
//! |----------|-------|
//! | columns | `ceil(2·tan(hfov/2)·H / 2π)` |
//! | rows | `20·V` |
//! | `cx`, `cy` | `cols/2`, `rows/2` |
//! | `fx` | `cx / tan(hfov/2)` |
//! | `fy` | `(cy − 0.5)·cos(w/2) / tan(vfov/2)` |
//!
//! A ray at sector-relative yaw `a` and pitch `p` lands on
//! `u = floor(cx − fx·tan a)`, `v = floor(cy − fy·tan p / cos a)` and
//! `range = depth / (cos p · cos a)`. The `fy` choice keeps the whole
//! vertical fan inside every column, including the sector edges.
//!
//! # Reading pipeline
//!
//! 1. Render one depth buffer per sector from the sensor's world pose
//! 2. For every valid LUT entry: depth → range, drop ranges outside
//!    `[range_min, range_max]`, add Gaussian noise, emit a point
//! 3. Swap the finished scan into the shared snapshot cell
//!
//! Without a renderer every ray reads "no return"; the step never fails.

use super::depth::{CameraSpec, DepthImage, DepthRenderer, SceneGeometry};
use super::noise::RangeNoise;
use super::{Sensor, SensorBuildContext, SensorEnv, SensorView};
use crate::core::simulable::EntityId;
use crate::core::snapshot::SnapshotCell;
use crate::core::types::{normalize_angle, Pose2D, SimulContext};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::f32::consts::TAU;
use std::sync::Arc;

/// Horizontal width covered by one virtual camera (degrees)
pub const SECTOR_FOV_DEG: f32 = 120.0;

/// Extra horizontal field of view per camera so sector edges stay inside (degrees)
pub const SECTOR_FOV_MARGIN_DEG: f32 = 0.02;

/// Depth buffer rows per vertical ray
pub const FBO_ROWS_PER_RAY: usize = 20;

/// Tolerance when comparing simulated time against a capture deadline (s)
const CAPTURE_TIME_EPSILON: f64 = 1e-9;

// ============================================================================
// Configuration
// ============================================================================

/// `[[entities.sensors]]` table of `type = "lidar3d"`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Lidar3DConfig {
    /// Sensor name (default: lidar3d001, ...)
    #[serde(default)]
    pub name: Option<String>,

    /// Mounting pose on the parent `[x, y, z, yaw_deg]`
    #[serde(default = "default_pose")]
    pub pose: [f32; 4],

    /// Vertical field of view (degrees)
    #[serde(default = "default_vert_fov")]
    pub vert_fov: f32,

    #[serde(default = "default_vert_nrays")]
    pub vert_nrays: usize,

    #[serde(default = "default_horz_nrays")]
    pub horz_nrays: usize,

    /// Closest valid range (meters)
    #[serde(default = "default_range_min")]
    pub range_min: f32,

    /// Farthest valid range (meters)
    #[serde(default = "default_range_max")]
    pub range_max: f32,

    /// Range noise standard deviation (meters)
    #[serde(default = "default_range_std_noise")]
    pub range_std_noise: f32,

    /// Leave the carrying body out of the rendered scene
    #[serde(default)]
    pub ignore_parent_body: bool,

    /// Time between scans (seconds); 0 scans every sub-step
    #[serde(default = "default_sensor_period")]
    pub sensor_period: f64,
}

fn default_pose() -> [f32; 4] {
    [0.0, 0.0, 0.5, 0.0]
}
fn default_vert_fov() -> f32 {
    30.0
}
fn default_vert_nrays() -> usize {
    16
}
fn default_horz_nrays() -> usize {
    180
}
fn default_range_min() -> f32 {
    0.01
}
fn default_range_max() -> f32 {
    80.0
}
fn default_range_std_noise() -> f32 {
    0.01
}
fn default_sensor_period() -> f64 {
    0.1
}

impl Default for Lidar3DConfig {
    fn default() -> Self {
        Self {
            name: None,
            pose: default_pose(),
            vert_fov: default_vert_fov(),
            vert_nrays: default_vert_nrays(),
            horz_nrays: default_horz_nrays(),
            range_min: default_range_min(),
            range_max: default_range_max(),
            range_std_noise: default_range_std_noise(),
            ignore_parent_body: false,
            sensor_period: default_sensor_period(),
        }
    }
}

impl Lidar3DConfig {
    pub fn validate(&self) -> Result<()> {
        if self.vert_nrays < 1 || self.horz_nrays < 1 {
            return Err(Error::Config(format!(
                "lidar3d needs at least one ray per axis (vert_nrays={}, horz_nrays={})",
                self.vert_nrays, self.horz_nrays
            )));
        }
        if !(self.vert_fov > 0.0 && self.vert_fov < 180.0) {
            return Err(Error::Config(format!(
                "lidar3d vert_fov must be in (0, 180) degrees, got {}",
                self.vert_fov
            )));
        }
        if !(self.range_min >= 0.0 && self.range_min < self.range_max) {
            return Err(Error::Config(format!(
                "lidar3d needs 0 <= range_min < range_max, got [{}, {}]",
                self.range_min, self.range_max
            )));
        }
        if !(self.range_std_noise >= 0.0) {
            return Err(Error::Config(format!(
                "lidar3d range_std_noise must be >= 0, got {}",
                self.range_std_noise
            )));
        }
        if !(self.sensor_period >= 0.0) {
            return Err(Error::Config(format!(
                "lidar3d sensor_period must be >= 0, got {}",
                self.sensor_period
            )));
        }
        if self.pose.iter().any(|v| !v.is_finite()) {
            return Err(Error::Config("lidar3d pose has non-finite values".to_string()));
        }
        Ok(())
    }

    /// Mounting pose on the parent body in the plane
    pub fn mount_pose(&self) -> Pose2D {
        Pose2D::new(self.pose[0], self.pose[1], self.pose[3].to_radians())
    }

    /// Mounting height above the ground
    pub fn mount_height(&self) -> f32 {
        self.pose[2]
    }
}

// ============================================================================
// Lookup table
// ============================================================================

/// Shared intrinsics of the sector cameras
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectorCamera {
    pub nsectors: usize,
    /// Yaw spacing between sector axes (radians)
    pub sector_width: f32,
    /// Horizontal field of view of one camera (radians)
    pub hfov: f32,
    pub ncols: usize,
    pub nrows: usize,
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl SectorCamera {
    fn new(vert_fov: f32, vert_nrays: usize, horz_nrays: usize) -> Self {
        let nsectors = (360.0 / SECTOR_FOV_DEG).ceil() as usize;
        let sector_width = TAU / nsectors as f32;
        let hfov = sector_width + SECTOR_FOV_MARGIN_DEG.to_radians();
        let half_tan = (hfov * 0.5).tan();

        let ncols = ((2.0 * half_tan * horz_nrays as f32 / TAU).ceil() as usize).max(1);
        let nrows = FBO_ROWS_PER_RAY * vert_nrays;

        let cx = ncols as f32 * 0.5;
        let cy = nrows as f32 * 0.5;
        let fx = cx / half_tan;
        let fy = (cy - 0.5) * (sector_width * 0.5).cos() / (vert_fov * 0.5).tan();

        Self {
            nsectors,
            sector_width,
            hfov,
            ncols,
            nrows,
            fx,
            fy,
            cx,
            cy,
        }
    }

    /// Optical axis of sector `s`, relative to the sensor heading
    #[inline]
    pub fn sector_yaw(&self, s: usize) -> f32 {
        s as f32 * self.sector_width
    }
}

/// Where one ray reads its depth
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayLutEntry {
    pub sector: usize,
    pub u: usize,
    pub v: usize,
    /// Optical-axis depth to range along the ray
    pub depth2range: f32,
    /// Unit ray direction in the sensor frame
    pub dir: [f32; 3],
}

/// Per-ray lookup table, indexed `vert_ray * horz_nrays + horz_ray`
#[derive(Debug, Clone)]
pub struct RayLut {
    camera: SectorCamera,
    vert_nrays: usize,
    horz_nrays: usize,
    entries: Vec<Option<RayLutEntry>>,
}

impl RayLut {
    /// Build the table for a vertical fan of `vert_fov` radians
    pub fn build(vert_fov: f32, vert_nrays: usize, horz_nrays: usize) -> Self {
        let camera = SectorCamera::new(vert_fov, vert_nrays, horz_nrays);
        let mut entries = Vec::with_capacity(vert_nrays * horz_nrays);

        for i in 0..vert_nrays {
            let pitch = if vert_nrays > 1 {
                -vert_fov * 0.5 + i as f32 * vert_fov / (vert_nrays - 1) as f32
            } else {
                0.0
            };
            let (sp, cp) = pitch.sin_cos();

            for j in 0..horz_nrays {
                let yaw = j as f32 * TAU / horz_nrays as f32;
                let sector =
                    ((yaw / camera.sector_width).round() as usize) % camera.nsectors;
                let a = normalize_angle(yaw - camera.sector_yaw(sector));
                let ca = a.cos();

                let u = (camera.cx - camera.fx * a.tan()).floor();
                let v = (camera.cy - camera.fy * pitch.tan() / ca).floor();

                let inside = u >= 0.0
                    && v >= 0.0
                    && (u as usize) < camera.ncols
                    && (v as usize) < camera.nrows;

                entries.push(inside.then(|| RayLutEntry {
                    sector,
                    u: u as usize,
                    v: v as usize,
                    depth2range: 1.0 / (cp * ca),
                    dir: [cp * yaw.cos(), cp * yaw.sin(), sp],
                }));
            }
        }

        Self {
            camera,
            vert_nrays,
            horz_nrays,
            entries,
        }
    }

    #[inline]
    pub fn camera(&self) -> &SectorCamera {
        &self.camera
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn entries(&self) -> &[Option<RayLutEntry>] {
        &self.entries
    }

    #[inline]
    pub fn get(&self, vert_ray: usize, horz_ray: usize) -> Option<&RayLutEntry> {
        if horz_ray >= self.horz_nrays {
            return None;
        }
        self.entries
            .get(vert_ray * self.horz_nrays + horz_ray)
            .and_then(Option::as_ref)
    }
}

// ============================================================================
// Scans
// ============================================================================

/// One valid lidar return
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LidarReturn {
    /// Range along the ray (meters, noise included)
    pub range: f32,
    /// Point in the sensor frame
    pub point: [f32; 3],
}

/// One complete lidar reading
#[derive(Debug, Clone)]
pub struct LidarScan {
    /// Simulated time of the capture (seconds)
    pub timestamp: f64,
    /// Sensor pose in the world plane at capture time
    pub sensor_pose: Pose2D,
    /// Sensor height at capture time
    pub sensor_z: f32,
    pub vert_nrays: usize,
    pub horz_nrays: usize,
    /// `None` marks "no return" or an out-of-range reading
    pub returns: Vec<Option<LidarReturn>>,
}

impl LidarScan {
    /// Scan with no valid return
    pub fn empty(timestamp: f64, sensor_pose: Pose2D, sensor_z: f32, vert: usize, horz: usize) -> Self {
        Self {
            timestamp,
            sensor_pose,
            sensor_z,
            vert_nrays: vert,
            horz_nrays: horz,
            returns: vec![None; vert * horz],
        }
    }

    pub fn valid_count(&self) -> usize {
        self.returns.iter().filter(|r| r.is_some()).count()
    }

    #[inline]
    pub fn get(&self, vert_ray: usize, horz_ray: usize) -> Option<&LidarReturn> {
        if horz_ray >= self.horz_nrays {
            return None;
        }
        self.returns
            .get(vert_ray * self.horz_nrays + horz_ray)
            .and_then(Option::as_ref)
    }

    /// Valid returns transformed to world coordinates
    pub fn world_points(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        self.returns.iter().flatten().map(move |r| {
            let [x, y] = self.sensor_pose.transform_point([r.point[0], r.point[1]]);
            [x, y, self.sensor_z + r.point[2]]
        })
    }
}

// ============================================================================
// Sensor
// ============================================================================

/// 3D lidar mounted on an entity
pub struct Lidar3D {
    name: String,
    parent: EntityId,
    config: Lidar3DConfig,
    lut: RayLut,
    noise: RangeNoise,
    scan: Arc<SnapshotCell<LidarScan>>,
    next_capture: f64,
    warned_unavailable: bool,
}

impl Lidar3D {
    pub fn new(name: String, parent: EntityId, config: Lidar3DConfig, noise_seed: u64) -> Result<Self> {
        config.validate()?;
        let lut = RayLut::build(
            config.vert_fov.to_radians(),
            config.vert_nrays,
            config.horz_nrays,
        );
        log::debug!(
            "{}: LUT {} rays, {} sectors of {}x{} px",
            name,
            lut.len(),
            lut.camera().nsectors,
            lut.camera().ncols,
            lut.camera().nrows
        );

        let noise = RangeNoise::new(noise_seed, config.range_std_noise);
        Ok(Self {
            name,
            parent,
            config,
            lut,
            noise,
            scan: Arc::new(SnapshotCell::new()),
            next_capture: 0.0,
            warned_unavailable: false,
        })
    }

    #[inline]
    pub fn config(&self) -> &Lidar3DConfig {
        &self.config
    }

    #[inline]
    pub fn lut(&self) -> &RayLut {
        &self.lut
    }

    /// Cell holding the latest completed scan
    pub fn scan_cell(&self) -> &Arc<SnapshotCell<LidarScan>> {
        &self.scan
    }

    /// Change the ray fan; rebuilds the LUT
    pub fn set_geometry(&mut self, vert_fov: f32, vert_nrays: usize, horz_nrays: usize) -> Result<()> {
        let mut config = self.config.clone();
        config.vert_fov = vert_fov;
        config.vert_nrays = vert_nrays;
        config.horz_nrays = horz_nrays;
        config.validate()?;

        self.lut = RayLut::build(vert_fov.to_radians(), vert_nrays, horz_nrays);
        self.config = config;
        Ok(())
    }

    /// Sensor pose in the world plane for a given parent pose
    pub fn world_pose(&self, parent_pose: &Pose2D) -> Pose2D {
        parent_pose.compose(&self.config.mount_pose())
    }

    /// Camera of sector `s` for a sensor at `sensor_pose`
    fn sector_camera(&self, sensor_pose: &Pose2D, s: usize) -> CameraSpec {
        let cam = self.lut.camera();
        CameraSpec {
            origin: [sensor_pose.x, sensor_pose.y, self.config.mount_height()],
            yaw: sensor_pose.yaw + cam.sector_yaw(s),
            ncols: cam.ncols,
            nrows: cam.nrows,
            fx: cam.fx,
            fy: cam.fy,
            cx: cam.cx,
            cy: cam.cy,
            near: self.config.range_min.max(1e-3),
            far: self.config.range_max,
        }
    }

    /// Render the sector buffers and build a complete scan
    pub fn capture(
        &mut self,
        timestamp: f64,
        parent_pose: &Pose2D,
        scene: &SceneGeometry,
        renderer: &dyn DepthRenderer,
    ) -> Result<LidarScan> {
        let sensor_pose = self.world_pose(parent_pose);
        let exclude = self.config.ignore_parent_body.then_some(self.parent);

        let mut images = Vec::with_capacity(self.lut.camera().nsectors);
        for s in 0..self.lut.camera().nsectors {
            let camera = self.sector_camera(&sensor_pose, s);
            images.push(renderer.render(scene, &camera, exclude)?);
        }

        Ok(LidarScan {
            timestamp,
            sensor_pose,
            sensor_z: self.config.mount_height(),
            vert_nrays: self.config.vert_nrays,
            horz_nrays: self.config.horz_nrays,
            returns: self.reproject(&images),
        })
    }

    /// Turn sector depth buffers into per-ray returns
    pub fn reproject(&mut self, images: &[DepthImage]) -> Vec<Option<LidarReturn>> {
        let far = self.config.range_max;
        let (range_min, range_max) = (self.config.range_min, self.config.range_max);

        let mut returns = Vec::with_capacity(self.lut.len());
        for entry in self.lut.entries() {
            let reading = entry.and_then(|e| {
                let depth = images.get(e.sector)?.get(e.u, e.v)?;
                if depth >= far {
                    return None;
                }
                let range = depth * e.depth2range;
                if range < range_min || range > range_max {
                    return None;
                }
                let range = self.noise.perturb(range);
                Some(LidarReturn {
                    range,
                    point: [e.dir[0] * range, e.dir[1] * range, e.dir[2] * range],
                })
            });
            returns.push(reading);
        }
        returns
    }
}

impl Sensor for Lidar3D {
    fn name(&self) -> &str {
        &self.name
    }

    fn parent(&self) -> EntityId {
        self.parent
    }

    fn post_step(&mut self, ctx: &SimulContext, env: &SensorEnv<'_>) -> Result<()> {
        if ctx.simul_time + CAPTURE_TIME_EPSILON < self.next_capture {
            return Ok(());
        }
        let period = self.config.sensor_period;
        if period > 0.0 {
            // Deadlines stay on the k·period grid. A sensor faster than dt
            // restarts its schedule from the current time.
            self.next_capture += period;
            if self.next_capture <= ctx.simul_time + CAPTURE_TIME_EPSILON {
                self.next_capture = ctx.simul_time + period;
            }
        }

        let scan = match self.capture(ctx.simul_time, &env.parent_pose, env.scene, env.renderer) {
            Ok(scan) => scan,
            Err(Error::RenderUnavailable(reason)) => {
                if !self.warned_unavailable {
                    log::warn!("{}: no depth renderer ({}), publishing empty scans", self.name, reason);
                    self.warned_unavailable = true;
                }
                LidarScan::empty(
                    ctx.simul_time,
                    self.world_pose(&env.parent_pose),
                    self.config.mount_height(),
                    self.config.vert_nrays,
                    self.config.horz_nrays,
                )
            }
            Err(e) => return Err(Error::step(&self.name, e.to_string())),
        };

        log::trace!("{}: scan at t={:.3} with {} returns", self.name, scan.timestamp, scan.valid_count());
        self.scan.publish(scan);
        Ok(())
    }

    fn gui_view(&self) -> SensorView {
        SensorView {
            name: self.name.clone(),
            parent: self.parent,
            scan: Some(Arc::clone(&self.scan)),
        }
    }
}

/// Registry factory for `type = "lidar3d"`
pub(crate) fn build(params: &toml::Table, ctx: &SensorBuildContext<'_>) -> Result<Box<dyn Sensor>> {
    let config: Lidar3DConfig = toml::Value::Table(params.clone())
        .try_into()
        .map_err(|e| Error::Config(format!("lidar3d on '{}': {}", ctx.parent_name, e)))?;
    let name = config
        .name
        .clone()
        .unwrap_or_else(|| format!("lidar3d{:03}", ctx.index + 1));
    let lidar = Lidar3D::new(name, ctx.parent, config, ctx.noise_seed())?;
    Ok(Box::new(lidar))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::depth::NoRenderer;
    use approx::assert_relative_eq;

    /// Renderer returning the same depth everywhere
    struct ConstantDepth(f32);

    impl DepthRenderer for ConstantDepth {
        fn render(
            &self,
            _: &SceneGeometry,
            camera: &CameraSpec,
            _: Option<EntityId>,
        ) -> Result<DepthImage> {
            Ok(DepthImage::filled(camera.ncols, camera.nrows, self.0))
        }
    }

    fn lidar(config: Lidar3DConfig) -> Lidar3D {
        Lidar3D::new("lidar".to_string(), 0, config, 1).unwrap()
    }

    fn noiseless() -> Lidar3DConfig {
        Lidar3DConfig {
            range_std_noise: 0.0,
            sensor_period: 0.0,
            ..Lidar3DConfig::default()
        }
    }

    #[test]
    fn test_lut_size_and_bounds() {
        for (v, h) in [(1, 1), (1, 360), (16, 180), (32, 1024), (7, 3)] {
            let lut = RayLut::build(30f32.to_radians(), v, h);
            assert_eq!(lut.len(), v * h);
            let cam = lut.camera();
            assert_eq!(cam.nsectors, 3);
            assert_eq!(cam.nrows, 20 * v);
            for entry in lut.entries() {
                let e = entry.expect("every ray of a 30 deg fan lands in a buffer");
                assert!(e.sector < cam.nsectors);
                assert!(e.u < cam.ncols);
                assert!(e.v < cam.nrows);
                assert!(e.depth2range >= 1.0);
            }
        }
    }

    #[test]
    fn test_lut_wide_vertical_fan_stays_inside() {
        let lut = RayLut::build(170f32.to_radians(), 9, 90);
        assert!(lut.entries().iter().all(Option::is_some));
    }

    #[test]
    fn test_lut_forward_ray() {
        let lut = RayLut::build(30f32.to_radians(), 1, 180);
        let e = lut.get(0, 0).unwrap();
        assert_eq!(e.sector, 0);
        assert_relative_eq!(e.depth2range, 1.0, epsilon = 1e-6);
        assert_eq!(e.u, lut.camera().ncols / 2);
        assert_relative_eq!(e.dir[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_lut_sector_wraparound() {
        let h = 360;
        let lut = RayLut::build(30f32.to_radians(), 1, h);
        // 350 deg is 10 deg right of the forward sector
        let e = lut.get(0, 350).unwrap();
        assert_eq!(e.sector, 0);
        assert!(e.u > lut.camera().ncols / 2);
        // 120 deg is the centre of sector 1
        let e = lut.get(0, 120).unwrap();
        assert_eq!(e.sector, 1);
        assert_relative_eq!(e.depth2range, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_constant_depth_gives_scaled_ranges() {
        let mut sensor = lidar(noiseless());
        let d = 5.0;
        let scan = sensor
            .capture(0.0, &Pose2D::default(), &SceneGeometry::default(), &ConstantDepth(d))
            .unwrap();

        assert_eq!(scan.returns.len(), 16 * 180);
        for (entry, ret) in sensor.lut().entries().iter().zip(&scan.returns) {
            let entry = entry.unwrap();
            let ret = ret.unwrap();
            assert_relative_eq!(ret.range, d * entry.depth2range, epsilon = 1e-5);
            let norm = ret.point.iter().map(|c| c * c).sum::<f32>().sqrt();
            assert_relative_eq!(norm, ret.range, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_out_of_range_is_rejected_not_clamped() {
        let config = Lidar3DConfig {
            range_min: 1.0,
            range_max: 10.0,
            ..noiseless()
        };
        // Largest depth2range of a 30 deg fan is 1/(cos 15° cos 60°) ≈ 2.07
        let mut sensor = lidar(config.clone());
        let close = sensor
            .capture(0.0, &Pose2D::default(), &SceneGeometry::default(), &ConstantDepth(0.4))
            .unwrap();
        assert_eq!(close.valid_count(), 0);

        // 9.9 m of depth is beyond 10 m of range for any tilted ray
        let mut sensor = lidar(config);
        let edge = sensor
            .capture(0.0, &Pose2D::default(), &SceneGeometry::default(), &ConstantDepth(9.9))
            .unwrap();
        for (entry, ret) in sensor.lut().entries().iter().zip(&edge.returns) {
            let within = 9.9 * entry.unwrap().depth2range <= 10.0;
            assert_eq!(ret.is_some(), within);
        }
    }

    #[test]
    fn test_far_sentinel_is_no_return() {
        let config = noiseless();
        let far = config.range_max;
        let mut sensor = lidar(config);
        let scan = sensor
            .capture(0.0, &Pose2D::default(), &SceneGeometry::default(), &ConstantDepth(far))
            .unwrap();
        assert_eq!(scan.valid_count(), 0);
    }

    #[test]
    fn test_headless_publishes_empty_scan() {
        let mut sensor = lidar(noiseless());
        let scene = SceneGeometry::default();
        let env = SensorEnv {
            parent_pose: Pose2D::default(),
            scene: &scene,
            renderer: &NoRenderer,
        };
        let ctx = SimulContext {
            simul_time: 0.01,
            dt: 0.01,
            step_count: 1,
        };
        sensor.post_step(&ctx, &env).unwrap();
        sensor.post_step(&ctx, &env).unwrap();
        let scan = sensor.scan_cell().take_fresh().unwrap();
        assert_eq!(scan.valid_count(), 0);
        assert_eq!(scan.returns.len(), 16 * 180);
    }

    #[test]
    fn test_sensor_period() {
        let config = Lidar3DConfig {
            sensor_period: 0.1,
            ..noiseless()
        };
        let mut sensor = lidar(config);
        let scene = SceneGeometry::default();
        let renderer = ConstantDepth(3.0);
        let env = SensorEnv {
            parent_pose: Pose2D::default(),
            scene: &scene,
            renderer: &renderer,
        };

        let dt = 0.01;
        let mut captures = 0;
        for step in 1..=100u64 {
            let ctx = SimulContext {
                simul_time: step as f64 * dt,
                dt,
                step_count: step,
            };
            sensor.post_step(&ctx, &env).unwrap();
            if sensor.scan_cell().take_fresh().is_some() {
                captures += 1;
            }
        }
        // Deadlines at 0.0, 0.1, ..., 1.0
        assert_eq!(captures, 11);
    }

    #[test]
    fn test_sensor_period_not_multiple_of_dt() {
        let period = 0.007;
        let config = Lidar3DConfig {
            sensor_period: period,
            vert_nrays: 1,
            horz_nrays: 8,
            ..noiseless()
        };
        let mut sensor = lidar(config);
        let scene = SceneGeometry::default();
        let renderer = ConstantDepth(3.0);
        let env = SensorEnv {
            parent_pose: Pose2D::default(),
            scene: &scene,
            renderer: &renderer,
        };

        let dt = 0.005;
        let mut captures = 0u64;
        for step in 1..=100u64 {
            let t = step as f64 * dt;
            let ctx = SimulContext {
                simul_time: t,
                dt,
                step_count: step,
            };
            sensor.post_step(&ctx, &env).unwrap();
            if sensor.scan_cell().take_fresh().is_some() {
                captures += 1;
            }
            // Never more captures than deadlines reached so far
            let deadlines = (t / period + 1e-9).floor() as u64 + 1;
            assert!(captures <= deadlines, "t={} captures={} deadlines={}", t, captures, deadlines);
        }
        // One capture per deadline 0, 0.007, ..., 0.497
        assert_eq!(captures, 72);
    }

    #[test]
    fn test_sensor_faster_than_step_captures_every_step() {
        let config = Lidar3DConfig {
            sensor_period: 0.001,
            vert_nrays: 1,
            horz_nrays: 8,
            ..noiseless()
        };
        let mut sensor = lidar(config);
        let scene = SceneGeometry::default();
        let env = SensorEnv {
            parent_pose: Pose2D::default(),
            scene: &scene,
            renderer: &NoRenderer,
        };

        let mut captures = 0;
        for step in 1..=20u64 {
            let ctx = SimulContext {
                simul_time: step as f64 * 0.01,
                dt: 0.01,
                step_count: step,
            };
            sensor.post_step(&ctx, &env).unwrap();
            if sensor.scan_cell().take_fresh().is_some() {
                captures += 1;
            }
        }
        assert_eq!(captures, 20);
    }

    #[test]
    fn test_set_geometry_rebuilds_lut() {
        let mut sensor = lidar(noiseless());
        sensor.set_geometry(20.0, 4, 90).unwrap();
        assert_eq!(sensor.lut().len(), 4 * 90);
        assert!(sensor.set_geometry(20.0, 0, 90).is_err());
        assert_eq!(sensor.lut().len(), 4 * 90);
    }

    #[test]
    fn test_config_validation() {
        let bad = Lidar3DConfig {
            range_min: 5.0,
            range_max: 1.0,
            ..Lidar3DConfig::default()
        };
        assert!(matches!(bad.validate(), Err(Error::Config(_))));

        let table: toml::Table = toml::from_str("horz_nrays = 10\nbogus = 1").unwrap();
        let ctx = SensorBuildContext {
            parent: 0,
            parent_name: "r1",
            index: 0,
            random_seed: 0,
        };
        assert!(matches!(build(&table, &ctx), Err(Error::Config(_))));
    }
}
