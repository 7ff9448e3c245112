//! Viewer thread and its handoff with the simulation thread.
//!
//! # Thread Model
//!
//! ```text
//! ┌──────────────────┐   status text    ┌──────────────────┐
//! │ Simulation loop  │ ───────────────▶ │   Viewer loop    │
//! │  (main thread)   │                  │   (vahana-gui)   │
//! │                  │ ◀─────────────── │                  │
//! └──────────────────┘   last key event └──────────────────┘
//!          │                                    ▲
//!          │ PoseCell / SnapshotCell per entity │
//!          └────────────────────────────────────┘
//! ```
//!
//! All shared state sits in [`GuiContext`] (key slot, status text, closing
//! flag, close request) and in the per-entity / per-sensor snapshot cells.
//! Every lock is held only to copy a value in or out.
//!
//! Shutdown: the simulation thread calls [`GuiContext::request_closing`];
//! the viewer loop sees the flag at the top of its next iteration and exits;
//! the simulation thread joins it.

pub mod viewer;

pub use viewer::{TerminalViewer, Viewer};

use crate::core::simulable::EntityView;
use crate::core::types::{KeyEvent, Pose2D, Twist2D};
use crate::error::{Error, Result};
use crate::sensors::{LidarScan, SensorView};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// State shared between the simulation and viewer threads
#[derive(Debug, Default)]
pub struct GuiContext {
    /// Latest key pressed in the viewer (single slot, last wins)
    key: Mutex<Option<KeyEvent>>,
    /// Text shown by the viewer
    status: Mutex<String>,
    /// Set by the simulation thread to stop the viewer
    closing: Mutex<bool>,
    /// Set by the viewer when the user closes it
    close_requested: Mutex<bool>,
}

impl GuiContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a key press, replacing any unread one
    pub fn push_key(&self, key: KeyEvent) {
        *self.key.lock() = Some(key);
    }

    /// Drain the key slot
    pub fn take_key(&self) -> Option<KeyEvent> {
        self.key.lock().take()
    }

    pub fn set_status(&self, text: String) {
        *self.status.lock() = text;
    }

    pub fn status(&self) -> String {
        self.status.lock().clone()
    }

    /// Ask the viewer thread to exit
    pub fn request_closing(&self) {
        *self.closing.lock() = true;
    }

    pub fn is_closing(&self) -> bool {
        *self.closing.lock()
    }

    /// Viewer side: the user closed the viewer
    pub fn request_viewer_close(&self) {
        *self.close_requested.lock() = true;
    }

    pub fn viewer_close_requested(&self) -> bool {
        *self.close_requested.lock()
    }
}

/// Viewer-side copy of one entity
#[derive(Debug, Clone)]
pub struct EntityFrame {
    pub name: String,
    pub outline: Vec<[f32; 2]>,
    pub pose: Pose2D,
    pub twist: Twist2D,
}

/// Viewer-side copy of one sensor
#[derive(Debug, Clone)]
pub struct SensorFrame {
    pub name: String,
    /// Index into [`Frame::entities`]
    pub parent: usize,
    pub scan: Option<Arc<LidarScan>>,
}

/// Everything one paint call draws
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub entities: Vec<EntityFrame>,
    pub sensors: Vec<SensorFrame>,
}

/// Viewer-owned scene kept in sync with the simulation through snapshot cells
pub struct GuiScene {
    entity_views: Vec<EntityView>,
    sensor_views: Vec<SensorView>,
    frame: Frame,
}

impl GuiScene {
    pub fn new(entity_views: Vec<EntityView>, sensor_views: Vec<SensorView>) -> Self {
        let entities = entity_views
            .iter()
            .map(|v| EntityFrame {
                name: v.name.clone(),
                outline: v.outline.clone(),
                pose: v.kinematics.pose(),
                twist: v.kinematics.twist(),
            })
            .collect();
        let sensors = sensor_views
            .iter()
            .map(|v| SensorFrame {
                name: v.name.clone(),
                parent: v.parent,
                scan: None,
            })
            .collect();

        Self {
            entity_views,
            sensor_views,
            frame: Frame { entities, sensors },
        }
    }

    /// Copy dirty poses and fresh scans; returns how many items changed
    pub fn refresh(&mut self) -> usize {
        let mut changed = 0;
        for (view, frame) in self.entity_views.iter().zip(&mut self.frame.entities) {
            if let Some((pose, twist)) = view.kinematics.take_dirty() {
                frame.pose = pose;
                frame.twist = twist;
                changed += 1;
            }
        }
        for (view, frame) in self.sensor_views.iter().zip(&mut self.frame.sensors) {
            if let Some(scan) = view.scan.as_ref().and_then(|cell| cell.take_fresh()) {
                frame.scan = Some(scan);
                changed += 1;
            }
        }
        changed
    }

    #[inline]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

/// Viewer loop body; returns when the simulation asks it to close
pub fn run_gui_loop(
    ctx: &GuiContext,
    scene: &mut GuiScene,
    viewer: &mut dyn Viewer,
    refresh_period: Duration,
) {
    loop {
        if ctx.is_closing() {
            break;
        }

        let status = ctx.status();
        scene.refresh();
        if let Err(e) = viewer.paint(scene.frame(), &status) {
            log::warn!("Viewer paint failed: {}", e);
        }

        if let Some(key) = viewer.poll_key() {
            ctx.push_key(key);
        }
        if viewer.is_closed() && !ctx.viewer_close_requested() {
            log::info!("Viewer closed");
            ctx.request_viewer_close();
        }

        thread::sleep(refresh_period);
    }
    viewer.shutdown();
}

/// Start the viewer thread
pub fn spawn_gui_thread(
    ctx: Arc<GuiContext>,
    mut scene: GuiScene,
    mut viewer: Box<dyn Viewer>,
    refresh_period: Duration,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("vahana-gui".to_string())
        .spawn(move || {
            run_gui_loop(&ctx, &mut scene, viewer.as_mut(), refresh_period);
        })
        .map_err(|e| Error::Other(format!("Failed to spawn viewer thread: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::{PoseCell, SnapshotCell};
    use std::collections::VecDeque;
    use std::time::Instant;

    /// Viewer replaying a fixed key sequence, one per paint
    struct ScriptedViewer {
        keys: VecDeque<KeyEvent>,
        paints: Arc<Mutex<Vec<String>>>,
        close_after: Option<usize>,
    }

    impl Viewer for ScriptedViewer {
        fn paint(&mut self, _frame: &Frame, status: &str) -> Result<()> {
            self.paints.lock().push(status.to_string());
            Ok(())
        }

        fn poll_key(&mut self) -> Option<KeyEvent> {
            self.keys.pop_front()
        }

        fn is_closed(&self) -> bool {
            self.close_after
                .is_some_and(|n| self.paints.lock().len() >= n)
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_key_slot_last_wins() {
        let ctx = GuiContext::new();
        ctx.push_key(KeyEvent::char('a'));
        ctx.push_key(KeyEvent::char('b'));
        assert_eq!(ctx.take_key(), Some(KeyEvent::char('b')));
        assert_eq!(ctx.take_key(), None);
    }

    #[test]
    fn test_scene_refresh_copies_dirty_only() {
        let cell = Arc::new(PoseCell::new(Pose2D::new(1.0, 0.0, 0.0), Twist2D::default()));
        let scans = Arc::new(SnapshotCell::new());
        let mut scene = GuiScene::new(
            vec![EntityView {
                name: "b".to_string(),
                outline: vec![],
                kinematics: Arc::clone(&cell),
            }],
            vec![SensorView {
                name: "l".to_string(),
                parent: 0,
                scan: Some(Arc::clone(&scans)),
            }],
        );

        assert_eq!(scene.refresh(), 1);
        assert_eq!(scene.refresh(), 0);

        cell.lock().set_pose(Pose2D::new(2.0, 0.0, 0.0));
        scans.publish(LidarScan::empty(0.1, Pose2D::default(), 0.5, 1, 4));
        assert_eq!(scene.refresh(), 2);
        assert_eq!(scene.frame().entities[0].pose.x, 2.0);
        assert_eq!(scene.frame().sensors[0].scan.as_ref().unwrap().returns.len(), 4);
    }

    #[test]
    fn test_gui_thread_round_trip() {
        let ctx = Arc::new(GuiContext::new());
        ctx.set_status("hello".to_string());
        let paints = Arc::new(Mutex::new(Vec::new()));
        let viewer = ScriptedViewer {
            keys: VecDeque::from(vec![KeyEvent::char('w')]),
            paints: Arc::clone(&paints),
            close_after: None,
        };

        let handle = spawn_gui_thread(
            Arc::clone(&ctx),
            GuiScene::new(vec![], vec![]),
            Box::new(viewer),
            Duration::from_millis(2),
        )
        .unwrap();

        let mut key = None;
        assert!(wait_for(|| {
            key = key.or_else(|| ctx.take_key());
            key.is_some()
        }));
        assert_eq!(key, Some(KeyEvent::char('w')));

        ctx.request_closing();
        handle.join().unwrap();
        assert!(paints.lock().iter().any(|s| s == "hello"));
        assert!(!ctx.viewer_close_requested());
    }

    #[test]
    fn test_viewer_close_is_reported() {
        let ctx = Arc::new(GuiContext::new());
        let viewer = ScriptedViewer {
            keys: VecDeque::new(),
            paints: Arc::new(Mutex::new(Vec::new())),
            close_after: Some(3),
        };
        let handle = spawn_gui_thread(
            Arc::clone(&ctx),
            GuiScene::new(vec![], vec![]),
            Box::new(viewer),
            Duration::from_millis(1),
        )
        .unwrap();

        assert!(wait_for(|| ctx.viewer_close_requested()));
        ctx.request_closing();
        handle.join().unwrap();
    }
}
