//! Cross-thread handoff cells between the simulation and viewer threads.
//!
//! Both cells hold their lock only around copy-in / copy-out:
//!
//! - [`PoseCell`]: an entity's pose and twist plus a "dirty for GUI" flag.
//!   Writers take a [`PoseGuard`]; code that already holds the guard reads
//!   through it instead of locking again.
//! - [`SnapshotCell`]: the latest complete value of a larger reading (a lidar
//!   scan). The producer builds the pending value outside the lock and swaps
//!   it in; readers get either the previous or the new value, never a mix.

use crate::core::types::{Pose2D, Twist2D};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
struct Kinematics {
    pose: Pose2D,
    twist: Twist2D,
    dirty: bool,
}

/// Mutex-guarded pose/twist of one entity
#[derive(Debug, Default)]
pub struct PoseCell {
    inner: Mutex<Kinematics>,
}

/// Proof that the caller holds an entity's pose lock
pub struct PoseGuard<'a> {
    inner: MutexGuard<'a, Kinematics>,
}

impl PoseCell {
    pub fn new(pose: Pose2D, twist: Twist2D) -> Self {
        Self {
            inner: Mutex::new(Kinematics {
                pose,
                twist,
                dirty: true,
            }),
        }
    }

    /// Acquire the pose lock
    pub fn lock(&self) -> PoseGuard<'_> {
        PoseGuard {
            inner: self.inner.lock(),
        }
    }

    /// Current pose (locks)
    pub fn pose(&self) -> Pose2D {
        self.inner.lock().pose
    }

    /// Current twist (locks)
    pub fn twist(&self) -> Twist2D {
        self.inner.lock().twist
    }

    /// Copy out pose and twist if they changed since the last call
    pub fn take_dirty(&self) -> Option<(Pose2D, Twist2D)> {
        let mut k = self.inner.lock();
        if !k.dirty {
            return None;
        }
        k.dirty = false;
        Some((k.pose, k.twist))
    }
}

impl PoseGuard<'_> {
    /// Pose read under the already-held lock
    #[inline]
    pub fn pose(&self) -> Pose2D {
        self.inner.pose
    }

    /// Twist read under the already-held lock
    #[inline]
    pub fn twist(&self) -> Twist2D {
        self.inner.twist
    }

    /// Overwrite the pose and mark it dirty for the viewer
    pub fn set_pose(&mut self, pose: Pose2D) {
        self.inner.pose = pose;
        self.inner.dirty = true;
    }

    /// Overwrite the twist and mark it dirty for the viewer
    pub fn set_twist(&mut self, twist: Twist2D) {
        self.inner.twist = twist;
        self.inner.dirty = true;
    }
}

#[derive(Debug)]
struct Slot<T> {
    ready: Option<Arc<T>>,
    fresh: bool,
}

/// Single-slot "latest complete value" cell with a refresh flag
#[derive(Debug)]
pub struct SnapshotCell<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SnapshotCell<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                ready: None,
                fresh: false,
            }),
        }
    }

    /// Swap a completed value in as the ready one and raise the refresh flag
    pub fn publish(&self, pending: T) {
        let pending = Arc::new(pending);
        let previous = {
            let mut slot = self.slot.lock();
            slot.fresh = true;
            slot.ready.replace(pending)
        };
        // Free the replaced value after releasing the lock.
        drop(previous);
    }

    /// Latest ready value, regardless of the refresh flag
    pub fn latest(&self) -> Option<Arc<T>> {
        self.slot.lock().ready.clone()
    }

    /// Latest ready value if it was published since the last take
    pub fn take_fresh(&self) -> Option<Arc<T>> {
        let mut slot = self.slot.lock();
        if !slot.fresh {
            return None;
        }
        slot.fresh = false;
        slot.ready.clone()
    }

    /// Whether a value was published since the last [`take_fresh`](Self::take_fresh)
    pub fn is_fresh(&self) -> bool {
        self.slot.lock().fresh
    }
}
