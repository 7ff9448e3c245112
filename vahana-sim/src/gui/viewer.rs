//! Viewer front-ends.
//!
//! [`TerminalViewer`] reports the scene through the log and reads keys from
//! stdin, one per line (`w`, `3`, `esc`, `space`, ...). Closing stdin
//! (Ctrl-D) closes the viewer.

use super::Frame;
use crate::core::types::KeyEvent;
use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, TryRecvError};
use std::io::BufRead;
use std::thread;
use std::time::{Duration, Instant};

/// Something that can show frames and capture keys
pub trait Viewer: Send {
    /// Draw one frame with the current status text
    fn paint(&mut self, frame: &Frame, status: &str) -> Result<()>;

    /// Next captured key, if any
    fn poll_key(&mut self) -> Option<KeyEvent>;

    /// Whether the user closed the viewer
    fn is_closed(&self) -> bool;

    /// Release viewer resources
    fn shutdown(&mut self) {}
}

enum TerminalInput {
    Key(KeyEvent),
    Eof,
}

/// Log-based viewer with line-oriented keyboard input
pub struct TerminalViewer {
    input: Receiver<TerminalInput>,
    closed: bool,
    report_period: Duration,
    last_report: Option<Instant>,
    last_status: String,
}

impl TerminalViewer {
    /// Start the stdin reader; reports the scene at most every `report_period`
    pub fn new(report_period: Duration) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        thread::Builder::new()
            .name("vahana-stdin".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else {
                        break;
                    };
                    match KeyEvent::parse(&line) {
                        Some(key) => {
                            if tx.send(TerminalInput::Key(key)).is_err() {
                                return;
                            }
                        }
                        None => log::info!("Unrecognized key '{}'", line.trim()),
                    }
                }
                let _ = tx.send(TerminalInput::Eof);
            })
            .map_err(|e| Error::Other(format!("Failed to spawn stdin reader: {}", e)))?;

        Ok(Self {
            input: rx,
            closed: false,
            report_period,
            last_report: None,
            last_status: String::new(),
        })
    }
}

impl Viewer for TerminalViewer {
    fn paint(&mut self, frame: &Frame, status: &str) -> Result<()> {
        let due = self
            .last_report
            .map_or(true, |t| t.elapsed() >= self.report_period);
        if !due && status == self.last_status {
            return Ok(());
        }
        self.last_report = Some(Instant::now());

        if status != self.last_status {
            for line in status.lines() {
                log::info!("{}", line);
            }
            self.last_status = status.to_string();
        }

        for e in &frame.entities {
            log::debug!(
                "{:<12} x={:7.3} y={:7.3} yaw={:6.1}°",
                e.name,
                e.pose.x,
                e.pose.y,
                e.pose.yaw.to_degrees()
            );
        }
        for s in &frame.sensors {
            if let Some(scan) = &s.scan {
                log::debug!(
                    "{:<12} t={:.2} {} / {} returns",
                    s.name,
                    scan.timestamp,
                    scan.valid_count(),
                    scan.returns.len()
                );
            }
        }
        Ok(())
    }

    fn poll_key(&mut self) -> Option<KeyEvent> {
        match self.input.try_recv() {
            Ok(TerminalInput::Key(key)) => Some(key),
            Ok(TerminalInput::Eof) | Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
            Err(TryRecvError::Empty) => None,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
