//! # Sensor Source
//!
//! The capability the recorder samples from. A [`SensorSource`] returns the
//! current button and motion state on demand; it never blocks waiting for new
//! input, so the recorder's sampling loop keeps its own cadence.
//!
//! [`DualSenseSource`] is the hardware implementation: one reader thread per
//! evdev node keeps a shared snapshot current, and [`SensorSource::read`]
//! copies it out.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use evdev::Device;
use tracing::{debug, error, info};

use super::buttons::ButtonSet;
use super::mapper::{Accel, GamepadMapper, Gyro, MotionMapper, MotionState};
use super::ps5::{open_node, DualSenseNodes};
use crate::error::{CollectorError, Result};

/// One snapshot of the controller state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorReading {
    pub buttons: ButtonSet,
    pub gyro: Gyro,
    pub accel: Accel,
}

/// Provider of current controller state.
#[cfg_attr(test, mockall::automock)]
pub trait SensorSource: Send + Sync {
    /// Returns the controller state as of now.
    fn read(&self) -> Result<SensorReading>;
}

#[derive(Debug, Default)]
struct SharedState {
    buttons: ButtonSet,
    motion: MotionState,
}

/// DualSense controller read through evdev.
pub struct DualSenseSource {
    state: Arc<Mutex<SharedState>>,
    failed: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    nodes: DualSenseNodes,
}

impl std::fmt::Debug for DualSenseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualSenseSource")
            .field("nodes", &self.nodes)
            .field("failed", &self.failed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl DualSenseSource {
    /// Open both nodes and start the reader threads.
    ///
    /// # Errors
    ///
    /// Returns `Controller` if either node cannot be opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dualsense_collector::controller::ps5::DualSenseNodes;
    /// use dualsense_collector::controller::source::{DualSenseSource, SensorSource};
    ///
    /// let source = DualSenseSource::open(DualSenseNodes::detect()?)?;
    /// println!("Pressed: {}", source.read()?.buttons);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(nodes: DualSenseNodes) -> Result<Self> {
        let gamepad = open_node(&nodes.gamepad)?;
        let motion = open_node(&nodes.motion)?;

        let source = Self {
            state: Arc::new(Mutex::new(SharedState::default())),
            failed: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            nodes,
        };

        source.spawn_reader(
            "ds-gamepad",
            gamepad,
            &source.nodes.gamepad,
            NodeReader::Gamepad(GamepadMapper::new()),
        )?;
        source.spawn_reader(
            "ds-motion",
            motion,
            &source.nodes.motion,
            NodeReader::Motion(MotionMapper::new()),
        )?;

        info!(
            "DualSense source ready (gamepad: {}, motion: {})",
            source.nodes.gamepad.display(),
            source.nodes.motion.display()
        );
        Ok(source)
    }

    pub fn nodes(&self) -> &DualSenseNodes {
        &self.nodes
    }

    fn spawn_reader(
        &self,
        name: &str,
        mut device: Device,
        path: &Path,
        mut reader: NodeReader,
    ) -> Result<()> {
        let state = Arc::clone(&self.state);
        let failed = Arc::clone(&self.failed);
        let shutdown = Arc::clone(&self.shutdown);
        let path = path.display().to_string();

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::Acquire) {
                    // Blocks until the node has events
                    let events = match device.fetch_events() {
                        Ok(events) => events,
                        Err(e) => {
                            error!("Lost controller node {}: {}", path, e);
                            failed.store(true, Ordering::Release);
                            return;
                        }
                    };

                    for event in events {
                        reader.process(&event);
                    }

                    match state.lock() {
                        Ok(mut shared) => reader.publish(&mut shared),
                        Err(_) => {
                            failed.store(true, Ordering::Release);
                            return;
                        }
                    }
                }
                debug!("Reader for {} stopped", path);
            })
            .map_err(|e| {
                CollectorError::Controller(format!("Failed to spawn reader thread: {}", e))
            })?;

        Ok(())
    }
}

impl SensorSource for DualSenseSource {
    fn read(&self) -> Result<SensorReading> {
        if self.failed.load(Ordering::Acquire) {
            return Err(CollectorError::SensorRead("controller disconnected".to_string()));
        }

        let shared = self
            .state
            .lock()
            .map_err(|_| CollectorError::SensorRead("controller state lock poisoned".to_string()))?;

        Ok(SensorReading {
            buttons: shared.buttons,
            gyro: shared.motion.gyro,
            accel: shared.motion.accel,
        })
    }
}

impl Drop for DualSenseSource {
    fn drop(&mut self) {
        // Readers exit after their next batch of events
        self.shutdown.store(true, Ordering::Release);
    }
}

enum NodeReader {
    Gamepad(GamepadMapper),
    Motion(MotionMapper),
}

impl NodeReader {
    fn process(&mut self, event: &evdev::InputEvent) {
        match self {
            NodeReader::Gamepad(mapper) => mapper.process_event(event),
            NodeReader::Motion(mapper) => mapper.process_event(event),
        }
    }

    fn publish(&self, shared: &mut SharedState) {
        match self {
            NodeReader::Gamepad(mapper) => shared.buttons = mapper.buttons(),
            NodeReader::Motion(mapper) => shared.motion = mapper.state(),
        }
    }
}
