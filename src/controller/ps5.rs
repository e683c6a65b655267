//! # PS5 DualSense Controller Module
//!
//! This module handles DualSense controller detection using the Linux evdev
//! interface.
//!
//! ## Controller Detection
//!
//! The DualSense controller is identified by:
//! - Vendor ID: 0x054c (Sony)
//! - Product ID: 0x0ce6 (DualSense) or 0x0df2 (DualSense Edge)
//!
//! The `hid-playstation` driver registers several input nodes per controller
//! with the same IDs. They are told apart by name:
//!
//! - `DualSense Wireless Controller`: buttons, sticks, d-pad
//! - `DualSense Wireless Controller Motion Sensors`: gyro and accelerometer
//! - `DualSense Wireless Controller Touchpad`: touch surface (unused)

use evdev::Device;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{CollectorError, Result};

/// PS5 DualSense vendor ID (Sony)
const DUALSENSE_VENDOR_ID: u16 = 0x054c;

/// DualSense product IDs (standard and Edge)
const DUALSENSE_PRODUCT_IDS: &[u16] = &[0x0ce6, 0x0df2];

const MOTION_NODE_SUFFIX: &str = "Motion Sensors";
const TOUCHPAD_NODE_SUFFIX: &str = "Touchpad";

/// Role of a DualSense evdev node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Gamepad,
    Motion,
    Touchpad,
}

/// Classifies a DualSense node by its device name.
pub fn classify_node(name: &str) -> NodeKind {
    let name = name.trim_end();
    if name.ends_with(MOTION_NODE_SUFFIX) {
        NodeKind::Motion
    } else if name.ends_with(TOUCHPAD_NODE_SUFFIX) {
        NodeKind::Touchpad
    } else {
        NodeKind::Gamepad
    }
}

/// Checks vendor and product IDs against the known DualSense models.
pub fn is_dualsense(vendor: u16, product: u16) -> bool {
    vendor == DUALSENSE_VENDOR_ID && DUALSENSE_PRODUCT_IDS.contains(&product)
}

/// Paths of the two evdev nodes the collector reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualSenseNodes {
    pub gamepad: PathBuf,
    pub motion: PathBuf,
}

impl DualSenseNodes {
    /// Detect the first DualSense controller's gamepad and motion nodes
    ///
    /// Scans all `/dev/input/event*` devices in sorted order so the choice is
    /// deterministic when several controllers are connected.
    ///
    /// # Errors
    ///
    /// - `ControllerNotFound`: no DualSense gamepad/motion pair on the system
    /// - `Controller`: `/dev/input` is missing or unreadable
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dualsense_collector::controller::ps5::DualSenseNodes;
    ///
    /// let nodes = DualSenseNodes::detect()?;
    /// println!("Motion sensors at: {}", nodes.motion.display());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn detect() -> Result<Self> {
        Self::detect_in(Path::new("/dev/input"))
    }

    /// Same as [`DualSenseNodes::detect`] with an explicit input directory.
    pub fn detect_in(input_dir: &Path) -> Result<Self> {
        if !input_dir.exists() {
            return Err(CollectorError::Controller(format!(
                "{} directory not found",
                input_dir.display()
            )));
        }

        let mut entries: Vec<_> = std::fs::read_dir(input_dir)
            .map_err(|e| {
                CollectorError::Controller(format!("Failed to read {}: {}", input_dir.display(), e))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                CollectorError::Controller(format!("Failed to read directory entry: {}", e))
            })?;

        entries.sort_by_key(|entry| entry.path());

        let mut gamepad = None;
        let mut motion = None;

        for entry in entries {
            let path = entry.path();

            // Only check event* devices
            match path.file_name() {
                Some(filename) if filename.to_string_lossy().starts_with("event") => {}
                _ => continue,
            }

            let device = match Device::open(&path) {
                Ok(device) => device,
                Err(e) => {
                    // Permission denied or other errors - skip device
                    debug!("Could not open {}: {}", path.display(), e);
                    continue;
                }
            };

            let id = device.input_id();
            debug!(
                "Found input device: {} (vendor: 0x{:04x}, product: 0x{:04x})",
                path.display(),
                id.vendor(),
                id.product()
            );

            if !is_dualsense(id.vendor(), id.product()) {
                continue;
            }

            let name = device.name().unwrap_or_default();
            match classify_node(name) {
                NodeKind::Gamepad if gamepad.is_none() => {
                    info!("Found DualSense gamepad node at: {}", path.display());
                    gamepad = Some(path);
                }
                NodeKind::Motion if motion.is_none() => {
                    info!("Found DualSense motion sensor node at: {}", path.display());
                    motion = Some(path);
                }
                _ => {}
            }

            if let (Some(gamepad), Some(motion)) = (&gamepad, &motion) {
                return Ok(Self {
                    gamepad: gamepad.clone(),
                    motion: motion.clone(),
                });
            }
        }

        Err(CollectorError::ControllerNotFound)
    }

    /// Uses configured paths, falling back to detection for empty ones.
    pub fn resolve(gamepad_path: &str, motion_path: &str) -> Result<Self> {
        if !gamepad_path.is_empty() && !motion_path.is_empty() {
            return Ok(Self {
                gamepad: PathBuf::from(gamepad_path),
                motion: PathBuf::from(motion_path),
            });
        }

        let detected = Self::detect()?;
        Ok(Self {
            gamepad: non_empty_or(gamepad_path, detected.gamepad),
            motion: non_empty_or(motion_path, detected.motion),
        })
    }
}

fn non_empty_or(configured: &str, detected: PathBuf) -> PathBuf {
    if configured.is_empty() {
        detected
    } else {
        PathBuf::from(configured)
    }
}

/// Opens an evdev node, mapping failures to controller errors.
pub fn open_node(path: &Path) -> Result<Device> {
    Device::open(path)
        .map_err(|e| {
            CollectorError::Controller(format!("Failed to open {}: {}", path.display(), e))
        })
}
