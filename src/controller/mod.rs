//! # Controller Module
//!
//! PS5 DualSense controller input handling.
//!
//! This module handles:
//! - The recorded button set and its label format
//! - Press/release edge detection between snapshots
//! - Mapping evdev events to buttons and motion readings
//! - DualSense node detection via evdev
//! - The `SensorSource` capability sampled by the recorder

pub mod buttons;
pub mod edge;
pub mod mapper;
pub mod ps5;
pub mod source;

pub use buttons::{Button, ButtonSet};
pub use edge::{ButtonEdge, EdgeDetector, EdgeKind, PressCounter};
pub use mapper::{Accel, Gyro, MotionState};
pub use source::{DualSenseSource, SensorReading, SensorSource};
