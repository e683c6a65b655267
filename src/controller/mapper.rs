//! # Controller Input Mapper Module
//!
//! This module parses raw evdev events from the two DualSense input nodes the
//! Linux `hid-playstation` driver exposes and folds them into structured
//! state:
//!
//! - [`GamepadMapper`]: buttons and d-pad from the gamepad node, as a
//!   [`ButtonSet`].
//! - [`MotionMapper`]: gyroscope and accelerometer from the motion sensor
//!   node, as a [`MotionState`] in physical units.
//!
//! ## Button Codes (EV_KEY)
//!
//! | Button | evdev Code |
//! |--------|------------|
//! | Cross (×) | BTN_SOUTH |
//! | Circle (○) | BTN_EAST |
//! | Triangle (△) | BTN_NORTH |
//! | Square (□) | BTN_WEST |
//! | L1 / R1 | BTN_TL / BTN_TR |
//! | L2 / R2 (click) | BTN_TL2 / BTN_TR2 |
//! | L3 / R3 | BTN_THUMBL / BTN_THUMBR |
//!
//! The d-pad arrives as ABS_HAT0X / ABS_HAT0Y (-1/0/1) and is mapped to the
//! `up`/`down`/`left`/`right` buttons.
//!
//! ## Motion Axes (EV_ABS, motion node)
//!
//! | Axis | evdev Code | Scale |
//! |------|------------|-------|
//! | Accelerometer X/Y/Z | ABS_X / ABS_Y / ABS_Z | 8192 counts per g |
//! | Gyro pitch/yaw/roll | ABS_RX / ABS_RY / ABS_RZ | 1024 counts per deg/s |

use evdev::{AbsoluteAxisType, InputEvent, InputEventKind, Key};

use super::buttons::{Button, ButtonSet};

/// D-Pad pressed negative direction (left or up).
pub const DPAD_NEGATIVE: i32 = -1;
/// D-Pad pressed positive direction (right or down).
pub const DPAD_POSITIVE: i32 = 1;

/// Accelerometer resolution reported by hid-playstation.
pub const ACCEL_COUNTS_PER_G: f64 = 8192.0;
/// Gyroscope resolution reported by hid-playstation.
pub const GYRO_COUNTS_PER_DEG_S: f64 = 1024.0;

/// Angular rate in degrees per second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Gyro {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

/// Linear acceleration in g.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accel {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Motion sensor state of the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionState {
    pub gyro: Gyro,
    pub accel: Accel,
}

/// Folds gamepad-node events into the pressed [`ButtonSet`].
///
/// # Examples
///
/// ```
/// use dualsense_collector::controller::mapper::GamepadMapper;
///
/// let mapper = GamepadMapper::new();
/// assert_eq!(mapper.buttons().to_string(), "none");
/// ```
#[derive(Debug, Default)]
pub struct GamepadMapper {
    buttons: ButtonSet,
}

impl GamepadMapper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently pressed buttons.
    #[must_use]
    pub fn buttons(&self) -> ButtonSet {
        self.buttons
    }

    /// Processes a single evdev input event and updates internal state.
    pub fn process_event(&mut self, event: &InputEvent) {
        match event.kind() {
            InputEventKind::AbsAxis(axis) => self.process_hat_event(axis, event.value()),
            InputEventKind::Key(key) => self.process_key_event(key, event.value() != 0),
            _ => {
                // Ignore sync events and other event types
            }
        }
    }

    fn process_hat_event(&mut self, axis: AbsoluteAxisType, value: i32) {
        let (negative, positive) = match axis {
            AbsoluteAxisType::ABS_HAT0X => (Button::Left, Button::Right),
            AbsoluteAxisType::ABS_HAT0Y => (Button::Up, Button::Down),
            // Sticks and analog triggers are not recorded
            _ => return,
        };

        self.buttons.set(negative, value == DPAD_NEGATIVE);
        self.buttons.set(positive, value == DPAD_POSITIVE);
    }

    fn process_key_event(&mut self, key: Key, pressed: bool) {
        let button = match key {
            Key::BTN_SOUTH => Button::Cross,
            Key::BTN_EAST => Button::Circle,
            Key::BTN_NORTH => Button::Triangle,
            Key::BTN_WEST => Button::Square,
            Key::BTN_TL => Button::L1,
            Key::BTN_TL2 => Button::L2,
            Key::BTN_THUMBL => Button::L3,
            Key::BTN_TR => Button::R1,
            Key::BTN_TR2 => Button::R2,
            Key::BTN_THUMBR => Button::R3,
            // Share, options, PS and touchpad are not recorded
            _ => return,
        };

        self.buttons.set(button, pressed);
    }

    /// Releases all buttons, e.g. after the device was reopened.
    pub fn reset(&mut self) {
        self.buttons = ButtonSet::new();
    }
}

/// Folds motion-node events into a [`MotionState`].
#[derive(Debug, Default)]
pub struct MotionMapper {
    state: MotionState,
}

impl MotionMapper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Processes a single evdev input event and updates internal state.
    pub fn process_event(&mut self, event: &InputEvent) {
        if let InputEventKind::AbsAxis(axis) = event.kind() {
            let value = f64::from(event.value());
            match axis {
                AbsoluteAxisType::ABS_X => self.state.accel.x = value / ACCEL_COUNTS_PER_G,
                AbsoluteAxisType::ABS_Y => self.state.accel.y = value / ACCEL_COUNTS_PER_G,
                AbsoluteAxisType::ABS_Z => self.state.accel.z = value / ACCEL_COUNTS_PER_G,
                AbsoluteAxisType::ABS_RX => self.state.gyro.pitch = value / GYRO_COUNTS_PER_DEG_S,
                AbsoluteAxisType::ABS_RY => self.state.gyro.yaw = value / GYRO_COUNTS_PER_DEG_S,
                AbsoluteAxisType::ABS_RZ => self.state.gyro.roll = value / GYRO_COUNTS_PER_DEG_S,
                _ => {}
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = MotionState::default();
    }
}
