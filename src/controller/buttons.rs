//! # Button Model
//!
//! The fixed set of DualSense buttons that appear in recorded telemetry.
//!
//! Button order is part of the file format: a pressed set is always rendered
//! in [`Button::ALL`] order, joined by commas, so identical controller states
//! always produce identical labels. An empty set renders as `none`.
//!
//! ```
//! use dualsense_collector::controller::buttons::{Button, ButtonSet};
//!
//! let mut set = ButtonSet::new();
//! set.insert(Button::L1);
//! set.insert(Button::Cross);
//! assert_eq!(set.to_string(), "cross,L1");
//! assert_eq!(ButtonSet::new().to_string(), "none");
//! ```

use std::fmt;
use std::str::FromStr;

/// Label used for a sample with no buttons pressed.
pub const NO_BUTTONS: &str = "none";

/// A recorded controller button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Button {
    Cross,
    Circle,
    Triangle,
    Square,
    Up,
    Down,
    Left,
    Right,
    L1,
    L2,
    L3,
    R1,
    R2,
    R3,
}

impl Button {
    /// All buttons in canonical label order.
    pub const ALL: [Button; 14] = [
        Button::Cross,
        Button::Circle,
        Button::Triangle,
        Button::Square,
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::L1,
        Button::L2,
        Button::L3,
        Button::R1,
        Button::R2,
        Button::R3,
    ];

    /// Name used in CSV labels.
    pub fn name(self) -> &'static str {
        match self {
            Button::Cross => "cross",
            Button::Circle => "circle",
            Button::Triangle => "triangle",
            Button::Square => "square",
            Button::Up => "up",
            Button::Down => "down",
            Button::Left => "left",
            Button::Right => "right",
            Button::L1 => "L1",
            Button::L2 => "L2",
            Button::L3 => "L3",
            Button::R1 => "R1",
            Button::R2 => "R2",
            Button::R3 => "R3",
        }
    }

    /// Position in [`Button::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    fn bit(self) -> u16 {
        1 << self.index()
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown button name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownButton(pub String);

impl fmt::Display for UnknownButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown button '{}'", self.0)
    }
}

impl std::error::Error for UnknownButton {}

impl FromStr for Button {
    type Err = UnknownButton;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Button::ALL
            .iter()
            .copied()
            .find(|button| button.name() == s)
            .ok_or_else(|| UnknownButton(s.to_string()))
    }
}

/// Set of currently pressed buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ButtonSet(u16);

impl ButtonSet {
    #[must_use]
    pub fn new() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, button: Button) {
        self.0 |= button.bit();
    }

    pub fn remove(&mut self, button: Button) {
        self.0 &= !button.bit();
    }

    /// Sets or clears `button` according to `pressed`.
    pub fn set(&mut self, button: Button, pressed: bool) {
        if pressed {
            self.insert(button);
        } else {
            self.remove(button);
        }
    }

    #[must_use]
    pub fn contains(&self, button: Button) -> bool {
        self.0 & button.bit() != 0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Pressed buttons in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = Button> + '_ {
        Button::ALL.into_iter().filter(move |b| self.contains(*b))
    }
}

impl FromIterator<Button> for ButtonSet {
    fn from_iter<I: IntoIterator<Item = Button>>(iter: I) -> Self {
        let mut set = ButtonSet::new();
        for button in iter {
            set.insert(button);
        }
        set
    }
}

impl fmt::Display for ButtonSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str(NO_BUTTONS);
        }

        for (i, button) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(button.name())?;
        }
        Ok(())
    }
}

impl FromStr for ButtonSet {
    type Err = UnknownButton;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == NO_BUTTONS || s.is_empty() {
            return Ok(ButtonSet::new());
        }

        s.split(',').map(str::parse::<Button>).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_matches_indices() {
        for (i, button) in Button::ALL.iter().enumerate() {
            assert_eq!(button.index(), i);
        }
    }

    #[test]
    fn test_button_names() {
        let names: Vec<&str> = Button::ALL.iter().map(|b| b.name()).collect();
        assert_eq!(
            names,
            [
                "cross", "circle", "triangle", "square", "up", "down", "left", "right", "L1",
                "L2", "L3", "R1", "R2", "R3"
            ]
        );
    }

    #[test]
    fn test_empty_set_renders_none() {
        assert_eq!(ButtonSet::new().to_string(), "none");
    }

    #[test]
    fn test_label_uses_canonical_order() {
        // Insertion order must not affect the label
        let mut set = ButtonSet::new();
        set.insert(Button::R3);
        set.insert(Button::Up);
        set.insert(Button::Cross);
        assert_eq!(set.to_string(), "cross,up,R3");
    }

    #[test]
    fn test_set_and_remove() {
        let mut set = ButtonSet::new();
        set.set(Button::Square, true);
        assert!(set.contains(Button::Square));
        assert_eq!(set.len(), 1);

        set.set(Button::Square, false);
        assert!(!set.contains(Button::Square));
        assert!(set.is_empty());
    }

    #[test]
    fn test_parse_label() {
        let set: ButtonSet = "circle,L2,R1".parse().unwrap();
        assert!(set.contains(Button::Circle));
        assert!(set.contains(Button::L2));
        assert!(set.contains(Button::R1));
        assert_eq!(set.len(), 3);

        assert_eq!("none".parse::<ButtonSet>().unwrap(), ButtonSet::new());
    }

    #[test]
    fn test_parse_unknown_button() {
        let err = "cross,options".parse::<ButtonSet>().unwrap_err();
        assert_eq!(err, UnknownButton("options".to_string()));
    }

    #[test]
    fn test_all_buttons_label() {
        let set: ButtonSet = Button::ALL.into_iter().collect();
        assert_eq!(set.len(), 14);
        assert_eq!(
            set.to_string(),
            "cross,circle,triangle,square,up,down,left,right,L1,L2,L3,R1,R2,R3"
        );
    }
}
