//! # Guided Button Sequence
//!
//! Walks a participant through a fixed list of buttons. Each correct press
//! advances to the next target; presses of any other button are ignored.
//!
//! ```
//! use dualsense_collector::controller::buttons::Button;
//! use dualsense_collector::sequence::{ButtonSequence, Progress};
//!
//! let mut sequence = ButtonSequence::default();
//! assert_eq!(sequence.target(), Some(Button::Cross));
//! assert_eq!(sequence.on_press(Button::Square), Progress::Ignored);
//! assert_eq!(sequence.on_press(Button::Cross), Progress::Advanced { next: Button::Circle });
//! ```

use std::str::FromStr;
use std::time::Duration;

use crate::controller::buttons::{Button, UnknownButton};

/// Pause between a correct press and the next prompt.
pub const PROMPT_DELAY: Duration = Duration::from_millis(400);

/// Countdown before a guided session starts recording.
pub const COUNTDOWN_SECS: u64 = 2;

/// Face buttons in prompt order.
pub const DEFAULT_SEQUENCE: [Button; 4] = [
    Button::Cross,
    Button::Circle,
    Button::Triangle,
    Button::Square,
];

/// Effect of a press on the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The target was pressed; `next` is the new target
    Advanced { next: Button },
    /// The last target was pressed
    Completed,
    /// Not the current target, or the sequence is already complete
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonSequence {
    buttons: Vec<Button>,
    position: usize,
}

impl ButtonSequence {
    pub fn new(buttons: Vec<Button>) -> Self {
        Self { buttons, position: 0 }
    }

    /// Button the participant should press next.
    pub fn target(&self) -> Option<Button> {
        self.buttons.get(self.position).copied()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.buttons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.position >= self.buttons.len()
    }

    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }

    pub fn on_press(&mut self, button: Button) -> Progress {
        if self.target() != Some(button) {
            return Progress::Ignored;
        }

        self.position += 1;
        match self.target() {
            Some(next) => Progress::Advanced { next },
            None => Progress::Completed,
        }
    }

    /// Starts over from the first button.
    pub fn reset(&mut self) {
        self.position = 0;
    }
}

impl Default for ButtonSequence {
    fn default() -> Self {
        Self::new(DEFAULT_SEQUENCE.to_vec())
    }
}

/// Parses a comma-separated list such as `cross,circle,L1`. Order and
/// repeats are kept.
impl FromStr for ButtonSequence {
    type Err = UnknownButton;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::parse::<Button>)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

/// Event name recorded when `button` is prompted.
pub fn prompt_event(button: Button) -> String {
    format!("prompt_{}", button)
}
