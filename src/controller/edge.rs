//! # Button Edge Detection
//!
//! Turns successive button snapshots into press/release events.
//!
//! Polling loops see only the current [`ButtonSet`]; the [`EdgeDetector`]
//! remembers the previous snapshot and reports what changed, and the
//! [`PressCounter`] tallies rising edges per button.

use super::buttons::{Button, ButtonSet};

/// Direction of a button state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Pressed,
    Released,
}

/// A single button state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEdge {
    pub button: Button,
    pub kind: EdgeKind,
}

impl ButtonEdge {
    #[must_use]
    pub fn is_press(&self) -> bool {
        self.kind == EdgeKind::Pressed
    }
}

/// Reports button transitions between successive snapshots.
///
/// # Examples
///
/// ```
/// use dualsense_collector::controller::buttons::{Button, ButtonSet};
/// use dualsense_collector::controller::edge::{EdgeDetector, EdgeKind};
///
/// let mut detector = EdgeDetector::new();
/// let pressed: ButtonSet = [Button::Cross].into_iter().collect();
///
/// let edges = detector.update(pressed);
/// assert_eq!(edges.len(), 1);
/// assert_eq!(edges[0].kind, EdgeKind::Pressed);
///
/// // Holding the button produces no further edges
/// assert!(detector.update(pressed).is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct EdgeDetector {
    previous: ButtonSet,
}

impl EdgeDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares `current` with the previous snapshot and stores it.
    ///
    /// Edges are returned in canonical button order.
    pub fn update(&mut self, current: ButtonSet) -> Vec<ButtonEdge> {
        let edges = Button::ALL
            .into_iter()
            .filter_map(|button| {
                match (self.previous.contains(button), current.contains(button)) {
                    (false, true) => Some(ButtonEdge { button, kind: EdgeKind::Pressed }),
                    (true, false) => Some(ButtonEdge { button, kind: EdgeKind::Released }),
                    _ => None,
                }
            })
            .collect();

        self.previous = current;
        edges
    }

    /// Last snapshot passed to [`EdgeDetector::update`].
    #[must_use]
    pub fn previous(&self) -> ButtonSet {
        self.previous
    }

    /// Forgets the previous snapshot (all buttons released).
    pub fn reset(&mut self) {
        self.previous = ButtonSet::new();
    }
}

/// Counts presses per button.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PressCounter {
    counts: [u64; Button::ALL.len()],
}

impl PressCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts every rising edge in `edges`.
    pub fn record(&mut self, edges: &[ButtonEdge]) {
        for edge in edges.iter().filter(|e| e.is_press()) {
            self.counts[edge.button.index()] += 1;
        }
    }

    #[must_use]
    pub fn count(&self, button: Button) -> u64 {
        self.counts[button.index()]
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Buttons pressed at least once, in canonical order.
    pub fn nonzero(&self) -> Vec<(Button, u64)> {
        Button::ALL
            .into_iter()
            .map(|b| (b, self.count(b)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}
