//! [`EdgeEvent`] – level-to-edge conversion for switches and keys.
//!
//! An `EdgeEvent` is sampled once per tick with the current level of an input
//! (a key bit, "left switch is down", "chassis output is on").  It remembers
//! the previous level and, on a genuine transition, hands the reaction bound
//! to that edge to a caller-supplied handler.  A sustained level never fires
//! anything.
//!
//! Reactions are plain values of the caller's action type `A`; the detector
//! never owns a closure, so the caller can freely borrow its own state inside
//! the handler:
//!
//! ```
//! use engineer_kernel::edge_event::{Edge, EdgeEvent};
//!
//! #[derive(Debug, PartialEq)]
//! enum Action { Open, Close }
//!
//! let mut gripper = EdgeEvent::new()
//!     .on_rising(Action::Open)
//!     .on_falling(Action::Close);
//!
//! let mut fired = Vec::new();
//! let mut record = |a: &Action| -> Result<(), ()> {
//!     fired.push(format!("{a:?}"));
//!     Ok(())
//! };
//!
//! assert_eq!(gripper.update(true, &mut record), Ok(Some(Edge::Rising)));
//! assert_eq!(gripper.update(true, &mut record), Ok(None));
//! assert_eq!(gripper.update(false, &mut record), Ok(Some(Edge::Falling)));
//! assert_eq!(fired, ["Open", "Close"]);
//! ```

/// Direction of a level transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// false → true
    Rising,
    /// true → false
    Falling,
}

/// Edge detector with optional reactions bound to each direction.
#[derive(Debug, Clone)]
pub struct EdgeEvent<A> {
    previous_level: bool,
    rising: Option<A>,
    falling: Option<A>,
}

impl<A> Default for EdgeEvent<A> {
    fn default() -> Self {
        Self {
            previous_level: false,
            rising: None,
            falling: None,
        }
    }
}

impl<A> EdgeEvent<A> {
    /// Detector with no reactions and a low initial level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `action` to the rising edge.
    pub fn on_rising(mut self, action: A) -> Self {
        self.rising = Some(action);
        self
    }

    /// Bind `action` to the falling edge.
    pub fn on_falling(mut self, action: A) -> Self {
        self.falling = Some(action);
        self
    }

    /// Start from `level` instead of low, so the first sample at that level
    /// is not reported as a transition.
    pub fn with_level(mut self, level: bool) -> Self {
        self.previous_level = level;
        self
    }

    pub fn previous_level(&self) -> bool {
        self.previous_level
    }

    pub fn rising(&self) -> Option<&A> {
        self.rising.as_ref()
    }

    pub fn falling(&self) -> Option<&A> {
        self.falling.as_ref()
    }

    /// Sample `level` without running any reaction.
    pub fn sample(&mut self, level: bool) -> Option<Edge> {
        let edge = match (self.previous_level, level) {
            (false, true) => Some(Edge::Rising),
            (true, false) => Some(Edge::Falling),
            _ => None,
        };
        self.previous_level = level;
        edge
    }

    /// Sample `level` and, on a transition, pass the reaction bound to that
    /// edge (if any) to `handler`.
    ///
    /// The new level is latched before the handler runs, so a failing
    /// reaction is not retried on the next tick.
    ///
    /// # Errors
    ///
    /// Returns whatever error the handler returns.
    pub fn update<E, F>(&mut self, level: bool, mut handler: F) -> Result<Option<Edge>, E>
    where
        F: FnMut(&A) -> Result<(), E>,
    {
        let edge = self.sample(level);
        let action = match edge {
            Some(Edge::Rising) => self.rising.as_ref(),
            Some(Edge::Falling) => self.falling.as_ref(),
            None => None,
        };
        if let Some(action) = action {
            handler(action)?;
        }
        Ok(edge)
    }
}
