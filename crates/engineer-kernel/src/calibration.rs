//! [`CalibrationQueue`] – ordered, non-blocking homing of actuator groups.
//!
//! A queue holds a list of [`CalibrationStep`]s.  Each step swaps a joint
//! from its normal controllers to its calibration controllers, polls the
//! calibration status until the joint reports homed, then swaps back and
//! moves on.  One call to [`CalibrationQueue::update`] performs at most one
//! of those actions, so the control tick never waits on a joint.
//!
//! ```text
//!  ┌────────┐ start ctrls ┌─────────┐ calibrated ┌──────────┐
//!  │ idle i │ ──────────▶ │ running │ ─────────▶ │ idle i+1 │ ─▶ … ─▶ completed
//!  └────────┘             └─────────┘            └──────────┘
//!                           │    ▲
//!                           └────┘ query (≤ 1 per query_interval)
//! ```

use std::time::{Duration, Instant};

use engineer_hal::ControllerManager;
use engineer_types::CalibrationStep;
use tracing::{debug, info, warn};

/// Minimum spacing between two calibration status queries for one step.
pub const DEFAULT_QUERY_INTERVAL: Duration = Duration::from_millis(200);

pub struct CalibrationQueue {
    name: String,
    steps: Vec<CalibrationStep>,
    index: usize,
    /// The current step's calibration controllers have been started.
    running: bool,
    /// The current step's `stop_controllers` are stopped and must be
    /// restarted when the step ends or the queue resets.
    displaced: bool,
    completed: bool,
    last_query: Option<Instant>,
    query_interval: Duration,
    /// Stop the step's `stop_controllers` while it runs and restart them
    /// afterwards.
    flip_controllers: bool,
}

impl CalibrationQueue {
    /// Build a queue named `name` (used in logs) over `steps`.
    ///
    /// An empty queue is complete from the start.
    pub fn new(name: impl Into<String>, steps: Vec<CalibrationStep>) -> Self {
        let completed = steps.is_empty();
        Self {
            name: name.into(),
            steps,
            index: 0,
            running: false,
            displaced: false,
            completed,
            last_query: None,
            query_interval: DEFAULT_QUERY_INTERVAL,
            flip_controllers: true,
        }
    }

    pub fn with_query_interval(mut self, interval: Duration) -> Self {
        self.query_interval = interval;
        self
    }

    pub fn with_flip_controllers(mut self, flip: bool) -> Self {
        self.flip_controllers = flip;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[CalibrationStep] {
        &self.steps
    }

    /// Index of the step being (or about to be) calibrated.  Equals the
    /// number of steps once the queue is complete.
    pub fn current_step_index(&self) -> usize {
        self.index
    }

    /// Name of the step being (or about to be) calibrated.
    pub fn current_step(&self) -> Option<&str> {
        self.steps.get(self.index).map(|s| s.name.as_str())
    }

    /// `true` while the current step's calibration controllers are running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Advance the queue by at most one action.
    ///
    /// Does nothing while `enabled` is false or the queue is complete.
    pub fn update(&mut self, now: Instant, enabled: bool, controllers: &mut dyn ControllerManager) {
        if !enabled || self.completed {
            return;
        }
        let Some(step) = self.steps.get(self.index) else {
            self.completed = true;
            return;
        };

        if !self.running {
            controllers.clear_calibrated(&step.name);
            if self.flip_controllers && !self.displaced {
                if let Err(e) = controllers.stop_controllers(&step.stop_controllers) {
                    warn!(queue = %self.name, step = %step.name, error = %e, "Failed to stop controllers; retrying");
                    return;
                }
                self.displaced = true;
            }
            if let Err(e) = controllers.start_controllers(&step.start_controllers) {
                warn!(queue = %self.name, step = %step.name, error = %e, "Failed to start calibration controllers; retrying");
                return;
            }
            debug!(queue = %self.name, step = %step.name, "Calibration step started");
            self.running = true;
            self.last_query = None;
            return;
        }

        if controllers.is_calibrated(&step.name) {
            if let Err(e) = controllers.stop_controllers(&step.start_controllers) {
                warn!(queue = %self.name, step = %step.name, error = %e, "Failed to stop calibration controllers; retrying");
                return;
            }
            if self.displaced {
                if let Err(e) = controllers.start_controllers(&step.stop_controllers) {
                    warn!(queue = %self.name, step = %step.name, error = %e, "Failed to restart controllers; retrying");
                    return;
                }
                self.displaced = false;
            }
            debug!(queue = %self.name, step = %step.name, "Calibration step done");
            self.running = false;
            self.index += 1;
            if self.index == self.steps.len() {
                info!(queue = %self.name, "Calibration completed");
                self.completed = true;
            }
            return;
        }

        let due = self
            .last_query
            .is_none_or(|last| now.saturating_duration_since(last) >= self.query_interval);
        if due {
            self.last_query = Some(now);
            controllers.query_calibration(&step.name);
        }
    }

    /// Halt the in-progress step and rewind to the first step.
    ///
    /// Every step's calibrated flag is cleared so the whole queue runs again.
    pub fn reset(&mut self, controllers: &mut dyn ControllerManager) {
        if let Some(step) = self.steps.get(self.index) {
            if self.running
                && let Err(e) = controllers.stop_controllers(&step.start_controllers)
            {
                warn!(queue = %self.name, step = %step.name, error = %e, "Failed to stop calibration controllers on reset");
            }
            if self.displaced
                && let Err(e) = controllers.start_controllers(&step.stop_controllers)
            {
                warn!(queue = %self.name, step = %step.name, error = %e, "Failed to restart controllers on reset");
            }
        }
        for step in &self.steps {
            controllers.clear_calibrated(&step.name);
        }
        self.index = 0;
        self.running = false;
        self.displaced = false;
        self.last_query = None;
        self.completed = self.steps.is_empty();
        debug!(queue = %self.name, "Calibration reset");
    }
}
