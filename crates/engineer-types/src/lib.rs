//! `engineer-types` – shared vocabulary of the engineer manual-control stack.
//!
//! Everything that crosses a crate boundary lives here: the per-tick
//! [`InputFrame`], the operating/control modes, the step-queue goal protocol
//! records, the published [`EngineerCmd`] status record, the [`Event`]
//! envelope carried by the event bus, and the [`ManualError`] type.

pub mod input;

pub use input::{InputFrame, Key, KeySet, SwitchPosition};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Modes
// ────────────────────────────────────────────────────────────────────────────

/// Which control path owns actuator command dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// The operator drives chassis, velocity and card directly.
    #[default]
    Manual,
    /// An automated step queue is running on the executor.
    Middleware,
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingMode::Manual => f.write_str("MANUAL"),
            OperatingMode::Middleware => f.write_str("MIDDLEWARE"),
        }
    }
}

/// Which input path feeds manual commands, selected by the right switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    /// No input path; calibration that depends on power is held.
    #[default]
    Passive,
    /// Radio sticks and switches.
    Rc,
    /// Keyboard and mouse relayed through the link.
    Pc,
}

/// Chassis controller mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChassisMode {
    /// Velocity commands are applied in the chassis frame as given.
    #[default]
    Raw,
    Follow,
    Gyro,
    Twist,
}

// ────────────────────────────────────────────────────────────────────────────
// Step-queue protocol
// ────────────────────────────────────────────────────────────────────────────

/// Client-assigned identifier of a submitted goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GoalId(pub u64);

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "goal#{}", self.0)
    }
}

/// Request to run a named step queue on the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepQueueGoal {
    pub step_queue_name: String,
    /// Parity bit, flipped on every run request so the receiver can tell
    /// consecutive requests for the same queue apart.
    pub symbol: bool,
}

/// Progress report for the running goal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepQueueFeedback {
    pub current_step_name: String,
    pub finished_step: u32,
    pub total_steps: u32,
}

/// Terminal result of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepQueueResult {
    /// `true` when every step of the queue ran to completion.
    pub finish: bool,
}

/// Terminal state reported with a [`StepQueueResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalState {
    Succeeded,
    Aborted,
    Preempted,
    Recalled,
    Rejected,
    Lost,
}

impl fmt::Display for GoalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GoalState::Succeeded => "SUCCEEDED",
            GoalState::Aborted => "ABORTED",
            GoalState::Preempted => "PREEMPTED",
            GoalState::Recalled => "RECALLED",
            GoalState::Rejected => "REJECTED",
            GoalState::Lost => "LOST",
        };
        f.write_str(s)
    }
}

/// Status record published to the operator UI once per feedback message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineerCmd {
    pub current_step_name: String,
    pub finished_step: u32,
    pub total_steps: u32,
    /// Parity bit of the most recent run request.
    pub symbol: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Calibration
// ────────────────────────────────────────────────────────────────────────────

/// One homing step: which controllers run the calibration and which normal
/// controllers must be stopped while it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationStep {
    /// Step name, also the key used to query the calibration status.
    pub name: String,
    #[serde(default)]
    pub start_controllers: Vec<String>,
    #[serde(default)]
    pub stop_controllers: Vec<String>,
}

/// The independent calibration queues of the engineer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationGroup {
    PowerOn,
    Mast,
    Arm,
}

impl fmt::Display for CalibrationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationGroup::PowerOn => f.write_str("power_on"),
            CalibrationGroup::Mast => f.write_str("mast"),
            CalibrationGroup::Arm => f.write_str("arm"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Event envelope
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the status/alert bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"engineer-middleware::step_queue"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped now.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Step-queue progress for the operator UI.
    Status(EngineerCmd),
    ModeChanged {
        mode: OperatingMode,
    },
    GoalFinished {
        step_queue: String,
        state: GoalState,
        finish: bool,
    },
    /// A run request that did not reach the executor.
    SubmissionRejected {
        step_queue: String,
        reason: String,
    },
    HardwareFault {
        component: String,
        details: String,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every engineer crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ManualError {
    #[error("Step-queue executor unreachable; '{step_queue}' not submitted")]
    ExecutorUnreachable { step_queue: String },

    #[error("Goal {outstanding} still outstanding; '{step_queue}' not submitted")]
    GoalOutstanding {
        step_queue: String,
        outstanding: GoalId,
    },

    #[error("Step-queue transport error: {0}")]
    Transport(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Invalid binding: {0}")]
    InvalidBinding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event bus error: {0}")]
    Channel(String),
}
