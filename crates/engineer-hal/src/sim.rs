//! In-process simulated actuators for hardware-less runs and tests.
//!
//! Every simulated sender appends the command it emits to a shared
//! [`SendLog`], so a test (or the CLI) can observe exactly which actuator
//! groups were ticked and with what target.  [`SimControllerManager`] keeps
//! the set of running controllers and reports a calibration step as done
//! after a configurable number of status queries.
//!
//! Both the log and the controller manager are cheap `Arc`-backed handles:
//! clone one before moving the original into the control stack.
//!
//! # Example
//!
//! ```rust
//! use std::time::Instant;
//! use engineer_hal::sim::{SendLog, SimBinarySender};
//! use engineer_hal::{BinaryCommandSender, CommandSender};
//!
//! let log = SendLog::default();
//! let mut card = SimBinarySender::new("card", log.clone());
//! card.on();
//! card.send_command(Instant::now()).expect("sim send must succeed");
//! assert_eq!(log.count("card"), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use engineer_types::{ChassisMode, ManualError};
use tracing::trace;

use crate::controller::ControllerManager;
use crate::sender::{
    BinaryCommandSender, ChassisCommandSender, CommandSender, Twist, VelocityCommandSender,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Send log
// ────────────────────────────────────────────────────────────────────────────

/// Value emitted by a simulated sender.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandValue {
    Binary(bool),
    Chassis(ChassisMode),
    Velocity(Twist),
}

/// One emitted command.
#[derive(Debug, Clone, PartialEq)]
pub struct SentCommand {
    pub sender: String,
    pub at: Instant,
    pub value: CommandValue,
}

/// Shared, append-only record of every simulated command emission.
#[derive(Debug, Clone, Default)]
pub struct SendLog {
    entries: Arc<Mutex<Vec<SentCommand>>>,
}

impl SendLog {
    fn push(&self, sender: &str, at: Instant, value: CommandValue) {
        trace!(sender, ?value, "sim command emitted");
        lock(&self.entries).push(SentCommand {
            sender: sender.to_string(),
            at,
            value,
        });
    }

    /// Number of emissions by `sender`.
    pub fn count(&self, sender: &str) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|c| c.sender == sender)
            .count()
    }

    /// Most recent value emitted by `sender`.
    pub fn last(&self, sender: &str) -> Option<CommandValue> {
        lock(&self.entries)
            .iter()
            .rev()
            .find(|c| c.sender == sender)
            .map(|c| c.value)
    }

    /// Snapshot of every emission so far, oldest first.
    pub fn entries(&self) -> Vec<SentCommand> {
        lock(&self.entries).clone()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Senders
// ────────────────────────────────────────────────────────────────────────────

/// Simulated two-position joint (mast, card).
pub struct SimBinarySender {
    id: String,
    on: bool,
    log: SendLog,
}

impl SimBinarySender {
    /// Create a sender in the "off" position.
    pub fn new(id: impl Into<String>, log: SendLog) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            on: false,
            log,
        })
    }
}

impl CommandSender for SimBinarySender {
    fn id(&self) -> &str {
        &self.id
    }

    fn send_command(&mut self, time: Instant) -> Result<(), ManualError> {
        self.log.push(&self.id, time, CommandValue::Binary(self.on));
        Ok(())
    }
}

impl BinaryCommandSender for SimBinarySender {
    fn on(&mut self) {
        self.on = true;
    }

    fn off(&mut self) {
        self.on = false;
    }

    fn state(&self) -> bool {
        self.on
    }
}

/// Simulated chassis mode channel.
pub struct SimChassisSender {
    id: String,
    mode: ChassisMode,
    log: SendLog,
}

impl SimChassisSender {
    /// Create a chassis sender with `initial` mode.
    pub fn new(id: impl Into<String>, initial: ChassisMode, log: SendLog) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            mode: initial,
            log,
        })
    }
}

impl CommandSender for SimChassisSender {
    fn id(&self) -> &str {
        &self.id
    }

    fn send_command(&mut self, time: Instant) -> Result<(), ManualError> {
        self.log.push(&self.id, time, CommandValue::Chassis(self.mode));
        Ok(())
    }
}

impl ChassisCommandSender for SimChassisSender {
    fn set_mode(&mut self, mode: ChassisMode) {
        self.mode = mode;
    }

    fn mode(&self) -> ChassisMode {
        self.mode
    }
}

/// Simulated chassis velocity channel.
pub struct SimVelocitySender {
    id: String,
    twist: Twist,
    log: SendLog,
}

impl SimVelocitySender {
    /// Create a velocity sender commanding zero velocity.
    pub fn new(id: impl Into<String>, log: SendLog) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            twist: Twist::ZERO,
            log,
        })
    }
}

impl CommandSender for SimVelocitySender {
    fn id(&self) -> &str {
        &self.id
    }

    fn send_command(&mut self, time: Instant) -> Result<(), ManualError> {
        self.log.push(&self.id, time, CommandValue::Velocity(self.twist));
        Ok(())
    }
}

impl VelocityCommandSender for SimVelocitySender {
    fn set_linear_vel(&mut self, x: f32, y: f32) {
        self.twist.linear_x = x;
        self.twist.linear_y = y;
    }

    fn set_angular_vel(&mut self, z: f32) {
        self.twist.angular_z = z;
    }

    fn velocity(&self) -> Twist {
        self.twist
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Controller manager
// ────────────────────────────────────────────────────────────────────────────

/// A controller start/stop as recorded by [`SimControllerManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerSwitch {
    Start(String),
    Stop(String),
}

#[derive(Debug, Default)]
struct SimControllerState {
    running: HashSet<String>,
    calibrated: HashSet<String>,
    queries: HashMap<String, u32>,
    stalled: HashSet<String>,
    refused: HashSet<String>,
    history: Vec<ControllerSwitch>,
}

/// Simulated controller manager.
///
/// A calibration step reports done once it has been queried
/// `calibrate_after_queries` times since it was last cleared, unless it has
/// been marked stalled with [`stall`][Self::stall].
#[derive(Debug, Clone)]
pub struct SimControllerManager {
    calibrate_after_queries: u32,
    state: Arc<Mutex<SimControllerState>>,
}

impl SimControllerManager {
    pub fn new(calibrate_after_queries: u32) -> Self {
        Self {
            calibrate_after_queries,
            state: Arc::new(Mutex::new(SimControllerState::default())),
        }
    }

    /// Never report `step` as calibrated.
    pub fn stall(&self, step: &str) {
        lock(&self.state).stalled.insert(step.to_string());
    }

    /// Refuse to start `controller` until [`accept`][Self::accept] is called.
    pub fn refuse(&self, controller: &str) {
        lock(&self.state).refused.insert(controller.to_string());
    }

    pub fn accept(&self, controller: &str) {
        lock(&self.state).refused.remove(controller);
    }

    pub fn is_running(&self, controller: &str) -> bool {
        lock(&self.state).running.contains(controller)
    }

    /// Number of status queries issued for `step` since it was last cleared.
    pub fn query_count(&self, step: &str) -> u32 {
        lock(&self.state).queries.get(step).copied().unwrap_or(0)
    }

    /// Every start/stop so far, oldest first.
    pub fn history(&self) -> Vec<ControllerSwitch> {
        lock(&self.state).history.clone()
    }
}

impl Default for SimControllerManager {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ControllerManager for SimControllerManager {
    fn start_controllers(&mut self, names: &[String]) -> Result<(), ManualError> {
        let mut state = lock(&self.state);
        if let Some(refused) = names.iter().find(|n| state.refused.contains(*n)) {
            return Err(ManualError::HardwareFault {
                component: refused.clone(),
                details: format!("controller '{refused}' refused to start"),
            });
        }
        for name in names {
            state.running.insert(name.clone());
            state.history.push(ControllerSwitch::Start(name.clone()));
        }
        Ok(())
    }

    fn stop_controllers(&mut self, names: &[String]) -> Result<(), ManualError> {
        let mut state = lock(&self.state);
        for name in names {
            state.running.remove(name);
            state.history.push(ControllerSwitch::Stop(name.clone()));
        }
        Ok(())
    }

    fn query_calibration(&mut self, step: &str) {
        let mut state = lock(&self.state);
        let count = {
            let entry = state.queries.entry(step.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        if count >= self.calibrate_after_queries && !state.stalled.contains(step) {
            state.calibrated.insert(step.to_string());
        }
    }

    fn is_calibrated(&self, step: &str) -> bool {
        lock(&self.state).calibrated.contains(step)
    }

    fn clear_calibrated(&mut self, step: &str) {
        let mut state = lock(&self.state);
        state.calibrated.remove(step);
        state.queries.remove(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn senders_share_one_log() {
        let log = SendLog::default();
        let mut mast = SimBinarySender::new("mast", log.clone());
        let mut vel = SimVelocitySender::new("vel", log.clone());
        let now = Instant::now();

        mast.on();
        mast.send_command(now).unwrap();
        vel.set_linear_vel(1.0, 0.0);
        vel.send_command(now).unwrap();
        vel.send_command(now).unwrap();

        assert_eq!(log.count("mast"), 1);
        assert_eq!(log.count("vel"), 2);
        assert_eq!(log.last("mast"), Some(CommandValue::Binary(true)));
        assert_eq!(log.entries().len(), 3);

        log.clear();
        assert!(log.entries().is_empty());
    }

    #[test]
    fn chassis_sender_emits_current_mode() {
        let log = SendLog::default();
        let mut chassis = SimChassisSender::new("chassis", ChassisMode::Follow, log.clone());
        chassis.set_mode(ChassisMode::Raw);
        chassis.send_command(Instant::now()).unwrap();
        assert_eq!(log.last("chassis"), Some(CommandValue::Chassis(ChassisMode::Raw)));
    }

    #[test]
    fn sim_manager_calibrates_after_queries() {
        let mut mgr = SimControllerManager::new(2);
        assert!(!mgr.is_calibrated("mast_home"));
        mgr.query_calibration("mast_home");
        assert!(!mgr.is_calibrated("mast_home"));
        mgr.query_calibration("mast_home");
        assert!(mgr.is_calibrated("mast_home"));

        mgr.clear_calibrated("mast_home");
        assert!(!mgr.is_calibrated("mast_home"));
        assert_eq!(mgr.query_count("mast_home"), 0);
    }

    #[test]
    fn stalled_step_never_calibrates() {
        let mut mgr = SimControllerManager::new(1);
        mgr.stall("arm_home");
        for _ in 0..10 {
            mgr.query_calibration("arm_home");
        }
        assert!(!mgr.is_calibrated("arm_home"));
    }

    #[test]
    fn refused_controller_fails_start_without_side_effects() {
        let mut mgr = SimControllerManager::default();
        mgr.refuse("arm_calibration_controller");
        let names = vec![
            "mast_calibration_controller".to_string(),
            "arm_calibration_controller".to_string(),
        ];
        assert!(mgr.start_controllers(&names).is_err());
        assert!(!mgr.is_running("mast_calibration_controller"));

        mgr.accept("arm_calibration_controller");
        mgr.start_controllers(&names).unwrap();
        assert!(mgr.is_running("arm_calibration_controller"));
        assert_eq!(mgr.history().len(), 2);
    }
}
