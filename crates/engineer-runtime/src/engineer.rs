//! [`EngineerManual`] – manual control of the engineer robot.
//!
//! Extends [`ManualBase`] with the engineer's actuators (chassis, mast,
//! card), three calibration queues and the step-queue client, and arbitrates
//! between the operator (MANUAL) and the step-queue executor (MIDDLEWARE).
//!
//! # Dispatch
//!
//! Every tick the mast sender is ticked.  Chassis mode, chassis velocity and
//! card are ticked only while the mode is MANUAL, so the executor owns them
//! while a step queue runs.
//!
//! # Forced return to MANUAL
//!
//! Losing the remote link, energising the chassis output while in
//! MIDDLEWARE, or moving the right switch cancels the running step queue,
//! zeroes the velocity target and switches to MANUAL at once.  The cancelled
//! goal still counts as outstanding until the executor reports it done, and
//! run requests are refused meanwhile.
//!
//! # Calibration
//!
//! | Queue | Runs while | Reset by |
//! |---|---|---|
//! | power-on | state ≠ Passive | chassis output on, bindings |
//! | mast | state ≠ Passive | chassis output on, bindings |
//! | arm | always | bindings |

use std::time::{Duration, Instant};

use engineer_hal::{
    BinaryCommandSender, ChassisCommandSender, CommandSender, ControllerManager, Twist,
    VelocityCommandSender,
};
use engineer_kernel::{CalibrationQueue, DEFAULT_LINK_TIMEOUT, DEFAULT_QUERY_INTERVAL, EdgeEvent};
use engineer_middleware::{EventBus, StepQueueClient, Topic};
use engineer_types::{
    CalibrationGroup, CalibrationStep, ChassisMode, ControlState, Event, EventPayload,
    InputFrame, Key, ManualError, OperatingMode,
};
use tracing::{debug, info, warn};

use crate::bindings::{Binding, BindingEdge, Reaction, Trigger, default_bindings};
use crate::manual_base::{ManualBase, ManualControl, run_tick};

const SOURCE: &str = "engineer-runtime::engineer";

// ────────────────────────────────────────────────────────────────────────────
// Construction inputs
// ────────────────────────────────────────────────────────────────────────────

/// Tunables of the engineer controller.
#[derive(Debug, Clone)]
pub struct EngineerSettings {
    pub link_timeout: Duration,
    pub calibration_query_interval: Duration,
    pub power_on_calibration: Vec<CalibrationStep>,
    pub mast_calibration: Vec<CalibrationStep>,
    pub arm_calibration: Vec<CalibrationStep>,
    pub bindings: Vec<Binding>,
    /// m/s at full stick or key press.
    pub max_linear_vel: f32,
    /// rad/s at full stick or mouse deflection.
    pub max_angular_vel: f32,
}

impl Default for EngineerSettings {
    fn default() -> Self {
        Self {
            link_timeout: DEFAULT_LINK_TIMEOUT,
            calibration_query_interval: DEFAULT_QUERY_INTERVAL,
            power_on_calibration: Vec::new(),
            mast_calibration: Vec::new(),
            arm_calibration: Vec::new(),
            bindings: default_bindings(),
            max_linear_vel: 1.5,
            max_angular_vel: 3.0,
        }
    }
}

/// The engineer's actuator groups.
pub struct EngineerSenders {
    pub chassis: Box<dyn ChassisCommandSender>,
    pub vel: Box<dyn VelocityCommandSender>,
    pub mast: Box<dyn BinaryCommandSender>,
    pub card: Box<dyn BinaryCommandSender>,
}

struct BoundTrigger {
    trigger: Trigger,
    event: EdgeEvent<Reaction>,
}

/// Group `bindings` into one edge detector per trigger, split into keyboard
/// chords and left-switch positions.
fn bind(bindings: &[Binding]) -> Result<(Vec<BoundTrigger>, Vec<BoundTrigger>), ManualError> {
    let mut chords: Vec<BoundTrigger> = Vec::new();
    let mut switches: Vec<BoundTrigger> = Vec::new();

    for binding in bindings {
        let list = match binding.trigger {
            Trigger::Chord(_) => &mut chords,
            Trigger::LeftSwitch(_) => &mut switches,
        };
        let index = match list.iter().position(|b| b.trigger == binding.trigger) {
            Some(i) => i,
            None => {
                list.push(BoundTrigger {
                    trigger: binding.trigger,
                    event: EdgeEvent::new(),
                });
                list.len() - 1
            }
        };
        let bound = &mut list[index];
        let taken = match binding.edge {
            BindingEdge::Rising => bound.event.rising().is_some(),
            BindingEdge::Falling => bound.event.falling().is_some(),
        };
        if taken {
            return Err(ManualError::InvalidBinding(format!(
                "{} has two {:?} bindings",
                binding.trigger, binding.edge
            )));
        }
        let event = std::mem::take(&mut bound.event);
        bound.event = match binding.edge {
            BindingEdge::Rising => event.on_rising(binding.reaction.clone()),
            BindingEdge::Falling => event.on_falling(binding.reaction.clone()),
        };
    }
    Ok((chords, switches))
}

fn send<S: CommandSender + ?Sized>(sender: &mut S, now: Instant, bus: &EventBus) {
    if let Err(e) = sender.send_command(now) {
        warn!(sender = sender.id(), error = %e, "Command send failed");
        bus.notify(
            Topic::SystemAlerts,
            Event::new(
                SOURCE,
                EventPayload::HardwareFault {
                    component: sender.id().to_string(),
                    details: e.to_string(),
                },
            ),
        );
    }
}

fn axis(frame: &InputFrame, positive: Key, negative: Key) -> f32 {
    match (frame.key(positive), frame.key(negative)) {
        (true, false) => 1.0,
        (false, true) => -1.0,
        _ => 0.0,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// EngineerManual
// ────────────────────────────────────────────────────────────────────────────

pub struct EngineerManual {
    base: ManualBase,
    senders: EngineerSenders,
    controllers: Box<dyn ControllerManager>,
    power_on_calibration: CalibrationQueue,
    mast_calibration: CalibrationQueue,
    arm_calibration: CalibrationQueue,
    step_queue: StepQueueClient,
    bus: EventBus,
    chord_triggers: Vec<BoundTrigger>,
    switch_triggers: Vec<BoundTrigger>,
    max_linear_vel: f32,
    max_angular_vel: f32,
}

impl EngineerManual {
    /// Build the controller.
    ///
    /// # Errors
    ///
    /// Returns [`ManualError::InvalidBinding`] when two bindings share a
    /// trigger and edge.
    pub fn new(
        settings: EngineerSettings,
        senders: EngineerSenders,
        controllers: Box<dyn ControllerManager>,
        step_queue: StepQueueClient,
    ) -> Result<Self, ManualError> {
        let (chord_triggers, switch_triggers) = bind(&settings.bindings)?;
        let queue = |name: &str, steps: Vec<CalibrationStep>| {
            CalibrationQueue::new(name, steps).with_query_interval(settings.calibration_query_interval)
        };
        let bus = step_queue.bus().clone();
        Ok(Self {
            base: ManualBase::new(settings.link_timeout),
            senders,
            controllers,
            power_on_calibration: queue("power_on", settings.power_on_calibration.clone()),
            mast_calibration: queue("mast", settings.mast_calibration.clone()),
            arm_calibration: queue("arm", settings.arm_calibration.clone()),
            step_queue,
            bus,
            chord_triggers,
            switch_triggers,
            max_linear_vel: settings.max_linear_vel,
            max_angular_vel: settings.max_angular_vel,
        })
    }

    /// Run one control tick on `frame`.
    ///
    /// # Errors
    ///
    /// Propagates the first error raised by an input reaction.
    pub fn run(&mut self, frame: &InputFrame, now: Instant) -> Result<(), ManualError> {
        run_tick(self, frame, now)
    }

    pub fn mode(&self) -> OperatingMode {
        self.step_queue.mode()
    }

    pub fn state(&self) -> ControlState {
        self.base.state()
    }

    pub fn step_queue(&self) -> &StepQueueClient {
        &self.step_queue
    }

    pub fn calibration(&self, group: CalibrationGroup) -> &CalibrationQueue {
        match group {
            CalibrationGroup::PowerOn => &self.power_on_calibration,
            CalibrationGroup::Mast => &self.mast_calibration,
            CalibrationGroup::Arm => &self.arm_calibration,
        }
    }

    pub fn card_on(&self) -> bool {
        self.senders.card.state()
    }

    pub fn velocity(&self) -> Twist {
        self.senders.vel.velocity()
    }

    pub fn chassis_mode(&self) -> ChassisMode {
        self.senders.chassis.mode()
    }

    /// Cancel any running step queue and return to MANUAL.
    pub fn shutdown(&mut self) {
        self.revert_to_manual("shutdown");
    }

    fn revert_to_manual(&mut self, reason: &str) {
        self.senders.vel.set_zero();
        self.step_queue.force_manual(reason);
    }

    fn reset_calibration(&mut self, group: CalibrationGroup) {
        let controllers = self.controllers.as_mut();
        let queue = match group {
            CalibrationGroup::PowerOn => &mut self.power_on_calibration,
            CalibrationGroup::Mast => &mut self.mast_calibration,
            CalibrationGroup::Arm => &mut self.arm_calibration,
        };
        queue.reset(controllers);
    }

    fn react(&mut self, trigger: &Trigger, reaction: &Reaction) -> Result<(), ManualError> {
        debug!(%trigger, ?reaction, "Binding fired");
        match reaction {
            Reaction::ToggleCard => {
                self.senders.card.toggle();
                info!(on = self.senders.card.state(), "Card toggled");
            }
            Reaction::RunStepQueue { name } => {
                if let Err(e) = self.step_queue.submit(name) {
                    debug!(step_queue = %name, error = %e, "Run request not submitted");
                }
            }
            Reaction::CancelStepQueue => self.step_queue.cancel_all(),
            Reaction::ResetCalibration { groups } => {
                for group in groups {
                    info!(queue = %group, "Calibration reset requested");
                    self.reset_calibration(*group);
                }
            }
        }
        Ok(())
    }

    fn fire(
        &mut self,
        mut triggers: Vec<BoundTrigger>,
        frame: &InputFrame,
    ) -> (Vec<BoundTrigger>, Result<(), ManualError>) {
        let result = triggers.iter_mut().try_for_each(|bound| {
            let level = bound.trigger.level(frame);
            bound
                .event
                .update(level, |reaction| self.react(&bound.trigger, reaction))
                .map(|_| ())
        });
        (triggers, result)
    }
}

impl ManualControl for EngineerManual {
    fn base(&self) -> &ManualBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ManualBase {
        &mut self.base
    }

    fn remote_control_turn_off(&mut self) -> Result<(), ManualError> {
        self.revert_to_manual("remote control off");
        Ok(())
    }

    fn right_switch_down_rise(&mut self) -> Result<(), ManualError> {
        self.senders.chassis.set_mode(ChassisMode::Raw);
        self.revert_to_manual("right switch down");
        Ok(())
    }

    fn right_switch_mid_rise(&mut self) -> Result<(), ManualError> {
        self.senders.chassis.set_mode(ChassisMode::Raw);
        self.revert_to_manual("right switch mid");
        Ok(())
    }

    fn right_switch_up_rise(&mut self) -> Result<(), ManualError> {
        self.senders.chassis.set_mode(ChassisMode::Raw);
        self.revert_to_manual("right switch up");
        Ok(())
    }

    fn chassis_output_on(&mut self) -> Result<(), ManualError> {
        info!("Chassis output on, recalibrating");
        self.reset_calibration(CalibrationGroup::PowerOn);
        self.reset_calibration(CalibrationGroup::Mast);
        if self.step_queue.mode() == OperatingMode::Middleware {
            self.revert_to_manual("chassis output on");
        }
        Ok(())
    }

    fn check_input(&mut self, frame: &InputFrame) -> Result<(), ManualError> {
        let chords = std::mem::take(&mut self.chord_triggers);
        let (chords, result) = self.fire(chords, frame);
        self.chord_triggers = chords;
        result
    }

    fn update_from_radio(&mut self, frame: &InputFrame) -> Result<(), ManualError> {
        self.senders.chassis.set_mode(ChassisMode::Raw);
        self.senders.vel.set_linear_vel(
            frame.ch_r_y * self.max_linear_vel,
            -frame.ch_r_x * self.max_linear_vel,
        );
        self.senders
            .vel
            .set_angular_vel(-frame.ch_l_x * self.max_angular_vel);

        let switches = std::mem::take(&mut self.switch_triggers);
        let (switches, result) = self.fire(switches, frame);
        self.switch_triggers = switches;
        result
    }

    fn update_from_host(&mut self, frame: &InputFrame) -> Result<(), ManualError> {
        self.senders.vel.set_linear_vel(
            axis(frame, Key::W, Key::S) * self.max_linear_vel,
            axis(frame, Key::A, Key::D) * self.max_linear_vel,
        );
        self.senders
            .vel
            .set_angular_vel(-frame.m_x * self.max_angular_vel);
        Ok(())
    }

    fn update_periodic(&mut self, now: Instant) -> Result<(), ManualError> {
        let powered = self.base.state() != ControlState::Passive;
        let controllers = self.controllers.as_mut();
        self.power_on_calibration.update(now, powered, controllers);
        self.mast_calibration.update(now, powered, controllers);
        self.arm_calibration.update(now, true, controllers);
        Ok(())
    }

    fn dispatch_commands(&mut self, now: Instant) {
        send(self.senders.mast.as_mut(), now, &self.bus);
        if self.step_queue.mode() == OperatingMode::Manual {
            send(self.senders.chassis.as_mut(), now, &self.bus);
            send(self.senders.vel.as_mut(), now, &self.bus);
            send(self.senders.card.as_mut(), now, &self.bus);
        }
    }
}
