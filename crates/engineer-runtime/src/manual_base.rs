//! [`ManualBase`] and the [`ManualControl`] capability.
//!
//! `ManualBase` is the part of a manual controller that every robot shares:
//! it watches the remote link, maps the right switch to a [`ControlState`]
//! and tracks the referee chassis-output flag.  A concrete controller embeds
//! a `ManualBase`, implements [`ManualControl`] to override the hooks it
//! cares about, and is driven once per frame by [`run_tick`].
//!
//! | Right switch | [`ControlState`] | Input path |
//! |---|---|---|
//! | down | `Passive` | none |
//! | mid | `Rc` | radio sticks, left switch |
//! | up | `Pc` | keyboard and mouse |
//!
//! A lost link forces `Passive`.  The switch detectors keep their last level
//! across the loss, so after relinking the state stays `Passive` until the
//! operator moves the right switch.

use std::time::{Duration, Instant};

use engineer_kernel::{Edge, EdgeEvent, LinkWatchdog};
use engineer_types::{ControlState, InputFrame, ManualError, SwitchPosition};
use tracing::info;

/// Edge-level events detected by [`ManualBase::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseEvent {
    RemoteControlTurnOn,
    RemoteControlTurnOff,
    RightSwitchDownRise,
    RightSwitchMidRise,
    RightSwitchUpRise,
    ChassisOutputOn,
    ChassisOutputOff,
}

pub struct ManualBase {
    state: ControlState,
    remote_is_open: bool,
    link: LinkWatchdog,
    right_switch_down: EdgeEvent<()>,
    right_switch_mid: EdgeEvent<()>,
    right_switch_up: EdgeEvent<()>,
    chassis_output: EdgeEvent<()>,
}

impl ManualBase {
    pub fn new(link_timeout: Duration) -> Self {
        Self {
            state: ControlState::Passive,
            remote_is_open: false,
            link: LinkWatchdog::new(link_timeout),
            right_switch_down: EdgeEvent::new(),
            right_switch_mid: EdgeEvent::new(),
            right_switch_up: EdgeEvent::new(),
            chassis_output: EdgeEvent::new(),
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn remote_is_open(&self) -> bool {
        self.remote_is_open
    }

    /// Update the link, switch and chassis-output detectors from `frame` and
    /// return the events of this tick in the order they must be handled.
    pub fn observe(&mut self, frame: &InputFrame, now: Instant) -> Vec<BaseEvent> {
        let mut events = Vec::new();

        match self.chassis_output.sample(frame.chassis_output_on) {
            Some(Edge::Rising) => events.push(BaseEvent::ChassisOutputOn),
            Some(Edge::Falling) => events.push(BaseEvent::ChassisOutputOff),
            None => {}
        }

        self.link.heartbeat(frame.stamp);
        if !self.link.is_alive(now) {
            if self.remote_is_open {
                info!("Remote control link lost");
                self.remote_is_open = false;
                self.state = ControlState::Passive;
                events.push(BaseEvent::RemoteControlTurnOff);
            }
            return events;
        }
        if !self.remote_is_open {
            info!("Remote control link up");
            self.remote_is_open = true;
            events.push(BaseEvent::RemoteControlTurnOn);
        }

        let switches = [
            (SwitchPosition::Down, ControlState::Passive, BaseEvent::RightSwitchDownRise),
            (SwitchPosition::Mid, ControlState::Rc, BaseEvent::RightSwitchMidRise),
            (SwitchPosition::Up, ControlState::Pc, BaseEvent::RightSwitchUpRise),
        ];
        for (position, state, event) in switches {
            let detector = match position {
                SwitchPosition::Down => &mut self.right_switch_down,
                SwitchPosition::Mid => &mut self.right_switch_mid,
                SwitchPosition::Up => &mut self.right_switch_up,
            };
            if detector.sample(frame.s_r == position) == Some(Edge::Rising) {
                self.state = state;
                events.push(event);
            }
        }
        events
    }
}

/// Hooks of a manual controller built on [`ManualBase`].
///
/// Every hook has an empty default.  [`run_tick`] calls them in a fixed
/// order; errors returned by a hook abort the tick and propagate.
pub trait ManualControl {
    fn base(&self) -> &ManualBase;

    fn base_mut(&mut self) -> &mut ManualBase;

    fn remote_control_turn_on(&mut self) -> Result<(), ManualError> {
        Ok(())
    }

    fn remote_control_turn_off(&mut self) -> Result<(), ManualError> {
        Ok(())
    }

    fn right_switch_down_rise(&mut self) -> Result<(), ManualError> {
        Ok(())
    }

    fn right_switch_mid_rise(&mut self) -> Result<(), ManualError> {
        Ok(())
    }

    fn right_switch_up_rise(&mut self) -> Result<(), ManualError> {
        Ok(())
    }

    fn chassis_output_on(&mut self) -> Result<(), ManualError> {
        Ok(())
    }

    fn chassis_output_off(&mut self) -> Result<(), ManualError> {
        Ok(())
    }

    /// Keyboard edge bindings (PC state).
    fn check_input(&mut self, _frame: &InputFrame) -> Result<(), ManualError> {
        Ok(())
    }

    /// Radio sticks and switches (RC state).
    fn update_from_radio(&mut self, _frame: &InputFrame) -> Result<(), ManualError> {
        Ok(())
    }

    /// Keyboard and mouse (PC state), after [`check_input`][Self::check_input].
    fn update_from_host(&mut self, _frame: &InputFrame) -> Result<(), ManualError> {
        Ok(())
    }

    /// Work done every tick regardless of state, e.g. calibration.
    fn update_periodic(&mut self, _now: Instant) -> Result<(), ManualError> {
        Ok(())
    }

    /// Emit actuator commands.  Runs last, every tick.
    fn dispatch_commands(&mut self, _now: Instant) {}
}

fn handle_event<M: ManualControl + ?Sized>(m: &mut M, event: BaseEvent) -> Result<(), ManualError> {
    match event {
        BaseEvent::RemoteControlTurnOn => m.remote_control_turn_on(),
        BaseEvent::RemoteControlTurnOff => m.remote_control_turn_off(),
        BaseEvent::RightSwitchDownRise => m.right_switch_down_rise(),
        BaseEvent::RightSwitchMidRise => m.right_switch_mid_rise(),
        BaseEvent::RightSwitchUpRise => m.right_switch_up_rise(),
        BaseEvent::ChassisOutputOn => m.chassis_output_on(),
        BaseEvent::ChassisOutputOff => m.chassis_output_off(),
    }
}

/// One control tick: base events, then the input path of the current state,
/// then periodic work, then command dispatch.
///
/// # Errors
///
/// Returns the first error raised by a hook; the rest of the tick is skipped.
pub fn run_tick<M: ManualControl + ?Sized>(
    m: &mut M,
    frame: &InputFrame,
    now: Instant,
) -> Result<(), ManualError> {
    for event in m.base_mut().observe(frame, now) {
        handle_event(m, event)?;
    }
    match m.base().state() {
        ControlState::Passive => {}
        ControlState::Rc => m.update_from_radio(frame)?,
        ControlState::Pc => {
            m.check_input(frame)?;
            m.update_from_host(frame)?;
        }
    }
    m.update_periodic(now)?;
    m.dispatch_commands(now);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use engineer_kernel::DEFAULT_LINK_TIMEOUT;

    fn frame(stamp: Instant, s_r: SwitchPosition) -> InputFrame {
        let mut f = InputFrame::at(stamp);
        f.s_r = s_r;
        f
    }

    #[test]
    fn right_switch_selects_state() {
        let mut base = ManualBase::new(DEFAULT_LINK_TIMEOUT);
        let t0 = Instant::now();

        let events = base.observe(&frame(t0, SwitchPosition::Mid), t0);
        assert_eq!(events, [BaseEvent::RemoteControlTurnOn, BaseEvent::RightSwitchMidRise]);
        assert_eq!(base.state(), ControlState::Rc);

        let events = base.observe(&frame(t0, SwitchPosition::Up), t0);
        assert_eq!(events, [BaseEvent::RightSwitchUpRise]);
        assert_eq!(base.state(), ControlState::Pc);

        assert!(base.observe(&frame(t0, SwitchPosition::Up), t0).is_empty());

        base.observe(&frame(t0, SwitchPosition::Down), t0);
        assert_eq!(base.state(), ControlState::Passive);
    }

    #[test]
    fn link_loss_forces_passive_until_switch_moves() {
        let mut base = ManualBase::new(Duration::from_millis(200));
        let t0 = Instant::now();
        base.observe(&frame(t0, SwitchPosition::Up), t0);
        assert_eq!(base.state(), ControlState::Pc);

        // Last frame is stale.
        let late = t0 + Duration::from_millis(300);
        let events = base.observe(&frame(t0, SwitchPosition::Up), late);
        assert_eq!(events, [BaseEvent::RemoteControlTurnOff]);
        assert_eq!(base.state(), ControlState::Passive);
        assert!(!base.remote_is_open());

        // Relink with the switch still up.
        let events = base.observe(&frame(late, SwitchPosition::Up), late);
        assert_eq!(events, [BaseEvent::RemoteControlTurnOn]);
        assert_eq!(base.state(), ControlState::Passive);

        // Operator moves the switch.
        base.observe(&frame(late, SwitchPosition::Mid), late);
        base.observe(&frame(late, SwitchPosition::Up), late);
        assert_eq!(base.state(), ControlState::Pc);
    }

    #[test]
    fn chassis_output_edges_reported_without_link() {
        let mut base = ManualBase::new(DEFAULT_LINK_TIMEOUT);
        let t0 = Instant::now();
        let mut f = InputFrame::at(t0);
        f.chassis_output_on = true;

        let events = base.observe(&f, t0 + Duration::from_secs(5));
        assert_eq!(events, [BaseEvent::ChassisOutputOn]);

        f.chassis_output_on = false;
        let events = base.observe(&f, t0 + Duration::from_secs(5));
        assert_eq!(events, [BaseEvent::ChassisOutputOff]);
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<&'static str>,
    }

    struct Probe {
        base: ManualBase,
        rec: Recorder,
    }

    impl ManualControl for Probe {
        fn base(&self) -> &ManualBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ManualBase {
            &mut self.base
        }

        fn right_switch_up_rise(&mut self) -> Result<(), ManualError> {
            self.rec.calls.push("up_rise");
            Ok(())
        }

        fn check_input(&mut self, _frame: &InputFrame) -> Result<(), ManualError> {
            self.rec.calls.push("check_input");
            Ok(())
        }

        fn update_from_radio(&mut self, _frame: &InputFrame) -> Result<(), ManualError> {
            self.rec.calls.push("radio");
            Ok(())
        }

        fn update_from_host(&mut self, _frame: &InputFrame) -> Result<(), ManualError> {
            self.rec.calls.push("host");
            Ok(())
        }

        fn update_periodic(&mut self, _now: Instant) -> Result<(), ManualError> {
            self.rec.calls.push("periodic");
            Ok(())
        }

        fn dispatch_commands(&mut self, _now: Instant) {
            self.rec.calls.push("dispatch");
        }
    }

    #[test]
    fn run_tick_calls_hooks_in_order() {
        let mut probe = Probe {
            base: ManualBase::new(DEFAULT_LINK_TIMEOUT),
            rec: Recorder::default(),
        };
        let t0 = Instant::now();
        run_tick(&mut probe, &frame(t0, SwitchPosition::Up), t0).unwrap();
        assert_eq!(
            probe.rec.calls,
            ["up_rise", "check_input", "host", "periodic", "dispatch"]
        );
    }

    #[test]
    fn hook_error_aborts_tick() {
        struct Failing {
            base: ManualBase,
            dispatched: bool,
        }

        impl ManualControl for Failing {
            fn base(&self) -> &ManualBase {
                &self.base
            }

            fn base_mut(&mut self) -> &mut ManualBase {
                &mut self.base
            }

            fn update_from_radio(&mut self, _frame: &InputFrame) -> Result<(), ManualError> {
                Err(ManualError::HardwareFault {
                    component: "card".to_string(),
                    details: "stuck".to_string(),
                })
            }

            fn dispatch_commands(&mut self, _now: Instant) {
                self.dispatched = true;
            }
        }

        let mut m = Failing {
            base: ManualBase::new(DEFAULT_LINK_TIMEOUT),
            dispatched: false,
        };
        let t0 = Instant::now();
        let err = run_tick(&mut m, &frame(t0, SwitchPosition::Mid), t0).unwrap_err();
        assert!(matches!(err, ManualError::HardwareFault { .. }));
        assert!(!m.dispatched);
    }
}
