//! Command sender traits for the engineer's actuator groups.
//!
//! A command sender owns the target of one actuator group and re-emits it on
//! the group's control channel every time [`CommandSender::send_command`] is
//! called.  The arbitration layer decides *whether* a sender is ticked; the
//! sender only decides *what* is emitted.
//!
//! Drivers implement the base trait plus the capability trait matching their
//! group:
//!
//! | Trait | Groups |
//! |---|---|
//! | [`BinaryCommandSender`] | mast, card (two-position joints) |
//! | [`ChassisCommandSender`] | chassis mode channel |
//! | [`VelocityCommandSender`] | chassis velocity channel |

use std::time::Instant;

use engineer_types::{ChassisMode, ManualError};

/// An actuator group that re-emits its current target on every call to
/// [`send_command`][CommandSender::send_command].
pub trait CommandSender: Send {
    /// Stable identifier, e.g. `"mast"` or `"chassis"`.
    fn id(&self) -> &str;

    /// Emit the current target onto the control channel.
    ///
    /// # Errors
    ///
    /// Returns [`ManualError::HardwareFault`] if the channel refuses the
    /// command.
    fn send_command(&mut self, time: Instant) -> Result<(), ManualError>;
}

/// A joint with two commanded positions (e.g. card gripper open/closed).
pub trait BinaryCommandSender: CommandSender {
    fn on(&mut self);

    fn off(&mut self);

    /// `true` while the "on" position is commanded.
    fn state(&self) -> bool;

    /// Flip between the two positions.
    fn toggle(&mut self) {
        if self.state() {
            self.off();
        } else {
            self.on();
        }
    }
}

/// The chassis mode channel.
pub trait ChassisCommandSender: CommandSender {
    fn set_mode(&mut self, mode: ChassisMode);

    fn mode(&self) -> ChassisMode;
}

/// Planar chassis velocity target.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist {
    pub linear_x: f32,
    pub linear_y: f32,
    pub angular_z: f32,
}

impl Twist {
    pub const ZERO: Twist = Twist {
        linear_x: 0.0,
        linear_y: 0.0,
        angular_z: 0.0,
    };

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// The chassis velocity channel.
pub trait VelocityCommandSender: CommandSender {
    fn set_linear_vel(&mut self, x: f32, y: f32);

    fn set_angular_vel(&mut self, z: f32);

    fn velocity(&self) -> Twist;

    /// Command a full stop.
    fn set_zero(&mut self) {
        self.set_linear_vel(0.0, 0.0);
        self.set_angular_vel(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockGripper {
        on: bool,
    }

    impl CommandSender for MockGripper {
        fn id(&self) -> &str {
            "card"
        }

        fn send_command(&mut self, _time: Instant) -> Result<(), ManualError> {
            Ok(())
        }
    }

    impl BinaryCommandSender for MockGripper {
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

    struct MockBase {
        twist: Twist,
    }

    impl CommandSender for MockBase {
        fn id(&self) -> &str {
            "vel"
        }

        fn send_command(&mut self, _time: Instant) -> Result<(), ManualError> {
            Ok(())
        }
    }

    impl VelocityCommandSender for MockBase {
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

    #[test]
    fn toggle_flips_binary_state() {
        let mut gripper = MockGripper { on: false };
        gripper.toggle();
        assert!(gripper.state());
        gripper.toggle();
        assert!(!gripper.state());
    }

    #[test]
    fn set_zero_clears_all_axes() {
        let mut base = MockBase { twist: Twist::ZERO };
        base.set_linear_vel(1.0, -0.5);
        base.set_angular_vel(2.0);
        assert!(!base.velocity().is_zero());

        base.set_zero();
        assert!(base.velocity().is_zero());
    }
}
