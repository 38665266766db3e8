//! `engineer-hal` – actuator-facing interfaces.
//!
//! The arbitration layer never talks to drivers directly; it only sees the
//! traits defined here, so real drivers and the simulated ones in [`sim`]
//! are interchangeable.
//!
//! # Modules
//!
//! - [`sender`] – [`CommandSender`] and its capability traits
//!   ([`BinaryCommandSender`], [`ChassisCommandSender`],
//!   [`VelocityCommandSender`]).
//! - [`controller`] – [`ControllerManager`]: controller switching and
//!   calibration status used by calibration queues.
//! - [`sim`] – in-process simulated senders and controller manager.

pub mod controller;
pub mod sender;
pub mod sim;

pub use controller::ControllerManager;
pub use sender::{
    BinaryCommandSender, ChassisCommandSender, CommandSender, Twist, VelocityCommandSender,
};
