//! `engineer-kernel` – tick-level primitives of the manual controller.
//!
//! Nothing in this crate blocks or spawns; every type is owned by the control
//! tick and mutated once per frame.
//!
//! # Modules
//!
//! - [`edge_event`] – [`EdgeEvent`][edge_event::EdgeEvent]: turns a sampled
//!   boolean level into at most one reaction per genuine transition.
//! - [`calibration`] – [`CalibrationQueue`][calibration::CalibrationQueue]:
//!   runs an ordered list of homing steps through a
//!   [`ControllerManager`][engineer_hal::ControllerManager] without ever
//!   waiting on it.
//! - [`link_watchdog`] – [`LinkWatchdog`][link_watchdog::LinkWatchdog]:
//!   decides whether the remote link is still alive from frame stamps.

pub mod calibration;
pub mod edge_event;
pub mod link_watchdog;

pub use calibration::{CalibrationQueue, DEFAULT_QUERY_INTERVAL};
pub use edge_event::{Edge, EdgeEvent};
pub use link_watchdog::{DEFAULT_LINK_TIMEOUT, LinkHealth, LinkWatchdog};
