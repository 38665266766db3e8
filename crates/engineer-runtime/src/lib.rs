//! `engineer-runtime` – the engineer's manual controller.
//!
//! # Modules
//!
//! - [`manual_base`] – [`ManualBase`][manual_base::ManualBase] and the
//!   [`ManualControl`][manual_base::ManualControl] hooks driven by
//!   [`run_tick`][manual_base::run_tick].
//! - [`bindings`] – key-chord and left-switch bindings to engineer reactions.
//! - [`engineer`] – [`EngineerManual`][engineer::EngineerManual]: MANUAL /
//!   MIDDLEWARE arbitration, calibration and command dispatch.
//! - [`telemetry`] – `tracing` subscriber and optional OTLP export.

pub mod bindings;
pub mod engineer;
pub mod manual_base;
pub mod telemetry;

pub use bindings::{Binding, BindingEdge, KeyChord, Reaction, Trigger, default_bindings};
pub use engineer::{EngineerManual, EngineerSenders, EngineerSettings};
pub use manual_base::{BaseEvent, ManualBase, ManualControl, run_tick};
