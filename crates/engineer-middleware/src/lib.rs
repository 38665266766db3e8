//! `engineer-middleware` – everything that crosses a thread or process
//! boundary.
//!
//! # Modules
//!
//! - [`bus`] – topic-based publish/subscribe [`EventBus`] for status records,
//!   mode changes and alerts, built on Tokio broadcast channels.
//! - [`step_queue`] – [`StepQueueClient`]: submits step-queue goals to the
//!   executor, tracks the outstanding goal and owns the operating mode shared
//!   with the goal callbacks.
//! - [`sim`] – [`SimStepExecutor`][sim::SimStepExecutor], a Tokio-backed
//!   executor, and [`LoopbackTransport`][sim::LoopbackTransport] for tests.

pub mod bus;
pub mod sim;
pub mod step_queue;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use step_queue::{GoalCallbacks, StepQueueClient, StepQueueTransport};
