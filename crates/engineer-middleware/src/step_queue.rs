//! [`StepQueueClient`] – the engineer's side of the step-queue executor
//! protocol.
//!
//! The client owns the [`OperatingMode`].  A successful
//! [`submit`][StepQueueClient::submit] moves it to MIDDLEWARE; the terminal
//! callback of that goal moves it back to MANUAL whatever the outcome.
//!
//! Goal callbacks may run on any thread (typically a Tokio worker), so the
//! mode, the published status record and the outstanding-goal marker live in
//! one mutex-protected cell shared by the client and every
//! [`GoalCallbacks`] handle.  Mode events are published while that lock is
//! held, so the Mode topic sees transitions in the order they were applied.
//! The transport is never called with the lock held.
//!
//! ```text
//!            submit (reachable, nothing outstanding)
//!   MANUAL ─────────────────────────────────────────▶ MIDDLEWARE
//!     ▲                                                   │
//!     └─────────── on_done (any state) / force_manual ────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use engineer_types::{
    EngineerCmd, Event, EventPayload, GoalId, GoalState, ManualError, OperatingMode,
    StepQueueFeedback, StepQueueGoal, StepQueueResult,
};
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, Topic};

const SOURCE: &str = "engineer-middleware::step_queue";

// ────────────────────────────────────────────────────────────────────────────
// Transport
// ────────────────────────────────────────────────────────────────────────────

/// Connection to a step-queue executor.
///
/// Implementations must not block: `send_goal` and `cancel_all_goals` hand
/// the request off and return, and progress is reported later through the
/// [`GoalCallbacks`] given with the goal.
pub trait StepQueueTransport: Send + Sync {
    fn is_server_connected(&self) -> bool;

    /// Hand `goal` to the executor.
    ///
    /// # Errors
    ///
    /// Returns [`ManualError::Transport`] if the request could not be sent.
    fn send_goal(
        &self,
        id: GoalId,
        goal: StepQueueGoal,
        callbacks: GoalCallbacks,
    ) -> Result<(), ManualError>;

    /// Ask the executor to cancel every goal it is running for this client.
    ///
    /// # Errors
    ///
    /// Returns [`ManualError::Transport`] if the request could not be sent.
    fn cancel_all_goals(&self) -> Result<(), ManualError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Shared state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ClientState {
    mode: OperatingMode,
    status: EngineerCmd,
    outstanding: Option<Outstanding>,
}

#[derive(Debug, Clone)]
struct Outstanding {
    id: GoalId,
    step_queue: String,
}

type SharedState = Arc<Mutex<ClientState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, ClientState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn mode_event(mode: OperatingMode) -> Event {
    Event::new(SOURCE, EventPayload::ModeChanged { mode })
}

/// Apply `mode` and publish the change, returning whether it changed.
///
/// Must be called with the state lock held.
fn set_mode(state: &mut ClientState, mode: OperatingMode, bus: &EventBus) -> bool {
    if std::mem::replace(&mut state.mode, mode) == mode {
        return false;
    }
    bus.notify(Topic::Mode, mode_event(mode));
    true
}

// ────────────────────────────────────────────────────────────────────────────
// Callbacks
// ────────────────────────────────────────────────────────────────────────────

/// Callback handle bound to one submitted goal.
///
/// Callbacks for a goal that is no longer outstanding are ignored, which
/// makes `on_done` take effect exactly once per goal.
#[derive(Clone, Debug)]
pub struct GoalCallbacks {
    id: GoalId,
    step_queue: String,
    state: SharedState,
    bus: EventBus,
}

impl GoalCallbacks {
    pub fn goal_id(&self) -> GoalId {
        self.id
    }

    pub fn step_queue(&self) -> &str {
        &self.step_queue
    }

    fn is_current(&self, state: &ClientState) -> bool {
        state.outstanding.as_ref().is_some_and(|o| o.id == self.id)
    }

    /// The executor accepted the goal.
    pub fn on_active(&self) {
        debug!(step_queue = %self.step_queue, goal_id = %self.id, "Goal just went active");
    }

    /// Copy `feedback` into the status record and publish it.
    pub fn on_feedback(&self, feedback: &StepQueueFeedback) {
        let status = {
            let mut state = lock(&self.state);
            if !self.is_current(&state) {
                debug!(goal_id = %self.id, "Ignoring feedback of a stale goal");
                return;
            }
            state.status.current_step_name = feedback.current_step_name.clone();
            state.status.finished_step = feedback.finished_step;
            state.status.total_steps = feedback.total_steps;
            state.status.clone()
        };
        debug!(
            step_queue = %self.step_queue,
            step = %status.current_step_name,
            finished = status.finished_step,
            total = status.total_steps,
            "Step-queue feedback"
        );
        self.bus
            .notify(Topic::Status, Event::new(SOURCE, EventPayload::Status(status)));
    }

    /// Terminal callback: clear the outstanding goal and return to MANUAL,
    /// whatever `goal_state` and `result` say.
    pub fn on_done(&self, goal_state: GoalState, result: StepQueueResult) {
        let mut state = lock(&self.state);
        if !self.is_current(&state) {
            debug!(goal_id = %self.id, state = %goal_state, "Ignoring result of a stale goal");
            return;
        }
        state.outstanding = None;
        info!(
            step_queue = %self.step_queue,
            goal_id = %self.id,
            state = %goal_state,
            finish = result.finish,
            "Step queue done"
        );
        self.bus.notify(
            Topic::Mode,
            Event::new(
                SOURCE,
                EventPayload::GoalFinished {
                    step_queue: self.step_queue.clone(),
                    state: goal_state,
                    finish: result.finish,
                },
            ),
        );
        set_mode(&mut state, OperatingMode::Manual, &self.bus);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// Submits step-queue goals and tracks the resulting operating mode.
pub struct StepQueueClient {
    transport: Arc<dyn StepQueueTransport>,
    state: SharedState,
    bus: EventBus,
    symbol: bool,
    next_id: u64,
}

impl StepQueueClient {
    pub fn new(transport: Arc<dyn StepQueueTransport>, bus: EventBus) -> Self {
        Self {
            transport,
            state: Arc::new(Mutex::new(ClientState::default())),
            bus,
            symbol: false,
            next_id: 1,
        }
    }

    pub fn mode(&self) -> OperatingMode {
        lock(&self.state).mode
    }

    /// Latest status record (as last published).
    pub fn status(&self) -> EngineerCmd {
        lock(&self.state).status.clone()
    }

    /// Goal awaiting its terminal callback, if any.
    pub fn outstanding(&self) -> Option<GoalId> {
        lock(&self.state).outstanding.as_ref().map(|o| o.id)
    }

    /// Parity bit of the most recent run request.
    pub fn symbol(&self) -> bool {
        self.symbol
    }

    pub fn is_server_connected(&self) -> bool {
        self.transport.is_server_connected()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Run `step_queue` on the executor and switch to MIDDLEWARE.
    ///
    /// The parity bit flips on every call, accepted or not.  Rejections are
    /// logged and published on [`Topic::SystemAlerts`] before being
    /// returned.
    ///
    /// # Errors
    ///
    /// - [`ManualError::ExecutorUnreachable`] – the executor is not
    ///   connected; nothing was sent.
    /// - [`ManualError::GoalOutstanding`] – a previous goal has not finished
    ///   yet; nothing was sent.
    /// - [`ManualError::Transport`] – the transport refused the goal.
    ///
    /// In every error case the operating mode is unchanged.
    pub fn submit(&mut self, step_queue: &str) -> Result<GoalId, ManualError> {
        self.symbol = !self.symbol;
        let symbol = self.symbol;
        lock(&self.state).status.symbol = symbol;

        if !self.transport.is_server_connected() {
            error!(step_queue, "Step queue server not connected");
            return Err(self.reject(ManualError::ExecutorUnreachable {
                step_queue: step_queue.to_string(),
            }));
        }

        let id = GoalId(self.next_id);
        let previous_mode = {
            let mut state = lock(&self.state);
            if let Some(outstanding) = &state.outstanding {
                let err = ManualError::GoalOutstanding {
                    step_queue: step_queue.to_string(),
                    outstanding: outstanding.id,
                };
                drop(state);
                warn!(step_queue, "Run request ignored, a step queue is still running");
                return Err(self.reject(err));
            }
            state.outstanding = Some(Outstanding {
                id,
                step_queue: step_queue.to_string(),
            });
            let previous_mode = state.mode;
            set_mode(&mut state, OperatingMode::Middleware, &self.bus);
            previous_mode
        };
        self.next_id += 1;

        let goal = StepQueueGoal {
            step_queue_name: step_queue.to_string(),
            symbol,
        };
        let callbacks = GoalCallbacks {
            id,
            step_queue: step_queue.to_string(),
            state: Arc::clone(&self.state),
            bus: self.bus.clone(),
        };
        if let Err(e) = self.transport.send_goal(id, goal, callbacks) {
            {
                let mut state = lock(&self.state);
                if state.outstanding.as_ref().is_some_and(|o| o.id == id) {
                    state.outstanding = None;
                    set_mode(&mut state, previous_mode, &self.bus);
                }
            }
            error!(step_queue, error = %e, "Failed to send step-queue goal");
            return Err(self.reject(e));
        }

        info!(step_queue, goal_id = %id, symbol, "Step queue submitted");
        Ok(id)
    }

    /// Ask the executor to cancel the outstanding goal.
    ///
    /// Fire-and-forget: the mode changes only when the goal's terminal
    /// callback arrives.  A no-op when nothing is outstanding.
    pub fn cancel_all(&self) {
        let Some(outstanding) = lock(&self.state).outstanding.clone() else {
            debug!("Cancel requested with no outstanding goal");
            return;
        };
        info!(step_queue = %outstanding.step_queue, goal_id = %outstanding.id, "Cancelling step queue");
        if let Err(e) = self.transport.cancel_all_goals() {
            warn!(error = %e, "Failed to cancel step-queue goals");
        }
    }

    /// Cancel any outstanding goal and return to MANUAL immediately.
    ///
    /// The cancelled goal stays outstanding until its terminal callback
    /// arrives, so a new submission is refused until then.
    pub fn force_manual(&self, reason: &str) {
        self.cancel_all();
        if set_mode(&mut lock(&self.state), OperatingMode::Manual, &self.bus) {
            info!(reason, "Forced back to MANUAL");
        }
    }

    fn reject(&self, err: ManualError) -> ManualError {
        let step_queue = match &err {
            ManualError::ExecutorUnreachable { step_queue }
            | ManualError::GoalOutstanding { step_queue, .. } => step_queue.clone(),
            _ => String::new(),
        };
        self.bus.notify(
            Topic::SystemAlerts,
            Event::new(
                SOURCE,
                EventPayload::SubmissionRejected {
                    step_queue,
                    reason: err.to_string(),
                },
            ),
        );
        err
    }
}
