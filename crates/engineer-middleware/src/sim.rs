//! Step-queue executors that need no robot.
//!
//! - [`SimStepExecutor`] runs named step queues on a Tokio runtime: every
//!   step takes a fixed duration and is reported through
//!   [`GoalCallbacks::on_feedback`].  A new goal preempts the running one.
//! - [`LoopbackTransport`] runs nothing.  It records goals and cancel
//!   requests and hands the callbacks back to the test, which drives them by
//!   hand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use engineer_types::{
    GoalId, GoalState, ManualError, StepQueueFeedback, StepQueueGoal, StepQueueResult,
};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::step_queue::{GoalCallbacks, StepQueueTransport};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// SimStepExecutor
// ────────────────────────────────────────────────────────────────────────────

struct RunningGoal {
    id: GoalId,
    cancel: watch::Sender<bool>,
}

/// Tokio-backed step-queue executor.
///
/// | Situation | Terminal state |
/// |---|---|
/// | every step ran | [`GoalState::Succeeded`], `finish = true` |
/// | cancelled or replaced by a newer goal | [`GoalState::Preempted`] |
/// | unknown step-queue name | [`GoalState::Rejected`] |
pub struct SimStepExecutor {
    handle: Handle,
    step_duration: Duration,
    queues: HashMap<String, Vec<String>>,
    connected: AtomicBool,
    running: Arc<Mutex<Option<RunningGoal>>>,
}

impl SimStepExecutor {
    /// Executor spawning its goals on `handle`; every step takes
    /// `step_duration`.
    pub fn new(handle: Handle, step_duration: Duration) -> Self {
        Self {
            handle,
            step_duration,
            queues: HashMap::new(),
            connected: AtomicBool::new(true),
            running: Arc::new(Mutex::new(None)),
        }
    }

    /// Register step queue `name` made of `steps`.
    pub fn with_queue(mut self, name: impl Into<String>, steps: Vec<String>) -> Self {
        self.queues.insert(name.into(), steps);
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn queue_names(&self) -> impl Iterator<Item = &str> {
        self.queues.keys().map(String::as_str)
    }

    /// Goal currently executing, if any.
    pub fn running_goal(&self) -> Option<GoalId> {
        lock(&self.running).as_ref().map(|r| r.id)
    }
}

async fn run_goal(
    steps: Option<Vec<String>>,
    step_duration: Duration,
    callbacks: GoalCallbacks,
    cancel: watch::Receiver<bool>,
    running: Arc<Mutex<Option<RunningGoal>>>,
) {
    let (state, result) = execute(steps, step_duration, &callbacks, cancel).await;
    {
        let mut running = lock(&running);
        if running.as_ref().is_some_and(|r| r.id == callbacks.goal_id()) {
            *running = None;
        }
    }
    callbacks.on_done(state, result);
}

async fn execute(
    steps: Option<Vec<String>>,
    step_duration: Duration,
    callbacks: &GoalCallbacks,
    mut cancel: watch::Receiver<bool>,
) -> (GoalState, StepQueueResult) {
    let Some(steps) = steps else {
        debug!(step_queue = %callbacks.step_queue(), "Unknown step queue, rejecting");
        return (GoalState::Rejected, StepQueueResult { finish: false });
    };
    callbacks.on_active();

    let total = steps.len() as u32;
    for (i, step) in steps.into_iter().enumerate() {
        tokio::select! {
            _ = tokio::time::sleep(step_duration) => {}
            _ = cancel.changed() => {
                return (GoalState::Preempted, StepQueueResult { finish: false });
            }
        }
        callbacks.on_feedback(&StepQueueFeedback {
            current_step_name: step,
            finished_step: i as u32 + 1,
            total_steps: total,
        });
    }
    (GoalState::Succeeded, StepQueueResult { finish: true })
}

impl StepQueueTransport for SimStepExecutor {
    fn is_server_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send_goal(
        &self,
        id: GoalId,
        goal: StepQueueGoal,
        callbacks: GoalCallbacks,
    ) -> Result<(), ManualError> {
        if !self.is_server_connected() {
            return Err(ManualError::Transport("sim executor offline".to_string()));
        }
        let (cancel_tx, cancel_rx) = watch::channel(false);
        if let Some(previous) = lock(&self.running).replace(RunningGoal { id, cancel: cancel_tx }) {
            debug!(preempted = %previous.id, by = %id, "Preempting running goal");
            let _ = previous.cancel.send(true);
        }
        info!(step_queue = %goal.step_queue_name, goal_id = %id, "Sim executor accepted goal");
        let steps = self.queues.get(&goal.step_queue_name).cloned();
        self.handle.spawn(run_goal(
            steps,
            self.step_duration,
            callbacks,
            cancel_rx,
            Arc::clone(&self.running),
        ));
        Ok(())
    }

    fn cancel_all_goals(&self) -> Result<(), ManualError> {
        if let Some(running) = lock(&self.running).take() {
            debug!(goal_id = %running.id, "Cancelling running goal");
            let _ = running.cancel.send(true);
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LoopbackTransport
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct LoopbackState {
    goals: Vec<(GoalId, StepQueueGoal)>,
    callbacks: Vec<GoalCallbacks>,
    cancels: usize,
    fail_sends: bool,
}

/// Transport that records requests and leaves the callbacks to the caller.
pub struct LoopbackTransport {
    connected: AtomicBool,
    state: Mutex<LoopbackState>,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    /// A connected transport with nothing recorded.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            state: Mutex::new(LoopbackState::default()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make every following `send_goal` fail with a transport error.
    pub fn fail_sends(&self, fail: bool) {
        lock(&self.state).fail_sends = fail;
    }

    /// Every goal sent so far, oldest first.
    pub fn goals(&self) -> Vec<(GoalId, StepQueueGoal)> {
        lock(&self.state).goals.clone()
    }

    /// Callbacks of the most recent goal.
    pub fn last_callbacks(&self) -> Option<GoalCallbacks> {
        lock(&self.state).callbacks.last().cloned()
    }

    pub fn cancel_count(&self) -> usize {
        lock(&self.state).cancels
    }
}

impl StepQueueTransport for LoopbackTransport {
    fn is_server_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send_goal(
        &self,
        id: GoalId,
        goal: StepQueueGoal,
        callbacks: GoalCallbacks,
    ) -> Result<(), ManualError> {
        let mut state = lock(&self.state);
        if state.fail_sends {
            return Err(ManualError::Transport("loopback send refused".to_string()));
        }
        state.goals.push((id, goal));
        state.callbacks.push(callbacks);
        Ok(())
    }

    fn cancel_all_goals(&self) -> Result<(), ManualError> {
        lock(&self.state).cancels += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{EventBus, Topic};
    use crate::step_queue::StepQueueClient;
    use engineer_types::{EventPayload, OperatingMode};

    fn executor() -> Arc<SimStepExecutor> {
        Arc::new(
            SimStepExecutor::new(Handle::current(), Duration::from_millis(5)).with_queue(
                "install_module",
                vec!["lift".to_string(), "extend".to_string(), "release".to_string()],
            ),
        )
    }

    async fn wait_for_manual(client: &StepQueueClient) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while client.mode() != OperatingMode::Manual {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("goal must finish");
    }

    #[tokio::test]
    async fn runs_queue_with_monotonic_feedback_and_one_done() {
        let exec = executor();
        let bus = EventBus::default();
        let mut status = bus.subscribe_to(Topic::Status);
        let mut mode = bus.subscribe_to(Topic::Mode);
        let mut client = StepQueueClient::new(exec.clone(), bus);

        client.submit("install_module").unwrap();
        assert_eq!(client.mode(), OperatingMode::Middleware);
        wait_for_manual(&client).await;

        let mut finished = Vec::new();
        while let Ok(event) = status.try_recv() {
            if let EventPayload::Status(cmd) = event.payload {
                finished.push(cmd.finished_step);
            }
        }
        assert_eq!(finished, [1, 2, 3]);

        let mut results = Vec::new();
        while let Ok(event) = mode.try_recv() {
            if let EventPayload::GoalFinished { state, finish, .. } = event.payload {
                results.push((state, finish));
            }
        }
        assert_eq!(results, [(GoalState::Succeeded, true)]);
    }

    #[tokio::test]
    async fn finished_goal_is_no_longer_running() {
        let exec = executor();
        let mut client = StepQueueClient::new(exec.clone(), EventBus::default());

        let id = client.submit("install_module").unwrap();
        assert_eq!(exec.running_goal(), Some(id));
        wait_for_manual(&client).await;
        assert_eq!(exec.running_goal(), None);

        client.submit("no_such_queue").unwrap();
        wait_for_manual(&client).await;
        assert_eq!(exec.running_goal(), None);
    }

    #[tokio::test]
    async fn unknown_queue_is_rejected_and_reverts() {
        let exec = executor();
        let bus = EventBus::default();
        let mut mode = bus.subscribe_to(Topic::Mode);
        let mut client = StepQueueClient::new(exec, bus);

        client.submit("no_such_queue").unwrap();
        wait_for_manual(&client).await;

        let rejected = std::iter::from_fn(|| mode.try_recv().ok()).any(|e| {
            matches!(
                e.payload,
                EventPayload::GoalFinished {
                    state: GoalState::Rejected,
                    ..
                }
            )
        });
        assert!(rejected);
    }

    #[tokio::test]
    async fn cancel_preempts_running_goal() {
        let exec = Arc::new(
            SimStepExecutor::new(Handle::current(), Duration::from_secs(10))
                .with_queue("pick_ore", vec!["reach".to_string()]),
        );
        let bus = EventBus::default();
        let mut mode = bus.subscribe_to(Topic::Mode);
        let mut client = StepQueueClient::new(exec, bus);

        client.submit("pick_ore").unwrap();
        client.cancel_all();
        wait_for_manual(&client).await;

        let preempted = std::iter::from_fn(|| mode.try_recv().ok()).any(|e| {
            matches!(
                e.payload,
                EventPayload::GoalFinished {
                    state: GoalState::Preempted,
                    finish: false,
                    ..
                }
            )
        });
        assert!(preempted);
    }

    #[tokio::test]
    async fn offline_executor_is_unreachable() {
        let exec = executor();
        exec.set_connected(false);
        let mut client = StepQueueClient::new(exec, EventBus::default());
        assert!(matches!(
            client.submit("install_module"),
            Err(ManualError::ExecutorUnreachable { .. })
        ));
        assert_eq!(client.mode(), OperatingMode::Manual);
    }

    #[test]
    fn loopback_records_goals_and_cancels() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut client = StepQueueClient::new(transport.clone(), EventBus::default());
        let id = client.submit("card_grab").unwrap();
        client.cancel_all();

        let goals = transport.goals();
        assert_eq!(goals[0].0, id);
        assert_eq!(transport.cancel_count(), 1);
        assert_eq!(transport.last_callbacks().unwrap().goal_id(), id);
    }
}
