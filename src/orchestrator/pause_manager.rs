//! Pause point registry and intervention waits.
//!
//! Each pause point owns a `oneshot` channel created with it. The receiver
//! can be taken by exactly one [`PauseManager::wait_for_intervention`] call;
//! the sender is consumed by the first resolution or dropped on timeout.
//! A resolution that arrives before the wait begins stays buffered in the
//! channel and is delivered as soon as the wait starts.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::RecvError;
use tokio::time::error::Elapsed;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::events::{AgentEvent, EventBus};
use crate::models::pause::{
    AvailableAction, Intervention, InterventionResponse, PauseAction, PausePoint, TriggerDetails,
};
use crate::{AppError, Result};

/// Default wait deadline: one hour.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Closed pause points kept for inspection before the oldest is evicted.
pub const DEFAULT_CLOSED_RETENTION: usize = 256;

/// Optional settings applied when a pause point is created.
#[derive(Debug, Clone, Default)]
pub struct PauseOptions {
    /// Wait deadline; the manager default applies when absent.
    pub timeout_ms: Option<u64>,
    /// Action to fall back to when the deadline elapses.
    pub on_timeout: Option<PauseAction>,
    /// Questions for the operator.
    pub pending_questions: Vec<String>,
    /// Actions offered in addition to `continue` and `cancel`.
    pub extra_actions: Vec<AvailableAction>,
}

/// An operator's resolution of a pause point.
#[derive(Debug, Clone, Default)]
pub struct InterventionReply {
    /// Responder identity.
    pub responder: Option<String>,
    /// Response payload; a bare resolution means `continue`.
    pub response: Option<InterventionResponse>,
}

impl InterventionReply {
    /// A reply choosing `action` with no amendments.
    #[must_use]
    pub fn action(action: PauseAction) -> Self {
        Self {
            responder: None,
            response: Some(InterventionResponse::action(action)),
        }
    }
}

/// Lifecycle of one pause point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseState {
    /// Awaiting resolution.
    Created,
    /// Resolved or rejected by an operator.
    Resolved,
    /// The wait deadline elapsed first.
    TimedOut,
}

enum Decision {
    Resolved(Intervention),
    Rejected(String),
}

struct Slot {
    point: PausePoint,
    state: PauseState,
    tx: Option<oneshot::Sender<Decision>>,
    rx: Option<oneshot::Receiver<Decision>>,
}

#[derive(Default)]
struct Registry {
    slots: HashMap<String, Slot>,
    // Ids whose wait has finished, oldest first.
    closed: VecDeque<String>,
    // Executions with a pending manual pause request.
    requested: HashSet<String>,
}

impl Registry {
    fn get_mut(&mut self, id: &str) -> Option<&mut Slot> {
        self.slots.get_mut(id)
    }

    fn get(&self, id: &str) -> Option<&Slot> {
        self.slots.get(id)
    }

    fn insert(&mut self, id: String, slot: Slot) {
        self.slots.insert(id, slot);
    }

    fn remove(&mut self, id: &str) -> Option<Slot> {
        self.closed.retain(|closed| closed != id);
        self.slots.remove(id)
    }

    /// Mark `id` closed, evicting the oldest closed slots beyond `retention`.
    fn close(&mut self, id: &str, retention: usize) {
        if !self.slots.contains_key(id) {
            return;
        }
        self.closed.push_back(id.to_owned());
        while self.closed.len() > retention {
            if let Some(evicted) = self.closed.pop_front() {
                self.slots.remove(&evicted);
            }
        }
    }
}

/// Registry of pause points awaiting external decisions.
///
/// The registry lock is never held across an `.await`, so resolutions from
/// other tasks proceed while a wait is suspended. Once a wait finishes its
/// pause point stays inspectable until [`PauseManager::remove`] or until
/// more than the retention limit of later pause points have closed.
pub struct PauseManager {
    bus: Arc<EventBus>,
    default_timeout: Duration,
    closed_retention: usize,
    registry: Mutex<Registry>,
}

impl PauseManager {
    /// Create a manager emitting `agent.paused` on `bus`.
    #[must_use]
    pub fn new(bus: Arc<EventBus>, default_timeout: Duration) -> Self {
        Self::with_retention(bus, default_timeout, DEFAULT_CLOSED_RETENTION)
    }

    /// Create a manager keeping at most `closed_retention` closed pause points.
    #[must_use]
    pub fn with_retention(
        bus: Arc<EventBus>,
        default_timeout: Duration,
        closed_retention: usize,
    ) -> Self {
        Self {
            bus,
            default_timeout,
            closed_retention,
            registry: Mutex::new(Registry::default()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask execution `execution_id` to raise a manual pause point at its
    /// next entry phase.
    pub fn request_pause(&self, execution_id: &str) {
        self.registry().requested.insert(execution_id.to_owned());
    }

    /// Consume a pending manual pause request for `execution_id`.
    pub fn take_pause_request(&self, execution_id: &str) -> bool {
        self.registry().requested.remove(execution_id)
    }

    /// Drop any pending manual pause request for `execution_id`.
    pub fn clear_pause_request(&self, execution_id: &str) {
        self.registry().requested.remove(execution_id);
    }

    /// Raise a pause point, register its channel, and emit `agent.paused`.
    ///
    /// Does not block. `checkpoint_id` is recorded as the sentinel `none`
    /// when absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the pause point or its event is
    /// malformed; the pause point is not registered in that case.
    pub fn create_pause_point(
        &self,
        execution_id: &str,
        checkpoint_id: Option<&str>,
        details: TriggerDetails,
        options: PauseOptions,
    ) -> Result<PausePoint> {
        let mut point = PausePoint::new(
            execution_id.to_owned(),
            checkpoint_id.map(ToOwned::to_owned),
            details,
        );
        point.timeout_ms = Some(
            options
                .timeout_ms
                .unwrap_or_else(|| duration_ms(self.default_timeout)),
        );
        point.on_timeout = options.on_timeout;
        point.pending_questions = options.pending_questions;
        point.available_actions.extend(options.extra_actions);
        point.validate()?;

        let (tx, rx) = oneshot::channel();
        self.registry().insert(
            point.id.clone(),
            Slot {
                point: point.clone(),
                state: PauseState::Created,
                tx: Some(tx),
                rx: Some(rx),
            },
        );

        let event = AgentEvent::Paused {
            execution_id: execution_id.to_owned(),
            pause_point: Box::new(point.clone()),
            timestamp: Utc::now(),
        };
        if let Err(err) = self.bus.emit(&event) {
            self.registry().remove(&point.id);
            return Err(err);
        }

        info!(
            pause_point_id = %point.id,
            execution_id,
            trigger = ?point.trigger,
            checkpoint_id = %point.checkpoint_id,
            "pause point created"
        );
        Ok(point)
    }

    /// Suspend until the pause point is resolved or its deadline elapses.
    ///
    /// The effective deadline is `timeout`, else the pause point's
    /// `timeout_ms`, else the manager default.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` if the pause point is unknown.
    /// - `AppError::AlreadyConsumed` if a wait was already issued for it.
    /// - `AppError::Timeout` if the deadline elapses first.
    /// - `AppError::Rejected` if an operator rejected it.
    pub async fn wait_for_intervention(
        &self,
        pause_point_id: &str,
        timeout: Option<Duration>,
    ) -> Result<Intervention> {
        let (mut rx, deadline) = {
            let mut slots = self.registry();
            let slot = slots
                .get_mut(pause_point_id)
                .ok_or_else(|| AppError::NotFound(format!("pause point {pause_point_id}")))?;
            let rx = slot.rx.take().ok_or_else(|| {
                AppError::AlreadyConsumed(format!(
                    "pause point {pause_point_id} already has a wait"
                ))
            })?;
            let deadline = timeout
                .or_else(|| slot.point.timeout_ms.map(Duration::from_millis))
                .unwrap_or(self.default_timeout);
            (rx, deadline)
        };

        let span = info_span!(
            "wait_for_intervention",
            pause_point_id,
            timeout_ms = duration_ms(deadline)
        );
        let received = tokio::time::timeout(deadline, &mut rx)
            .instrument(span)
            .await;
        let outcome = self.settle(pause_point_id, deadline, received, &mut rx);
        self.registry().close(pause_point_id, self.closed_retention);
        outcome
    }

    fn settle(
        &self,
        pause_point_id: &str,
        deadline: Duration,
        received: std::result::Result<std::result::Result<Decision, RecvError>, Elapsed>,
        rx: &mut oneshot::Receiver<Decision>,
    ) -> Result<Intervention> {
        let decision = match received {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => {
                return Err(AppError::AlreadyConsumed(format!(
                    "pause point {pause_point_id} was closed without a decision"
                )));
            }
            Err(_elapsed) => {
                // A resolution may have landed in the same instant the deadline fired.
                let resolved = {
                    let mut slots = self.registry();
                    match slots.get_mut(pause_point_id) {
                        Some(slot) if slot.state == PauseState::Resolved => true,
                        Some(slot) => {
                            slot.state = PauseState::TimedOut;
                            slot.tx = None;
                            false
                        }
                        None => false,
                    }
                };
                if !resolved {
                    warn!(
                        pause_point_id,
                        timeout_ms = duration_ms(deadline),
                        "intervention wait timed out"
                    );
                    return Err(AppError::Timeout(format!(
                        "pause point {pause_point_id} not resolved within {} ms",
                        duration_ms(deadline)
                    )));
                }
                rx.try_recv()
                    .map_err(|_| AppError::Timeout(format!("pause point {pause_point_id}")))?
            }
        };

        match decision {
            Decision::Resolved(intervention) => Ok(intervention),
            Decision::Rejected(reason) => Err(AppError::Rejected(format!(
                "pause point {pause_point_id}: {reason}"
            ))),
        }
    }

    /// Resolve a pause point with a reply.
    ///
    /// Returns `false` and does nothing if the pause point is unknown or its
    /// resolution window has closed.
    pub fn resolve_intervention(&self, pause_point_id: &str, reply: InterventionReply) -> bool {
        let mut slots = self.registry();
        let Some(slot) = slots.get_mut(pause_point_id) else {
            return false;
        };
        let Some(tx) = take_open_sender(slot) else {
            return false;
        };

        let now = Utc::now();
        slot.point.resolved_at = Some(now);
        let intervention = Intervention {
            id: Uuid::new_v4().to_string(),
            execution_id: slot.point.execution_id.clone(),
            pause_point_id: pause_point_id.to_owned(),
            requested_at: slot.point.created_at,
            responded_at: Some(now),
            responder: reply.responder,
            response: reply.response,
        };
        info!(
            pause_point_id,
            action = ?intervention.action(),
            "pause point resolved"
        );
        if tx.send(Decision::Resolved(intervention)).is_err() {
            warn!(pause_point_id, "intervention receiver already dropped");
        }
        true
    }

    /// Resolve a pause point with a bare `continue`.
    pub fn resolve(&self, pause_point_id: &str) -> bool {
        self.resolve_intervention(pause_point_id, InterventionReply::default())
    }

    /// Reject a pause point; its wait fails with `AppError::Rejected`.
    ///
    /// Returns `false` and does nothing if the resolution window has closed.
    pub fn reject_intervention(&self, pause_point_id: &str, reason: &str) -> bool {
        let mut slots = self.registry();
        let Some(slot) = slots.get_mut(pause_point_id) else {
            return false;
        };
        let Some(tx) = take_open_sender(slot) else {
            return false;
        };
        slot.point.resolved_at = Some(Utc::now());
        info!(pause_point_id, reason, "pause point rejected");
        if tx.send(Decision::Rejected(reason.to_owned())).is_err() {
            warn!(pause_point_id, "intervention receiver already dropped");
        }
        true
    }

    /// Current record of a pause point.
    #[must_use]
    pub fn pause_point(&self, pause_point_id: &str) -> Option<PausePoint> {
        self.registry().get(pause_point_id).map(|slot| slot.point.clone())
    }

    /// Current lifecycle state of a pause point.
    #[must_use]
    pub fn state(&self, pause_point_id: &str) -> Option<PauseState> {
        self.registry().get(pause_point_id).map(|slot| slot.state)
    }

    /// Drop a pause point from the registry, returning its final record.
    pub fn remove(&self, pause_point_id: &str) -> Option<PausePoint> {
        self.registry().remove(pause_point_id).map(|slot| slot.point)
    }
}

fn take_open_sender(slot: &mut Slot) -> Option<oneshot::Sender<Decision>> {
    if slot.state != PauseState::Created {
        return None;
    }
    let tx = slot.tx.take()?;
    slot.state = PauseState::Resolved;
    Some(tx)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
