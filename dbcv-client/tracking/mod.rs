//! Generation-tracking session: REST snapshots plus an optional push feed.

pub mod backend;
pub mod types;

pub use backend::{RestTracking, TrackingBackend};
pub use types::{
    Progress, SessionStatus, SessionSummary, StartSession, TrackingEvent, TrackingFrame,
    TrackingSession, TrackingStep, TrackingStepStatus,
};

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::socket::{Connection, SocketEvent};

pub const MAX_EVENTS: usize = 200;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingState {
    pub current_session: Option<TrackingSession>,
    pub steps: Vec<TrackingStep>,
    pub events: VecDeque<TrackingEvent>,
    pub is_connected: bool,
    pub progress: Progress,
}

impl TrackingState {
    pub fn session_status(&self) -> SessionStatus {
        self.current_session
            .as_ref()
            .map(|s| s.status)
            .unwrap_or_default()
    }

    pub fn is_session_active(&self) -> bool {
        self.session_status() == SessionStatus::InProgress
    }

    fn steps_with(&self, status: TrackingStepStatus) -> Vec<&TrackingStep> {
        self.steps.iter().filter(|s| s.status == status).collect()
    }

    pub fn completed_steps(&self) -> Vec<&TrackingStep> {
        self.steps_with(TrackingStepStatus::Completed)
    }

    pub fn failed_steps(&self) -> Vec<&TrackingStep> {
        self.steps_with(TrackingStepStatus::Failed)
    }

    pub fn in_progress_steps(&self) -> Vec<&TrackingStep> {
        self.steps_with(TrackingStepStatus::InProgress)
    }

    pub fn update_progress(&mut self) {
        let total = self.steps.len();
        let completed = self.completed_steps().len();
        self.progress = Progress {
            total_steps: total,
            completed_steps: completed,
            percentage: if total > 0 {
                completed as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        };
    }

    /// Append unless an event with the same id is already logged; the log
    /// keeps the newest `MAX_EVENTS`.
    pub fn push_event(&mut self, event: TrackingEvent) {
        if self.events.iter().any(|e| e.id == event.id) {
            return;
        }
        self.events.push_back(event);
        while self.events.len() > MAX_EVENTS {
            self.events.pop_front();
        }
    }

    fn set_events(&mut self, events: Vec<TrackingEvent>) {
        let skip = events.len().saturating_sub(MAX_EVENTS);
        self.events = events.into_iter().skip(skip).collect();
    }

    pub fn apply(&mut self, frame: TrackingFrame) {
        match frame {
            TrackingFrame::SessionStarted { data } => {
                self.current_session = Some(data);
            }
            TrackingFrame::StepAdded { data } => {
                self.steps.push(data);
                self.update_progress();
            }
            TrackingFrame::StepStarted { step_id } => {
                self.set_step_status(&step_id, TrackingStepStatus::InProgress, None);
            }
            TrackingFrame::StepCompleted { step_id, data } => {
                self.set_step_status(&step_id, TrackingStepStatus::Completed, data.as_ref());
                self.update_progress();
            }
            TrackingFrame::SessionFinalized { data } => {
                if let Some(session) = self.current_session.as_mut() {
                    session.status = SessionStatus::Completed;
                    session.final_bot_id = data.final_bot_id;
                    session.total_duration = data.total_duration;
                }
            }
            TrackingFrame::TrackingEvent { event } => {
                if let Some(event) = event {
                    self.push_event(event);
                }
            }
            TrackingFrame::Unrecognized => {}
        }
    }

    fn set_step_status(
        &mut self,
        step_id: &str,
        status: TrackingStepStatus,
        data: Option<&serde_json::Map<String, Value>>,
    ) {
        let Some(step) = self.steps.iter_mut().find(|s| s.id == step_id) else {
            tracing::debug!(step_id, "status update for unknown tracking step");
            return;
        };
        step.status = status;
        if let Some(data) = data {
            if let Err(e) = step.merge(data) {
                tracing::warn!(step_id, error = %e, "could not merge step data");
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Shared tracking state with its REST backend.
pub struct TrackingStore {
    backend: Arc<dyn TrackingBackend>,
    state: RwLock<TrackingState>,
}

impl TrackingStore {
    pub fn new(backend: Arc<dyn TrackingBackend>) -> Self {
        Self {
            backend,
            state: RwLock::new(TrackingState::default()),
        }
    }

    pub async fn snapshot(&self) -> TrackingState {
        self.state.read().await.clone()
    }

    pub async fn start_session(&self, request: &StartSession) -> Option<TrackingSession> {
        let session = self.backend.start_session(request).await?;
        let mut state = self.state.write().await;
        state.current_session = Some(session.clone());
        state.steps.clear();
        state.events.clear();
        state.update_progress();
        tracing::info!(session_id = %session.id, "tracking session started");
        Some(session)
    }

    /// Adopt the server's session, steps and progress as-is.
    pub async fn load_session_summary(&self, session_id: &str) -> Option<SessionSummary> {
        let summary = self.backend.session_summary(session_id).await?;
        let mut state = self.state.write().await;
        state.current_session = Some(summary.session.clone());
        state.steps = summary.steps.clone();
        state.progress = summary.progress;
        Some(summary)
    }

    pub async fn load_session_events(&self, session_id: &str) -> Option<Vec<TrackingEvent>> {
        let events = self.backend.session_events(session_id).await?;
        self.state.write().await.set_events(events.clone());
        Some(events)
    }

    pub async fn update_session_status(&self, session_id: &str) -> Option<TrackingSession> {
        let session = self.backend.session_status(session_id).await?;
        self.state.write().await.current_session = Some(session.clone());
        Some(session)
    }

    pub async fn load_session_steps(&self, session_id: &str) -> Option<Vec<TrackingStep>> {
        let steps = self.backend.session_steps(session_id).await?;
        let mut state = self.state.write().await;
        state.steps = steps.clone();
        state.update_progress();
        Some(steps)
    }

    pub async fn apply_changes(&self, session_id: &str) -> Option<Value> {
        let response = self.backend.apply_changes(session_id).await?;
        if !response.is_null() {
            self.update_session_status(session_id).await;
        }
        Some(response)
    }

    pub async fn rollback_changes(&self, session_id: &str) -> Option<Value> {
        let response = self.backend.rollback_changes(session_id).await?;
        if !response.is_null() {
            self.update_session_status(session_id).await;
        }
        Some(response)
    }

    pub async fn handle_frame(&self, frame: TrackingFrame) {
        self.state.write().await.apply(frame);
    }

    pub async fn reset(&self) {
        self.state.write().await.reset();
    }

    /// Feed push frames from `conn` into the store until the socket closes.
    pub fn attach(self: &Arc<Self>, conn: Connection) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let Connection {
            outbound,
            mut inbound,
        } = conn;
        tokio::spawn(async move {
            // Held so the socket stays open while the feed runs.
            let _outbound = outbound;
            while let Some(event) = inbound.recv().await {
                match event {
                    SocketEvent::Opened => store.state.write().await.is_connected = true,
                    SocketEvent::Frame(text) => match serde_json::from_str::<TrackingFrame>(&text) {
                        Ok(frame) => store.handle_frame(frame).await,
                        Err(e) => tracing::warn!(error = %e, "failed to parse tracking frame"),
                    },
                    SocketEvent::Error(e) => tracing::error!(error = %e, "tracking socket error"),
                    SocketEvent::Closed => break,
                }
            }
            store.state.write().await.is_connected = false;
        })
    }
}
