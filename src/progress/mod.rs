//! Progress notifier: best-effort fan-out of job progress to session subscribers.
//!
//! Events are routed by session id. Delivery is at-most-once with no
//! buffering for absent subscribers and no replay for late ones.

pub mod ws;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use uuid::Uuid;

use crate::jobs::JobStatus;

/// Per-subscriber queue depth. A subscriber that falls this far behind misses events.
const SUBSCRIBER_CAPACITY: usize = 256;

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub session_id: String,
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A stream attached under one session.
pub struct Subscription {
    pub id: Uuid,
    pub session_id: String,
    rx: mpsc::Receiver<ProgressEvent>,
}

impl Subscription {
    /// Next event, or `None` once detached.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    /// Events as a `Stream`; ends once the subscriber is detached.
    pub fn into_stream(self) -> ReceiverStream<ProgressEvent> {
        ReceiverStream::new(self.rx)
    }
}

/// Session id → attached subscribers.
pub struct ProgressNotifier {
    sessions: RwLock<HashMap<String, HashMap<Uuid, mpsc::Sender<ProgressEvent>>>>,
}

impl ProgressNotifier {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a new subscriber under `session_id`.
    pub async fn subscribe(&self, session_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = Uuid::new_v4();
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .insert(id, tx);
        debug!(session = %session_id, subscriber = %id, "Progress subscriber attached");
        Subscription {
            id,
            session_id: session_id.to_string(),
            rx,
        }
    }

    /// Detach a subscriber. Safe to call repeatedly or for unknown ids.
    pub async fn unsubscribe(&self, session_id: &str, subscriber_id: Uuid) {
        let mut sessions = self.sessions.write().await;
        if let Some(subs) = sessions.get_mut(session_id) {
            if subs.remove(&subscriber_id).is_some() {
                debug!(session = %session_id, subscriber = %subscriber_id, "Progress subscriber detached");
            }
            if subs.is_empty() {
                sessions.remove(session_id);
            }
        }
    }

    /// Number of subscribers currently attached under a session.
    pub async fn subscriber_count(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Deliver an event to every subscriber attached under `session_id`.
    /// Returns how many subscribers accepted it; zero is not an error.
    pub async fn send_progress(
        &self,
        session_id: &str,
        job_id: Uuid,
        status: JobStatus,
        message: impl Into<String>,
    ) -> usize {
        let event = ProgressEvent {
            session_id: session_id.to_string(),
            job_id,
            status,
            message: message.into(),
            timestamp: Utc::now(),
        };

        let mut sessions = self.sessions.write().await;
        let Some(subs) = sessions.get_mut(session_id) else {
            return 0;
        };

        let mut delivered = 0;
        subs.retain(|sub_id, tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(subscriber = %sub_id, "Progress subscriber full, event dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if subs.is_empty() {
            sessions.remove(session_id);
        }

        delivered
    }
}

impl Default for ProgressNotifier {
    fn default() -> Self {
        Self::new()
    }
}
