//! Sessions and the authentication event stream.
//!
//! [`SessionHub`] fans out [`SessionEvent`]s to every live
//! [`SessionSubscription`]. A subscription is released when it is dropped;
//! there is no global listener registry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{Engine, ResultEngine};

const DEFAULT_HUB_CAPACITY: usize = 64;

/// Proof of authentication for one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user_id: String },
    SignedOut { user_id: String },
    TokenRefreshed { user_id: String },
    /// The subscriber fell behind and dropped this many events.
    Lagged(u64),
}

#[derive(Clone, Debug)]
pub struct SessionHub {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

impl SessionHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver `event` to current subscribers. Having none is not an error.
    pub fn publish(&self, event: SessionEvent) {
        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::trace!(delivered, "session event published");
    }

    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live registration on a [`SessionHub`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct SessionSubscription {
    receiver: broadcast::Receiver<SessionEvent>,
}

impl SessionSubscription {
    /// Wait for the next event. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "session subscriber lagged");
                Some(SessionEvent::Lagged(skipped))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

/// Where a gate reads the current session from.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn current_session(&self) -> ResultEngine<Option<Session>>;
}

/// The session behind a bearer token, looked up fresh on every call.
#[derive(Clone, Debug)]
pub struct TokenSession {
    engine: Arc<Engine>,
    token: Option<String>,
}

impl TokenSession {
    pub fn new(engine: Arc<Engine>, token: Option<String>) -> Self {
        Self { engine, token }
    }
}

#[async_trait]
impl SessionSource for TokenSession {
    async fn current_session(&self) -> ResultEngine<Option<Session>> {
        match self.token.as_deref() {
            Some(token) => self.engine.session(token, Utc::now()).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SessionSource for Option<Session> {
    async fn current_session(&self) -> ResultEngine<Option<Session>> {
        Ok(self.clone())
    }
}
