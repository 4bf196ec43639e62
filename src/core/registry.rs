//! Session registry and dispatcher.
//!
//! Consumes the transport's stream of new calls, spawns one [`Session`] per
//! call and keeps a handle to each live session until it ends.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::core::session::{Session, SessionDeps, SessionError, SessionHandle};
use crate::core::transport::{CallConnection, ConnectionStream};

/// Error types for session dispatch
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Call capacity reached ({0} active calls)")]
    AtCapacity(usize),
    #[error("Call {0} already has a session")]
    DuplicateCall(String),
    #[error("Registry is shutting down")]
    ShuttingDown,
    #[error("Failed to create session: {0}")]
    Session(#[from] SessionError),
}

/// Live sessions keyed by call id
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
    deps: SessionDeps,
    max_concurrent_calls: Option<usize>,
    scope: CancellationToken,
    tracker: TaskTracker,
}

impl SessionRegistry {
    /// `shutdown` is the process-wide token; sessions run under a child of it
    pub fn new(
        deps: SessionDeps,
        max_concurrent_calls: Option<usize>,
        shutdown: &CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            deps,
            max_concurrent_calls,
            scope: shutdown.child_token(),
            tracker: TaskTracker::new(),
        })
    }

    /// Accept calls from `connections` until it ends or `shutdown` fires
    pub async fn serve(self: Arc<Self>, mut connections: ConnectionStream, shutdown: CancellationToken) {
        info!("Session dispatcher started");
        loop {
            let connection = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                connection = connections.recv() => connection,
            };
            let Some(connection) = connection else {
                debug!("Connection stream closed");
                break;
            };
            if let Err(e) = self.dispatch(connection) {
                warn!(error = %e, "Rejected call");
            }
        }
        info!("Session dispatcher stopped");
    }

    /// Start a session for `connection`. On any rejection the connection is
    /// closed before returning.
    pub fn dispatch(self: &Arc<Self>, connection: CallConnection) -> Result<SessionHandle, RegistryError> {
        if self.scope.is_cancelled() {
            connection.close();
            return Err(RegistryError::ShuttingDown);
        }
        if let Some(max) = self.max_concurrent_calls
            && self.sessions.len() >= max
        {
            warn!(call_id = %connection.id(), max_calls = max, "At call capacity, closing connection");
            connection.close();
            return Err(RegistryError::AtCapacity(max));
        }

        let call_id = connection.id().to_string();
        let entry = match self.sessions.entry(call_id.clone()) {
            Entry::Occupied(_) => {
                connection.close();
                return Err(RegistryError::DuplicateCall(call_id));
            }
            Entry::Vacant(entry) => entry,
        };

        let (session, handle) = match Session::new(connection, &self.deps, &self.scope) {
            Ok(pair) => pair,
            Err(e) => {
                error!(call_id = %call_id, error = %e, "Failed to create session");
                return Err(e.into());
            }
        };
        entry.insert(handle.clone());

        let registry = Arc::clone(self);
        self.tracker.spawn(async move {
            match session.run().await {
                Ok(reason) => info!(call_id = %call_id, reason = ?reason, "Session ended"),
                Err(e) => warn!(call_id = %call_id, error = %e, "Session ended with error"),
            }
            registry.sessions.remove(&call_id);
            debug!(active_calls = registry.sessions.len(), "Session removed");
        });

        info!(call_id = %handle.id(), active_calls = self.sessions.len(), "Session dispatched");
        Ok(handle)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn get(&self, call_id: &str) -> Option<SessionHandle> {
        self.sessions.get(call_id).map(|h| h.value().clone())
    }

    pub fn max_concurrent_calls(&self) -> Option<usize> {
        self.max_concurrent_calls
    }

    pub fn is_at_capacity(&self) -> bool {
        self.max_concurrent_calls
            .is_some_and(|max| self.sessions.len() >= max)
    }

    /// Ask one session to close. Returns `false` for unknown ids.
    pub fn close_session(&self, call_id: &str) -> bool {
        match self.sessions.get(call_id) {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    /// Cancel every session and wait up to `grace` for them to finish.
    /// Returns whether all sessions closed in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let active = self.sessions.len();
        info!(active_calls = active, grace_secs = grace.as_secs_f32(), "Shutting down sessions");
        self.scope.cancel();
        self.tracker.close();

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                info!("All sessions closed");
                true
            }
            Err(_) => {
                warn!(remaining = self.sessions.len(), "Sessions still running after grace period");
                false
            }
        }
    }
}
