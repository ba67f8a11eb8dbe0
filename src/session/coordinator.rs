// Refresh coordinator
//
// Guarantees at most one refresh RPC is in flight at a time. Concurrent
// callers attach to the shared in-flight attempt and all receive its
// outcome. The IDLE -> REFRESHING transition happens under a std mutex,
// never across an await point, so the single-flight invariant holds on a
// multi-threaded runtime as well.

use chrono::{Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use super::expiry;
use super::refresh;
use super::store::CredentialStore;
use super::types::{RefreshFailure, SessionEvent, StoredCredentials, TokenGrant, UserProfile};
use crate::error::SessionError;

/// One shared refresh attempt; every waiter clones the handle and awaits it
type SharedAttempt = Shared<BoxFuture<'static, Result<String, RefreshFailure>>>;

/// The in-flight slot: Some while REFRESHING, None while IDLE
type InFlightSlot = Arc<Mutex<Option<SharedAttempt>>>;

enum Entry {
    /// The store turned out to hold a fresh token; no attempt needed
    Fresh(String),
    /// Attach to this in-flight (or just-started) attempt
    Attempt(SharedAttempt),
}

pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,

    /// HTTP client for refresh requests
    client: Client,

    /// Absolute URL of the refresh RPC
    refresh_url: String,

    /// Proactive renewal window
    refresh_buffer: Duration,

    in_flight: InFlightSlot,

    /// Logout signal to the UI collaborator
    events: broadcast::Sender<SessionEvent>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        client: Client,
        refresh_url: String,
        refresh_buffer_secs: i64,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            store,
            client,
            refresh_url,
            refresh_buffer: Duration::seconds(refresh_buffer_secs),
            in_flight: Arc::new(Mutex::new(None)),
            events,
        }
    }

    /// Read the persisted credential record.
    /// All credential access goes through the coordinator.
    pub fn credentials(&self) -> StoredCredentials {
        self.store.read()
    }

    /// Read the persisted user profile, if any
    pub fn current_user(&self) -> Option<UserProfile> {
        self.store.current_user()
    }

    /// Return a currently valid access token, refreshing if necessary.
    /// Fails with `NoSession` when no refresh token exists.
    pub async fn ensure_fresh(&self) -> Result<String, SessionError> {
        self.acquire(false).await
    }

    /// Force a refresh even if the stored token looks fresh. Used after the
    /// backend has rejected a token the expiry data still considers valid.
    /// Still single-flight: joins any attempt already in progress.
    pub async fn refresh_now(&self) -> Result<String, SessionError> {
        self.acquire(true).await
    }

    /// Install a token grant from a successful login or refresh
    pub fn establish(&self, grant: &TokenGrant) {
        self.store.save_access(&grant.access_token, grant.expires_in);
        self.store.save_refresh(&grant.refresh_token);
        if let Some(ref user) = grant.user {
            self.store.save_user(user);
        }
    }

    /// Clear all credentials and signal logout
    pub fn invalidate(&self) {
        self.store.clear_all();
        let _ = self.events.send(SessionEvent::LoggedOut);
    }

    async fn acquire(&self, force: bool) -> Result<String, SessionError> {
        if !force {
            // Common cheap path: no slot contention at all
            if let Some(token) = self.current_fresh_token() {
                return Ok(token);
            }
        }

        let attempt = match self.join_or_start(force)? {
            Entry::Fresh(token) => return Ok(token),
            Entry::Attempt(attempt) => attempt,
        };

        attempt.await.map_err(SessionError::from)
    }

    fn current_fresh_token(&self) -> Option<String> {
        let creds = self.store.read();
        let token = creds.access_token?;
        if expiry::is_expiring_soon(creds.expires_at, Utc::now(), self.refresh_buffer) {
            None
        } else {
            Some(token)
        }
    }

    /// The IDLE -> REFRESHING transition; atomic and non-suspending.
    fn join_or_start(&self, force: bool) -> Result<Entry, SessionError> {
        let mut slot = self.in_flight.lock().unwrap();

        if let Some(attempt) = slot.as_ref() {
            return Ok(Entry::Attempt(attempt.clone()));
        }

        // Re-check under the lock: a refresh may have completed between the
        // caller's snapshot and now, and its result must not be discarded.
        if !force {
            if let Some(token) = self.current_fresh_token() {
                return Ok(Entry::Fresh(token));
            }
        }

        let creds = self.store.read();
        let refresh_token = creds.refresh_token.ok_or(SessionError::NoSession)?;

        // Spawn the attempt so it always runs to completion, even if every
        // waiter is dropped before it resolves.
        let task = tokio::spawn(run_refresh(
            Arc::clone(&self.store),
            self.client.clone(),
            self.refresh_url.clone(),
            self.events.clone(),
            Arc::clone(&self.in_flight),
            refresh_token,
        ));
        let attempt: SharedAttempt = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(RefreshFailure::Transport(format!(
                    "Refresh task failed: {}",
                    e
                ))),
            }
        }
        .boxed()
        .shared();

        *slot = Some(attempt.clone());
        Ok(Entry::Attempt(attempt))
    }
}

/// One refresh attempt. Persists the grant on success; clears the store and
/// signals logout exactly once on failure. The in-flight slot is emptied the
/// instant the attempt resolves.
async fn run_refresh(
    store: Arc<CredentialStore>,
    client: Client,
    refresh_url: String,
    events: broadcast::Sender<SessionEvent>,
    in_flight: InFlightSlot,
    refresh_token: String,
) -> Result<String, RefreshFailure> {
    let outcome = match refresh::refresh_access_token(&client, &refresh_url, &refresh_token).await {
        Ok(grant) => {
            store.save_access(&grant.access_token, grant.expires_in);
            store.save_refresh(&grant.refresh_token);
            if let Some(ref user) = grant.user {
                store.save_user(user);
            }
            Ok(grant.access_token)
        }
        Err(failure) => {
            tracing::error!("Token refresh failed: {:?}", failure);
            store.clear_all();
            let _ = events.send(SessionEvent::LoggedOut);
            Err(failure)
        }
    };

    *in_flight.lock().unwrap() = None;
    outcome
}
