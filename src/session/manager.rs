// Session facade
//
// The surface the rest of the application consumes: session liveness,
// credential retrieval, forced logout, and the periodic liveness check.

use anyhow::Context;
use chrono::Utc;
use reqwest::Client;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::coordinator::RefreshCoordinator;
use super::expiry::{self, DEFAULT_REFRESH_BUFFER_SECS};
use super::store::CredentialStore;
use super::types::{SessionEvent, StoredCredentials, UserProfile};
use crate::config::Config;
use crate::error::SessionError;

/// Tunable session policy knobs
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Seconds before expiry at which a proactive refresh is triggered
    pub refresh_buffer_secs: i64,
    /// Interval of the periodic liveness check in seconds
    pub liveness_interval_secs: u64,
    /// HTTP timeout for the refresh RPC in seconds
    pub http_timeout_secs: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            refresh_buffer_secs: DEFAULT_REFRESH_BUFFER_SECS,
            liveness_interval_secs: 300,
            http_timeout_secs: 10,
        }
    }
}

pub struct SessionManager {
    coordinator: Arc<RefreshCoordinator>,
    events: broadcast::Sender<SessionEvent>,
    liveness_interval: Duration,
    liveness_stop: Mutex<Option<watch::Sender<bool>>>,
}

impl SessionManager {
    /// Create a manager over the durable store configured in `config`
    pub fn new(config: &Config) -> Result<Self, SessionError> {
        let store = Arc::new(CredentialStore::open(&config.store_path)?);
        Self::with_store(
            store,
            &config.api_base_url,
            SessionOptions {
                refresh_buffer_secs: config.refresh_buffer_secs,
                liveness_interval_secs: config.liveness_interval_secs,
                http_timeout_secs: config.http_timeout_secs,
            },
        )
    }

    /// Create a manager over an explicit store (ephemeral sessions, tests)
    pub fn with_store(
        store: Arc<CredentialStore>,
        api_base_url: &str,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.http_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let refresh_url = format!("{}/auth/refresh", api_base_url.trim_end_matches('/'));

        let (events, _) = broadcast::channel(16);
        let coordinator = Arc::new(RefreshCoordinator::new(
            store,
            client,
            refresh_url,
            options.refresh_buffer_secs,
            events.clone(),
        ));

        Ok(Self {
            coordinator,
            events,
            liveness_interval: Duration::from_secs(options.liveness_interval_secs.max(1)),
            liveness_stop: Mutex::new(None),
        })
    }

    pub(crate) fn coordinator(&self) -> Arc<RefreshCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// A session is alive when a refresh token exists and either an access
    /// token is present or the stored expiry has not unconditionally lapsed.
    pub fn is_active(&self) -> bool {
        session_active(&self.coordinator)
    }

    /// Return a currently valid access token, refreshing if necessary
    pub async fn get_access_token(&self) -> Result<String, SessionError> {
        self.coordinator.ensure_fresh().await
    }

    /// Snapshot of the persisted credential record
    pub fn credentials(&self) -> StoredCredentials {
        self.coordinator.credentials()
    }

    /// The persisted user profile, if any
    pub fn current_user(&self) -> Option<UserProfile> {
        self.coordinator.current_user()
    }

    /// Clear all credentials and broadcast the logout signal
    pub fn force_logout(&self) {
        tracing::info!("Forcing logout, clearing session credentials");
        self.coordinator.invalidate();
    }

    /// Subscribe to session lifecycle events (the UI collaborator uses the
    /// `LoggedOut` signal to navigate to its unauthenticated entry point)
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Start the periodic liveness check.
    ///
    /// While a session is active, proactively obtains a valid credential on
    /// a fixed interval; silent expiry or revocation surfaces as a forced
    /// logout even without user-triggered requests.
    pub fn start_liveness_check(&self) -> JoinHandle<()> {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        *self.liveness_stop.lock().unwrap() = Some(stop_tx);

        let coordinator = Arc::clone(&self.coordinator);
        let interval = self.liveness_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; consume it so the first probe
            // lands one full interval after start
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            tracing::debug!("Liveness check stopping");
                            break;
                        }
                        continue;
                    }
                }

                if !session_active(&coordinator) {
                    continue;
                }

                match coordinator.ensure_fresh().await {
                    Ok(_) => {}
                    Err(SessionError::RefreshFailed(e)) => {
                        // The coordinator has already cleared the credentials
                        // and signaled logout for this failed attempt
                        tracing::warn!("Periodic session check failed: {}", e);
                    }
                    Err(e) => {
                        tracing::warn!("Periodic session check failed: {}", e);
                        coordinator.invalidate();
                    }
                }
            }
        })
    }

    /// Stop the periodic liveness check; takes effect promptly
    pub fn stop_liveness_check(&self) {
        if let Some(stop) = self.liveness_stop.lock().unwrap().take() {
            let _ = stop.send(true);
        }
    }
}

fn session_active(coordinator: &RefreshCoordinator) -> bool {
    let creds = coordinator.credentials();
    let recoverable =
        creds.access_token.is_some() || !expiry::is_expired(creds.expires_at, Utc::now());
    creds.refresh_token.is_some() && recoverable
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_store(store: Arc<CredentialStore>) -> SessionManager {
        SessionManager::with_store(
            store,
            "http://localhost:8080/api/v1",
            SessionOptions::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_is_active_empty_store() {
        let store = Arc::new(CredentialStore::open_in_memory().unwrap());
        let manager = manager_with_store(store);
        assert!(!manager.is_active());
    }

    #[tokio::test]
    async fn test_is_active_with_full_session() {
        let store = Arc::new(CredentialStore::open_in_memory().unwrap());
        store.save_access("A1", 3600);
        store.save_refresh("R1");

        let manager = manager_with_store(store);
        assert!(manager.is_active());
    }

    #[tokio::test]
    async fn test_is_active_requires_refresh_token() {
        let store = Arc::new(CredentialStore::open_in_memory().unwrap());
        store.save_access("A1", 3600);

        let manager = manager_with_store(store);
        assert!(!manager.is_active());
    }

    #[tokio::test]
    async fn test_force_logout_clears_and_signals() {
        let store = Arc::new(CredentialStore::open_in_memory().unwrap());
        store.save_access("A1", 3600);
        store.save_refresh("R1");

        let manager = manager_with_store(store.clone());
        let mut events = manager.subscribe();

        manager.force_logout();

        assert!(!manager.is_active());
        assert!(store.read().refresh_token.is_none());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedOut);
    }

    #[tokio::test]
    async fn test_liveness_check_stops_promptly() {
        let store = Arc::new(CredentialStore::open_in_memory().unwrap());
        let manager = manager_with_store(store);

        // Long interval: only the stop signal can end the task quickly
        let handle = manager.start_liveness_check();
        manager.stop_liveness_check();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("liveness task did not stop")
            .unwrap();
    }
}
