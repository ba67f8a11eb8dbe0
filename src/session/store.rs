// Durable credential storage backed by SQLite
//
// Holds the access token, its absolute expiry, the refresh token, and the
// user profile as independent rows with optional retention windows. Reads
// degrade to "absent" on storage errors; writes are best-effort and logged.

use chrono::{Duration, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::types::{StoredCredentials, UserProfile};
use crate::error::SessionError;

const KEY_ACCESS_TOKEN: &str = "access_token";
const KEY_ACCESS_EXPIRES_AT: &str = "access_token_expires_at";
const KEY_REFRESH_TOKEN: &str = "refresh_token";
const KEY_USER: &str = "user";

/// Retention window for the refresh token and user profile rows
pub const REFRESH_TOKEN_RETENTION_DAYS: i64 = 30;

/// Thread-safe persisted key-value store for session credentials
pub struct CredentialStore {
    conn: Mutex<Connection>,
}

impl CredentialStore {
    /// Open (or create) the store at the given path
    pub fn open(path: &Path) -> Result<Self, SessionError> {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(
                    "Could not create store directory {}: {}",
                    parent.display(),
                    e
                );
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            SessionError::StorageUnavailable(format!("{}: {}", path.display(), e))
        })?;
        Self::init(conn)
    }

    /// Open an ephemeral in-memory store; the session will not survive a restart
    pub fn open_in_memory() -> Result<Self, SessionError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SessionError::StorageUnavailable(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, SessionError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS session_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                retain_until INTEGER
            )",
            [],
        )
        .map_err(|e| SessionError::StorageUnavailable(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Persist the access token and its absolute expiry in one transaction.
    /// The expiry is serialized as an epoch-millisecond string.
    pub fn save_access(&self, token: &str, expires_in_secs: i64) {
        let expires_at = Utc::now() + Duration::seconds(expires_in_secs);
        let millis = expires_at.timestamp_millis();

        let mut conn = self.conn.lock().unwrap();
        let result = (|| -> rusqlite::Result<()> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO session_kv (key, value, retain_until) VALUES (?1, ?2, ?3)",
                params![KEY_ACCESS_TOKEN, token, millis],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO session_kv (key, value, retain_until) VALUES (?1, ?2, ?3)",
                params![KEY_ACCESS_EXPIRES_AT, millis.to_string(), millis],
            )?;
            tx.commit()
        })();

        if let Err(e) = result {
            tracing::warn!("Failed to persist access token: {}", e);
        }
    }

    /// Persist the refresh token with its fixed retention window
    pub fn save_refresh(&self, token: &str) {
        let retain_until =
            (Utc::now() + Duration::days(REFRESH_TOKEN_RETENTION_DAYS)).timestamp_millis();

        let conn = self.conn.lock().unwrap();
        if let Err(e) = conn.execute(
            "INSERT OR REPLACE INTO session_kv (key, value, retain_until) VALUES (?1, ?2, ?3)",
            params![KEY_REFRESH_TOKEN, token, retain_until],
        ) {
            tracing::warn!("Failed to persist refresh token: {}", e);
        }
    }

    /// Persist the authenticated user profile alongside the tokens
    pub fn save_user(&self, user: &UserProfile) {
        let json = match serde_json::to_string(user) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize user profile: {}", e);
                return;
            }
        };
        let retain_until =
            (Utc::now() + Duration::days(REFRESH_TOKEN_RETENTION_DAYS)).timestamp_millis();

        let conn = self.conn.lock().unwrap();
        if let Err(e) = conn.execute(
            "INSERT OR REPLACE INTO session_kv (key, value, retain_until) VALUES (?1, ?2, ?3)",
            params![KEY_USER, json, retain_until],
        ) {
            tracing::warn!("Failed to persist user profile: {}", e);
        }
    }

    /// Non-blocking read of the current credential record.
    /// An access token without an expiry (or vice versa) is surfaced as
    /// neither present, never as a torn record.
    pub fn read(&self) -> StoredCredentials {
        let conn = self.conn.lock().unwrap();
        let now_millis = Utc::now().timestamp_millis();

        let access_token = Self::get(&conn, KEY_ACCESS_TOKEN, now_millis);
        let expires_raw = Self::get(&conn, KEY_ACCESS_EXPIRES_AT, now_millis);
        let refresh_token = Self::get(&conn, KEY_REFRESH_TOKEN, now_millis);

        let expires_at = expires_raw
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        match (access_token, expires_at) {
            (Some(token), Some(expires_at)) => StoredCredentials {
                access_token: Some(token),
                expires_at: Some(expires_at),
                refresh_token,
            },
            _ => StoredCredentials {
                access_token: None,
                expires_at: None,
                refresh_token,
            },
        }
    }

    /// Read the persisted user profile, if any
    pub fn current_user(&self) -> Option<UserProfile> {
        let conn = self.conn.lock().unwrap();
        let now_millis = Utc::now().timestamp_millis();
        let json = Self::get(&conn, KEY_USER, now_millis)?;

        match serde_json::from_str(&json) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!("Failed to parse persisted user profile: {}", e);
                None
            }
        }
    }

    /// Remove every persisted field; idempotent
    pub fn clear_all(&self) {
        let conn = self.conn.lock().unwrap();
        if let Err(e) = conn.execute("DELETE FROM session_kv", []) {
            tracing::warn!("Failed to clear credential store: {}", e);
        }
    }

    fn get(conn: &Connection, key: &str, now_millis: i64) -> Option<String> {
        let row = conn
            .query_row(
                "SELECT value, retain_until FROM session_kv WHERE key = ?1",
                [key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<i64>>(1)?)),
            )
            .optional();

        match row {
            Ok(Some((value, retain_until))) => {
                // Rows past their retention window are treated as absent
                if retain_until.is_some_and(|r| now_millis >= r) {
                    None
                } else {
                    Some(value)
                }
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Credential store read failed for {}: {}", key, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_read_roundtrip() {
        let store = CredentialStore::open_in_memory().unwrap();
        store.save_access("A1", 3600);
        store.save_refresh("R1");

        let creds = store.read();
        assert_eq!(creds.access_token.as_deref(), Some("A1"));
        assert_eq!(creds.refresh_token.as_deref(), Some("R1"));

        let expires_at = creds.expires_at.unwrap();
        let delta = expires_at - (Utc::now() + Duration::seconds(3600));
        assert!(delta.num_seconds().abs() < 30);
    }

    #[test]
    fn test_clear_all_is_idempotent() {
        let store = CredentialStore::open_in_memory().unwrap();
        store.clear_all();
        store.clear_all();

        let creds = store.read();
        assert!(creds.access_token.is_none());
        assert!(creds.expires_at.is_none());
        assert!(creds.refresh_token.is_none());
    }

    #[test]
    fn test_clear_all_removes_everything() {
        let store = CredentialStore::open_in_memory().unwrap();
        store.save_access("A1", 3600);
        store.save_refresh("R1");
        store.save_user(&UserProfile {
            id: "u1".to_string(),
            email: "a@example.com".to_string(),
            name: "Aya".to_string(),
        });

        store.clear_all();

        let creds = store.read();
        assert!(creds.access_token.is_none());
        assert!(creds.expires_at.is_none());
        assert!(creds.refresh_token.is_none());
        assert!(store.current_user().is_none());
    }

    #[test]
    fn test_token_without_expiry_reads_as_absent() {
        let store = CredentialStore::open_in_memory().unwrap();
        store.save_access("A1", 3600);

        // Simulate a torn write by dropping the expiry row
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM session_kv WHERE key = ?1",
                [KEY_ACCESS_EXPIRES_AT],
            )
            .unwrap();

        let creds = store.read();
        assert!(creds.access_token.is_none());
        assert!(creds.expires_at.is_none());
    }

    #[test]
    fn test_lapsed_retention_reads_as_absent() {
        let store = CredentialStore::open_in_memory().unwrap();
        let past = (Utc::now() - Duration::days(1)).timestamp_millis();

        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT OR REPLACE INTO session_kv (key, value, retain_until) VALUES (?1, ?2, ?3)",
                params![KEY_REFRESH_TOKEN, "R-old", past],
            )
            .unwrap();

        assert!(store.read().refresh_token.is_none());
    }

    #[test]
    fn test_user_profile_roundtrip() {
        let store = CredentialStore::open_in_memory().unwrap();
        let user = UserProfile {
            id: "u1".to_string(),
            email: "a@example.com".to_string(),
            name: "Aya".to_string(),
        };

        store.save_user(&user);
        assert_eq!(store.current_user(), Some(user));
    }
}
