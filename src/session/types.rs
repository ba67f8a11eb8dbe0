// Session types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Authenticated user profile returned by the login and refresh RPCs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Snapshot of the persisted credential record
#[derive(Debug, Clone, Default)]
pub struct StoredCredentials {
    pub access_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
}

/// Login request body
#[derive(Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Refresh request body
#[derive(Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Token grant returned by the login and refresh RPCs
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// Error body returned by the API on a rejected request
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub message: Option<String>,
}

/// Session lifecycle events broadcast to the UI collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Credentials were cleared; navigate to the unauthenticated entry point
    LoggedOut,
}

/// Failure of a single refresh attempt.
/// Clone so every waiter on the shared attempt receives the same outcome.
#[derive(Debug, Clone)]
pub enum RefreshFailure {
    /// The backend rejected the refresh token
    Rejected { status: u16, message: String },
    /// The refresh RPC never completed
    Transport(String),
}

impl From<RefreshFailure> for SessionError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::Rejected { status, message } => {
                SessionError::RefreshFailed(format!("{} - {}", status, message))
            }
            RefreshFailure::Transport(message) => SessionError::RefreshFailed(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_grant_deserialization() {
        let json = r#"{
            "access_token": "A1",
            "refresh_token": "R2",
            "expires_in": 3600,
            "token_type": "Bearer",
            "user": {"id": "u1", "email": "a@example.com", "name": "Aya"}
        }"#;

        let grant: TokenGrant = serde_json::from_str(json).unwrap();
        assert_eq!(grant.access_token, "A1");
        assert_eq!(grant.refresh_token, "R2");
        assert_eq!(grant.expires_in, 3600);
        assert_eq!(grant.user.unwrap().name, "Aya");
    }

    #[test]
    fn test_token_grant_without_user() {
        // token_type and user are optional in the wire format
        let json = r#"{"access_token": "A1", "refresh_token": "R2", "expires_in": 600}"#;
        let grant: TokenGrant = serde_json::from_str(json).unwrap();
        assert!(grant.token_type.is_none());
        assert!(grant.user.is_none());
    }

    #[test]
    fn test_refresh_failure_conversion() {
        let err: SessionError = RefreshFailure::Rejected {
            status: 401,
            message: "invalid refresh token".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Token refresh failed: 401 - invalid refresh token"
        );

        let err: SessionError = RefreshFailure::Transport("connection refused".to_string()).into();
        assert_eq!(err.to_string(), "Token refresh failed: connection refused");
    }
}
