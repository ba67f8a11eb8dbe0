// Session lifecycle module
// Credential storage, expiry policy, coordinated refresh, and the facade

mod coordinator;
mod expiry;
mod manager;
mod refresh;
mod store;
mod types;

pub use coordinator::RefreshCoordinator;
pub use expiry::{is_expired, is_expiring_soon, DEFAULT_REFRESH_BUFFER_SECS};
pub use manager::{SessionManager, SessionOptions};
pub use store::{CredentialStore, REFRESH_TOKEN_RETENTION_DAYS};
pub use types::{
    ApiErrorBody, LoginRequest, RefreshFailure, SessionEvent, StoredCredentials, TokenGrant,
    UserProfile,
};
