// Request authenticator for the Eigo API
//
// Attaches a valid credential to every outgoing request and performs the
// one-shot refresh-and-retry when the backend answers 401. Login and
// refresh endpoints authenticate themselves and are exempt.

use anyhow::Context;
use reqwest::{header, Client, Method, Request, RequestBuilder, Response};
use std::sync::Arc;
use std::time::Duration;

use crate::error::SessionError;
use crate::session::{ApiErrorBody, LoginRequest, RefreshCoordinator, SessionManager, TokenGrant};

/// Endpoints that must not trigger credential attachment or retry
const EXEMPT_PATHS: [&str; 2] = ["/auth/login", "/auth/refresh"];

pub struct ApiClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Base URL of the API, e.g. http://localhost:8080/api/v1
    base_url: String,

    coordinator: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn new(
        session: &SessionManager,
        base_url: &str,
        timeout_secs: u64,
    ) -> Result<Self, SessionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            coordinator: session.coordinator(),
        })
    }

    /// Build a request against the API base URL
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.client.request(method, url)
    }

    /// Execute a request with credential attachment and the one-shot retry.
    ///
    /// Non-exempt requests fail with `NoSession` before reaching the network
    /// when no credential can be obtained. A 401 response triggers exactly
    /// one coordinated refresh and at most one resend; a second 401 ends the
    /// session and surfaces `RequestRetryExhausted`.
    pub async fn execute(&self, builder: RequestBuilder) -> Result<Response, SessionError> {
        let mut request = builder.build().context("Failed to build request")?;
        let exempt = is_exempt(request.url().path());

        if !exempt {
            let token = self.coordinator.ensure_fresh().await?;
            set_bearer(&mut request, &token);
        }

        // Clone up front; the retry needs the original body
        let retry = request.try_clone();

        let response = self.send(request).await?;
        if response.status().as_u16() != 401 || exempt {
            return Ok(response);
        }

        let Some(mut retry) = retry else {
            // Streaming bodies cannot be replayed; surface the original failure
            return Ok(response);
        };

        tracing::warn!("Received 401, refreshing credentials and retrying once...");
        let token = self.coordinator.refresh_now().await?;
        set_bearer(&mut retry, &token);

        let response = self.send(retry).await?;
        if response.status().as_u16() == 401 {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            tracing::error!("Request still unauthorized after refresh, ending session");
            self.coordinator.invalidate();
            return Err(SessionError::RequestRetryExhausted { status, message });
        }

        Ok(response)
    }

    /// Login RPC; installs the granted tokens on success
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenGrant, SessionError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Internal(anyhow::anyhow!("Login request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or(body);
            return Err(SessionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let grant: TokenGrant = response
            .json()
            .await
            .context("Failed to parse login response")?;

        self.coordinator.establish(&grant);
        tracing::info!("Login successful, session established");
        Ok(grant)
    }

    async fn send(&self, request: Request) -> Result<Response, SessionError> {
        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        self.client
            .execute(request)
            .await
            .map_err(|e| SessionError::Internal(anyhow::anyhow!("HTTP request failed: {}", e)))
    }
}

fn is_exempt(path: &str) -> bool {
    EXEMPT_PATHS.iter().any(|p| path.contains(p))
}

fn set_bearer(request: &mut Request, token: &str) {
    if let Ok(value) = format!("Bearer {}", token).parse() {
        request.headers_mut().insert(header::AUTHORIZATION, value);
    }
}

/// Hostname-derived fingerprint for the User-Agent
fn user_agent() -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let mut hasher = DefaultHasher::new();
    host.hash(&mut hasher);
    format!(
        "eigo-session/{} ({:x})",
        env!("CARGO_PKG_VERSION"),
        hasher.finish()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exempt_paths() {
        assert!(is_exempt("/api/v1/auth/login"));
        assert!(is_exempt("/api/v1/auth/refresh"));
        assert!(!is_exempt("/api/v1/projects"));
        assert!(!is_exempt("/api/v1/results/42"));
    }

    #[test]
    fn test_user_agent_is_stable() {
        let a = user_agent();
        let b = user_agent();
        assert_eq!(a, b);
        assert!(a.starts_with("eigo-session/"));
    }
}
