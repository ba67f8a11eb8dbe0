// Refresh RPC against the Eigo API

use reqwest::Client;

use super::types::{ApiErrorBody, RefreshFailure, RefreshRequest, TokenGrant};

/// Exchange the refresh token for a new token grant.
/// Any non-success status or transport error is uniformly a refresh failure.
pub async fn refresh_access_token(
    client: &Client,
    refresh_url: &str,
    refresh_token: &str,
) -> Result<TokenGrant, RefreshFailure> {
    tracing::debug!("Refreshing access token...");

    let request = RefreshRequest {
        refresh_token: refresh_token.to_string(),
    };

    let response = client
        .post(refresh_url)
        .json(&request)
        .send()
        .await
        .map_err(|e| RefreshFailure::Transport(format!("Refresh request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(body);

        tracing::warn!("Refresh rejected: {} - {}", status, message);
        return Err(RefreshFailure::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    let grant: TokenGrant = response.json().await.map_err(|e| {
        RefreshFailure::Transport(format!("Failed to parse refresh response: {}", e))
    })?;

    if grant.access_token.is_empty() {
        return Err(RefreshFailure::Rejected {
            status: status.as_u16(),
            message: "Refresh response does not contain access_token".to_string(),
        });
    }

    tracing::info!("Access token refreshed, expires in {}s", grant.expires_in);
    Ok(grant)
}
