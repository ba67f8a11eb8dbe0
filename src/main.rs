use anyhow::Result;
use dialoguer::{Input, Password};
use std::sync::Arc;

use eigo_session::client::ApiClient;
use eigo_session::config::{Config, SessionCommand};
use eigo_session::session::{SessionEvent, SessionManager};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, command) = Config::load()?;
    config.validate()?;

    // Initialize logging with the configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let session = Arc::new(SessionManager::new(&config)?);
    let api = ApiClient::new(&session, &config.api_base_url, config.http_timeout_secs)?;

    match command {
        SessionCommand::Login { email } => {
            let email = match email {
                Some(email) => email,
                None => Input::new().with_prompt("Email").interact_text()?,
            };
            let password = Password::new().with_prompt("Password").interact()?;

            let grant = api.login(&email, &password).await?;
            match grant.user {
                Some(user) => println!("Logged in as {} <{}>", user.name, user.email),
                None => println!("Logged in"),
            }
        }

        SessionCommand::Status => {
            let creds = session.credentials();
            println!("Active:        {}", session.is_active());
            println!(
                "Access token:  {}",
                if creds.access_token.is_some() {
                    "present"
                } else {
                    "absent"
                }
            );
            if let Some(expires_at) = creds.expires_at {
                println!("Expires at:    {}", expires_at.to_rfc3339());
            }
            println!(
                "Refresh token: {}",
                if creds.refresh_token.is_some() {
                    "present"
                } else {
                    "absent"
                }
            );
            if let Some(user) = session.current_user() {
                println!("User:          {} <{}>", user.name, user.email);
            }
        }

        SessionCommand::Refresh => {
            let token = session.get_access_token().await?;
            let expires_at = session
                .credentials()
                .expires_at
                .map(|e| e.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "Access token valid (…{}), expires at {}",
                &token[token.len().saturating_sub(6)..],
                expires_at
            );
        }

        SessionCommand::Logout => {
            session.force_logout();
            println!("Session cleared");
        }

        SessionCommand::Watch => {
            let mut events = session.subscribe();
            let handle = session.start_liveness_check();
            println!(
                "Watching session (interval: {}s). Press Ctrl+C to stop.",
                config.liveness_interval_secs
            );

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    session.stop_liveness_check();
                }
                event = events.recv() => {
                    if matches!(event, Ok(SessionEvent::LoggedOut)) {
                        println!("Session ended; logged out");
                        session.stop_liveness_check();
                    }
                }
            }

            handle.await.ok();
        }
    }

    Ok(())
}
