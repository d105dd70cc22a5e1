//! Minimal host wiring: file-backed credentials, a live endpoint, and a
//! log-only event sink. Run with `RUST_LOG=debug` to watch the state
//! machine; with no server listening, the policy fetch falls back to the
//! configured one-minute timeout and the session expires on its own.

use std::io;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use sessionwatch_core::{
    ActivityKind, AuthClient, CredentialStore, Credentials, FileStore, Role, SessionConfig,
    SessionController, SessionEvents, SessionState,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

struct LogEvents;

impl SessionEvents for LogEvents {
    fn on_warning(&self) {
        info!("toast: your session is about to expire");
    }

    fn on_expired(&self) {
        info!("toast: session expired after inactivity");
    }

    fn on_logout(&self) {
        info!("navigate: back to the sign-in view");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = SessionConfig {
        endpoint: "http://localhost:4000/graphql".to_string(),
        default_timeout_minutes: 1,
        activity_throttle_ms: 1_000,
    };

    let store = CredentialStore::new(Arc::new(FileStore::open_default("sessionwatch-demo")?));
    if store.load().is_none() {
        // Seed a demo record so the state machine has something to drive.
        store.store(&Credentials {
            access_token: "demo-access".to_string(),
            refresh_token: "demo-refresh".to_string(),
            user_id: "demo-user".to_string(),
            role: Role::Member,
            display_name: "Demo User".to_string(),
            issued_at: Utc::now(),
        });
    }

    let api = Arc::new(AuthClient::new(config.endpoint.clone())?);
    let controller = SessionController::new(config, store, api, Arc::new(LogEvents));

    if !controller.start_session().await {
        anyhow::bail!("no credential record to monitor");
    }

    // One interaction, then hands off the keyboard.
    controller.activity_handle().report(ActivityKind::Click);

    let mut state = controller.state();
    while state.changed().await.is_ok() {
        let current = *state.borrow_and_update();
        info!(state = ?current, "session state changed");
        if current == SessionState::Anonymous {
            break;
        }
    }

    Ok(())
}
