use deepdetect_client::{
    app_state::AppState,
    config::AppConfig,
    models::{events::StatusEvent, identity::Identity},
    views::history::HistoryView,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const MAX_FETCH_ATTEMPTS: u32 = 3;
const FETCH_RETRY_MS: u64 = 1000;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting job history watcher");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let state = AppState::new(&config).expect("Failed to initialize backend clients");

    let identity = config
        .deepdetect_user_id
        .clone()
        .and_then(Identity::from_user_id)
        .expect("DEEPDETECT_USER_ID must name the signed-in user");

    // Open the push channel first so no update is lost while the list loads
    let mut subscription = state.push.subscribe(&identity);
    let mut view = HistoryView::new();

    match view
        .refresh_with_retry(
            &state.backend,
            &identity,
            MAX_FETCH_ATTEMPTS,
            Duration::from_millis(FETCH_RETRY_MS),
        )
        .await
    {
        Ok(count) => tracing::info!(user_id = %identity, jobs = count, "Loaded job history"),
        Err(e) => {
            // Without a history every push event would be a no-op.
            tracing::error!(user_id = %identity, error = %e, "Giving up: job history unavailable");
            subscription.cancel();
            std::process::exit(1);
        }
    }

    tracing::info!("Watcher ready, waiting for status events");

    loop {
        tokio::select! {
            event = subscription.next() => match event {
                Some(event) => handle_event(&mut view, &event),
                None => {
                    tracing::warn!("Push channel ended");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down watcher");
                break;
            }
        }
    }

    subscription.cancel();
}

/// Apply one event and log the resulting job state.
fn handle_event(view: &mut HistoryView, event: &StatusEvent) {
    let Some(patch) = event.patch() else {
        return;
    };

    if !view.apply(event) {
        tracing::debug!(job_id = %patch.id, "Status event did not change any displayed job");
        return;
    }

    if let Some(job) = view.get(&patch.id) {
        tracing::info!(
            job_id = %job.id,
            file_name = %job.file_name,
            status = %job.status,
            prediction = ?job.prediction,
            confidence = ?job.confidence.as_ref().map(|c| c.as_str()),
            "Job updated"
        );
    }
}
