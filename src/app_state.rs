use std::sync::Arc;

use reqwest::Client;

use crate::config::{AppConfig, ConfigError};
use crate::services::{backend::BackendClient, push::PushSubscriber, upload::UploadSubmitter};

/// Backend collaborators shared by every view of a session.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<BackendClient>,
    pub uploads: Arc<UploadSubmitter>,
    pub push: Arc<PushSubscriber>,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        let endpoints = config.endpoints()?;
        let http = Client::new();

        Ok(Self {
            backend: Arc::new(BackendClient::new(http.clone(), endpoints.clone())),
            uploads: Arc::new(UploadSubmitter::new(http, endpoints.clone())),
            push: Arc::new(PushSubscriber::new(endpoints, config.reconnect_policy())),
        })
    }
}
