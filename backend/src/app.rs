//! Shared application state and route registration.

use crate::auth::{HeaderIdentity, IdentityProvider};
use crate::config::AppConfig;
use crate::job_controller::state::JobsState;
use crate::job_controller::worker::IngestWorkers;
use crate::persistence::PropertyStore;
use crate::services;
use actix_web::web;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub jobs: JobsState,
    pub workers: IngestWorkers,
    pub identity: Arc<dyn IdentityProvider>,
    pub max_file_bytes: usize,
}

impl AppState {
    pub fn new(config: &AppConfig, jobs: JobsState, store: Arc<dyn PropertyStore>) -> Self {
        Self {
            jobs,
            workers: IngestWorkers::new(&config.ingest, store),
            identity: Arc::new(HeaderIdentity::default()),
            max_file_bytes: config.ingest.max_file_bytes,
        }
    }
}

/// Registers every route of the service. Expects `web::Data<AppState>` in app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(services::uploads::configure_routes());
}
