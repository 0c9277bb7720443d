use actix_web::{web, App, HttpServer};
use backend::app::{self, AppState};
use backend::config;
use backend::job_controller::reaper::{start_job_reaper, ReaperConfig};
use backend::job_controller::state::{start_job_updater, JobsState};
use backend::persistence::SqlitePropertyStore;
use env_logger::Env;
use log::info;
use std::io;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = config::load().map_err(io::Error::other)?;
    let store = SqlitePropertyStore::open(&config.storage.database_path).map_err(io::Error::other)?;
    info!("property store at {}", config.storage.database_path.display());

    // Initialize job controller state
    let (jobs_state, rx) = JobsState::new(config.ingest.update_channel_capacity);

    // Single writer for job state; workers only send updates.
    tokio::spawn(start_job_updater(jobs_state.clone(), rx));
    tokio::spawn(start_job_reaper(jobs_state.clone(), ReaperConfig::from(&config.jobs)));

    let state = AppState::new(&config, jobs_state, Arc::new(store));
    let (host, port) = (config.server.host.clone(), config.server.port);
    info!(
        "Server running at http://{}:{} ({} ingestion workers, {} rows max per file)",
        host, port, config.ingest.max_concurrent_jobs, config.ingest.max_rows
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(app::configure)
    })
    .bind((host, port))?
    .run()
    .await
}
