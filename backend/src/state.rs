use crate::{config::Config, services::IngestService};

#[derive(Clone)]
pub struct AppState {
    pub ingest: IngestService,
    pub config: Config,
}

impl AppState {
    pub fn new(ingest: IngestService, config: Config) -> Self {
        Self { ingest, config }
    }
}
