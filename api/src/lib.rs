pub mod config;
pub mod domains;
pub mod error;
pub mod handler;
pub mod http;
pub mod repositories;
pub mod server;
pub mod statics;

use std::sync::Arc;

use repositories::{memory::MemoryPeopleRepository, sql::SqlPeopleRepository, PeopleRepository};
use statics::StaticFiles;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn PeopleRepository + Send + Sync>,
    pub static_files: Arc<StaticFiles>,
}

impl AppState {
    /// Connects to postgres when `database_url` is set and falls back to the
    /// in-memory store otherwise.
    pub async fn from_config(config: &crate::config::Config) -> Result<Self, error::StoreError> {
        let repository: Arc<dyn PeopleRepository + Send + Sync> = match &config.database_url {
            Some(url) => Arc::new(SqlPeopleRepository::connect(url).await?),
            None => {
                tracing::warn!("no database url configured, records are kept in memory");
                Arc::new(MemoryPeopleRepository::new())
            }
        };

        Ok(Self {
            repository,
            static_files: Arc::new(StaticFiles::new(&config.static_dir)),
        })
    }
}
