use crate::config::Config;
use crate::db::Database;
use crate::presence::PresenceHub;

pub struct AppState {
    pub database: Database,
    pub hub: PresenceHub,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> crate::error::AppResult<Self> {
        let database = Database::new(&config.database_url).await?;
        Ok(Self {
            database,
            hub: PresenceHub::new(),
            config,
        })
    }
}
