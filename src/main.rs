mod classify;
mod commands;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod polls;
mod presence;
mod rooms;
mod server;
mod session;
mod state;
mod tasks;
mod voting;

use std::sync::Arc;

use config::Config;
use log::{error, info};
use state::AppState;

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();

    // Initialize database and realtime hub
    let state = match AppState::new(config).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };

    // Background task for ending polls
    let closer_state = Arc::clone(&state);
    tokio::spawn(async move {
        tasks::poll_closer::close_expired_polls_task(closer_state).await;
    });

    info!("Starting chat server on {}", state.config.bind_addr);
    if let Err(why) = server::run(state).await {
        error!("Server error: {:?}", why);
    }
}
