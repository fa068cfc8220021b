use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use tokio::time::interval;

use crate::error::AppResult;
use crate::polls;
use crate::state::AppState;

pub async fn close_expired_polls_task(state: Arc<AppState>) {
    info!(
        "Starting background task to close expired polls every {:?}",
        state.config.poll_check_interval
    );
    let mut interval = interval(state.config.poll_check_interval);

    loop {
        interval.tick().await;
        if let Err(e) = sweep(&state, Utc::now()).await {
            error!("Failed to query for expired polls: {}", e);
        }
    }
}

/// Closes every active poll whose deadline is before `now`, one task per
/// poll. Returns how many polls this sweep actually closed.
pub async fn sweep(state: &Arc<AppState>, now: DateTime<Utc>) -> AppResult<usize> {
    let expired = state.database.get_expired_polls(now).await?;
    if expired.is_empty() {
        debug!("No expired polls at {}", now.to_rfc3339());
        return Ok(0);
    }
    info!("Found {} expired poll(s).", expired.len());

    let handles: Vec<_> = expired
        .into_iter()
        .map(|poll| {
            let state = Arc::clone(state);
            tokio::spawn(async move {
                let poll_id = poll.id.clone();
                match polls::close_poll(&state.database, &state.hub, poll).await {
                    Ok(Some(_)) => {
                        info!("Successfully closed expired poll {}", poll_id);
                        true
                    }
                    Ok(None) => false,
                    Err(e) => {
                        error!("Error closing expired poll {}: {}", poll_id, e);
                        false
                    }
                }
            })
        })
        .collect();

    let mut closed = 0;
    for handle in handles {
        match handle.await {
            Ok(true) => closed += 1,
            Ok(false) => {}
            Err(e) => error!("Poll closing task panicked: {}", e),
        }
    }
    Ok(closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::models::{Ballot, Poll, RoomVisibility};
    use crate::presence::{PresenceHub, Realtime, RoomEvent};
    use crate::rooms;
    use crate::session::Session;
    use std::time::Duration;

    #[tokio::test]
    async fn sweep_closes_only_due_polls() {
        let state = Arc::new(AppState {
            database: Database::in_memory().await,
            hub: PresenceHub::new(),
            config: Config {
                database_url: "sqlite::memory:".to_string(),
                bind_addr: "127.0.0.1:0".to_string(),
                poll_check_interval: Duration::from_secs(1),
                draft_debounce: Duration::from_millis(10),
            },
        });
        let owner = Session::start("owner").unwrap();
        let room = rooms::create_room(&state.database, &owner, "lobby", RoomVisibility::Public, None)
            .await
            .unwrap();

        let mut due = Poll::new(room.id.clone(), owner.user_id.clone(), "Due".into(), vec!["a".into(), "b".into()], false, None);
        due.ends_at = Some(Utc::now() - chrono::Duration::seconds(5));
        let later = Poll::new(room.id.clone(), owner.user_id.clone(), "Later".into(), vec!["a".into(), "b".into()], false, Some(60));
        let open_ended = Poll::new(room.id.clone(), owner.user_id.clone(), "Open".into(), vec!["a".into(), "b".into()], false, None);
        for poll in [&due, &later, &open_ended] {
            state.database.create_poll(poll).await.unwrap();
        }
        state
            .database
            .save_ballot(&Ballot::new(due.id.clone(), owner.user_id.clone(), vec![1]))
            .await
            .unwrap();

        let mut rx = state.hub.subscribe(&room.id);
        assert_eq!(sweep(&state, Utc::now()).await.unwrap(), 1);

        match rx.recv().await.unwrap() {
            RoomEvent::PollClosed { poll_id, summary } => {
                assert_eq!(poll_id, due.id);
                assert!(summary.contains("2. **b**: 1 votes"));
            }
            other => panic!("unexpected event {other:?}"),
        }

        assert!(!state.database.get_poll(&due.id).await.unwrap().is_active);
        assert!(state.database.get_poll(&later.id).await.unwrap().is_active);
        assert_eq!(sweep(&state, Utc::now()).await.unwrap(), 0);
    }
}
