use std::collections::HashSet;

use log::{info, warn};

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{Ballot, Poll, TallyResult, MAX_POLL_OPTIONS, MIN_POLL_OPTIONS};
use crate::presence::{PresenceHub, Realtime, RoomEvent};
use crate::session::Session;
use crate::voting::{compute_stats, summarize, PollSummary};

const MAX_POLL_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct PollDraft {
    pub question: String,
    pub options: Vec<String>,
    pub multi_select: bool,
    pub duration_minutes: Option<i64>,
}

pub struct PollStats {
    pub poll: Poll,
    pub results: Vec<TallyResult>,
    pub total_ballots: usize,
    pub total_participants: u32,
}

impl PollStats {
    pub fn summary(&self) -> PollSummary {
        summarize(&self.poll, &self.results, self.total_ballots, self.total_participants)
    }
}

fn validate_draft(draft: &PollDraft) -> AppResult<()> {
    if draft.question.trim().is_empty() {
        return Err(AppError::Validation("poll question cannot be empty".to_string()));
    }
    let count = draft.options.len();
    if !(MIN_POLL_OPTIONS..=MAX_POLL_OPTIONS).contains(&count) {
        return Err(AppError::Validation(format!(
            "poll must have between {MIN_POLL_OPTIONS} and {MAX_POLL_OPTIONS} options, got {count}"
        )));
    }
    if draft.options.iter().any(|o| o.trim().is_empty()) {
        return Err(AppError::Validation("poll options cannot be empty".to_string()));
    }
    let distinct: HashSet<String> = draft.options.iter().map(|o| o.trim().to_lowercase()).collect();
    if distinct.len() != count {
        return Err(AppError::Validation("poll options must be distinct".to_string()));
    }
    if let Some(minutes) = draft.duration_minutes {
        if !(1..=MAX_POLL_MINUTES).contains(&minutes) {
            return Err(AppError::Validation(format!(
                "poll duration must be between 1 and {MAX_POLL_MINUTES} minutes"
            )));
        }
    }
    Ok(())
}

/// Checks a selection against the poll before it becomes a ballot.
pub fn validate_selection(poll: &Poll, option_indices: &[i32]) -> AppResult<()> {
    if option_indices.is_empty() {
        return Err(AppError::Validation("select at least one option".to_string()));
    }
    if !poll.multi_select && option_indices.len() > 1 {
        return Err(AppError::Validation("this poll allows only one choice".to_string()));
    }

    let mut seen = HashSet::new();
    for &index in option_indices {
        if index < 0 || index >= poll.options_count() {
            return Err(AppError::Validation(format!(
                "option {} does not exist, pick 1 to {}",
                index + 1,
                poll.options_count()
            )));
        }
        if !seen.insert(index) {
            return Err(AppError::Validation(format!("option {} selected twice", index + 1)));
        }
    }
    Ok(())
}

async fn require_member(database: &Database, session: &Session, room_id: &str) -> AppResult<()> {
    if database.is_member(room_id, &session.user_id).await? {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub async fn open_poll(
    database: &Database,
    hub: &PresenceHub,
    session: &Session,
    room_id: &str,
    draft: PollDraft,
) -> AppResult<Poll> {
    require_member(database, session, room_id).await?;
    validate_draft(&draft)?;

    let options = draft.options.iter().map(|o| o.trim().to_string()).collect();
    let poll = Poll::new(
        room_id.to_string(),
        session.user_id.clone(),
        draft.question.trim().to_string(),
        options,
        draft.multi_select,
        draft.duration_minutes,
    );
    database.create_poll(&poll).await?;
    info!("{} opened poll {} in room {}", session.display_name, poll.id, room_id);

    hub.publish(
        room_id,
        RoomEvent::PollOpened {
            poll_id: poll.id.clone(),
            question: poll.question.clone(),
            options: poll.options.clone(),
            multi_select: poll.multi_select,
        },
    )
    .await;

    Ok(poll)
}

/// Loads ballots and membership size side by side, then tallies.
/// The two reads are independent snapshots.
pub async fn poll_stats(database: &Database, poll: Poll) -> AppResult<PollStats> {
    let (ballots, total_participants) = tokio::try_join!(
        database.get_poll_ballots(&poll.id),
        database.count_participants(&poll.room_id),
    )?;

    let results = compute_stats(&ballots, total_participants, poll.options_count())?;

    Ok(PollStats {
        poll,
        results,
        total_ballots: ballots.len(),
        total_participants,
    })
}

pub async fn results(database: &Database, session: &Session, poll_id: &str) -> AppResult<PollStats> {
    let poll = database.get_poll(poll_id).await?;
    require_member(database, session, &poll.room_id).await?;
    poll_stats(database, poll).await
}

pub async fn cast_ballot(
    database: &Database,
    session: &Session,
    poll_id: &str,
    option_indices: Vec<i32>,
) -> AppResult<Ballot> {
    let poll = database.get_poll(poll_id).await?;
    if !poll.is_active {
        return Err(AppError::PollClosed);
    }
    require_member(database, session, &poll.room_id).await?;
    validate_selection(&poll, &option_indices)?;

    let ballot = Ballot::new(poll.id.clone(), session.user_id.clone(), option_indices);
    if let Err(e) = database.save_ballot(&ballot).await {
        warn!("Ballot from {} on poll {} rejected: {}", session.display_name, poll_id, e);
        return Err(e);
    }
    info!("{} voted in poll {}", session.display_name, poll_id);

    Ok(ballot)
}

pub async fn active_polls(database: &Database, session: &Session, room_id: &str) -> AppResult<Vec<Poll>> {
    require_member(database, session, room_id).await?;
    database.get_active_polls_by_room(room_id).await
}

/// Closes a poll and announces the final tally to its room.
/// Returns `None` if someone else closed it first.
pub async fn close_poll(database: &Database, hub: &PresenceHub, poll: Poll) -> AppResult<Option<PollSummary>> {
    if !database.end_poll(&poll.id).await? {
        return Ok(None);
    }

    let room_id = poll.room_id.clone();
    let poll_id = poll.id.clone();
    let stats = poll_stats(database, poll).await?;
    let summary = stats.summary();

    hub.publish(
        &room_id,
        RoomEvent::PollClosed {
            poll_id: poll_id.clone(),
            summary: summary.summary.clone(),
        },
    )
    .await;
    info!("Poll {} closed, leader: {}", poll_id, summary.leader);

    Ok(Some(summary))
}

/// Ends a poll on request of its creator or the room owner.
pub async fn end_poll(database: &Database, hub: &PresenceHub, session: &Session, poll_id: &str) -> AppResult<PollSummary> {
    let poll = database.get_poll(poll_id).await?;
    let room = database.get_room(&poll.room_id).await?;
    if !session.is(&poll.creator_id) && !session.is(&room.owner_id) {
        return Err(AppError::Forbidden);
    }
    if !poll.is_active {
        return Err(AppError::PollClosed);
    }

    close_poll(database, hub, poll).await?.ok_or(AppError::PollClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoomVisibility;
    use crate::rooms;

    fn draft(options: &[&str], multi: bool) -> PollDraft {
        PollDraft {
            question: "Lunch?".to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            multi_select: multi,
            duration_minutes: None,
        }
    }

    struct Fixture {
        db: Database,
        hub: PresenceHub,
        owner: Session,
        guest: Session,
        room_id: String,
    }

    async fn fixture() -> Fixture {
        let db = Database::in_memory().await;
        let hub = PresenceHub::new();
        let owner = Session::start("owner").unwrap();
        let guest = Session::start("guest").unwrap();
        let room = rooms::create_room(&db, &owner, "lobby", RoomVisibility::Public, None).await.unwrap();
        rooms::join_room(&db, &hub, &guest, &room.id, None).await.unwrap();
        Fixture { db, hub, owner, guest, room_id: room.id }
    }

    #[test]
    fn draft_rules() {
        assert!(validate_draft(&draft(&["a", "b"], false)).is_ok());
        assert!(validate_draft(&draft(&["a"], false)).is_err());
        assert!(validate_draft(&draft(&["a", "A "], false)).is_err());
        assert!(validate_draft(&draft(&["a", " "], false)).is_err());
        let eleven: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        let refs: Vec<&str> = eleven.iter().map(String::as_str).collect();
        assert!(validate_draft(&draft(&refs, false)).is_err());

        let mut timed = draft(&["a", "b"], false);
        timed.duration_minutes = Some(0);
        assert!(validate_draft(&timed).is_err());
        timed.duration_minutes = Some(15);
        assert!(validate_draft(&timed).is_ok());
    }

    #[test]
    fn selection_rules() {
        let single = Poll::new("r".into(), "c".into(), "Q".into(), vec!["a".into(), "b".into(), "c".into()], false, None);
        let multi = Poll { multi_select: true, ..single.clone() };

        assert!(validate_selection(&single, &[1]).is_ok());
        assert!(validate_selection(&single, &[]).is_err());
        assert!(validate_selection(&single, &[0, 1]).is_err());
        assert!(validate_selection(&single, &[3]).is_err());
        assert!(validate_selection(&single, &[-1]).is_err());
        assert!(validate_selection(&multi, &[0, 2]).is_ok());
        assert!(validate_selection(&multi, &[2, 2]).is_err());
    }

    #[tokio::test]
    async fn vote_and_tally() {
        let f = fixture().await;
        let mut rx = f.hub.subscribe(&f.room_id);
        let poll = open_poll(&f.db, &f.hub, &f.owner, &f.room_id, draft(&["Pizza", "Sushi", "Tacos"], true))
            .await
            .unwrap();
        assert!(matches!(rx.recv().await.unwrap(), RoomEvent::PollOpened { .. }));

        cast_ballot(&f.db, &f.owner, &poll.id, vec![0]).await.unwrap();
        cast_ballot(&f.db, &f.guest, &poll.id, vec![0, 1]).await.unwrap();
        assert!(matches!(
            cast_ballot(&f.db, &f.guest, &poll.id, vec![2]).await,
            Err(AppError::AlreadyVoted)
        ));

        let stats = results(&f.db, &f.guest, &poll.id).await.unwrap();
        assert_eq!(stats.total_ballots, 2);
        assert_eq!(stats.total_participants, 2);
        let votes: Vec<u32> = stats.results.iter().map(|r| r.votes).collect();
        assert_eq!(votes, vec![2, 1, 0]);
        assert_eq!(stats.results[0].percentage, 100.0);
        assert_eq!(stats.results[1].participation_rate, 50.0);
        assert_eq!(stats.summary().leader, "Pizza");
    }

    #[tokio::test]
    async fn outsiders_cannot_vote_or_peek() {
        let f = fixture().await;
        let outsider = Session::start("outsider").unwrap();
        let poll = open_poll(&f.db, &f.hub, &f.owner, &f.room_id, draft(&["a", "b"], false)).await.unwrap();

        assert!(matches!(cast_ballot(&f.db, &outsider, &poll.id, vec![0]).await, Err(AppError::Forbidden)));
        assert!(matches!(results(&f.db, &outsider, &poll.id).await, Err(AppError::Forbidden)));
        assert!(matches!(
            open_poll(&f.db, &f.hub, &outsider, &f.room_id, draft(&["a", "b"], false)).await,
            Err(AppError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn ending_a_poll() {
        let f = fixture().await;
        let poll = open_poll(&f.db, &f.hub, &f.guest, &f.room_id, draft(&["a", "b"], false)).await.unwrap();
        cast_ballot(&f.db, &f.guest, &poll.id, vec![1]).await.unwrap();

        let stranger = Session::start("stranger").unwrap();
        assert!(matches!(end_poll(&f.db, &f.hub, &stranger, &poll.id).await, Err(AppError::Forbidden)));

        let mut rx = f.hub.subscribe(&f.room_id);
        // Room owner may end a poll someone else opened
        let summary = end_poll(&f.db, &f.hub, &f.owner, &poll.id).await.unwrap();
        assert_eq!(summary.leader, "b");
        assert!(matches!(rx.recv().await.unwrap(), RoomEvent::PollClosed { .. }));

        assert!(matches!(end_poll(&f.db, &f.hub, &f.owner, &poll.id).await, Err(AppError::PollClosed)));
        assert!(matches!(cast_ballot(&f.db, &f.owner, &poll.id, vec![0]).await, Err(AppError::PollClosed)));
        assert!(active_polls(&f.db, &f.owner, &f.room_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_track_membership_changes() {
        let f = fixture().await;
        let poll = open_poll(&f.db, &f.hub, &f.owner, &f.room_id, draft(&["a", "b"], false)).await.unwrap();
        cast_ballot(&f.db, &f.guest, &poll.id, vec![0]).await.unwrap();
        rooms::leave_room(&f.db, &f.hub, &f.guest, &f.room_id).await.unwrap();

        // The ballot stays, the denominator shrinks
        let stats = poll_stats(&f.db, f.db.get_poll(&poll.id).await.unwrap()).await.unwrap();
        assert_eq!(stats.total_participants, 1);
        assert_eq!(stats.results[0].participation_rate, 100.0);
    }
}
