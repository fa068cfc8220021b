use chrono::Utc;
use log::{debug, error, info, warn};

use crate::classify::classify;
use crate::commands::{self, Command};
use crate::error::{AppError, AppResult};
use crate::models::Message;
use crate::presence::{Realtime, RoomEvent};
use crate::session::Session;
use crate::state::AppState;
use crate::{polls, rooms};

/// Per-connection state: who is talking and where.
#[derive(Debug, Default)]
pub struct Client {
    pub session: Option<Session>,
    pub room_id: Option<String>,
}

impl Client {
    fn session(&self) -> AppResult<&Session> {
        self.session.as_ref().ok_or(AppError::NotLoggedIn)
    }

    fn in_room(&self) -> AppResult<(&Session, &str)> {
        let session = self.session()?;
        let room_id = self.room_id.as_deref().ok_or(AppError::NotInRoom)?;
        Ok((session, room_id))
    }
}

/// What the connection loop must do besides writing the reply lines.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Entered(String),
    Left,
    Draft(String),
    Quit,
}

#[derive(Debug, Default)]
pub struct Outcome {
    pub lines: Vec<String>,
    pub action: Option<Action>,
}

impl Outcome {
    fn say(line: impl Into<String>) -> Self {
        Self { lines: vec![line.into()], action: None }
    }

    fn lines(lines: Vec<String>) -> Self {
        Self { lines, action: None }
    }

    fn with(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }
}

// Entry point for every line a client sends
pub async fn handle_line(state: &AppState, client: &mut Client, line: &str) -> Outcome {
    let result = match commands::parse(line) {
        None => send_chat(state, client, line).await,
        Some(Err(usage)) => Ok(Outcome::say(usage)),
        Some(Ok(command)) => handle_command(state, client, command, line).await,
    };

    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            match &e {
                AppError::Database(_) | AppError::Corrupt(_) | AppError::Tally(_) => {
                    error!("Handler error on {:?}: {}", line, e)
                }
                _ => debug!("Rejected {:?}: {}", line, e),
            }
            Outcome::say(format!("error: {e}"))
        }
    }
}

async fn send_chat(state: &AppState, client: &Client, line: &str) -> AppResult<Outcome> {
    let body = line.trim();
    if body.is_empty() {
        return Ok(Outcome::default());
    }
    let (session, room_id) = client.in_room()?;

    let message = Message::new(
        room_id.to_string(),
        session.user_id.clone(),
        session.display_name.clone(),
        body.to_string(),
        classify(body),
    );
    state.database.insert_message(&message).await?;
    state.hub.publish(room_id, RoomEvent::Chat(message)).await;

    // The sender sees their own line through the room subscription
    Ok(Outcome::default())
}

pub async fn handle_command(
    state: &AppState,
    client: &mut Client,
    command: Command,
    line: &str,
) -> AppResult<Outcome> {
    let database = &state.database;
    let hub = &state.hub;

    match command {
        Command::Login { name } => {
            if let Some(current) = &client.session {
                return Err(AppError::Validation(format!(
                    "already logged in as {}",
                    current.display_name
                )));
            }
            let session = Session::start(&name)?;
            info!("{} logged in as {}", session.display_name, session.user_id);
            let reply = Outcome::say(format!(
                "welcome {}, your user id is {}",
                session.display_name, session.user_id
            ));
            client.session = Some(session);
            Ok(reply)
        }
        Command::Rooms => {
            let listed = rooms::list_rooms(database).await?;
            if listed.is_empty() {
                return Ok(Outcome::say("no rooms yet, /create one"));
            }
            let lines = listed
                .iter()
                .map(|(room, members)| {
                    format!("{}  {}  [{}]  {} members", room.id, room.name, room.visibility.as_str(), members)
                })
                .collect();
            Ok(Outcome::lines(lines))
        }
        Command::Create { visibility, name, password } => {
            let session = client.session()?;
            let room = rooms::create_room(database, session, &name, visibility, password.as_deref()).await?;
            enter(state, client, room.id.clone(), format!("created {} ({})", room.name, room.id)).await
        }
        Command::Join { room_id, password } => {
            let session = client.session()?;
            let room = rooms::join_room(database, hub, session, &room_id, password.as_deref()).await?;
            enter(state, client, room.id.clone(), format!("joined {} ({})", room.name, room.id)).await
        }
        Command::Leave => {
            let (session, room_id) = client.in_room()?;
            rooms::leave_room(database, hub, session, room_id).await?;
            client.room_id = None;
            Ok(Outcome::say("you left the room").with(Action::Left))
        }
        Command::Invite { user_id } => {
            let (session, room_id) = client.in_room()?;
            rooms::invite(database, session, room_id, &user_id).await?;
            Ok(Outcome::say(format!("invited {user_id}")))
        }
        Command::Terminate => {
            let (session, room_id) = client.in_room()?;
            rooms::terminate_room(database, hub, session, room_id).await?;
            client.room_id = None;
            Ok(Outcome::say("room terminated").with(Action::Left))
        }
        Command::Who => {
            let (_, room_id) = client.in_room()?;
            let online = hub.online(room_id);
            Ok(Outcome::say(format!("online ({}): {}", online.len(), online.join(", "))))
        }
        Command::History { limit } => {
            let (_, room_id) = client.in_room()?;
            let messages = database.recent_messages(room_id, limit).await?;
            let lines = messages
                .iter()
                .map(|m| format!("{} [{}] <{}> {}", m.created_at.format("%H:%M"), m.kind.as_str(), m.author, m.body))
                .collect();
            Ok(Outcome::lines(lines))
        }
        Command::Poll(draft) => {
            let (session, room_id) = client.in_room()?;
            let poll = polls::open_poll(database, hub, session, room_id, draft).await?;

            // Keep the poll in the room's history too
            let body = line.trim().to_string();
            let message = Message::new(
                room_id.to_string(),
                session.user_id.clone(),
                session.display_name.clone(),
                body.clone(),
                classify(&body),
            );
            database.insert_message(&message).await?;

            Ok(Outcome::say(format!("poll {} is open", poll.id)))
        }
        Command::Polls => {
            let (session, room_id) = client.in_room()?;
            let open = polls::active_polls(database, session, room_id).await?;
            if open.is_empty() {
                return Ok(Outcome::say("no open polls"));
            }
            let lines = open
                .iter()
                .map(|p| match p.ends_at {
                    Some(ends) => format!("{}  {}  (ends {} UTC)", p.id, p.question, ends.format("%Y-%m-%d %H:%M")),
                    None => format!("{}  {}", p.id, p.question),
                })
                .collect();
            Ok(Outcome::lines(lines))
        }
        Command::Vote { poll_id, option_indices } => {
            let session = client.session()?;
            polls::cast_ballot(database, session, &poll_id, option_indices).await?;
            Ok(Outcome::say("vote recorded"))
        }
        Command::Results { poll_id } => {
            let session = client.session()?;
            let stats = polls::results(database, session, &poll_id).await?;
            let summary = stats.summary();
            Ok(Outcome::lines(summary.summary.lines().map(str::to_string).collect()))
        }
        Command::End { poll_id } => {
            let session = client.session()?;
            polls::end_poll(database, hub, session, &poll_id).await?;
            Ok(Outcome::say(format!("poll {poll_id} ended")))
        }
        Command::Draft { text } => Ok(Outcome::default().with(Action::Draft(text))),
        Command::Help => Ok(Outcome::lines(commands::help_text().lines().map(str::to_string).collect())),
        Command::Quit => Ok(Outcome::say("bye").with(Action::Quit)),
    }
}

// Moves the client into a room, leaving presence in the previous one
async fn enter(state: &AppState, client: &mut Client, room_id: String, reply: String) -> AppResult<Outcome> {
    let session = client.session()?.clone();
    if let Some(previous) = client.room_id.take() {
        if previous != room_id {
            state.hub.untrack(&previous, &session).await;
        }
    }
    state.hub.track(&room_id, &session).await;
    client.room_id = Some(room_id.clone());
    Ok(Outcome::say(reply).with(Action::Entered(room_id)))
}

/// Drops presence when a connection goes away; membership is kept.
pub async fn disconnect(state: &AppState, client: &Client) {
    if let (Some(session), Some(room_id)) = (&client.session, &client.room_id) {
        state.hub.untrack(room_id, session).await;
    }
    if let Some(session) = &client.session {
        let online_for = Utc::now() - session.started_at;
        info!("{} disconnected after {}s", session.display_name, online_for.num_seconds());
    } else {
        warn!("Anonymous client disconnected");
    }
}
