//! Room lifecycle and the join/termination authorization rules.

use chrono::Utc;
use log::{info, warn};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{Room, RoomVisibility};
use crate::presence::{PresenceHub, Realtime, RoomEvent};
use crate::session::Session;

const MAX_ROOM_NAME: usize = 64;

pub fn password_digest(room_id: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(room_id.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Decides whether `session` may enter `room`.
///
/// Members and the owner always get back in. Otherwise public rooms are
/// open, password rooms need the matching password and private rooms an
/// invite.
pub fn authorize_join(
    room: &Room,
    session: &Session,
    password: Option<&str>,
    is_member: bool,
    is_invited: bool,
) -> AppResult<()> {
    if is_member || session.is(&room.owner_id) {
        return Ok(());
    }

    match room.visibility {
        RoomVisibility::Public => Ok(()),
        RoomVisibility::Private => {
            if is_invited {
                Ok(())
            } else {
                Err(AppError::Forbidden)
            }
        }
        RoomVisibility::Password => {
            let password = password.ok_or(AppError::PasswordRequired)?;
            let expected = room.password_hash.as_deref().ok_or(AppError::Forbidden)?;
            if password_digest(&room.id, password) == expected {
                Ok(())
            } else {
                Err(AppError::WrongPassword)
            }
        }
    }
}

/// Only the owner may terminate a room.
pub fn authorize_termination(room: &Room, session: &Session) -> AppResult<()> {
    if session.is(&room.owner_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub async fn create_room(
    database: &Database,
    session: &Session,
    name: &str,
    visibility: RoomVisibility,
    password: Option<&str>,
) -> AppResult<Room> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_ROOM_NAME {
        return Err(AppError::Validation(format!(
            "room name must be between 1 and {MAX_ROOM_NAME} characters"
        )));
    }

    let id = Uuid::new_v4().to_string();
    let password_hash = match (visibility, password) {
        (RoomVisibility::Password, Some(p)) if !p.is_empty() => Some(password_digest(&id, p)),
        (RoomVisibility::Password, _) => {
            return Err(AppError::Validation("password rooms need a password".to_string()));
        }
        (_, Some(_)) => {
            return Err(AppError::Validation(format!(
                "{} rooms do not take a password",
                visibility.as_str()
            )));
        }
        (_, None) => None,
    };

    let room = Room {
        id,
        name: name.to_string(),
        owner_id: session.user_id.clone(),
        visibility,
        password_hash,
        created_at: Utc::now(),
    };
    database.create_room(&room, &session.display_name).await?;
    info!("{} created {} room {} ({})", session.display_name, visibility.as_str(), room.name, room.id);

    Ok(room)
}

pub async fn list_rooms(database: &Database) -> AppResult<Vec<(Room, u32)>> {
    database.list_discoverable_rooms().await
}

pub async fn join_room(
    database: &Database,
    hub: &PresenceHub,
    session: &Session,
    room_id: &str,
    password: Option<&str>,
) -> AppResult<Room> {
    let room = database.get_room(room_id).await?;
    let (is_member, is_invited) = tokio::try_join!(
        database.is_member(room_id, &session.user_id),
        database.is_invited(room_id, &session.user_id),
    )?;

    if let Err(e) = authorize_join(&room, session, password, is_member, is_invited) {
        warn!("{} was refused entry to room {}: {}", session.display_name, room_id, e);
        return Err(e);
    }

    database.add_member(room_id, &session.user_id, &session.display_name).await?;
    hub.track(room_id, session).await;
    info!("{} joined room {}", session.display_name, room_id);

    Ok(room)
}

/// Gives up membership. The owner cannot leave; they terminate instead.
pub async fn leave_room(database: &Database, hub: &PresenceHub, session: &Session, room_id: &str) -> AppResult<()> {
    let room = database.get_room(room_id).await?;
    if session.is(&room.owner_id) {
        return Err(AppError::Validation(
            "owners cannot leave their room, use /terminate".to_string(),
        ));
    }

    if !database.remove_member(room_id, &session.user_id).await? {
        return Err(AppError::NotFound(format!("your membership in room {room_id}")));
    }
    hub.untrack(room_id, session).await;
    info!("{} left room {}", session.display_name, room_id);
    Ok(())
}

pub async fn invite(database: &Database, session: &Session, room_id: &str, user_id: &str) -> AppResult<()> {
    let room = database.get_room(room_id).await?;
    if !session.is(&room.owner_id) {
        return Err(AppError::Forbidden);
    }
    if Uuid::parse_str(user_id).is_err() {
        return Err(AppError::Validation(format!("{user_id} is not a user id")));
    }

    database.add_invite(room_id, user_id).await?;
    info!("{} invited {} to room {}", session.display_name, user_id, room_id);
    Ok(())
}

pub async fn terminate_room(database: &Database, hub: &PresenceHub, session: &Session, room_id: &str) -> AppResult<()> {
    let room = database.get_room(room_id).await?;
    if let Err(e) = authorize_termination(&room, session) {
        warn!("{} tried to terminate room {} they do not own", session.display_name, room_id);
        return Err(e);
    }

    database.delete_room(room_id).await?;
    hub.publish(room_id, RoomEvent::Terminated { room_id: room_id.to_string() }).await;
    hub.close_topic(room_id);
    info!("Room {} terminated by {}", room_id, session.display_name);
    Ok(())
}
