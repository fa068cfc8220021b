use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_POLL_OPTIONS: usize = 2;
pub const MAX_POLL_OPTIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomVisibility {
    Public,
    Private,
    Password,
}

impl RoomVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomVisibility::Public => "public",
            RoomVisibility::Private => "private",
            RoomVisibility::Password => "password",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "public" => Some(RoomVisibility::Public),
            "private" => Some(RoomVisibility::Private),
            "password" => Some(RoomVisibility::Password),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub visibility: RoomVisibility,
    /// Hex SHA-256 of `room_id:password`; only set for password rooms.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Code,
    Link,
    Poll,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Code => "code",
            MessageKind::Link => "link",
            MessageKind::Poll => "poll",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(MessageKind::Text),
            "code" => Some(MessageKind::Code),
            "link" => Some(MessageKind::Link),
            "poll" => Some(MessageKind::Poll),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub author: String,
    pub body: String,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(room_id: String, user_id: String, author: String, body: String, kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            room_id,
            user_id,
            author,
            body,
            kind,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub room_id: String,
    pub creator_id: String,
    pub question: String,
    pub options: Vec<String>,
    pub multi_select: bool,
    pub created_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Poll {
    pub fn new(
        room_id: String,
        creator_id: String,
        question: String,
        options: Vec<String>,
        multi_select: bool,
        duration_minutes: Option<i64>,
    ) -> Self {
        let now = Utc::now();
        let ends_at = duration_minutes.map(|mins| now + chrono::Duration::minutes(mins));

        Self {
            id: Uuid::new_v4().to_string(),
            room_id,
            creator_id,
            question,
            options,
            multi_select,
            created_at: now,
            ends_at,
            is_active: true,
        }
    }

    pub fn options_count(&self) -> i32 {
        self.options.len() as i32
    }
}

/// One user's recorded submission for a poll. Never updated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub poll_id: String,
    pub user_id: String,
    pub option_indices: Vec<i32>,
}

impl Ballot {
    pub fn new(poll_id: String, user_id: String, option_indices: Vec<i32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            poll_id,
            user_id,
            option_indices,
        }
    }
}

/// Derived per-option statistics; recomputed on demand and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallyResult {
    pub option_index: usize,
    pub votes: u32,
    pub percentage: f64,
    pub participation_rate: f64,
}
