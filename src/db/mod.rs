use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{migrate::MigrateDatabase, Row, Sqlite};

use crate::error::{AppError, AppResult};
use crate::models::{Ballot, Message, MessageKind, Poll, Room, RoomVisibility};

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> AppResult<Self> {
        let in_memory = db_url.contains(":memory:");

        // Create database if it doesn't exist
        if !in_memory && !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            Sqlite::create_database(db_url).await?;
        }

        let options = if in_memory {
            // Every connection to :memory: is a separate database, keep exactly one alive
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(db_url).await?;

        Self::init_schema(&pool).await?;
        info!("Database ready at {}", db_url);

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Self {
        Self::new("sqlite::memory:").await.expect("in-memory database")
    }

    async fn init_schema(pool: &SqlitePool) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rooms (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                visibility TEXT NOT NULL,
                password_hash TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS room_members (
                room_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                joined_at TEXT NOT NULL,
                PRIMARY KEY (room_id, user_id),
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS room_invites (
                room_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                PRIMARY KEY (room_id, user_id),
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                author TEXT NOT NULL,
                body TEXT NOT NULL,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                creator_id TEXT NOT NULL,
                question TEXT NOT NULL,
                options TEXT NOT NULL,
                multi_select BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TEXT NOT NULL,
                ends_at TEXT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        // One ballot per user and poll
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ballots (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                poll_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                option_indices TEXT NOT NULL,
                UNIQUE (poll_id, user_id),
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    // Rooms

    /// Inserts the room and makes its owner the first member.
    pub async fn create_room(&self, room: &Room, owner_name: &str) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO rooms (id, name, owner_id, visibility, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&room.id)
        .bind(&room.name)
        .bind(&room.owner_id)
        .bind(room.visibility.as_str())
        .bind(&room.password_hash)
        .bind(timestamp(&room.created_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO room_members (room_id, user_id, display_name, joined_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&room.id)
        .bind(&room.owner_id)
        .bind(owner_name)
        .bind(timestamp(&room.created_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_room(&self, room_id: &str) -> AppResult<Room> {
        let row = sqlx::query(
            r#"
            SELECT id, name, owner_id, visibility, password_hash, created_at
            FROM rooms
            WHERE id = ?
            "#,
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("room {room_id}")))?;

        room_from_row(&row)
    }

    /// Rooms anyone may discover, newest first, with their member counts.
    pub async fn list_discoverable_rooms(&self) -> AppResult<Vec<(Room, u32)>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.name, r.owner_id, r.visibility, r.password_hash, r.created_at,
                   (SELECT COUNT(*) FROM room_members m WHERE m.room_id = r.id) AS members
            FROM rooms r
            WHERE r.visibility != 'private'
            ORDER BY r.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> AppResult<(Room, u32)> {
                Ok((room_from_row(row)?, row.try_get::<i64, _>("members")? as u32))
            })
            .collect()
    }

    pub async fn delete_room(&self, room_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM rooms WHERE id = ?")
            .bind(room_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // Memberships and invites

    pub async fn add_member(&self, room_id: &str, user_id: &str, display_name: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO room_members (room_id, user_id, display_name, joined_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(room_id, user_id) DO UPDATE SET display_name = excluded.display_name
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(display_name)
        .bind(timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_member(&self, room_id: &str, user_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM room_members WHERE room_id = ? AND user_id = ?")
            .bind(room_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_member(&self, room_id: &str, user_id: &str) -> AppResult<bool> {
        let found = sqlx::query("SELECT 1 FROM room_members WHERE room_id = ? AND user_id = ?")
            .bind(room_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        Ok(found)
    }

    /// Number of members in the room, used as the participation denominator.
    pub async fn count_participants(&self, room_id: &str) -> AppResult<u32> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM room_members WHERE room_id = ?")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        Ok(count as u32)
    }

    pub async fn add_invite(&self, room_id: &str, user_id: &str) -> AppResult<()> {
        sqlx::query("INSERT OR IGNORE INTO room_invites (room_id, user_id) VALUES (?, ?)")
            .bind(room_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn is_invited(&self, room_id: &str, user_id: &str) -> AppResult<bool> {
        let found = sqlx::query("SELECT 1 FROM room_invites WHERE room_id = ? AND user_id = ?")
            .bind(room_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        Ok(found)
    }

    // Messages

    pub async fn insert_message(&self, message: &Message) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, room_id, user_id, author, body, kind, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.room_id)
        .bind(&message.user_id)
        .bind(&message.author)
        .bind(&message.body)
        .bind(message.kind.as_str())
        .bind(timestamp(&message.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The latest `limit` messages of a room, oldest first.
    pub async fn recent_messages(&self, room_id: &str, limit: u32) -> AppResult<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, room_id, user_id, author, body, kind, created_at
            FROM messages
            WHERE room_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(room_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows.iter().map(message_from_row).collect::<AppResult<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    // Polls

    pub async fn create_poll(&self, poll: &Poll) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO polls (id, room_id, creator_id, question, options, multi_select, created_at, ends_at, is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&poll.id)
        .bind(&poll.room_id)
        .bind(&poll.creator_id)
        .bind(&poll.question)
        .bind(serde_json::to_string(&poll.options)?)
        .bind(poll.multi_select)
        .bind(timestamp(&poll.created_at))
        .bind(poll.ends_at.as_ref().map(timestamp))
        .bind(poll.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_poll(&self, poll_id: &str) -> AppResult<Poll> {
        let row = sqlx::query(
            r#"
            SELECT id, room_id, creator_id, question, options, multi_select, created_at, ends_at, is_active
            FROM polls
            WHERE id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("poll {poll_id}")))?;

        poll_from_row(&row)
    }

    /// Returns false when the poll was already closed or does not exist.
    pub async fn end_poll(&self, poll_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE polls
            SET is_active = FALSE
            WHERE id = ? AND is_active = TRUE
            "#,
        )
        .bind(poll_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // Polls that have passed their end time and are still active
    pub async fn get_expired_polls(&self, now: DateTime<Utc>) -> AppResult<Vec<Poll>> {
        let rows = sqlx::query(
            r#"
            SELECT id, room_id, creator_id, question, options, multi_select, created_at, ends_at, is_active
            FROM polls
            WHERE ends_at IS NOT NULL AND ends_at < ? AND is_active = TRUE
            "#,
        )
        .bind(timestamp(&now))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(poll_from_row).collect()
    }

    pub async fn get_active_polls_by_room(&self, room_id: &str) -> AppResult<Vec<Poll>> {
        let rows = sqlx::query(
            r#"
            SELECT id, room_id, creator_id, question, options, multi_select, created_at, ends_at, is_active
            FROM polls
            WHERE room_id = ? AND is_active = TRUE
            ORDER BY created_at DESC
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(poll_from_row).collect()
    }

    // Ballots

    pub async fn get_poll_ballots(&self, poll_id: &str) -> AppResult<Vec<Ballot>> {
        let rows = sqlx::query(
            r#"
            SELECT id, created_at, poll_id, user_id, option_indices
            FROM ballots
            WHERE poll_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(ballot_from_row).collect()
    }

    /// Insert-only; a second ballot from the same user is rejected.
    pub async fn save_ballot(&self, ballot: &Ballot) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO ballots (id, created_at, poll_id, user_id, option_indices)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ballot.id)
        .bind(timestamp(&ballot.created_at))
        .bind(&ballot.poll_id)
        .bind(&ballot.user_id)
        .bind(serde_json::to_string(&ballot.option_indices)?)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::AlreadyVoted),
            Err(e) => Err(e.into()),
        }
    }
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    // Fixed width so text comparison in SQL orders correctly
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> AppResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn room_from_row(row: &SqliteRow) -> AppResult<Room> {
    let visibility_str: String = row.try_get("visibility")?;
    let visibility = RoomVisibility::parse(&visibility_str)
        .ok_or_else(|| AppError::Corrupt(format!("unknown room visibility: {visibility_str}")))?;

    Ok(Room {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        owner_id: row.try_get("owner_id")?,
        visibility,
        password_hash: row.try_get("password_hash")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn message_from_row(row: &SqliteRow) -> AppResult<Message> {
    let kind_str: String = row.try_get("kind")?;
    let kind = MessageKind::parse(&kind_str)
        .ok_or_else(|| AppError::Corrupt(format!("unknown message kind: {kind_str}")))?;

    Ok(Message {
        id: row.try_get("id")?,
        room_id: row.try_get("room_id")?,
        user_id: row.try_get("user_id")?,
        author: row.try_get("author")?,
        body: row.try_get("body")?,
        kind,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn poll_from_row(row: &SqliteRow) -> AppResult<Poll> {
    let ends_at = match row.try_get::<Option<String>, _>("ends_at")? {
        Some(raw) => Some(parse_timestamp(&raw)?),
        None => None,
    };

    Ok(Poll {
        id: row.try_get("id")?,
        room_id: row.try_get("room_id")?,
        creator_id: row.try_get("creator_id")?,
        question: row.try_get("question")?,
        options: serde_json::from_str(&row.try_get::<String, _>("options")?)?,
        multi_select: row.try_get("multi_select")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        ends_at,
        is_active: row.try_get("is_active")?,
    })
}

fn ballot_from_row(row: &SqliteRow) -> AppResult<Ballot> {
    Ok(Ballot {
        id: row.try_get("id")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        poll_id: row.try_get("poll_id")?,
        user_id: row.try_get("user_id")?,
        option_indices: serde_json::from_str(&row.try_get::<String, _>("option_indices")?)?,
    })
}
