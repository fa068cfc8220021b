use thiserror::Error;

use crate::voting::TallyError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("could not compute poll results: {0}")]
    Tally(#[from] TallyError),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("you are not allowed to do that")]
    Forbidden,

    #[error("this room requires a password")]
    PasswordRequired,

    #[error("wrong password")]
    WrongPassword,

    #[error("you already voted in this poll")]
    AlreadyVoted,

    #[error("this poll has ended")]
    PollClosed,

    #[error("log in first with /login <name>")]
    NotLoggedIn,

    #[error("join a room first with /join <room_id>")]
    NotInRoom,

    #[error("{0}")]
    Validation(String),
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::Corrupt(value.to_string())
    }
}

impl From<chrono::ParseError> for AppError {
    fn from(value: chrono::ParseError) -> Self {
        AppError::Corrupt(format!("bad timestamp: {value}"))
    }
}

pub type AppResult<T> = Result<T, AppError>;
