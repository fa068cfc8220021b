//! Caller identity, passed explicitly into every operation that needs it.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

const MAX_DISPLAY_NAME: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn start(display_name: &str) -> AppResult<Self> {
        let display_name = display_name.trim();
        if display_name.is_empty() || display_name.chars().count() > MAX_DISPLAY_NAME {
            return Err(AppError::Validation(format!(
                "display name must be between 1 and {MAX_DISPLAY_NAME} characters"
            )));
        }
        if display_name.chars().any(char::is_whitespace) {
            return Err(AppError::Validation("display name cannot contain spaces".to_string()));
        }

        Ok(Self {
            user_id: Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            started_at: Utc::now(),
        })
    }

    pub fn is(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}
