//! Database entities

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Sender recorded on messages typed by the human side of the conversation.
pub const USER_SENDER: &str = "user";

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Character {
    pub id: i64,
    pub code_name: String,
    pub name: String,
    pub description: String,
    pub avatar: String,
    pub prompt: String,
}

/// A character row that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewCharacter {
    pub code_name: String,
    pub name: String,
    pub description: String,
    pub avatar: String,
    pub prompt: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub id: i64,
    pub character_code: String,
    pub sender: String,
    pub text: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A message row before insertion. The database stamps `id` and `created_at` while it
/// holds the write lock, so both follow commit order.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub character_code: String,
    pub sender: String,
    pub text: String,
    pub avatar: Option<String>,
}

impl NewMessage {
    pub fn new(
        character_code: impl Into<String>,
        sender: impl Into<String>,
        text: impl Into<String>,
        avatar: Option<String>,
    ) -> Self {
        NewMessage {
            character_code: character_code.into(),
            sender: sender.into(),
            text: text.into(),
            avatar,
        }
    }
}
