//! Infrastructure traits, used for DI on higher levels

use crate::infrastructure::entities;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A UNIQUE constraint rejected the write.
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e.as_database_error() {
            Some(db) if db.is_unique_violation() => RepositoryError::Conflict(db.message().to_owned()),
            _ => RepositoryError::Database(e),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: entities::User) -> RepositoryResult<entities::User>;

    async fn find_user_by_username(&self, username: &str)
    -> RepositoryResult<Option<entities::User>>;
}

#[async_trait]
pub trait CharacterRepository: Send + Sync {
    async fn list_characters(&self) -> RepositoryResult<Vec<entities::Character>>;

    async fn find_character(&self, code_name: &str) -> RepositoryResult<Option<entities::Character>>;

    /// Fails with [`RepositoryError::Conflict`] when the code name is taken.
    async fn create_character(
        &self,
        character: entities::NewCharacter,
    ) -> RepositoryResult<entities::Character>;

    async fn list_greetings(&self, code_name: &str) -> RepositoryResult<Vec<String>>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert_message(&self, message: entities::NewMessage)
    -> RepositoryResult<entities::Message>;

    /// Messages oldest first. With a limit, only the newest `limit` rows are returned,
    /// still oldest first.
    async fn list_messages(
        &self,
        character_code: &str,
        limit: Option<u32>,
    ) -> RepositoryResult<Vec<entities::Message>>;

    /// Inserts `message` only when its conversation has no rows yet.
    ///
    /// Returns whether the row was written.
    async fn insert_if_conversation_empty(&self, message: entities::NewMessage)
    -> RepositoryResult<bool>;

    /// Deletes the whole conversation and stores `message` as its first row, in one
    /// transaction.
    async fn replace_conversation(&self, message: entities::NewMessage)
    -> RepositoryResult<entities::Message>;

    async fn count_messages(&self, character_code: &str) -> RepositoryResult<i64>;
}
