//! DB Repository abstractions

use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{Character, Message, NewCharacter, NewMessage, User};
use crate::infrastructure::traits::{
    CharacterRepository, MessageRepository, RepositoryResult, UserRepository,
};
use async_trait::async_trait;
use di::{Ref, injectable};

const MESSAGE_COLUMNS: &str = "id, character_code, sender, text, avatar, created_at";

#[injectable(UserRepository)]
pub struct DbUserRepository {
    connection: Ref<DatabaseConnection>,
}

#[async_trait]
impl UserRepository for DbUserRepository {
    async fn create_user(&self, user: User) -> RepositoryResult<User> {
        let user = sqlx::query_as(
            "INSERT INTO users (id, username, password_hash) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(user.id)
        .bind(user.username)
        .bind(user.password_hash)
        .fetch_one(&**self.connection)
        .await?;

        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&**self.connection)
            .await?;

        Ok(user)
    }
}

#[injectable(CharacterRepository)]
pub struct DbCharacterRepository {
    connection: Ref<DatabaseConnection>,
}

#[async_trait]
impl CharacterRepository for DbCharacterRepository {
    async fn list_characters(&self) -> RepositoryResult<Vec<Character>> {
        let characters = sqlx::query_as("SELECT * FROM characters ORDER BY id ASC")
            .fetch_all(&**self.connection)
            .await?;

        Ok(characters)
    }

    async fn find_character(&self, code_name: &str) -> RepositoryResult<Option<Character>> {
        let character = sqlx::query_as("SELECT * FROM characters WHERE code_name = ?")
            .bind(code_name)
            .fetch_optional(&**self.connection)
            .await?;

        Ok(character)
    }

    async fn create_character(&self, character: NewCharacter) -> RepositoryResult<Character> {
        let character = sqlx::query_as(
            "INSERT INTO characters (code_name, name, description, avatar, prompt) VALUES (?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(character.code_name)
        .bind(character.name)
        .bind(character.description)
        .bind(character.avatar)
        .bind(character.prompt)
        .fetch_one(&**self.connection)
        .await?;

        Ok(character)
    }

    async fn list_greetings(&self, code_name: &str) -> RepositoryResult<Vec<String>> {
        let greetings = sqlx::query_scalar(
            "SELECT g.greeting FROM character_greetings g INNER JOIN characters c ON g.character_id = c.id WHERE c.code_name = ? ORDER BY g.id ASC",
        )
        .bind(code_name)
        .fetch_all(&**self.connection)
        .await?;

        Ok(greetings)
    }
}

#[injectable(MessageRepository)]
pub struct DbMessageRepository {
    connection: Ref<DatabaseConnection>,
}

#[async_trait]
impl MessageRepository for DbMessageRepository {
    async fn insert_message(&self, message: NewMessage) -> RepositoryResult<Message> {
        let message = sqlx::query_as(&format!(
            "INSERT INTO messages (character_code, sender, text, avatar) VALUES (?, ?, ?, ?) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message.character_code)
        .bind(message.sender)
        .bind(message.text)
        .bind(message.avatar)
        .fetch_one(&**self.connection)
        .await?;

        Ok(message)
    }

    async fn list_messages(
        &self,
        character_code: &str,
        limit: Option<u32>,
    ) -> RepositoryResult<Vec<Message>> {
        let messages = match limit {
            // Tail window: newest rows first in the subquery, flipped back to chronological.
            Some(limit) => {
                sqlx::query_as(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM (SELECT {MESSAGE_COLUMNS} FROM messages WHERE character_code = ? ORDER BY id DESC LIMIT ?) ORDER BY id ASC"
                ))
                .bind(character_code)
                .bind(limit)
                .fetch_all(&**self.connection)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE character_code = ? ORDER BY id ASC"
                ))
                .bind(character_code)
                .fetch_all(&**self.connection)
                .await?
            }
        };

        Ok(messages)
    }

    async fn insert_if_conversation_empty(&self, message: NewMessage) -> RepositoryResult<bool> {
        // A single statement takes SQLite's write lock before it reads, so two first
        // visits cannot both see an empty conversation.
        let result = sqlx::query(
            "INSERT INTO messages (character_code, sender, text, avatar) SELECT ?, ?, ?, ? WHERE NOT EXISTS (SELECT 1 FROM messages WHERE character_code = ?)",
        )
        .bind(&message.character_code)
        .bind(message.sender)
        .bind(message.text)
        .bind(message.avatar)
        .bind(&message.character_code)
        .execute(&**self.connection)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn replace_conversation(&self, message: NewMessage) -> RepositoryResult<Message> {
        let mut tx = self.connection.begin().await?;

        sqlx::query("DELETE FROM messages WHERE character_code = ?")
            .bind(&message.character_code)
            .execute(&mut *tx)
            .await?;

        let message = sqlx::query_as(&format!(
            "INSERT INTO messages (character_code, sender, text, avatar) VALUES (?, ?, ?, ?) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message.character_code)
        .bind(message.sender)
        .bind(message.text)
        .bind(message.avatar)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(message)
    }

    async fn count_messages(&self, character_code: &str) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE character_code = ?")
            .bind(character_code)
            .fetch_one(&**self.connection)
            .await?;

        Ok(count)
    }
}
