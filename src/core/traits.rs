//! DI "Interfaces"

use crate::core::error::ChatResult;
use crate::core::session::Identity;
use crate::infrastructure::entities;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Public face of a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacterView {
    pub code_name: String,
    pub name: String,
    pub description: String,
    pub avatar: String,
    #[serde(skip_serializing)]
    pub prompt: String,
}

impl From<entities::Character> for CharacterView {
    fn from(character: entities::Character) -> Self {
        CharacterView {
            code_name: character.code_name,
            name: character.name,
            description: character.description,
            avatar: character.avatar,
            prompt: character.prompt,
        }
    }
}

/// Fields submitted by the character creation form.
#[derive(Debug, Clone, Default)]
pub struct CharacterDraft {
    pub name: String,
    pub description: String,
    pub avatar: String,
    pub prompt: String,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Creates an account.
    ///
    /// Returns `Validation` for blank fields and `DuplicateUsername` when the name is
    /// taken.
    async fn register(&self, username: &str, password: &str) -> ChatResult<Uuid>;

    /// Checks credentials.
    ///
    /// Unknown users and wrong passwords both come back as `AuthFailure`.
    async fn authenticate(&self, username: &str, password: &str) -> ChatResult<Identity>;
}

#[async_trait]
pub trait CharacterService: Send + Sync {
    /// Every character, keyed by code name.
    async fn list_all(&self) -> ChatResult<BTreeMap<String, CharacterView>>;

    async fn find(&self, code_name: &str) -> ChatResult<Option<CharacterView>>;

    /// Stores a new character under a freshly generated code name and returns it.
    async fn create(&self, draft: CharacterDraft) -> ChatResult<String>;

    /// One of the character's greetings, picked at random.
    async fn greeting_for(&self, code_name: &str) -> ChatResult<String>;
}

#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Appends one message; committed when this returns.
    async fn append(
        &self,
        character_code: &str,
        sender: &str,
        text: &str,
        avatar: Option<String>,
    ) -> ChatResult<entities::Message>;

    /// The conversation oldest first, or only its newest `limit` messages (still oldest
    /// first).
    async fn fetch(
        &self,
        character_code: &str,
        limit: Option<u32>,
    ) -> ChatResult<Vec<entities::Message>>;

    /// Fetches the full conversation, seeding the greeting first if it is empty.
    ///
    /// Concurrent first visits produce a single greeting.
    async fn open_conversation(
        &self,
        character: &CharacterView,
    ) -> ChatResult<Vec<entities::Message>>;

    /// Wipes the conversation and starts over with a fresh greeting, atomically.
    async fn reset_conversation(&self, character: &CharacterView) -> ChatResult<()>;

    async fn count(&self, character_code: &str) -> ChatResult<i64>;
}

#[async_trait]
pub trait ChatService: Send + Sync {
    /// Records the user's line, asks the model for the character's answer and records
    /// that too. Returns the stored answer.
    async fn send_message(
        &self,
        character: &CharacterView,
        user_message: &str,
    ) -> ChatResult<entities::Message>;
}
