//! Implementations for the service the app needs.
//!

use crate::core::context::{CONTEXT_WINDOW, build_prompt};
use crate::core::error::{ChatError, ChatResult};
use crate::core::gateway::{GenerationGateway, GenerationRequest};
use crate::core::session::Identity;
use crate::core::traits::{
    CharacterDraft, CharacterService, CharacterView, ChatService, ConversationService,
    IdentityService,
};
use crate::infrastructure::entities::{Character, Message, NewCharacter, NewMessage, USER_SENDER, User};
use crate::infrastructure::traits::{
    CharacterRepository, MessageRepository, RepositoryError, UserRepository,
};
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use di::{Ref, injectable};
use log::{debug, error, info, warn};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use uuid::Uuid;

pub const CODE_NAME_PREFIX: &str = "char_";
pub const CODE_NAME_SUFFIX_LEN: usize = 6;
pub const MAX_CODE_NAME_ATTEMPTS: usize = 8;
const CODE_NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Appended to every user-written character prompt.
pub const PERSONA_SUFFIX: &str =
    " Never acknowledge being an AI. Never say I understand - respond naturally. Always stay in character.";

pub const FALLBACK_GREETING: &str = "Greetings.";

/// Verified against when the username does not exist, so both failure paths do the
/// same amount of work.
static DUMMY_PASSWORD_HASH: LazyLock<String> = LazyLock::new(|| {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(Uuid::new_v4().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .unwrap_or_default()
});

#[injectable(IdentityService)]
pub struct MyIdentityService {
    repo: Ref<dyn UserRepository>,
}

#[async_trait]
impl IdentityService for MyIdentityService {
    async fn register(&self, username: &str, password: &str) -> ChatResult<Uuid> {
        let username = username.trim();
        if username.is_empty() || password.trim().is_empty() {
            return Err(ChatError::validation("Username and password are required"));
        }

        let password_hash = hash_password(password.to_owned()).await?;

        match self
            .repo
            .create_user(User {
                id: Uuid::new_v4(),
                username: username.to_owned(),
                password_hash,
            })
            .await
        {
            Ok(user) => {
                info!("registered user {}", user.username);
                Ok(user.id)
            }
            Err(RepositoryError::Conflict(_)) => Err(ChatError::DuplicateUsername),
            Err(e) => Err(e.into()),
        }
    }

    async fn authenticate(&self, username: &str, password: &str) -> ChatResult<Identity> {
        let user = self.repo.find_user_by_username(username.trim()).await?;

        let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
        let password_matches = verify_password(password.to_owned(), stored_hash).await?;

        match user {
            Some(user) if password_matches => Ok(Identity {
                user_id: user.id,
                username: user.username,
            }),
            _ => {
                debug!("rejected login attempt");
                Err(ChatError::AuthFailure)
            }
        }
    }
}

async fn hash_password(password: String) -> ChatResult<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
    })
    .await
    .map_err(|e| ChatError::Internal(format!("hashing task failed: {e}")))?
    .map_err(|e| ChatError::Internal(format!("password hashing failed: {e}")))
}

/// `None` verifies against a throwaway hash and always reports a mismatch.
async fn verify_password(password: String, stored_hash: Option<String>) -> ChatResult<bool> {
    tokio::task::spawn_blocking(move || {
        let known_user = stored_hash.is_some();
        let stored_hash = stored_hash.unwrap_or_else(|| DUMMY_PASSWORD_HASH.clone());

        let parsed = match PasswordHash::new(&stored_hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("unparsable password hash: {e}");
                return false;
            }
        };

        let verified = Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();
        known_user && verified
    })
    .await
    .map_err(|e| ChatError::Internal(format!("verification task failed: {e}")))
}

#[injectable(CharacterService)]
pub struct MyCharacterService {
    repo: Ref<dyn CharacterRepository>,
}

#[async_trait]
impl CharacterService for MyCharacterService {
    async fn list_all(&self) -> ChatResult<BTreeMap<String, CharacterView>> {
        let characters = self.repo.list_characters().await?;

        Ok(characters
            .into_iter()
            .map(|c| (c.code_name.clone(), CharacterView::from(c)))
            .collect())
    }

    async fn find(&self, code_name: &str) -> ChatResult<Option<CharacterView>> {
        Ok(self
            .repo
            .find_character(code_name)
            .await?
            .map(CharacterView::from))
    }

    async fn create(&self, draft: CharacterDraft) -> ChatResult<String> {
        if draft.name.trim().is_empty() {
            return Err(ChatError::validation("Character name is required"));
        }

        let character =
            insert_with_unique_code_name(&*self.repo, &draft, generate_code_name).await?;
        info!("created character {} ({})", character.code_name, character.name);

        Ok(character.code_name)
    }

    async fn greeting_for(&self, code_name: &str) -> ChatResult<String> {
        let greetings = self.repo.list_greetings(code_name).await?;

        Ok(greetings
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| FALLBACK_GREETING.to_owned()))
    }
}

/// `char_` followed by six random lowercase letters or digits.
pub fn generate_code_name() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CODE_NAME_SUFFIX_LEN)
        .map(|_| CODE_NAME_ALPHABET[rng.gen_range(0..CODE_NAME_ALPHABET.len())] as char)
        .collect();
    format!("{CODE_NAME_PREFIX}{suffix}")
}

pub fn persona_prompt(raw_prompt: &str) -> String {
    format!("{}{}", raw_prompt.trim(), PERSONA_SUFFIX)
        .trim()
        .to_owned()
}

/// Stores `draft` under the first code name from `next_code_name` the database accepts.
///
/// Collisions are caught by the UNIQUE index and retried silently, at most
/// [`MAX_CODE_NAME_ATTEMPTS`] times.
pub async fn insert_with_unique_code_name<F>(
    repo: &dyn CharacterRepository,
    draft: &CharacterDraft,
    mut next_code_name: F,
) -> ChatResult<Character>
where
    F: FnMut() -> String + Send,
{
    for attempt in 1..=MAX_CODE_NAME_ATTEMPTS {
        let code_name = next_code_name();

        let result = repo
            .create_character(NewCharacter {
                code_name: code_name.clone(),
                name: draft.name.trim().to_owned(),
                description: draft.description.trim().to_owned(),
                avatar: draft.avatar.trim().to_owned(),
                prompt: persona_prompt(&draft.prompt),
            })
            .await;

        match result {
            Ok(character) => return Ok(character),
            Err(RepositoryError::Conflict(_)) => {
                debug!("code name {code_name} already taken (attempt {attempt})");
            }
            Err(e) => return Err(e.into()),
        }
    }

    error!("gave up generating a code name after {MAX_CODE_NAME_ATTEMPTS} attempts");
    Err(ChatError::Persistence(
        "could not allocate a unique code name".to_owned(),
    ))
}

pub fn greeting_message(character: &CharacterView, greeting: &str) -> String {
    format!("*{} looks at you intently* {}", character.name, greeting)
}

#[injectable(ConversationService)]
pub struct MyConversationService {
    messages: Ref<dyn MessageRepository>,
    characters: Ref<dyn CharacterService>,
}

impl MyConversationService {
    async fn greeting_row(&self, character: &CharacterView) -> ChatResult<NewMessage> {
        let greeting = self.characters.greeting_for(&character.code_name).await?;

        Ok(NewMessage::new(
            &character.code_name,
            &character.code_name,
            greeting_message(character, &greeting),
            Some(character.avatar.clone()),
        ))
    }
}

#[async_trait]
impl ConversationService for MyConversationService {
    async fn append(
        &self,
        character_code: &str,
        sender: &str,
        text: &str,
        avatar: Option<String>,
    ) -> ChatResult<Message> {
        Ok(self
            .messages
            .insert_message(NewMessage::new(character_code, sender, text, avatar))
            .await?)
    }

    async fn fetch(&self, character_code: &str, limit: Option<u32>) -> ChatResult<Vec<Message>> {
        Ok(self.messages.list_messages(character_code, limit).await?)
    }

    async fn open_conversation(&self, character: &CharacterView) -> ChatResult<Vec<Message>> {
        let story = self.fetch(&character.code_name, None).await?;
        if !story.is_empty() {
            return Ok(story);
        }

        let greeting = self.greeting_row(character).await?;
        if self.messages.insert_if_conversation_empty(greeting).await? {
            info!("seeded greeting for {}", character.code_name);
        }

        self.fetch(&character.code_name, None).await
    }

    async fn reset_conversation(&self, character: &CharacterView) -> ChatResult<()> {
        let greeting = self.greeting_row(character).await?;
        self.messages.replace_conversation(greeting).await?;
        info!("conversation with {} reset", character.code_name);

        Ok(())
    }

    async fn count(&self, character_code: &str) -> ChatResult<i64> {
        Ok(self.messages.count_messages(character_code).await?)
    }
}

#[injectable(ChatService)]
pub struct MyChatService {
    conversations: Ref<dyn ConversationService>,
    gateway: Ref<dyn GenerationGateway>,
}

#[async_trait]
impl ChatService for MyChatService {
    async fn send_message(
        &self,
        character: &CharacterView,
        user_message: &str,
    ) -> ChatResult<Message> {
        let user_message = user_message.trim();
        if user_message.is_empty() {
            return Err(ChatError::validation("Message cannot be empty"));
        }

        let code = &character.code_name;
        self.conversations
            .append(code, USER_SENDER, user_message, None)
            .await?;

        let recent = self
            .conversations
            .fetch(code, Some(CONTEXT_WINDOW as u32))
            .await?;
        let prompt = build_prompt(&character.prompt, &recent, user_message);

        let reply = self
            .gateway
            .complete(&GenerationRequest::persona(prompt))
            .await
            .inspect_err(|e| error!("generation for {code} failed: {e}"))?;

        self.conversations
            .append(code, code, &reply, Some(character.avatar.clone()))
            .await
    }
}
