//! Message sending endpoint

use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use di_axum::Inject;
use log::debug;

use crate::api::chat::schemas::{ChatReply, SendMessage};
use crate::core::error::ChatError;
use crate::core::rate_limit::RateLimiter;
use crate::core::session::SessionContext;
use crate::core::traits::{CharacterService, ChatService};

pub fn router() -> Router {
    Router::new().route("/send_message", post(send_message))
}

async fn send_message(
    Inject(rate_limiter): Inject<dyn RateLimiter>,
    Inject(character_service): Inject<dyn CharacterService>,
    Inject(chat_service): Inject<dyn ChatService>,
    session: SessionContext,
    payload: Result<Json<SendMessage>, JsonRejection>,
) -> Result<Json<ChatReply>, ChatError> {
    let (_, character_code) = session.require_active()?;

    let message = payload
        .ok()
        .and_then(|Json(payload)| payload.message)
        .map(|message| message.trim().to_owned())
        .filter(|message| !message.is_empty())
        .ok_or_else(|| ChatError::validation("Message cannot be empty"))?;

    let waited = rate_limiter.acquire().await;
    if !waited.is_zero() {
        debug!("send_message held back for {waited:?}");
    }

    let character = character_service
        .find(character_code)
        .await?
        .ok_or(ChatError::NotFound)?;

    let reply = chat_service.send_message(&character, &message).await?;

    Ok(Json(ChatReply::from(reply)))
}

pub mod schemas {
    use crate::infrastructure::entities;
    use crate::infrastructure::entities::USER_SENDER;
    use serde::{Deserialize, Serialize};

    #[derive(Deserialize, Debug)]
    pub struct SendMessage {
        pub message: Option<String>,
    }

    #[derive(Serialize, Debug)]
    pub struct ChatReply {
        pub sender: String,
        pub text: String,
        pub avatar: Option<String>,
    }

    impl From<entities::Message> for ChatReply {
        fn from(message: entities::Message) -> Self {
            ChatReply {
                sender: message.sender,
                text: message.text,
                avatar: message.avatar,
            }
        }
    }

    /// One line of a conversation as the chat page shows it.
    #[derive(Serialize, Debug)]
    pub struct StoryLine {
        pub sender: String,
        pub text: String,
        pub avatar: Option<String>,
        pub from_user: bool,
    }

    impl From<entities::Message> for StoryLine {
        fn from(message: entities::Message) -> Self {
            StoryLine {
                from_user: message.sender == USER_SENDER,
                sender: message.sender,
                text: message.text,
                avatar: message.avatar,
            }
        }
    }
}
