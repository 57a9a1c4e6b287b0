//! Character listing, chat view, story reset and character creation.

use axum::extract::{Path, Query};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use di_axum::Inject;
use minijinja::context;
use serde::Deserialize;

use crate::api::CurrentUser;
use crate::api::chat::schemas::StoryLine;
use crate::api::pages::render;
use crate::core::error::ChatError;
use crate::core::session::SessionStore;
use crate::core::traits::{CharacterDraft, CharacterService, ConversationService};

/// Used by `/new_story` when the requested character is missing or unknown.
pub const DEFAULT_CHARACTER: &str = "eldrin";

pub fn router() -> Router {
    Router::new()
        .route("/characters", get(list_characters))
        .route("/chat/:character", get(chat_view))
        .route("/new_story", get(new_story))
        .route(
            "/create_character",
            get(create_character_form).post(create_character),
        )
}

async fn list_characters(
    Inject(character_service): Inject<dyn CharacterService>,
    CurrentUser { identity, .. }: CurrentUser,
) -> Result<Html<String>, ChatError> {
    let characters = character_service.list_all().await?;

    render(
        "characters.html",
        context! {
            username => identity.username,
            characters => characters.values().collect::<Vec<_>>(),
        },
    )
}

async fn chat_view(
    Inject(character_service): Inject<dyn CharacterService>,
    Inject(conversation_service): Inject<dyn ConversationService>,
    Inject(sessions): Inject<dyn SessionStore>,
    current_user: CurrentUser,
    Path(character_code): Path<String>,
) -> Result<Response, ChatError> {
    let character = character_service
        .find(&character_code)
        .await?
        .ok_or(ChatError::NotFound)?;

    // The session can expire or be logged out between extraction and here.
    let activated = current_user
        .session
        .id()
        .is_some_and(|id| sessions.set_active_character(id, &character.code_name));
    if !activated {
        return Ok(Redirect::to("/login").into_response());
    }

    let story: Vec<StoryLine> = conversation_service
        .open_conversation(&character)
        .await?
        .into_iter()
        .map(StoryLine::from)
        .collect();

    render(
        "chat.html",
        context! {
            username => current_user.identity.username,
            character => character,
            story => story,
        },
    )
    .map(IntoResponse::into_response)
}

#[derive(Deserialize, Debug)]
pub struct NewStoryQuery {
    pub character: Option<String>,
}

async fn new_story(
    Inject(character_service): Inject<dyn CharacterService>,
    Inject(conversation_service): Inject<dyn ConversationService>,
    _current_user: CurrentUser,
    Query(query): Query<NewStoryQuery>,
) -> Result<Redirect, ChatError> {
    let requested = query.character.unwrap_or_default();

    let character = match character_service.find(requested.trim()).await? {
        Some(character) => character,
        None => character_service
            .find(DEFAULT_CHARACTER)
            .await?
            .ok_or(ChatError::NotFound)?,
    };

    conversation_service.reset_conversation(&character).await?;

    Ok(Redirect::to(&format!("/chat/{}", character.code_name)))
}

#[derive(Deserialize, Debug)]
pub struct CharacterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub prompt: String,
}

async fn create_character_form(current_user: CurrentUser) -> Result<Html<String>, ChatError> {
    render(
        "create_character.html",
        context! { username => current_user.identity.username },
    )
}

async fn create_character(
    Inject(character_service): Inject<dyn CharacterService>,
    _current_user: CurrentUser,
    Form(form): Form<CharacterForm>,
) -> Result<Redirect, ChatError> {
    character_service
        .create(CharacterDraft {
            name: form.name,
            description: form.description,
            avatar: form.avatar,
            prompt: form.prompt,
        })
        .await?;

    Ok(Redirect::to("/characters"))
}
