use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use di_axum::Inject;
use log::error;
use serde::Serialize;
use uuid::Uuid;

use crate::core::error::ChatError;
use crate::core::session::{Identity, SessionContext, SessionId, SessionStore};

pub mod auth;
pub mod characters;
pub mod chat;
pub mod pages;

pub const SESSION_COOKIE: &str = "session_id";

/// Every route the application serves, minus static assets.
pub fn router() -> Router {
    Router::new()
        .route("/", get(pages::index))
        .merge(auth::router())
        .merge(characters::router())
        .merge(chat::router())
}

#[derive(Serialize, Debug)]
pub struct ErrorEnvelope {
    pub error: String,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match &self {
            ChatError::Validation(_) | ChatError::NoActiveCharacter => StatusCode::BAD_REQUEST,
            ChatError::DuplicateUsername => StatusCode::CONFLICT,
            ChatError::AuthFailure | ChatError::Unauthorized => StatusCode::UNAUTHORIZED,
            ChatError::NotFound => StatusCode::NOT_FOUND,
            ChatError::Persistence(_) | ChatError::Generation(_) | ChatError::Internal(_) => {
                error!("request failed: {self}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(ErrorEnvelope {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}

/// Session id carried by the request's cookie, if any.
pub fn session_id(jar: &CookieJar) -> Option<SessionId> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

pub fn session_from_headers(store: &dyn SessionStore, headers: &HeaderMap) -> SessionContext {
    SessionContext::resolve(store, session_id(&CookieJar::from_headers(headers)))
}

pub fn session_cookie(id: SessionId, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ChatError> {
        let Inject(store) = Inject::<dyn SessionStore>::from_request_parts(parts, state)
            .await
            .map_err(|_| ChatError::Internal("session store is not registered".to_owned()))?;

        Ok(session_from_headers(&*store, &parts.headers))
    }
}

/// A signed-in caller. Anonymous page requests are sent to the login form.
#[derive(Debug)]
pub struct CurrentUser {
    pub session: SessionContext,
    pub identity: Identity,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Response> {
        let session = SessionContext::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        let identity = session
            .require_authenticated()
            .cloned()
            .map_err(|_| Redirect::to("/login").into_response())?;

        Ok(CurrentUser { session, identity })
    }
}
