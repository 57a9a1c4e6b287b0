//! Sign-up, login and logout.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use di_axum::Inject;
use log::info;
use minijinja::context;
use serde::Deserialize;

use crate::api::pages::render;
use crate::api::{SESSION_COOKIE, session_cookie, session_id};
use crate::config::AppConfig;
use crate::core::error::ChatError;
use crate::core::session::{SessionContext, SessionStore};
use crate::core::traits::IdentityService;

/// Shown for every failed login, whatever the reason.
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";

pub fn router() -> Router {
    Router::new()
        .route("/signup", get(signup_form).post(signup))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
}

#[derive(Deserialize, Debug)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

async fn signup_form() -> Result<Html<String>, ChatError> {
    render("signup.html", context! {})
}

async fn signup(
    Inject(identity_service): Inject<dyn IdentityService>,
    Form(credentials): Form<Credentials>,
) -> Result<Response, ChatError> {
    match identity_service
        .register(&credentials.username, &credentials.password)
        .await
    {
        Ok(_) => Ok(Redirect::to("/login").into_response()),
        Err(e @ (ChatError::Validation(_) | ChatError::DuplicateUsername)) => {
            let status = match &e {
                ChatError::DuplicateUsername => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            };
            let page = render(
                "signup.html",
                context! {
                    error => e.public_message(),
                    username => credentials.username.trim(),
                },
            )?;
            Ok((status, page).into_response())
        }
        Err(e) => Err(e),
    }
}

async fn login_form() -> Result<Html<String>, ChatError> {
    render("login.html", context! {})
}

async fn login(
    Inject(identity_service): Inject<dyn IdentityService>,
    Inject(sessions): Inject<dyn SessionStore>,
    Inject(config): Inject<AppConfig>,
    jar: CookieJar,
    Form(credentials): Form<Credentials>,
) -> Result<Response, ChatError> {
    match identity_service
        .authenticate(&credentials.username, &credentials.password)
        .await
    {
        Ok(identity) => {
            // Never reuse an id the browser brought with it.
            if let Some(previous) = session_id(&jar) {
                sessions.destroy(previous);
            }

            info!("{} logged in", identity.username);
            let id = sessions.start(identity);
            let jar = jar.add(session_cookie(id, config.session_cookie_secure));

            Ok((jar, Redirect::to("/characters")).into_response())
        }
        Err(ChatError::AuthFailure) => {
            let page = render("login.html", context! { error => INVALID_CREDENTIALS })?;
            Ok((StatusCode::UNAUTHORIZED, page).into_response())
        }
        Err(e) => Err(e),
    }
}

async fn logout(
    Inject(sessions): Inject<dyn SessionStore>,
    session: SessionContext,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(id) = session.id() {
        sessions.destroy(id);
    }

    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to("/"),
    )
}
