//! Server-rendered HTML pages.

use axum::response::Html;
use log::error;
use minijinja::{Environment, Value, context};
use std::sync::LazyLock;

use crate::core::error::ChatError;
use crate::core::session::SessionContext;

static TEMPLATES: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.set_trim_blocks(true);

    let sources = [
        ("base.html", include_str!("../../templates/base.html")),
        ("index.html", include_str!("../../templates/index.html")),
        ("signup.html", include_str!("../../templates/signup.html")),
        ("login.html", include_str!("../../templates/login.html")),
        ("characters.html", include_str!("../../templates/characters.html")),
        ("chat.html", include_str!("../../templates/chat.html")),
        (
            "create_character.html",
            include_str!("../../templates/create_character.html"),
        ),
    ];
    for (name, source) in sources {
        if let Err(e) = env.add_template(name, source) {
            error!("failed to load template {name}: {e}");
        }
    }

    env
});

pub fn render(name: &str, ctx: Value) -> Result<Html<String>, ChatError> {
    TEMPLATES
        .get_template(name)
        .and_then(|template| template.render(ctx))
        .map(Html)
        .map_err(|e| ChatError::Internal(format!("rendering {name} failed: {e}")))
}

pub async fn index(session: SessionContext) -> Result<Html<String>, ChatError> {
    let username = session.state().identity().map(|i| i.username.clone());
    render("index.html", context! { username => username })
}
