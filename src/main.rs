//! Persona chat web server

use persona_chat_server::api;
use persona_chat_server::config::AppConfig;
use persona_chat_server::core::gateway::GeminiGateway;
use persona_chat_server::core::rate_limit::GlobalRateLimiter;
use persona_chat_server::core::services::{
    MyCharacterService, MyChatService, MyConversationService, MyIdentityService,
};
use persona_chat_server::core::session::{MemorySessionStore, SessionStore};
use persona_chat_server::infrastructure::database::DatabaseConnection;
use persona_chat_server::infrastructure::repositories::{
    DbCharacterRepository, DbMessageRepository, DbUserRepository,
};

use anyhow::anyhow;
use axum::http::{HeaderValue, Method};
use di::{Injectable, ServiceCollection, ServiceProvider};
use di_axum::RouterServiceProviderExtensions;
use log::{debug, info};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(web_server_task(config))
}

fn build_provider() -> anyhow::Result<ServiceProvider> {
    ServiceCollection::new()
        .add(AppConfig::singleton())
        .add(DatabaseConnection::singleton())
        .add(MemorySessionStore::singleton())
        .add(GlobalRateLimiter::singleton())
        .add(GeminiGateway::singleton())
        .add(DbUserRepository::scoped())
        .add(DbCharacterRepository::scoped())
        .add(DbMessageRepository::scoped())
        .add(MyIdentityService::scoped())
        .add(MyCharacterService::scoped())
        .add(MyConversationService::scoped())
        .add(MyChatService::scoped())
        .build_provider()
        .map_err(|e| anyhow!("invalid service registrations: {e:?}"))
}

async fn web_server_task(config: AppConfig) -> anyhow::Result<()> {
    let pool = DatabaseConnection::open(&config.database_url).await?;
    DatabaseConnection::install_pool(pool);

    let provider = build_provider()?;

    let sessions = provider.get_required::<dyn SessionStore>();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                debug!("purged {purged} expired sessions");
            }
        }
    });

    // build our application with a route
    let app = api::router()
        .nest_service(
            "/static",
            ServiceBuilder::new().service(ServeDir::new("static")),
        )
        .layer(
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_origin([
                    HeaderValue::from_static("http://localhost:3000"),
                    HeaderValue::from_static("http://localhost:5173"),
                ]),
        )
        .with_provider(provider);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    info!("Shutting down...");

    Ok(())
}
