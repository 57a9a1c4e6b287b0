//! Runtime configuration, read from the process environment (and `.env`).

use di::injectable;
use log::warn;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:persona_chat.db?mode=rwc";
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 15;

/// Sessions never outlive one hour of inactivity, whatever the environment says.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_address: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub gemini_timeout: Duration,
    pub rate_limit_per_minute: u32,
    pub session_ttl: Duration,
    pub session_cookie_secure: bool,
}

#[injectable]
impl AppConfig {
    #[inject]
    pub fn create() -> AppConfig {
        dotenvy::dotenv().ok();
        AppConfig::from_env()
    }
}

impl AppConfig {
    pub fn from_env() -> AppConfig {
        let defaults = AppConfig::default();

        let session_ttl = Duration::from_secs(env_or("SESSION_TTL_SECS", MAX_SESSION_TTL.as_secs()));

        AppConfig {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: env::var("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            gemini_timeout: Duration::from_secs(env_or("GEMINI_TIMEOUT_SECS", 60)),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", DEFAULT_RATE_LIMIT_PER_MINUTE)
                .max(1),
            session_ttl: session_ttl.min(MAX_SESSION_TTL),
            session_cookie_secure: env_or("SESSION_COOKIE_SECURE", true),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_url: DEFAULT_DATABASE_URL.to_owned(),
            bind_address: DEFAULT_BIND_ADDRESS.to_owned(),
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_owned(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_owned(),
            gemini_timeout: Duration::from_secs(60),
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
            session_ttl: MAX_SESSION_TTL,
            session_cookie_secure: true,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => T::from_str(raw.trim()).unwrap_or_else(|_| {
            warn!("ignoring unparsable value for {key}: {raw:?}");
            default
        }),
        Err(_) => default,
    }
}
