//! Pooled SQLite connection

use di::inject;
use di::injectable;
use log::{info, warn};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Mutex;

use crate::config::DEFAULT_DATABASE_URL;

/// Pool handed to every `DatabaseConnection` the container creates.
///
/// `more-di` builds services through argument-less constructors, so the pool opened
/// (and migrated) at startup is parked here. Tests swap it for a throwaway database.
static INSTALLED_POOL: Mutex<Option<SqlitePool>> = Mutex::new(None);

pub struct DatabaseConnection {
    connection: SqlitePool,
}

#[injectable]
impl DatabaseConnection {
    #[inject]
    pub fn create() -> DatabaseConnection {
        if let Some(pool) = installed_pool() {
            return DatabaseConnection { connection: pool };
        }

        dotenvy::dotenv().ok();
        let connection_string =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_owned());
        warn!("no pool installed, connecting lazily to {connection_string} without running migrations");

        let options = connect_options(&connection_string).unwrap_or_else(|e| {
            warn!("bad DATABASE_URL ({e}), falling back to {DEFAULT_DATABASE_URL}");
            tune(SqliteConnectOptions::new().filename(DEFAULT_DATABASE_FILE))
        });

        DatabaseConnection {
            connection: pool_options().connect_lazy_with(options),
        }
    }
}

impl DatabaseConnection {
    /// Opens the pool and brings the schema up to date.
    pub async fn open(connection_string: &str) -> Result<SqlitePool, sqlx::Error> {
        let pool = pool_options()
            .connect_with(connect_options(connection_string)?)
            .await?;

        sqlx::migrate!().run(&pool).await?;
        info!("database ready at {connection_string}");

        Ok(pool)
    }

    /// Makes `pool` the one every container-built connection uses.
    pub fn install_pool(pool: SqlitePool) {
        *INSTALLED_POOL.lock().unwrap_or_else(|e| e.into_inner()) = Some(pool);
    }

    pub fn clear_pool() {
        INSTALLED_POOL
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }
}

const DEFAULT_DATABASE_FILE: &str = "persona_chat.db";

/// Settings every connection gets, whichever way the pool was built.
fn connect_options(connection_string: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    Ok(tune(SqliteConnectOptions::from_str(connection_string)?))
}

fn tune(options: SqliteConnectOptions) -> SqliteConnectOptions {
    options
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
}

fn pool_options() -> SqlitePoolOptions {
    SqlitePoolOptions::new().max_connections(5)
}

fn installed_pool() -> Option<SqlitePool> {
    INSTALLED_POOL
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

impl Deref for DatabaseConnection {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}
