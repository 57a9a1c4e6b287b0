//! Database and schema tests
//!
//! Tests SQLite migrations, seed data, and schema constraints

use chrono::Utc;
use persona_chat_server::infrastructure::database::DatabaseConnection;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Setup test database with migrations
async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

async fn insert_message(pool: &SqlitePool, character_code: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO messages (character_code, sender, text, avatar, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(character_code)
    .bind("user")
    .bind("Hello")
    .bind(None::<String>)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map(|_| ())
}

#[tokio::test]
async fn test_database_migrations_work() {
    let pool = setup_test_db().await;

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE '\\_%' ESCAPE '\\' AND name != 'sqlite_sequence' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(
        tables,
        vec!["character_greetings", "characters", "messages", "users"]
    );
}

#[tokio::test]
async fn test_default_character_is_seeded() {
    let pool = setup_test_db().await;

    let (name, avatar): (String, String) =
        sqlx::query_as("SELECT name, avatar FROM characters WHERE code_name = 'eldrin'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(name, "Eldrin");
    assert!(!avatar.is_empty());

    let greetings: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM character_greetings g JOIN characters c ON g.character_id = c.id WHERE c.code_name = 'eldrin'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(greetings.0, 3);
}

#[tokio::test]
async fn test_username_is_unique() {
    let pool = setup_test_db().await;

    for expect_ok in [true, false] {
        let result = sqlx::query("INSERT INTO users (id, username, password_hash) VALUES (?, ?, ?)")
            .bind(Uuid::new_v4())
            .bind("alice")
            .bind("$argon2id$placeholder")
            .execute(&pool)
            .await;

        match result {
            Ok(_) => assert!(expect_ok),
            Err(e) => {
                assert!(!expect_ok);
                assert!(e.as_database_error().unwrap().is_unique_violation());
            }
        }
    }
}

#[tokio::test]
async fn test_code_name_is_unique() {
    let pool = setup_test_db().await;

    let result = sqlx::query(
        "INSERT INTO characters (code_name, name, description, avatar, prompt) VALUES ('eldrin', 'Copy', '', '', 'p')",
    )
    .execute(&pool)
    .await;

    let err = result.unwrap_err();
    assert!(err.as_database_error().unwrap().is_unique_violation());
}

#[tokio::test]
async fn test_message_requires_known_character() {
    let pool = setup_test_db().await;

    assert!(insert_message(&pool, "eldrin").await.is_ok());
    assert!(insert_message(&pool, "char_nobody").await.is_err());
}

#[tokio::test]
async fn test_character_cascade_delete() {
    let pool = setup_test_db().await;

    insert_message(&pool, "eldrin").await.unwrap();

    sqlx::query("DELETE FROM characters WHERE code_name = 'eldrin'")
        .execute(&pool)
        .await
        .unwrap();

    let greetings: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM character_greetings")
        .fetch_one(&pool)
        .await
        .unwrap();
    let messages: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
        .fetch_one(&pool)
        .await
        .unwrap();

    assert_eq!(greetings.0, 0);
    assert_eq!(messages.0, 0);
}

#[tokio::test]
async fn test_fallback_connection_matches_opened_pool_settings() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("fallback.db").display());

    DatabaseConnection::clear_pool();
    // Only test in this binary that reads DATABASE_URL or the installed pool.
    unsafe { std::env::set_var("DATABASE_URL", &url) };
    let connection = DatabaseConnection::create();

    let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(&*connection)
        .await
        .unwrap();
    let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(&*connection)
        .await
        .unwrap();

    assert_eq!(foreign_keys, 1);
    assert_eq!(journal_mode, "wal");
}
