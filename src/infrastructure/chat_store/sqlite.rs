use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::domain::{ports::ChatStore, ChatRecord, DomainError, NewChatRecord};
use crate::infrastructure::config::DatabaseConfig;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS chat_history (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT    NOT NULL,
    query     TEXT    NOT NULL,
    response  TEXT    NOT NULL,
    sources   TEXT    NOT NULL,
    title     TEXT    NOT NULL
)
"#;

fn storage(err: sqlx::Error) -> DomainError {
    DomainError::storage(err.to_string())
}

#[derive(sqlx::FromRow)]
struct ChatRow {
    id: i64,
    timestamp: DateTime<Utc>,
    query: String,
    response: String,
    sources: String,
    title: String,
}

impl TryFrom<ChatRow> for ChatRecord {
    type Error = DomainError;

    fn try_from(row: ChatRow) -> Result<Self, Self::Error> {
        let sources = serde_json::from_str(&row.sources).map_err(|e| {
            DomainError::storage(format!("corrupt sources for chat {}: {e}", row.id))
        })?;
        Ok(ChatRecord {
            id: row.id,
            query: row.query,
            response: row.response,
            sources,
            title: row.title,
            timestamp: row.timestamp,
        })
    }
}

/// Chat history in a single append-only SQLite table.
#[derive(Clone)]
pub struct SqliteChatStore {
    pool: SqlitePool,
}

impl SqliteChatStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DomainError> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(storage)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(30));

        // Each connection to `:memory:` is a separate database, so pin to one.
        let in_memory = config.url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await.map_err(storage)?;
        let store = Self::from_pool(pool).await?;
        info!(url = %config.url, "chat history database ready");
        Ok(store)
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, DomainError> {
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(storage)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn insert(&self, record: NewChatRecord) -> Result<ChatRecord, DomainError> {
        let sources = serde_json::to_string(&record.sources)
            .map_err(|e| DomainError::internal(format!("failed to encode sources: {e}")))?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO chat_history (timestamp, query, response, sources, title)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(record.timestamp)
        .bind(&record.query)
        .bind(&record.response)
        .bind(&sources)
        .bind(&record.title)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;

        Ok(record.into_record(id))
    }

    async fn list(&self) -> Result<Vec<ChatRecord>, DomainError> {
        sqlx::query_as::<_, ChatRow>("SELECT * FROM chat_history ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?
            .into_iter()
            .map(ChatRecord::try_from)
            .collect()
    }

    async fn get(&self, id: i64) -> Result<Option<ChatRecord>, DomainError> {
        sqlx::query_as::<_, ChatRow>("SELECT * FROM chat_history WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .map(ChatRecord::try_from)
            .transpose()
    }

    async fn ping(&self) -> Result<(), DomainError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }
}
