// SQLite-backed violation store.
//
// One row per user; each category gets its own counter column, so
// per-category increments stay independent. Counter updates go through a
// single UPSERT ... RETURNING statement, which SQLite executes atomically:
// concurrent bumps for the same user serialize without lost updates, and
// the returned value is the one this bump produced.
//
// Table:
// - violations: user_id PK, display_name, four counter columns,
//   last-violation metadata (category, detail, content, timestamp)

use crate::core::moderation::{
    ModerationError, ViolationCategory, ViolationMeta, ViolationRecord, ViolationStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteViolationStore {
    pool: Pool<Sqlite>,
}

fn storage(e: sqlx::Error) -> ModerationError {
    ModerationError::Storage(e.to_string())
}

/// Counter column for a category. Static strings only - these get spliced
/// into SQL.
fn column(category: ViolationCategory) -> &'static str {
    match category {
        ViolationCategory::AbusiveLanguage => "abusive_count",
        ViolationCategory::DisallowedLink => "link_count",
        ViolationCategory::MassMention => "mention_count",
        ViolationCategory::Spam => "spam_count",
    }
}

fn category_tag(category: ViolationCategory) -> &'static str {
    match category {
        ViolationCategory::AbusiveLanguage => "abusive_language",
        ViolationCategory::DisallowedLink => "disallowed_link",
        ViolationCategory::MassMention => "mass_mention",
        ViolationCategory::Spam => "spam",
    }
}

fn parse_category_tag(tag: &str) -> Option<ViolationCategory> {
    match tag {
        "abusive_language" => Some(ViolationCategory::AbusiveLanguage),
        "disallowed_link" => Some(ViolationCategory::DisallowedLink),
        "mass_mention" => Some(ViolationCategory::MassMention),
        "spam" => Some(ViolationCategory::Spam),
        _ => None,
    }
}

impl SqliteViolationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS violations (
                user_id INTEGER PRIMARY KEY,
                display_name TEXT NOT NULL DEFAULT '',
                abusive_count INTEGER NOT NULL DEFAULT 0,
                link_count INTEGER NOT NULL DEFAULT 0,
                mention_count INTEGER NOT NULL DEFAULT 0,
                spam_count INTEGER NOT NULL DEFAULT 0,
                last_category TEXT,
                last_detail TEXT,
                last_content TEXT,
                last_at TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}

#[async_trait]
impl ViolationStore for SqliteViolationStore {
    async fn increment_and_get(
        &self,
        user_id: u64,
        category: ViolationCategory,
        meta: ViolationMeta,
        explicit_count: Option<u32>,
    ) -> Result<u32, ModerationError> {
        let col = column(category);
        // The store assigns the write timestamp.
        let now = Utc::now().to_rfc3339();

        // Explicit counts (the spam path) overwrite; everything else adds 1.
        let update_expr = if explicit_count.is_some() {
            format!("excluded.{col}")
        } else {
            format!("{col} + 1")
        };
        let value = i64::from(explicit_count.unwrap_or(1));

        let sql = format!(
            r#"
            INSERT INTO violations
                (user_id, display_name, {col}, last_category, last_detail, last_content, last_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                {col} = {update_expr},
                last_category = excluded.last_category,
                last_detail = excluded.last_detail,
                last_content = excluded.last_content,
                last_at = excluded.last_at
            RETURNING {col}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(user_id as i64)
            .bind(&meta.display_name)
            .bind(value)
            .bind(category_tag(category))
            .bind(&meta.detail)
            .bind(&meta.content)
            .bind(&now)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;

        let count: i64 = row.get(0);
        Ok(count as u32)
    }

    async fn get(&self, user_id: u64) -> Result<Option<ViolationRecord>, ModerationError> {
        let row = sqlx::query("SELECT * FROM violations WHERE user_id = ?")
            .bind(user_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        Ok(row.map(|row| ViolationRecord {
            user_id: row.get::<i64, _>("user_id") as u64,
            display_name: row.get("display_name"),
            abusive_count: row.get::<i64, _>("abusive_count") as u32,
            link_count: row.get::<i64, _>("link_count") as u32,
            mention_count: row.get::<i64, _>("mention_count") as u32,
            spam_count: row.get::<i64, _>("spam_count") as u32,
            last_category: row
                .get::<Option<String>, _>("last_category")
                .as_deref()
                .and_then(parse_category_tag),
            last_detail: row.get("last_detail"),
            last_content: row.get("last_content"),
            last_at: row
                .get::<Option<String>, _>("last_at")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }))
    }

    async fn reset(
        &self,
        user_id: u64,
        category: Option<ViolationCategory>,
    ) -> Result<(), ModerationError> {
        match category {
            Some(category) => {
                let sql = format!(
                    "UPDATE violations SET {} = 0 WHERE user_id = ?",
                    column(category)
                );
                sqlx::query(&sql)
                    .bind(user_id as i64)
                    .execute(&self.pool)
                    .await
                    .map_err(storage)?;
            }
            None => {
                // Fresh zero record: counters wiped, identity kept when a
                // record already exists.
                sqlx::query(
                    r#"
                    INSERT INTO violations (user_id)
                    VALUES (?)
                    ON CONFLICT(user_id) DO UPDATE SET
                        abusive_count = 0,
                        link_count = 0,
                        mention_count = 0,
                        spam_count = 0,
                        last_category = NULL,
                        last_detail = NULL,
                        last_content = NULL,
                        last_at = NULL
                    "#,
                )
                .bind(user_id as i64)
                .execute(&self.pool)
                .await
                .map_err(storage)?;
            }
        }
        Ok(())
    }
}
