//! SQLite persistence for leads, the query log, the cost log and the
//! classification audit trail.
//!
//! Uniqueness of a lead is enforced by the `leads.url` constraint, not by
//! the caller: concurrent inserts of the same canonical key leave one row.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use leadscout_common::{AuditRecord, CostRecord, Lead, QueryRecord};

use crate::traits::{InsertOutcome, LeadStore};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS queries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        query_text TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS leads (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL UNIQUE,
        profile_url TEXT NOT NULL,
        name TEXT NOT NULL DEFAULT '',
        job_title TEXT NOT NULL DEFAULT '',
        company TEXT NOT NULL DEFAULT '',
        location TEXT NOT NULL DEFAULT '',
        emails TEXT NOT NULL DEFAULT '[]',
        bio TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS cost_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        model TEXT NOT NULL,
        prompt_tokens INTEGER NOT NULL,
        completion_tokens INTEGER NOT NULL,
        cost_usd REAL NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS lead_audit (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        url TEXT NOT NULL,
        canonical_key TEXT NOT NULL,
        verdict TEXT NOT NULL,
        reason TEXT NOT NULL,
        query TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_queries_created_at ON queries (created_at)",
];

#[derive(Clone)]
pub struct SqliteLeadStore {
    pool: SqlitePool,
}

impl SqliteLeadStore {
    /// Open (creating if needed) the database at `database_url` and apply the
    /// schema.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid DATABASE_URL {database_url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("connecting to SQLite")?;

        let store = Self { pool };
        store.migrate().await?;
        info!(database_url, "Lead store ready");
        Ok(store)
    }

    /// Private in-memory database. One connection, so every query sees the
    /// same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("opening in-memory SQLite")?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&self.pool)
                .await
                .context("applying schema")?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl LeadStore for SqliteLeadStore {
    async fn insert_lead(&self, lead: &Lead) -> Result<InsertOutcome> {
        let emails = serde_json::to_string(&lead.emails)?;
        let result = sqlx::query(
            "INSERT INTO leads (url, profile_url, name, job_title, company, location, emails, bio, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT(url) DO NOTHING",
        )
        .bind(&lead.url)
        .bind(&lead.profile_url)
        .bind(&lead.name)
        .bind(&lead.job_title)
        .bind(&lead.company)
        .bind(&lead.location)
        .bind(emails)
        .bind(&lead.bio)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("inserting lead")?;

        Ok(if result.rows_affected() == 1 {
            InsertOutcome::Fresh
        } else {
            InsertOutcome::Duplicate
        })
    }

    async fn lead_urls(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>("SELECT url FROM leads")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(url,)| url).collect())
    }

    async fn count_leads(&self) -> Result<u64> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM leads")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn append_query(&self, query_text: &str) -> Result<()> {
        sqlx::query("INSERT INTO queries (query_text, created_at) VALUES ($1, $2)")
            .bind(query_text)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recent_queries(&self, limit: u32) -> Result<Vec<QueryRecord>> {
        let rows = sqlx::query_as::<_, (i64, String, DateTime<Utc>)>(
            "SELECT id, query_text, created_at FROM queries ORDER BY id DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, query_text, created_at)| QueryRecord {
                id,
                query_text,
                created_at,
            })
            .collect())
    }

    async fn append_cost(&self, record: &CostRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO cost_log (session_id, model, prompt_tokens, completion_tokens, cost_usd, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.session_id.to_string())
        .bind(&record.model)
        .bind(i64::from(record.prompt_tokens))
        .bind(i64::from(record.completion_tokens))
        .bind(record.cost_usd)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn total_cost(&self) -> Result<f64> {
        let (total,) =
            sqlx::query_as::<_, (f64,)>("SELECT COALESCE(SUM(cost_usd), 0.0) FROM cost_log")
                .fetch_one(&self.pool)
                .await?;
        Ok(total)
    }

    async fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO lead_audit (session_id, url, canonical_key, verdict, reason, query, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.session_id.to_string())
        .bind(&record.url)
        .bind(&record.canonical_key)
        .bind(record.verdict.as_str())
        .bind(&record.reason)
        .bind(&record.query)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
