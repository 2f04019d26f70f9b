//! SQLite persistence for quota counters and donor flags

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use super::donor::DonorDirectory;
use super::store::QuotaStore;
use super::types::{Identity, Lookup, Period, QuotaRecord};
use crate::error::{QuotaError, Result};

/// Open a pool, creating the database file if needed
pub async fn open_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

type QuotaRow = (String, String, i64, i32, Option<String>);

fn row_to_record(row: QuotaRow) -> Result<QuotaRecord> {
    let (identity, period, count, is_authenticated, updated_at) = row;

    Ok(QuotaRecord {
        identity,
        period: period.parse()?,
        count: u32::try_from(count)
            .map_err(|_| QuotaError::Store(format!("count out of range: {}", count)))?,
        is_authenticated: is_authenticated != 0,
        updated_at: updated_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        }),
    })
}

/// Quota store over the `download_quotas` table
#[derive(Debug, Clone)]
pub struct SqliteQuotaStore {
    db: SqlitePool,
}

impl SqliteQuotaStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS download_quotas (
                identity TEXT NOT NULL,
                period TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                is_authenticated INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT,
                PRIMARY KEY (identity, period, is_authenticated)
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_download_quotas_period ON download_quotas(period)")
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Record for (identity, period), if any
    pub async fn fetch(&self, identity: &Identity, period: &Period) -> Result<Option<QuotaRecord>> {
        let row = sqlx::query_as::<_, QuotaRow>(
            r#"
            SELECT identity, period, count, is_authenticated, updated_at
            FROM download_quotas
            WHERE identity = ? AND period = ? AND is_authenticated = ?
            "#,
        )
        .bind(identity.id())
        .bind(period.key())
        .bind(i32::from(identity.is_authenticated()))
        .fetch_optional(&self.db)
        .await?;

        row.map(row_to_record).transpose()
    }

    /// All records of a period, heaviest users first
    pub async fn list_period(&self, period: &Period) -> Result<Vec<QuotaRecord>> {
        let rows = sqlx::query_as::<_, QuotaRow>(
            r#"
            SELECT identity, period, count, is_authenticated, updated_at
            FROM download_quotas
            WHERE period = ?
            ORDER BY count DESC, identity ASC
            "#,
        )
        .bind(period.key())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }
}

#[async_trait]
impl QuotaStore for SqliteQuotaStore {
    async fn lookup(&self, identity: &Identity, period: &Period) -> Lookup {
        self.fetch(identity, period).await.into()
    }

    async fn upsert(&self, record: &QuotaRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO download_quotas (identity, period, count, is_authenticated, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(identity, period, is_authenticated) DO UPDATE SET
                count = MAX(download_quotas.count, excluded.count),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.identity)
        .bind(record.period.key())
        .bind(i64::from(record.count))
        .bind(i32::from(record.is_authenticated))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

/// Donor flags over the `donors` table
#[derive(Debug, Clone)]
pub struct SqliteDonorDirectory {
    db: SqlitePool,
}

impl SqliteDonorDirectory {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS donors (
                account_id TEXT PRIMARY KEY,
                has_donated INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Set or clear the donor flag of an account
    pub async fn set_donor(&self, account_id: &str, has_donated: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO donors (account_id, has_donated, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(account_id) DO UPDATE SET
                has_donated = excluded.has_donated,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(account_id)
        .bind(i32::from(has_donated))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DonorDirectory for SqliteDonorDirectory {
    async fn has_donated(&self, account_id: &str) -> Result<bool> {
        let row = sqlx::query_as::<_, (i32,)>("SELECT has_donated FROM donors WHERE account_id = ?")
            .bind(account_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.map(|(flag,)| flag != 0).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> SqlitePool {
        let pool = open_pool("sqlite::memory:").await.unwrap();
        SqliteQuotaStore::new(pool.clone()).init_db().await.unwrap();
        SqliteDonorDirectory::new(pool.clone()).init_db().await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_upsert_then_lookup() {
        let store = SqliteQuotaStore::new(setup_test_db().await);
        let identity = Identity::Anonymous("anon_1".to_string());
        let period: Period = "2026-10".parse().unwrap();

        assert_eq!(store.lookup(&identity, &period).await, Lookup::NotFound);

        store
            .upsert(&QuotaRecord::new(&identity, period, 1))
            .await
            .unwrap();
        store
            .upsert(&QuotaRecord::new(&identity, period, 2))
            .await
            .unwrap();

        let record = store.fetch(&identity, &period).await.unwrap().unwrap();
        assert_eq!(record.count, 2);
        assert!(!record.is_authenticated);
        assert!(record.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_upsert_keeps_higher_count() {
        let store = SqliteQuotaStore::new(setup_test_db().await);
        let identity = Identity::Account("user-1".to_string());
        let period: Period = "2026-10".parse().unwrap();

        store
            .upsert(&QuotaRecord::new(&identity, period, 5))
            .await
            .unwrap();
        store
            .upsert(&QuotaRecord::new(&identity, period, 1))
            .await
            .unwrap();

        let record = store.fetch(&identity, &period).await.unwrap().unwrap();
        assert_eq!(record.count, 5);
    }

    #[tokio::test]
    async fn test_donor_flag() {
        let donors = SqliteDonorDirectory::new(setup_test_db().await);

        assert!(!donors.has_donated("user-1").await.unwrap());

        donors.set_donor("user-1", true).await.unwrap();
        assert!(donors.has_donated("user-1").await.unwrap());

        donors.set_donor("user-1", false).await.unwrap();
        assert!(!donors.has_donated("user-1").await.unwrap());
    }
}
