//! Idempotent SQLite persistence for tickers, session prices and daily
//! reference closes.
//!
//! The central invariant lives in [`Database::upsert_session_price`]:
//! per (symbol, date, session) key, stored `last_ts` is monotonic. A
//! delayed or out-of-order batch can never clobber newer data, and
//! re-running an ingest pass with the same payload is a no-op.

use sqlx::{sqlite::SqliteConnectOptions, Row, SqlitePool};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::{DailyRef, Quality, Session, SessionPrice, Tick, Ticker};

/// Outcome of a conditional session-price write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertResult {
    Written,
    /// Incoming timestamp was older than the stored row; skipped by design
    SkippedStale,
}

#[derive(Debug)]
pub struct Database {
    pool: SqlitePool,
    /// Per (symbol, date, session) critical sections serializing
    /// read-before-write upserts
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Database {
    /// Open (or create) the database file and run schema migrations
    pub async fn new(database_path: PathBuf) -> Result<Self> {
        info!("Initializing SQLite database at: {:?}", database_path);

        if let Some(parent) = database_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(&database_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(connect_options).await?;
        let db = Self {
            pool,
            key_locks: Mutex::new(HashMap::new()),
        };
        db.initialize_schema().await?;
        info!("SQLite database initialized");
        Ok(db)
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tickers (
                symbol TEXT PRIMARY KEY,
                name TEXT,
                sector TEXT,
                industry TEXT,
                shares_outstanding INTEGER,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_prices (
                symbol TEXT NOT NULL,
                date TEXT NOT NULL,
                session TEXT NOT NULL,
                last_price REAL NOT NULL,
                last_ts INTEGER NOT NULL,
                change_pct REAL NOT NULL,
                quality TEXT NOT NULL,
                UNIQUE(symbol, date, session)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_refs (
                symbol TEXT NOT NULL,
                date TEXT NOT NULL,
                previous_close REAL,
                regular_close REAL,
                UNIQUE(symbol, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_session_prices_date ON session_prices(date, session)",
            "CREATE INDEX IF NOT EXISTS idx_daily_refs_date ON daily_refs(date)",
        ];
        for index in indexes {
            sqlx::query(index).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap();
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Ensure a ticker row exists and refresh `updated_at`. Identity
    /// fields (name/sector/industry/shares) belong to the out-of-band
    /// company bootstrap and are never written from the hot path.
    pub async fn touch_ticker(&self, symbol: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tickers (symbol, updated_at) VALUES (?, ?)
            ON CONFLICT(symbol) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(symbol)
        .bind(now.timestamp_micros())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Out-of-band identity bootstrap; the only writer of identity fields
    pub async fn set_ticker_identity(
        &self,
        symbol: &str,
        name: Option<&str>,
        sector: Option<&str>,
        industry: Option<&str>,
        shares_outstanding: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tickers (symbol, name, sector, industry, shares_outstanding, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                name = excluded.name,
                sector = excluded.sector,
                industry = excluded.industry,
                shares_outstanding = excluded.shares_outstanding
            "#,
        )
        .bind(symbol)
        .bind(name)
        .bind(sector)
        .bind(industry)
        .bind(shares_outstanding)
        .bind(Utc::now().timestamp_micros())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_ticker(&self, symbol: &str) -> Result<Option<Ticker>> {
        let row = sqlx::query(
            "SELECT symbol, name, sector, industry, shares_outstanding, updated_at FROM tickers WHERE symbol = ?",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Ticker {
            symbol: r.get("symbol"),
            name: r.get("name"),
            sector: r.get("sector"),
            industry: r.get("industry"),
            shares_outstanding: r.get("shares_outstanding"),
            updated_at: micros_to_utc(r.get("updated_at")),
        }))
    }

    /// Conditional write for one (symbol, date, session) key.
    ///
    /// Read-before-write under a per-key lock: the row is written only
    /// when absent or when `tick.ts >= stored.last_ts`. A stale tick is
    /// skipped and logged, which is the designed behavior under
    /// out-of-order delivery, not an error.
    pub async fn upsert_session_price(
        &self,
        symbol: &str,
        date: NaiveDate,
        session: Session,
        tick: &Tick,
    ) -> Result<UpsertResult> {
        let key = format!("{}|{}|{}", symbol, date, session.as_str());
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let existing_ts: Option<i64> = sqlx::query(
            "SELECT last_ts FROM session_prices WHERE symbol = ? AND date = ? AND session = ?",
        )
        .bind(symbol)
        .bind(date.to_string())
        .bind(session.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(|r| r.get("last_ts"));

        if let Some(stored) = existing_ts {
            if tick.ts.timestamp_micros() < stored {
                debug!(
                    symbol,
                    session = %session,
                    incoming_ts = tick.ts.timestamp_micros(),
                    stored_ts = stored,
                    "stale tick skipped"
                );
                return Ok(UpsertResult::SkippedStale);
            }
        }

        sqlx::query(
            r#"
            INSERT INTO session_prices (symbol, date, session, last_price, last_ts, change_pct, quality)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol, date, session) DO UPDATE SET
                last_price = excluded.last_price,
                last_ts = excluded.last_ts,
                change_pct = excluded.change_pct,
                quality = excluded.quality
            "#,
        )
        .bind(symbol)
        .bind(date.to_string())
        .bind(session.as_str())
        .bind(tick.price)
        .bind(tick.ts.timestamp_micros())
        .bind(tick.change_pct)
        .bind(tick.quality.as_str())
        .execute(&self.pool)
        .await?;

        Ok(UpsertResult::Written)
    }

    pub async fn get_session_price(
        &self,
        symbol: &str,
        date: NaiveDate,
        session: Session,
    ) -> Result<Option<SessionPrice>> {
        let row = sqlx::query(
            r#"
            SELECT symbol, date, session, last_price, last_ts, change_pct, quality
            FROM session_prices WHERE symbol = ? AND date = ? AND session = ?
            "#,
        )
        .bind(symbol)
        .bind(date.to_string())
        .bind(session.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let date_str: String = r.get("date");
            let session_str: String = r.get("session");
            let quality_str: String = r.get("quality");
            Ok(SessionPrice {
                symbol: r.get("symbol"),
                date: date_str
                    .parse()
                    .map_err(|e| AppError::Parse(format!("bad date in session_prices: {}", e)))?,
                session: Session::parse(&session_str).ok_or_else(|| {
                    AppError::Parse(format!("bad session in session_prices: {}", session_str))
                })?,
                last_price: r.get("last_price"),
                last_ts: micros_to_utc(r.get("last_ts")),
                change_pct: r.get("change_pct"),
                quality: Quality::parse(&quality_str).ok_or_else(|| {
                    AppError::Parse(format!("bad quality in session_prices: {}", quality_str))
                })?,
            })
        })
        .transpose()
    }

    /// Store the split-adjusted previous close for (symbol, date).
    ///
    /// Callers must only pass values from the adjusted aggregates
    /// endpoint; this is the value that overrides any unadjusted prevDay
    /// field later snapshots embed.
    pub async fn set_previous_close(
        &self,
        symbol: &str,
        date: NaiveDate,
        previous_close: f64,
    ) -> Result<()> {
        if !(previous_close.is_finite() && previous_close > 0.0) {
            return Err(AppError::InvalidInput(format!(
                "refusing non-positive previous close {} for {}",
                previous_close, symbol
            )));
        }
        sqlx::query(
            r#"
            INSERT INTO daily_refs (symbol, date, previous_close) VALUES (?, ?, ?)
            ON CONFLICT(symbol, date) DO UPDATE SET previous_close = excluded.previous_close
            "#,
        )
        .bind(symbol)
        .bind(date.to_string())
        .bind(previous_close)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Store the official same-day close at the close event. Write-once:
    /// an existing regular close is never silently replaced.
    pub async fn set_regular_close(
        &self,
        symbol: &str,
        date: NaiveDate,
        regular_close: f64,
    ) -> Result<()> {
        if !(regular_close.is_finite() && regular_close > 0.0) {
            return Err(AppError::InvalidInput(format!(
                "refusing non-positive regular close {} for {}",
                regular_close, symbol
            )));
        }
        sqlx::query(
            r#"
            INSERT INTO daily_refs (symbol, date, regular_close) VALUES (?, ?, ?)
            ON CONFLICT(symbol, date) DO UPDATE SET
                regular_close = excluded.regular_close
                WHERE daily_refs.regular_close IS NULL
            "#,
        )
        .bind(symbol)
        .bind(date.to_string())
        .bind(regular_close)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_daily_ref(&self, symbol: &str, date: NaiveDate) -> Result<Option<DailyRef>> {
        let row = sqlx::query(
            "SELECT symbol, date, previous_close, regular_close FROM daily_refs WHERE symbol = ? AND date = ?",
        )
        .bind(symbol)
        .bind(date.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let date_str: String = r.get("date");
            Ok(DailyRef {
                symbol: r.get("symbol"),
                date: date_str
                    .parse()
                    .map_err(|e| AppError::Parse(format!("bad date in daily_refs: {}", e)))?,
                previous_close: r.get("previous_close"),
                regular_close: r.get("regular_close"),
            })
        })
        .transpose()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn micros_to_utc(micros: i64) -> DateTime<Utc> {
    Utc.timestamp_micros(micros)
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tick(price: f64, ts_secs: i64) -> Tick {
        Tick {
            price,
            change_pct: 0.5,
            ts: Utc.timestamp_opt(ts_secs, 0).single().unwrap(),
            quality: Quality::Realtime,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    async fn open_db(dir: &tempfile::TempDir) -> Database {
        Database::new(dir.path().join("test.db")).await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_then_read_back() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir).await;

        let res = db
            .upsert_session_price("AAPL", date(), Session::Live, &tick(190.5, 1000))
            .await
            .unwrap();
        assert_eq!(res, UpsertResult::Written);

        let row = db
            .get_session_price("AAPL", date(), Session::Live)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.last_price, 190.5);
        assert_eq!(row.session, Session::Live);
        assert_eq!(row.quality, Quality::Realtime);
        db.close().await;
    }

    #[tokio::test]
    async fn test_monotonic_timestamps() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir).await;

        // Writes at t=1000, t=3000, then a delayed batch at t=2000
        for (price, ts) in [(100.0, 1000), (102.0, 3000)] {
            db.upsert_session_price("AAPL", date(), Session::Live, &tick(price, ts))
                .await
                .unwrap();
        }
        let res = db
            .upsert_session_price("AAPL", date(), Session::Live, &tick(50.0, 2000))
            .await
            .unwrap();
        assert_eq!(res, UpsertResult::SkippedStale);

        let row = db
            .get_session_price("AAPL", date(), Session::Live)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.last_price, 102.0);
        assert_eq!(row.last_ts.timestamp(), 3000);
        db.close().await;
    }

    #[tokio::test]
    async fn test_equal_timestamp_is_accepted() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir).await;

        db.upsert_session_price("AAPL", date(), Session::Live, &tick(100.0, 1000))
            .await
            .unwrap();
        let res = db
            .upsert_session_price("AAPL", date(), Session::Live, &tick(101.0, 1000))
            .await
            .unwrap();
        assert_eq!(res, UpsertResult::Written);
        db.close().await;
    }

    #[tokio::test]
    async fn test_sessions_are_distinct_rows() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir).await;

        db.upsert_session_price("AAPL", date(), Session::Live, &tick(100.0, 1000))
            .await
            .unwrap();
        db.upsert_session_price("AAPL", date(), Session::AfterHours, &tick(101.5, 2000))
            .await
            .unwrap();

        let live = db
            .get_session_price("AAPL", date(), Session::Live)
            .await
            .unwrap()
            .unwrap();
        let after = db
            .get_session_price("AAPL", date(), Session::AfterHours)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live.last_price, 100.0);
        assert_eq!(after.last_price, 101.5);
        db.close().await;
    }

    #[tokio::test]
    async fn test_touch_ticker_preserves_identity() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir).await;

        db.set_ticker_identity(
            "AAPL",
            Some("Apple Inc."),
            Some("Technology"),
            None,
            Some(15_000_000_000),
        )
        .await
        .unwrap();
        db.touch_ticker("AAPL", Utc::now()).await.unwrap();

        let t = db.get_ticker("AAPL").await.unwrap().unwrap();
        assert_eq!(t.name.as_deref(), Some("Apple Inc."));
        assert_eq!(t.sector.as_deref(), Some("Technology"));
        assert_eq!(t.shares_outstanding, Some(15_000_000_000));
        db.close().await;
    }

    #[tokio::test]
    async fn test_regular_close_is_write_once() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir).await;

        db.set_regular_close("AAPL", date(), 190.0).await.unwrap();
        db.set_regular_close("AAPL", date(), 10.0).await.unwrap();

        let r = db.get_daily_ref("AAPL", date()).await.unwrap().unwrap();
        assert_eq!(r.regular_close, Some(190.0));
        db.close().await;
    }

    #[tokio::test]
    async fn test_previous_close_rejects_bad_values() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir).await;

        assert!(db.set_previous_close("AAPL", date(), 0.0).await.is_err());
        assert!(db.set_previous_close("AAPL", date(), -5.0).await.is_err());
        assert!(db.get_daily_ref("AAPL", date()).await.unwrap().is_none());
        db.close().await;
    }

    #[tokio::test]
    async fn test_previous_and_regular_close_coexist() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir).await;

        db.set_previous_close("AAPL", date(), 150.0).await.unwrap();
        db.set_regular_close("AAPL", date(), 152.5).await.unwrap();

        let r = db.get_daily_ref("AAPL", date()).await.unwrap().unwrap();
        assert_eq!(r.previous_close, Some(150.0));
        assert_eq!(r.regular_close, Some(152.5));
        db.close().await;
    }
}
