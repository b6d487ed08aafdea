use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Quality, Session};

/// Instrument identity row. Identity fields (name, sector, industry) are
/// written by the out-of-band company bootstrap only; the ingestion hot
/// path may touch `updated_at` and nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub shares_outstanding: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// One stored price row per (symbol, date, session). `last_ts` is
/// monotonic: an upsert with an older timestamp is skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPrice {
    pub symbol: String,
    pub date: NaiveDate,
    pub session: Session,
    pub last_price: f64,
    pub last_ts: DateTime<Utc>,
    pub change_pct: f64,
    pub quality: Quality,
}

/// Split-adjusted reference closes for one (symbol, date).
///
/// `previous_close` is written by the bootstrap before open and takes
/// precedence over any unadjusted prevDay value a later snapshot embeds.
/// `regular_close` is written once at the close event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRef {
    pub symbol: String,
    pub date: NaiveDate,
    pub previous_close: Option<f64>,
    pub regular_close: Option<f64>,
}
