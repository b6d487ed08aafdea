use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upstream plan tier, set once from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanTier {
    /// Free/basic plans deliver 15-minute delayed data
    Basic,
    /// Paid plans deliver real-time SIP data
    Advanced,
}

impl PlanTier {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "basic" | "free" => Some(PlanTier::Basic),
            "advanced" | "paid" | "realtime" => Some(PlanTier::Advanced),
            _ => None,
        }
    }

    /// Quality tag applied to every tick from this plan. Static per
    /// process, not per record.
    pub fn quality(&self) -> Quality {
        match self {
            PlanTier::Basic => Quality::Delayed,
            PlanTier::Advanced => Quality::Realtime,
        }
    }
}

/// Data quality tag carried on every stored tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    Realtime,
    Delayed,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Realtime => "realtime",
            Quality::Delayed => "delayed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "realtime" => Some(Quality::Realtime),
            "delayed" => Some(Quality::Delayed),
            _ => None,
        }
    }
}

/// Canonical normalized tick, the only shape the pipeline moves around
/// after the normalizer. Ephemeral; persisted as a SessionPrice row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tick {
    pub price: f64,
    pub change_pct: f64,
    pub ts: DateTime<Utc>,
    pub quality: Quality,
}

/// Per-symbol outcome of one `ingest_batch` pass. Expected conditions
/// (gate denied, missing payload, stale tick) are reported here, never
/// raised as errors.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub symbol: String,
    pub success: bool,
    /// Human-readable reason when `success` is false
    pub reason: Option<String>,
}

impl IngestOutcome {
    pub fn ok(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            success: true,
            reason: None,
        }
    }

    pub fn failed(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            success: false,
            reason: Some(reason.into()),
        }
    }
}
