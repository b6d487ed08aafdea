use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Last-trade block of a provider snapshot (price + SIP timestamp in ns)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LastTrade {
    pub p: f64,
    pub t: i64,
}

/// Last-quote block: bid/ask plus SIP timestamp in ns
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LastQuote {
    /// Bid price
    #[serde(default)]
    pub p: f64,
    /// Ask price
    #[serde(rename = "P", default)]
    pub ap: f64,
    pub t: i64,
}

/// Daily OHLC bar block inside a snapshot (`day` / `prevDay`)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DayBar {
    #[serde(default)]
    pub o: f64,
    #[serde(default)]
    pub h: f64,
    #[serde(default)]
    pub l: f64,
    #[serde(default)]
    pub c: f64,
    #[serde(default)]
    pub v: f64,
}

/// One symbol's current-state quote payload as delivered by the provider.
///
/// Every block is optional in practice: off-hours snapshots drop
/// `lastTrade`, thin symbols drop `lastQuote`, and fresh listings have no
/// `prevDay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSnapshot {
    pub ticker: String,
    #[serde(default)]
    pub last_trade: Option<LastTrade>,
    #[serde(default)]
    pub last_quote: Option<LastQuote>,
    #[serde(default)]
    pub day: Option<DayBar>,
    #[serde(default)]
    pub prev_day: Option<DayBar>,
    /// Provider-side last update time, ns since epoch
    #[serde(default)]
    pub updated: Option<i64>,
}

/// Resolved price source for one snapshot, in priority order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceSource {
    LastTrade { price: f64, ts_ns: i64 },
    LastQuote { price: f64, ts_ns: i64 },
    DayClose { price: f64, ts_ns: i64 },
}

impl PriceSource {
    pub fn price(&self) -> f64 {
        match *self {
            PriceSource::LastTrade { price, .. }
            | PriceSource::LastQuote { price, .. }
            | PriceSource::DayClose { price, .. } => price,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        let ns = match *self {
            PriceSource::LastTrade { ts_ns, .. }
            | PriceSource::LastQuote { ts_ns, .. }
            | PriceSource::DayClose { ts_ns, .. } => ts_ns,
        };
        Utc.timestamp_nanos(ns)
    }
}

impl RawSnapshot {
    /// Resolve the best available price source by explicit priority:
    /// last trade, then last quote, then day close. A source only
    /// qualifies with a strictly positive price; otherwise fall through.
    pub fn price_source(&self) -> Option<PriceSource> {
        if let Some(trade) = &self.last_trade {
            if trade.p > 0.0 {
                return Some(PriceSource::LastTrade {
                    price: trade.p,
                    ts_ns: trade.t,
                });
            }
        }
        if let Some(quote) = &self.last_quote {
            // Midpoint when both sides are present, else whichever side is
            let price = match (quote.p > 0.0, quote.ap > 0.0) {
                (true, true) => (quote.p + quote.ap) / 2.0,
                (true, false) => quote.p,
                (false, true) => quote.ap,
                (false, false) => 0.0,
            };
            if price > 0.0 {
                return Some(PriceSource::LastQuote {
                    price,
                    ts_ns: quote.t,
                });
            }
        }
        if let Some(day) = &self.day {
            if day.c > 0.0 {
                // Day bars carry no trade timestamp; best effort is the
                // provider's own update time, else "now"
                let ts_ns = self
                    .updated
                    .unwrap_or_else(|| Utc::now().timestamp_nanos_opt().unwrap_or(0));
                return Some(PriceSource::DayClose {
                    price: day.c,
                    ts_ns,
                });
            }
        }
        None
    }

    /// Unadjusted prior-day close embedded by the provider. Only a
    /// degraded fallback; DailyRef.previous_close wins when present.
    pub fn unadjusted_prev_close(&self) -> Option<f64> {
        self.prev_day.map(|d| d.c).filter(|c| *c > 0.0)
    }
}

/// One adjusted daily aggregate row from the historical endpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyBar {
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
    /// Bar start, ms since epoch
    pub t: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(
        trade: Option<LastTrade>,
        quote: Option<LastQuote>,
        day: Option<DayBar>,
    ) -> RawSnapshot {
        RawSnapshot {
            ticker: "TEST".to_string(),
            last_trade: trade,
            last_quote: quote,
            day,
            prev_day: None,
            updated: Some(1_700_000_000_000_000_000),
        }
    }

    #[test]
    fn test_trade_beats_quote_and_day() {
        let s = snap(
            Some(LastTrade { p: 101.0, t: 1 }),
            Some(LastQuote {
                p: 100.0,
                ap: 102.0,
                t: 2,
            }),
            Some(DayBar {
                c: 99.0,
                ..Default::default()
            }),
        );
        assert_eq!(
            s.price_source(),
            Some(PriceSource::LastTrade {
                price: 101.0,
                ts_ns: 1
            })
        );
    }

    #[test]
    fn test_quote_midpoint_fallback() {
        let s = snap(
            None,
            Some(LastQuote {
                p: 100.0,
                ap: 102.0,
                t: 7,
            }),
            None,
        );
        assert_eq!(
            s.price_source(),
            Some(PriceSource::LastQuote {
                price: 101.0,
                ts_ns: 7
            })
        );
    }

    #[test]
    fn test_zero_trade_price_falls_through() {
        let s = snap(
            Some(LastTrade { p: 0.0, t: 1 }),
            None,
            Some(DayBar {
                c: 55.5,
                ..Default::default()
            }),
        );
        match s.price_source() {
            Some(PriceSource::DayClose { price, .. }) => assert_eq!(price, 55.5),
            other => panic!("expected day close, got {:?}", other),
        }
    }

    #[test]
    fn test_no_positive_source_is_none() {
        let s = snap(None, None, None);
        assert!(s.price_source().is_none());
    }

    #[test]
    fn test_deserialize_provider_payload() {
        let json = r#"{
            "ticker": "AAPL",
            "lastTrade": {"p": 190.12, "t": 1717000000000000000},
            "lastQuote": {"p": 190.10, "P": 190.14, "t": 1717000000000000000},
            "day": {"o": 189.0, "h": 191.0, "l": 188.5, "c": 190.0, "v": 1000.0},
            "prevDay": {"o": 188.0, "h": 190.0, "l": 187.0, "c": 189.5, "v": 900.0},
            "updated": 1717000000000000000
        }"#;
        let s: RawSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(s.ticker, "AAPL");
        assert_eq!(s.unadjusted_prev_close(), Some(189.5));
    }
}
