//! Snapshot normalizer: collapse a heterogeneous provider payload into
//! the canonical tick shape, or nothing at all. Never a coerced zero.

use tracing::warn;

use crate::models::{Quality, RawSnapshot, Tick};

/// Extract a canonical (price, change_pct, timestamp, quality) tuple.
///
/// Price source priority is last trade, last quote, day close (resolved
/// in [`RawSnapshot::price_source`]). Percent change is computed against
/// the split-adjusted previous close when the bootstrap has supplied
/// one; otherwise against the unadjusted `prevDay` close embedded in the
/// snapshot, which is a degraded-accuracy path around split days and is
/// logged as such.
pub fn normalize(
    raw: &RawSnapshot,
    adjusted_previous_close: Option<f64>,
    quality: Quality,
) -> Option<Tick> {
    let source = raw.price_source()?;
    let price = source.price();

    let reference = match adjusted_previous_close.filter(|p| *p > 0.0) {
        Some(adjusted) => Some(adjusted),
        None => {
            let fallback = raw.unadjusted_prev_close();
            if fallback.is_some() {
                warn!(
                    symbol = %raw.ticker,
                    degraded_reference = true,
                    "no adjusted previous close, falling back to unadjusted snapshot field"
                );
            }
            fallback
        }
    };

    let change_pct = match reference {
        Some(prev) => (price / prev - 1.0) * 100.0,
        None => 0.0,
    };

    Some(Tick {
        price,
        change_pct,
        ts: source.timestamp(),
        quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DayBar, LastTrade};

    fn snapshot_with_trade(price: f64, prev_day_close: f64) -> RawSnapshot {
        RawSnapshot {
            ticker: "TEST".to_string(),
            last_trade: Some(LastTrade {
                p: price,
                t: 1_750_000_000_000_000_000,
            }),
            last_quote: None,
            day: None,
            prev_day: Some(DayBar {
                c: prev_day_close,
                ..Default::default()
            }),
            updated: None,
        }
    }

    #[test]
    fn test_change_uses_adjusted_reference_over_unadjusted() {
        // Post-split scenario: adjusted previous close is 75, the
        // provider still embeds the unadjusted 150
        let raw = snapshot_with_trade(76.0, 150.0);
        let tick = normalize(&raw, Some(75.0), Quality::Realtime).unwrap();
        assert!((tick.change_pct - (76.0 / 75.0 - 1.0) * 100.0).abs() < 1e-9);
        assert!((tick.change_pct - 1.3333).abs() < 0.001);
    }

    #[test]
    fn test_unadjusted_fallback_when_no_bootstrap() {
        let raw = snapshot_with_trade(151.5, 150.0);
        let tick = normalize(&raw, None, Quality::Delayed).unwrap();
        assert!((tick.change_pct - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_reference_yields_zero_change() {
        let mut raw = snapshot_with_trade(100.0, 0.0);
        raw.prev_day = None;
        let tick = normalize(&raw, None, Quality::Realtime).unwrap();
        assert_eq!(tick.change_pct, 0.0);
        assert_eq!(tick.price, 100.0);
    }

    #[test]
    fn test_no_positive_price_returns_none() {
        let raw = RawSnapshot {
            ticker: "TEST".to_string(),
            last_trade: Some(LastTrade { p: 0.0, t: 1 }),
            last_quote: None,
            day: None,
            prev_day: Some(DayBar {
                c: 150.0,
                ..Default::default()
            }),
            updated: None,
        };
        assert!(normalize(&raw, Some(150.0), Quality::Realtime).is_none());
    }

    #[test]
    fn test_quality_tag_is_caller_supplied() {
        let raw = snapshot_with_trade(10.0, 10.0);
        let tick = normalize(&raw, Some(10.0), Quality::Delayed).unwrap();
        assert_eq!(tick.quality, Quality::Delayed);
    }
}
