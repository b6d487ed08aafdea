use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Exchange timezone for session math
pub const EXCHANGE_TZ: Tz = chrono_tz::America::New_York;

/// A named trading period for an exchange-local date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Session {
    /// Pre-market: 04:00 - 09:30 exchange local
    PreMarket,
    /// Regular session: 09:30 - 16:00 exchange local
    Live,
    /// After-hours: 16:00 - 20:00 exchange local
    AfterHours,
    /// Outside all trading windows (overnight)
    Closed,
}

impl Session {
    /// Stable string key used in storage and cache namespacing
    pub fn as_str(&self) -> &'static str {
        match self {
            Session::PreMarket => "pre",
            Session::Live => "live",
            Session::AfterHours => "after",
            Session::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pre" => Some(Session::PreMarket),
            "live" => Some(Session::Live),
            "after" => Some(Session::AfterHours),
            "closed" => Some(Session::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static weekend/holiday calendar for the exchange.
///
/// Holiday data is baked in; no network I/O so session detection stays
/// deterministic and unit-testable.
#[derive(Debug, Clone)]
pub struct MarketCalendar {
    holidays: &'static [(i32, u32, u32)],
}

/// Full-day US equity market closures, 2025-2026
const US_MARKET_HOLIDAYS: &[(i32, u32, u32)] = &[
    (2025, 1, 1),   // New Year's Day
    (2025, 1, 20),  // Martin Luther King Jr. Day
    (2025, 2, 17),  // Washington's Birthday
    (2025, 4, 18),  // Good Friday
    (2025, 5, 26),  // Memorial Day
    (2025, 6, 19),  // Juneteenth
    (2025, 7, 4),   // Independence Day
    (2025, 9, 1),   // Labor Day
    (2025, 11, 27), // Thanksgiving
    (2025, 12, 25), // Christmas
    (2026, 1, 1),
    (2026, 1, 19),
    (2026, 2, 16),
    (2026, 4, 3),
    (2026, 5, 25),
    (2026, 6, 19),
    (2026, 7, 3), // Independence Day observed
    (2026, 9, 7),
    (2026, 11, 26),
    (2026, 12, 25),
];

impl Default for MarketCalendar {
    fn default() -> Self {
        Self {
            holidays: US_MARKET_HOLIDAYS,
        }
    }
}

impl MarketCalendar {
    pub fn is_weekend(&self, date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays
            .iter()
            .any(|&(y, m, d)| date.year() == y && date.month() == m && date.day() == d)
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !self.is_weekend(date) && !self.is_holiday(date)
    }

    /// Whether the holiday table covers `date`. Outside coverage the
    /// holiday status is indeterminate and callers must fail closed.
    pub fn covers(&self, date: NaiveDate) -> bool {
        let min = self.holidays.iter().map(|h| h.0).min();
        let max = self.holidays.iter().map(|h| h.0).max();
        match (min, max) {
            (Some(lo), Some(hi)) => date.year() >= lo && date.year() <= hi,
            _ => false,
        }
    }

    /// Most recent trading day strictly before `date`
    pub fn prior_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut d = date - chrono::Duration::days(1);
        while !self.is_trading_day(d) {
            d -= chrono::Duration::days(1);
        }
        d
    }
}

/// Map an exchange-local timestamp to its trading session.
///
/// Pure function of the timestamp; weekend/holiday handling is the
/// calendar's job, so a Saturday 10:00 still maps to `Live` here and the
/// pricing state machine downgrades it to frozen.
pub fn detect_session(local: DateTime<Tz>) -> Session {
    let t = local.time();
    // Boundary times are exact; unwraps here are on constants
    let pre_open = NaiveTime::from_hms_opt(4, 0, 0).unwrap();
    let open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    let close = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
    let after_close = NaiveTime::from_hms_opt(20, 0, 0).unwrap();

    if t >= pre_open && t < open {
        Session::PreMarket
    } else if t >= open && t < close {
        Session::Live
    } else if t >= close && t < after_close {
        Session::AfterHours
    } else {
        Session::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
        EXCHANGE_TZ
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
    }

    #[test]
    fn test_session_boundaries() {
        assert_eq!(detect_session(at(2025, 6, 2, 3, 59)), Session::Closed);
        assert_eq!(detect_session(at(2025, 6, 2, 4, 0)), Session::PreMarket);
        assert_eq!(detect_session(at(2025, 6, 2, 9, 29)), Session::PreMarket);
        assert_eq!(detect_session(at(2025, 6, 2, 9, 30)), Session::Live);
        assert_eq!(detect_session(at(2025, 6, 2, 15, 59)), Session::Live);
        assert_eq!(detect_session(at(2025, 6, 2, 16, 0)), Session::AfterHours);
        assert_eq!(detect_session(at(2025, 6, 2, 19, 59)), Session::AfterHours);
        assert_eq!(detect_session(at(2025, 6, 2, 20, 0)), Session::Closed);
    }

    #[test]
    fn test_weekend_and_holiday() {
        let cal = MarketCalendar::default();
        // 2025-06-07 is a Saturday
        assert!(cal.is_weekend(NaiveDate::from_ymd_opt(2025, 6, 7).unwrap()));
        assert!(cal.is_holiday(NaiveDate::from_ymd_opt(2025, 7, 4).unwrap()));
        assert!(cal.is_trading_day(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()));
    }

    #[test]
    fn test_prior_trading_day_skips_weekend() {
        let cal = MarketCalendar::default();
        // Monday 2025-06-09 -> Friday 2025-06-06
        let monday = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
        assert_eq!(
            cal.prior_trading_day(monday),
            NaiveDate::from_ymd_opt(2025, 6, 6).unwrap()
        );
    }

    #[test]
    fn test_prior_trading_day_skips_holiday() {
        let cal = MarketCalendar::default();
        // Monday 2025-07-07 -> Jul 4 is a holiday, Jul 5/6 weekend -> Thu Jul 3
        let after_fourth = NaiveDate::from_ymd_opt(2025, 7, 7).unwrap();
        assert_eq!(
            cal.prior_trading_day(after_fourth),
            NaiveDate::from_ymd_opt(2025, 7, 3).unwrap()
        );
    }

    #[test]
    fn test_session_round_trip_keys() {
        for s in [
            Session::PreMarket,
            Session::Live,
            Session::AfterHours,
            Session::Closed,
        ] {
            assert_eq!(Session::parse(s.as_str()), Some(s));
        }
    }
}
