//! Pricing state machine: the single source of truth for "may we write
//! now, and how."
//!
//! Re-evaluated on every orchestrator pass (polled, not edge-triggered)
//! from the current exchange-local time plus stored reference data. The
//! contract downstream code relies on:
//!
//! - `can_ingest == false` short-circuits the whole symbol: no upstream
//!   call, no DB write, no cache write.
//! - `use_frozen_price == true` with `can_overwrite == false` means any
//!   freshly computed tick is discarded, never stored as zero or stale.

use chrono::DateTime;
use chrono_tz::Tz;
use tracing::warn;

use crate::models::{detect_session, MarketCalendar, PricingDecision, PricingState, Session};

/// Evaluate write permissions for one symbol at `local_now`.
///
/// `previous_close` is the adjusted reference from DailyRef, when the
/// bootstrap has run. A non-finite or non-positive reference is treated
/// as absent rather than propagated into percent-change math.
pub fn evaluate(
    local_now: DateTime<Tz>,
    calendar: &MarketCalendar,
    previous_close: Option<f64>,
) -> PricingDecision {
    let date = local_now.date_naive();
    let reference = previous_close.filter(|p| p.is_finite() && *p > 0.0);
    if reference.is_none() && previous_close.is_some() {
        warn!(
            previous_close = ?previous_close,
            "discarding non-positive reference close"
        );
    }

    // Holiday status is unknowable outside calendar coverage; fail closed
    // rather than risk overwriting frozen prices on an unlisted holiday.
    if !calendar.covers(date) {
        warn!(date = %date, "date outside holiday calendar coverage, failing closed");
        return PricingDecision::frozen(PricingState::HolidayFrozen, reference);
    }

    if calendar.is_weekend(date) {
        return PricingDecision::frozen(PricingState::WeekendFrozen, reference);
    }
    if calendar.is_holiday(date) {
        return PricingDecision::frozen(PricingState::HolidayFrozen, reference);
    }

    match detect_session(local_now) {
        Session::PreMarket => PricingDecision::active(PricingState::PreMarket, reference),
        Session::Live => PricingDecision::active(PricingState::Live, reference),
        Session::AfterHours => PricingDecision::active(PricingState::AfterHoursActive, reference),
        // Overnight: the stored after-hours price is authoritative until
        // pre-market opens. A zero/blank incoming price must never
        // overwrite it.
        Session::Closed => PricingDecision::frozen(PricingState::OvernightFrozen, reference),
    }
}
