use serde::Serialize;

/// Write-permission state for one symbol at one moment.
///
/// Active states allow ingest and overwrite; frozen states protect
/// whatever is already stored. `OvernightFrozen` exists so a blank
/// overnight snapshot can never clobber the last after-hours price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PricingState {
    Live,
    PreMarket,
    AfterHoursActive,
    OvernightFrozen,
    WeekendFrozen,
    HolidayFrozen,
}

impl PricingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingState::Live => "live",
            PricingState::PreMarket => "premarket",
            PricingState::AfterHoursActive => "afterhours_active",
            PricingState::OvernightFrozen => "overnight_frozen",
            PricingState::WeekendFrozen => "weekend_frozen",
            PricingState::HolidayFrozen => "holiday_frozen",
        }
    }
}

impl std::fmt::Display for PricingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one state-machine evaluation. Produced and consumed once per
/// orchestrator pass, never persisted.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PricingDecision {
    pub state: PricingState,
    /// May we call upstream and write at all
    pub can_ingest: bool,
    /// May a freshly computed tick replace the stored one
    pub can_overwrite: bool,
    /// Stored price is authoritative; discard computed ticks
    pub use_frozen_price: bool,
    /// Adjusted previous close to compute percent change against
    pub reference_price: Option<f64>,
}

impl PricingDecision {
    pub fn active(state: PricingState, reference_price: Option<f64>) -> Self {
        Self {
            state,
            can_ingest: true,
            can_overwrite: true,
            use_frozen_price: false,
            reference_price,
        }
    }

    pub fn frozen(state: PricingState, reference_price: Option<f64>) -> Self {
        Self {
            state,
            can_ingest: false,
            can_overwrite: false,
            use_frozen_price: true,
            reference_price,
        }
    }
}
