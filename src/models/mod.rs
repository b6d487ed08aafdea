mod pricing;
mod records;
mod session;
mod snapshot;
mod tick;

pub use pricing::{PricingDecision, PricingState};
pub use records::{DailyRef, SessionPrice, Ticker};
pub use session::{detect_session, MarketCalendar, Session, EXCHANGE_TZ};
pub use snapshot::{DailyBar, DayBar, LastQuote, LastTrade, PriceSource, RawSnapshot};
pub use tick::{IngestOutcome, PlanTier, Quality, Tick};
