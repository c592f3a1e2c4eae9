//! Immutable value objects. Every type here is constructed only through a
//! fallible factory (`new`/`try_new`) returning `Result<Self, ValidationError>`;
//! no partially-constructed entity escapes into the rest of the crate.

mod agent_response;
mod greeks;
mod health_status;
mod market_context;
mod option_contract;
mod price_bar;
mod quote;
mod scan_run;
mod ticker_info;
mod ticker_score;
mod trade_thesis;
mod watchlist;

pub use agent_response::{AgentResponse, AgentRole, GreeksCited};
pub use greeks::OptionGreeks;
pub use health_status::HealthStatus;
pub use market_context::MarketContext;
pub use option_contract::{GreeksSource, OptionContract, OptionType};
pub use price_bar::PriceBar;
pub use quote::Quote;
pub use scan_run::{ScanRun, ScanStatus};
pub use ticker_info::{AssetType, MarketCapTier, TickerInfo, TickerStatus};
pub use ticker_score::{resort_and_rerank, TickerScore};
pub use trade_thesis::{SignalDirection, TradeThesis};
pub use watchlist::WatchlistSummary;
