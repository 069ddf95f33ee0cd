//! Politeness gate
//!
//! Per-site rate limiting (minimum inter-request delay, concurrency tokens,
//! robots.txt crawl-delay) and the robots.txt allow/deny decision used by
//! crawl sessions before every fetch.

mod gate;
mod site_state;

pub use gate::{Cancelled, Permit, PolitenessGate, RobotsVerdict};
pub use site_state::SiteState;
