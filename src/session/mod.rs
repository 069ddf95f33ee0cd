//! Crawl sessions
//!
//! One [`CrawlSession`] per site: a state machine that seeds a FIFO frontier,
//! consults the politeness gate, fetches, stores and follows links until the
//! page limit is reached or the frontier runs dry.

mod runner;
mod state;

pub use runner::CrawlSession;
pub use state::SessionState;
