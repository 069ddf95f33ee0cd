//! Robots.txt handling module
//!
//! This module provides parsing and caching of robots.txt files. Fetching is
//! abstracted behind [`RobotsSource`] so the politeness gate can load rules
//! through the same static transport the fetch executor uses.

mod cache;
mod parser;

pub use cache::PolitenessPolicy;
pub use parser::RobotsRules;

use async_trait::async_trait;
use url::Url;

/// Outcome of one robots.txt fetch
#[derive(Debug, Clone, PartialEq)]
pub enum RobotsFetch {
    /// The server returned a robots.txt body
    Found(String),
    /// The server answered 4xx: no rules apply
    Missing,
    /// Network failure, timeout or 5xx
    Unavailable(String),
}

/// Anything that can retrieve a robots.txt file
#[async_trait]
pub trait RobotsSource: Send + Sync {
    async fn fetch_robots(&self, robots_url: &Url) -> RobotsFetch;
}

impl RobotsFetch {
    /// Converts the fetch outcome into rules
    ///
    /// Returns `None` when the file was unavailable; the caller decides how
    /// long to keep allowing everything.
    pub fn into_rules(self) -> Option<RobotsRules> {
        match self {
            RobotsFetch::Found(body) => Some(RobotsRules::from_content(&body)),
            RobotsFetch::Missing => Some(RobotsRules::allow_all()),
            RobotsFetch::Unavailable(_) => None,
        }
    }
}
