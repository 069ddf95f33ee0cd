//! Cached robots.txt policy with TTL-based expiry

use crate::robots::RobotsRules;
use chrono::{DateTime, Duration, Utc};

/// Politeness policy derived from one fetch of a site's robots.txt
///
/// Stores the parsed rules together with the time they were fetched so the
/// gate can decide when a refresh is due.
#[derive(Debug, Clone)]
pub struct PolitenessPolicy {
    /// The parsed robots.txt content
    pub rules: RobotsRules,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,

    /// How long the policy stays fresh
    pub ttl: Duration,
}

impl PolitenessPolicy {
    /// Creates a policy fetched now
    pub fn new(rules: RobotsRules, ttl: Duration) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
            ttl,
        }
    }

    /// Checks if the policy is older than its TTL
    pub fn is_stale(&self) -> bool {
        self.age() > self.ttl
    }

    /// Returns the age of the policy
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    /// Checks if a URL is allowed according to the cached rules
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        self.rules.is_allowed(url, user_agent)
    }

    /// Gets the crawl delay hint in seconds
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        self.rules.crawl_delay(user_agent)
    }

    /// Disallowed path prefixes for the user agent
    pub fn disallowed_prefixes(&self, user_agent: &str) -> Vec<String> {
        self.rules.disallowed_prefixes(user_agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_policy_not_stale() {
        let policy = PolitenessPolicy::new(RobotsRules::allow_all(), Duration::hours(24));
        assert!(!policy.is_stale());
    }

    #[test]
    fn test_policy_is_stale_after_ttl() {
        let mut policy = PolitenessPolicy::new(RobotsRules::allow_all(), Duration::hours(24));
        policy.fetched_at = Utc::now() - Duration::hours(25);
        assert!(policy.is_stale());
    }

    #[test]
    fn test_policy_not_stale_at_23_hours() {
        let mut policy = PolitenessPolicy::new(RobotsRules::allow_all(), Duration::hours(24));
        policy.fetched_at = Utc::now() - Duration::hours(23);
        assert!(!policy.is_stale());
    }

    #[test]
    fn test_custom_ttl() {
        let mut policy = PolitenessPolicy::new(RobotsRules::allow_all(), Duration::minutes(5));
        policy.fetched_at = Utc::now() - Duration::minutes(6);
        assert!(policy.is_stale());
    }

    #[test]
    fn test_delegates_to_rules() {
        let rules = RobotsRules::from_content("User-agent: *\nDisallow: /admin\nCrawl-delay: 4");
        let policy = PolitenessPolicy::new(rules, Duration::hours(24));

        assert!(policy.is_allowed("https://example.com/", "TestBot"));
        assert!(!policy.is_allowed("https://example.com/admin", "TestBot"));
        assert_eq!(policy.crawl_delay("TestBot"), Some(4.0));
        assert_eq!(policy.disallowed_prefixes("TestBot"), vec!["/admin".to_string()]);
    }
}
