//! Robots.txt parser implementation
//!
//! Allow/disallow decisions are delegated to the robotstxt crate's matcher.
//! The crawl-delay hint and the disallowed prefix list are read with a small
//! group-aware line parser.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt rules for one site
#[derive(Debug, Clone, PartialEq)]
pub struct RobotsRules {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    /// Whether to allow all (true = allow all, false = parse content)
    allow_all: bool,
}

/// One `User-agent` group: its agents and the directives that follow them
#[derive(Debug, Default)]
struct Group {
    agents: Vec<String>,
    disallow: Vec<String>,
    crawl_delay: Option<f64>,
}

impl RobotsRules {
    /// Creates rules from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates permissive rules that allow everything
    ///
    /// This is used when robots.txt is missing (4xx) or cannot be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Returns the raw robots.txt content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL to check
    /// * `user_agent` - The crawler's product token
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay for a specific user agent, in seconds
    ///
    /// A group naming the agent wins over the `*` group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        if self.allow_all || self.content.is_empty() {
            return None;
        }

        let groups = self.groups();
        let normalized_agent = user_agent.to_lowercase();

        let specific = groups
            .iter()
            .filter(|g| g.agents.iter().any(|ua| ua != "*" && normalized_agent.contains(ua)))
            .find_map(|g| g.crawl_delay);

        specific.or_else(|| {
            groups
                .iter()
                .filter(|g| g.agents.iter().any(|ua| ua == "*"))
                .find_map(|g| g.crawl_delay)
        })
    }

    /// Lists the disallowed path prefixes that apply to the user agent
    ///
    /// Uses the agent's own group when one exists, otherwise the `*` group.
    pub fn disallowed_prefixes(&self, user_agent: &str) -> Vec<String> {
        if self.allow_all || self.content.is_empty() {
            return Vec::new();
        }

        let groups = self.groups();
        let normalized_agent = user_agent.to_lowercase();

        let specific: Vec<&Group> = groups
            .iter()
            .filter(|g| g.agents.iter().any(|ua| ua != "*" && normalized_agent.contains(ua)))
            .collect();

        let chosen: Vec<&Group> = if specific.is_empty() {
            groups
                .iter()
                .filter(|g| g.agents.iter().any(|ua| ua == "*"))
                .collect()
        } else {
            specific
        };

        chosen
            .into_iter()
            .flat_map(|g| g.disallow.iter().cloned())
            .collect()
    }

    /// Splits the content into user-agent groups
    ///
    /// Consecutive `User-agent` lines share a group; the first directive
    /// after them closes the agent list.
    fn groups(&self) -> Vec<Group> {
        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        let mut in_agent_list = false;

        for line in self.content.lines() {
            let trimmed = line.split('#').next().unwrap_or("").trim();
            if trimmed.is_empty() {
                continue;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !in_agent_list && !current.agents.is_empty() {
                        groups.push(std::mem::take(&mut current));
                    }
                    current.agents.push(value.to_lowercase());
                    in_agent_list = true;
                }
                "disallow" => {
                    in_agent_list = false;
                    if !value.is_empty() {
                        current.disallow.push(value.to_string());
                    }
                }
                "crawl-delay" => {
                    in_agent_list = false;
                    if let Ok(delay) = value.parse::<f64>() {
                        if delay.is_finite() && delay >= 0.0 {
                            current.crawl_delay = Some(delay);
                        }
                    }
                }
                _ => {
                    in_agent_list = false;
                }
            }
        }

        if !current.agents.is_empty() {
            groups.push(current);
        }

        groups
    }
}
