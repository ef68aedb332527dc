//! Robots.txt parser
//!
//! Allow/disallow matching is delegated to the robotstxt crate; the
//! `Crawl-delay` extension is parsed here since the crate ignores it.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Longest `Crawl-delay` honoured; larger values are clamped to this
pub const MAX_CRAWL_DELAY: Duration = Duration::from_secs(60);

/// Parsed robots.txt for one origin, bound to the crawler's user agent
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content
    content: String,
    /// Product token matched against `User-agent` lines
    agent: String,
    /// True when the origin had no usable robots.txt
    allow_all: bool,
    crawl_delay: Option<Duration>,
}

impl ParsedRobots {
    /// Parses robots.txt content for the given user agent string
    ///
    /// # Arguments
    ///
    /// * `content` - Raw robots.txt body
    /// * `user_agent` - Full User-Agent header; only the product token
    ///   (`webrecon` in `webrecon/0.1.0`) is matched against groups
    ///
    /// # Examples
    ///
    /// ```
    /// use webrecon::robots::ParsedRobots;
    ///
    /// let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /admin", "webrecon/0.1.0");
    /// assert!(!robots.is_allowed("https://example.com/admin"));
    /// assert!(robots.is_allowed("https://example.com/"));
    /// ```
    pub fn from_content(content: &str, user_agent: &str) -> Self {
        let agent = product_token(user_agent);
        let crawl_delay = parse_crawl_delay(content, &agent);

        Self {
            content: content.to_string(),
            agent,
            allow_all: false,
            crawl_delay,
        }
    }

    /// Permissive robots used when the file is missing or unreadable
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            agent: String::new(),
            allow_all: true,
            crawl_delay: None,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks if a URL is allowed for this crawler
    pub fn is_allowed(&self, url: &str) -> bool {
        if self.allow_all || self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, &self.agent, url)
    }

    /// `Crawl-delay` of the group that applies to this crawler
    ///
    /// # Returns
    ///
    /// The delay of this agent's own group if it declares one, else the `*`
    /// group's, capped at [`MAX_CRAWL_DELAY`]. `None` when neither group
    /// declares a usable value.
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }
}

/// `webrecon/0.1 (+https://...)` becomes `webrecon`
fn product_token(user_agent: &str) -> String {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Finds the crawl delay for `agent`, preferring its own group over `*`
fn parse_crawl_delay(content: &str, agent: &str) -> Option<Duration> {
    let agent = agent.to_lowercase();
    let mut group_agents: Vec<String> = Vec::new();
    let mut in_agent_lines = false;
    let mut wildcard_delay: Option<f64> = None;
    let mut agent_delay: Option<f64> = None;

    for line in content.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        if key == "user-agent" {
            // consecutive User-agent lines share one group
            if !in_agent_lines {
                group_agents.clear();
            }
            group_agents.push(value.to_lowercase());
            in_agent_lines = true;
            continue;
        }
        in_agent_lines = false;

        if key != "crawl-delay" {
            continue;
        }
        let Ok(delay) = value.parse::<f64>() else {
            continue;
        };
        if !delay.is_finite() || delay < 0.0 {
            continue;
        }

        if !agent.is_empty() && group_agents.iter().any(|ua| *ua == agent) {
            agent_delay = Some(delay);
        } else if group_agents.iter().any(|ua| ua == "*") {
            wildcard_delay = Some(delay);
        }
    }

    // values too large for a Duration are clamped like any other huge delay
    agent_delay.or(wildcard_delay).map(|secs| {
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_CRAWL_DELAY)
            .min(MAX_CRAWL_DELAY)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "webrecon/0.1.0";

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("https://example.com/admin"));
        assert_eq!(robots.crawl_delay(), None);
    }

    #[test]
    fn test_disallow_path() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /admin", UA);
        assert!(!robots.is_allowed("https://example.com/admin"));
        assert!(!robots.is_allowed("https://example.com/admin/users"));
        assert!(robots.is_allowed("https://example.com/public"));
    }

    #[test]
    fn test_allow_overrides_disallow() {
        let content = "User-agent: *\nDisallow: /private\nAllow: /private/open";
        let robots = ParsedRobots::from_content(content, UA);
        assert!(robots.is_allowed("https://example.com/private/open"));
        assert!(!robots.is_allowed("https://example.com/private/closed"));
    }

    #[test]
    fn test_specific_agent_group() {
        let content = "User-agent: webrecon\nDisallow: /scan-free\n\nUser-agent: *\nDisallow:";
        let robots = ParsedRobots::from_content(content, UA);
        assert!(!robots.is_allowed("https://example.com/scan-free"));

        let other = ParsedRobots::from_content(content, "otherbot/1.0");
        assert!(other.is_allowed("https://example.com/scan-free"));
    }

    #[test]
    fn test_empty_content_allows() {
        let robots = ParsedRobots::from_content("", UA);
        assert!(robots.is_allowed("https://example.com/anything"));
    }

    #[test]
    fn test_crawl_delay_wildcard() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 2\nDisallow: /x", UA);
        assert_eq!(robots.crawl_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_crawl_delay_prefers_own_group() {
        let content = "User-agent: *\nCrawl-delay: 5\n\nUser-agent: WebRecon\nCrawl-delay: 0.5\n";
        let robots = ParsedRobots::from_content(content, UA);
        assert_eq!(robots.crawl_delay(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_crawl_delay_grouped_agents() {
        let content = "User-agent: googlebot\nUser-agent: webrecon\nDisallow: /a\nCrawl-delay: 3\n\nUser-agent: bingbot\nCrawl-delay: 9";
        let robots = ParsedRobots::from_content(content, UA);
        assert_eq!(robots.crawl_delay(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_crawl_delay_ignores_garbage() {
        let content = "User-agent: *\nCrawl-delay: soon\nCrawl-delay: -1";
        let robots = ParsedRobots::from_content(content, UA);
        assert_eq!(robots.crawl_delay(), None);
    }

    #[test]
    fn test_crawl_delay_clamped() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 86400", UA);
        assert_eq!(robots.crawl_delay(), Some(MAX_CRAWL_DELAY));
    }

    #[test]
    fn test_crawl_delay_overflowing_duration_clamped() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 1e20", UA);
        assert_eq!(robots.crawl_delay(), Some(MAX_CRAWL_DELAY));

        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: inf", UA);
        assert_eq!(robots.crawl_delay(), None);
    }
}
