//! robots.txt parsing and per-host caching.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// Parsed robots.txt rules.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    /// Rules per user-agent (lowercase)
    rules: HashMap<String, AgentRules>,

    /// Default rules (for *)
    default_rules: AgentRules,
}

#[derive(Debug, Clone, Default)]
struct AgentRules {
    disallow: Vec<String>,
    allow: Vec<String>,
}

impl RobotsTxt {
    pub fn parse(content: &str) -> Self {
        let mut robots = Self::default();
        let mut current_agents: Vec<String> = Vec::new();
        let mut current_rules = AgentRules::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((directive, value)) = line.split_once(':') {
                let directive = directive.trim().to_lowercase();
                let value = value.trim();

                match directive.as_str() {
                    "user-agent" => {
                        if !current_agents.is_empty()
                            && (!current_rules.disallow.is_empty() || !current_rules.allow.is_empty())
                        {
                            for agent in current_agents.drain(..) {
                                if agent == "*" {
                                    robots.default_rules = current_rules.clone();
                                } else {
                                    robots.rules.insert(agent, current_rules.clone());
                                }
                            }
                            current_rules = AgentRules::default();
                        }
                        current_agents.push(value.to_lowercase());
                    }
                    "disallow" => {
                        if !value.is_empty() {
                            current_rules.disallow.push(value.to_string());
                        }
                    }
                    "allow" => {
                        if !value.is_empty() {
                            current_rules.allow.push(value.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        for agent in current_agents {
            if agent == "*" {
                robots.default_rules = current_rules.clone();
            } else {
                robots.rules.insert(agent, current_rules.clone());
            }
        }

        robots
    }

    /// Check if a path is allowed for a user-agent. Allow rules take
    /// precedence over disallow rules.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let agent_lower = user_agent.to_lowercase();

        let rules = self
            .rules
            .iter()
            .find(|(k, _)| agent_lower.contains(k.as_str()))
            .map(|(_, v)| v)
            .unwrap_or(&self.default_rules);

        for allow in &rules.allow {
            if path.starts_with(allow.as_str()) {
                return true;
            }
        }

        for disallow in &rules.disallow {
            if disallow == "/" || path.starts_with(disallow.as_str()) {
                return false;
            }
        }

        true
    }
}

/// Per-host robots cache shared by the HTML and browser fetchers.
///
/// Hosts on the ignore list skip robots entirely (operator whitelist for
/// career boards with blanket-disallow robots files).
pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    cache: Mutex<HashMap<String, Arc<RobotsTxt>>>,
    ignore_hosts: HashSet<String>,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            cache: Mutex::new(HashMap::new()),
            ignore_hosts: HashSet::new(),
        }
    }

    pub fn with_ignored_hosts(mut self, hosts: impl IntoIterator<Item = String>) -> Self {
        self.ignore_hosts = hosts.into_iter().map(|h| h.to_lowercase()).collect();
        self
    }

    /// Whether fetching `url` is permitted. Missing or unfetchable
    /// robots.txt permits everything.
    pub async fn allows(&self, url: &Url, ignore_for_source: bool) -> bool {
        let host = match url.host_str() {
            Some(h) => h.to_lowercase(),
            None => return true,
        };

        if ignore_for_source || self.ignore_hosts.contains(&host) {
            return true;
        }

        let robots = self.robots_for(url, &host).await;
        robots.is_allowed(&self.user_agent, url.path())
    }

    async fn robots_for(&self, url: &Url, host: &str) -> Arc<RobotsTxt> {
        {
            let cache = self.cache.lock().await;
            if let Some(robots) = cache.get(host) {
                return Arc::clone(robots);
            }
        }

        let robots_url = format!("{}://{}/robots.txt", url.scheme(), host);
        let robots = match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(content) => Arc::new(RobotsTxt::parse(&content)),
                Err(_) => Arc::new(RobotsTxt::default()),
            },
            _ => {
                debug!(host = %host, "no robots.txt, allowing all");
                Arc::new(RobotsTxt::default())
            }
        };

        let mut cache = self.cache.lock().await;
        cache.insert(host.to_string(), Arc::clone(&robots));
        robots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic() {
        let content = r#"
User-agent: *
Disallow: /private/
Disallow: /admin/
Allow: /private/jobs/
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(robots.is_allowed("JobIngestBot", "/careers"));
        assert!(!robots.is_allowed("JobIngestBot", "/private/page"));
        assert!(!robots.is_allowed("JobIngestBot", "/admin/"));
        assert!(robots.is_allowed("JobIngestBot", "/private/jobs/42"));
    }

    #[test]
    fn specific_agent_overrides_default() {
        let content = r#"
User-agent: *
Disallow: /

User-agent: jobingestbot
Allow: /
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(!robots.is_allowed("OtherBot", "/careers"));
        assert!(robots.is_allowed("JobIngestBot/1.0", "/careers"));
    }

    #[test]
    fn empty_robots_allows_everything() {
        let robots = RobotsTxt::parse("");
        assert!(robots.is_allowed("AnyBot", "/any/path"));
    }

    #[test]
    fn disallow_root_blocks_all() {
        let robots = RobotsTxt::parse("User-agent: *\nDisallow: /");
        assert!(!robots.is_allowed("Bot", "/anything"));
    }
}
