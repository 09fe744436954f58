//! Bot classification and render mode selection.

use std::sync::Arc;

use crate::render::engine::RenderMode;

/// User-agent classification capability.
pub trait BotClassifier: Send + Sync {
    fn is_bot(&self, user_agent: &str) -> bool;
}

/// Product names that only ever identify automated agents. Checked against
/// every product token of the user agent.
const AGENT_MARKERS: &[&str] = &[
    "slurp",
    "headlesschrome",
    "chrome-lighthouse",
    "prerender",
    "phantomjs",
    "embedly",
    "scrapy",
];

/// Fragments that mark a product name as a crawler wherever they appear.
const NAME_FRAGMENTS: &[&str] = &["crawler", "spider", "validator", "archiver"];

/// Non-browser clients. They lead their user agent, so they only count as
/// the first product token; browsers embedding them further on stay
/// interactive.
const LEADING_AGENTS: &[&str] = &[
    "curl",
    "wget",
    "whatsapp",
    "facebookexternalhit",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "okhttp",
    "axios",
    "node-fetch",
    "libwww-perl",
    "apache-httpclient",
    "java",
];

/// Product names ending in "bot" that are devices or browsers.
const BOT_SUFFIX_EXCLUSIONS: &[&str] = &["cubot"];

/// Classifier over the product tokens of a user agent.
///
/// A user agent is split into product names (`Googlebot/2.1` → `googlebot`)
/// and each name is matched whole, never as a raw substring of the header.
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    markers: Vec<String>,
    fragments: Vec<String>,
    leading: Vec<String>,
    exclusions: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Lowercase product names, in order: the part of each token before `/`.
fn product_names(user_agent: &str) -> Vec<String> {
    user_agent
        .split(|c: char| c.is_whitespace() || matches!(c, ';' | '(' | ')' | ','))
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .split('/')
                .next()
                .unwrap_or(token)
                .to_ascii_lowercase()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

impl PatternClassifier {
    fn is_bot_name(&self, name: &str) -> bool {
        (name.ends_with("bot") && !self.exclusions.iter().any(|e| e == name))
            || self.markers.iter().any(|m| m == name)
            || self.fragments.iter().any(|f| name.contains(f.as_str()))
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self {
            markers: owned(AGENT_MARKERS),
            fragments: owned(NAME_FRAGMENTS),
            leading: owned(LEADING_AGENTS),
            exclusions: owned(BOT_SUFFIX_EXCLUSIONS),
        }
    }
}

impl BotClassifier for PatternClassifier {
    fn is_bot(&self, user_agent: &str) -> bool {
        let names = product_names(user_agent);
        let leads_with_agent = names
            .first()
            .is_some_and(|first| self.leading.iter().any(|agent| agent == first));
        leads_with_agent || names.iter().any(|name| self.is_bot_name(name))
    }
}

/// Classification of a requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Interactive,
    Crawler,
}

/// Picks the render mode for a request.
///
/// Without a classifier every requester is interactive.
#[derive(Clone, Default)]
pub struct ModeSelector {
    classifier: Option<Arc<dyn BotClassifier>>,
    spa_mode: bool,
}

impl ModeSelector {
    pub fn new(classifier: Option<Arc<dyn BotClassifier>>, spa_mode: bool) -> Self {
        Self { classifier, spa_mode }
    }

    pub fn classify(&self, user_agent: Option<&str>) -> Classification {
        let Some(ua) = user_agent.map(str::trim).filter(|ua| !ua.is_empty()) else {
            return Classification::Interactive;
        };
        match &self.classifier {
            Some(classifier) if classifier.is_bot(ua) => Classification::Crawler,
            _ => Classification::Interactive,
        }
    }

    /// Crawlers and static rendering mode use the bot strategy.
    pub fn select(&self, user_agent: Option<&str>) -> RenderMode {
        if self.spa_mode || self.classify(user_agent) == Classification::Crawler {
            RenderMode::Bot
        } else {
            RenderMode::Interactive
        }
    }
}

impl std::fmt::Debug for ModeSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeSelector")
            .field("classifier", &self.classifier.is_some())
            .field("spa_mode", &self.spa_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
    const GOOGLEBOT: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
    const GOOGLEBOT_SMARTPHONE: &str = "Mozilla/5.0 (Linux; Android 6.0.1; Nexus 5X Build/MMB29P) \
                                        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.6478.126 \
                                        Mobile Safari/537.36 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
    const CUBOT_CHROME: &str = "Mozilla/5.0 (Linux; Android 10; CUBOT P40) AppleWebKit/537.36 \
                                (KHTML, like Gecko) Chrome/96.0.4664.45 Mobile Safari/537.36";
    const WHATSAPP_IN_APP: &str = "Mozilla/5.0 (Linux; Android 12; SM-G991B Build/SP1A.210812.016; wv) \
                                   AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/114.0.5735.196 \
                                   Mobile Safari/537.36 WhatsApp/2.23.14.79";

    fn selector() -> ModeSelector {
        ModeSelector::new(Some(Arc::new(PatternClassifier::default())), false)
    }

    #[test]
    fn test_crawlers_get_bot_mode() {
        let s = selector();
        assert_eq!(s.select(Some(GOOGLEBOT)), RenderMode::Bot);
        assert_eq!(s.select(Some("curl/8.4.0")), RenderMode::Bot);
        assert_eq!(s.select(Some("facebookexternalhit/1.1")), RenderMode::Bot);
    }

    #[test]
    fn test_crawlers_embedded_in_browser_strings() {
        let s = selector();
        assert_eq!(s.select(Some(GOOGLEBOT_SMARTPHONE)), RenderMode::Bot);
        assert_eq!(
            s.select(Some("Mozilla/5.0 (compatible; bingbot/2.0; +http://www.bing.com/bingbot.htm)")),
            RenderMode::Bot
        );
        assert_eq!(
            s.select(Some("Mozilla/5.0 (compatible; Baiduspider/2.0; +http://www.baidu.com/search/spider.html)")),
            RenderMode::Bot
        );
        assert_eq!(
            s.select(Some("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) HeadlessChrome/120.0.0.0 Safari/537.36")),
            RenderMode::Bot
        );
        assert_eq!(s.select(Some("WhatsApp/2.23.20.0 A")), RenderMode::Bot);
    }

    #[test]
    fn test_browsers_get_interactive_mode() {
        let s = selector();
        assert_eq!(s.select(Some(CHROME)), RenderMode::Interactive);
        assert_eq!(s.select(Some(CUBOT_CHROME)), RenderMode::Interactive);
        assert_eq!(s.select(Some(WHATSAPP_IN_APP)), RenderMode::Interactive);
    }

    #[test]
    fn test_product_names() {
        assert_eq!(
            product_names("Mozilla/5.0 (compatible; Googlebot/2.1)"),
            vec!["mozilla", "compatible", "googlebot"]
        );
    }

    #[test]
    fn test_missing_user_agent_is_interactive() {
        let s = selector();
        assert_eq!(s.classify(None), Classification::Interactive);
        assert_eq!(s.classify(Some("   ")), Classification::Interactive);
    }

    #[test]
    fn test_absent_classifier_fails_open() {
        let s = ModeSelector::new(None, false);
        assert_eq!(s.select(Some(GOOGLEBOT)), RenderMode::Interactive);
    }

    #[test]
    fn test_spa_mode_forces_bot() {
        let s = ModeSelector::new(None, true);
        assert_eq!(s.select(Some(CHROME)), RenderMode::Bot);
        assert_eq!(s.select(None), RenderMode::Bot);
    }
}
