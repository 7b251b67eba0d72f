//! Heuristic Detector - structural scoring of unknown identifiers
//!
//! Each indicator adds a fixed weight; the sum is capped at 1.0. A bot
//! keyword plus a version token alone scores 0.68, deliberately short of
//! the confident threshold, so such identifiers land in the review queue.

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{DetectionMethod, DetectionResult};
use crate::constants::HEURISTIC_BOT_THRESHOLD;

// ============================================================================
// WEIGHTS
// ============================================================================

const W_COMPATIBLE: f64 = 0.40;
const W_DOC_URL: f64 = 0.40;
const W_VERSION: f64 = 0.30;
const W_KEYWORD: f64 = 0.35;
const W_EXTRA_KEYWORD: f64 = 0.15;
const MAX_EXTRA_KEYWORDS: usize = 2;
const W_KEYWORD_VERSION_ONLY: f64 = 0.03;
const W_KEYWORD_VERSION_CORROBORATED: f64 = 0.10;
const W_AUTOMATION_TOOL: f64 = 0.35;
const W_MISSING_ENGINE: f64 = 0.15;
const W_TOKEN_ORDER: f64 = 0.10;

const BOT_KEYWORDS: [&str; 4] = ["bot", "crawler", "spider", "scraper"];

// ============================================================================
// PATTERNS
// ============================================================================

static COMPATIBLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(compatible;\s*([^/;]+)/[\d.]+").expect("static regex"));

static DOC_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\+https?://\S+").expect("static regex"));

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([A-Za-z0-9_\-]+)/[\d.]+(?:-[a-z]+)?").expect("static regex"));

static AUTOMATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(curl|wget|python-requests|python-urllib|aiohttp|go-http-client|okhttp|java/|libwww-perl|apache-httpclient|axios|node-fetch|headlesschrome|phantomjs|scrapy)",
    )
    .expect("static regex")
});

static BROWSER_ENGINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)applewebkit|gecko|trident|presto").expect("static regex"));

/// Per keyword: (versioned token, bare token)
static KEYWORD_TOKEN_RES: Lazy<Vec<(&'static str, Regex, Regex)>> = Lazy::new(|| {
    BOT_KEYWORDS
        .iter()
        .map(|kw| {
            let versioned = Regex::new(&format!(r"(?i)([A-Za-z0-9_\-]*{}[A-Za-z0-9_\-]*)/[\d.]+", kw))
                .expect("static regex");
            let bare = Regex::new(&format!(r"(?i)([A-Za-z0-9_\-]*{}[A-Za-z0-9_\-]*)", kw)).expect("static regex");
            (*kw, versioned, bare)
        })
        .collect()
});

// ============================================================================
// DETECTOR
// ============================================================================

pub struct HeuristicDetector {
    bot_threshold: f64,
}

impl Default for HeuristicDetector {
    fn default() -> Self {
        Self { bot_threshold: HEURISTIC_BOT_THRESHOLD }
    }
}

impl HeuristicDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect(&self, identifier: &str) -> DetectionResult {
        if identifier.trim().is_empty() {
            return DetectionResult::no_match(DetectionMethod::Heuristic);
        }

        let lowered = identifier.to_lowercase();
        let mut indicators: Vec<String> = Vec::new();
        let mut bot_name: Option<String> = None;

        if let Some(caps) = COMPATIBLE_RE.captures(identifier) {
            indicators.push("compatible_pattern".to_string());
            bot_name = non_empty(caps.get(1).map(|m| m.as_str()));
        }

        let has_doc_url = DOC_URL_RE.is_match(identifier);
        if has_doc_url {
            indicators.push("documentation_url".to_string());
        }

        let mut keyword_count = 0usize;
        for (kw, versioned, bare) in KEYWORD_TOKEN_RES.iter() {
            if !lowered.contains(kw) {
                continue;
            }
            indicators.push(format!("keyword_{}", kw));
            keyword_count += 1;

            if bot_name.is_none() {
                bot_name = match versioned.captures(identifier) {
                    Some(caps) => non_empty(caps.get(1).map(|m| m.as_str())),
                    // A bare keyword ("bot") is too generic to be a name
                    None => bare
                        .captures(identifier)
                        .and_then(|caps| non_empty(caps.get(1).map(|m| m.as_str())))
                        .filter(|name| name.len() > 3),
                };
            }
        }

        let is_automation_tool = AUTOMATION_RE.is_match(identifier);

        let has_version = match VERSION_RE.captures(identifier) {
            Some(caps) => {
                indicators.push("version_pattern".to_string());
                if bot_name.is_none() {
                    let candidate = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                    if keyword_count > 0 || has_doc_url || is_automation_tool || contains_keyword(candidate) {
                        bot_name = non_empty(Some(candidate));
                    }
                }
                true
            }
            None => false,
        };

        if is_automation_tool {
            indicators.push("automation_tool".to_string());
        }

        // Browser-mimicry checks only count when nothing self-identifies as a bot
        let claims_mozilla = lowered.contains("mozilla/");
        if keyword_count == 0 && claims_mozilla {
            if !BROWSER_ENGINE_RE.is_match(identifier) {
                indicators.push("missing_browser_engine".to_string());
            }
            if !lowered.trim_start().starts_with("mozilla/") {
                indicators.push("suspicious_token_order".to_string());
            }
        }

        let confidence = score(&indicators, keyword_count, has_version);
        DetectionResult::heuristic(confidence, self.bot_threshold, bot_name, indicators)
    }
}

fn score(indicators: &[String], keyword_count: usize, has_version: bool) -> f64 {
    let has = |name: &str| indicators.iter().any(|i| i == name);
    let has_compatible = has("compatible_pattern");
    let has_doc_url = has("documentation_url");

    let mut score = 0.0;
    if has_compatible {
        score += W_COMPATIBLE;
    }
    if has_doc_url {
        score += W_DOC_URL;
    }
    if has_version {
        score += W_VERSION;
    }
    if keyword_count > 0 {
        score += W_KEYWORD;
        score += W_EXTRA_KEYWORD * (keyword_count - 1).min(MAX_EXTRA_KEYWORDS) as f64;

        if has_version {
            score += if has_doc_url || has_compatible {
                W_KEYWORD_VERSION_CORROBORATED
            } else {
                W_KEYWORD_VERSION_ONLY
            };
        }
    }
    if has("automation_tool") {
        score += W_AUTOMATION_TOOL;
    }
    if has("missing_browser_engine") {
        score += W_MISSING_ENGINE;
    }
    if has("suspicious_token_order") {
        score += W_TOKEN_ORDER;
    }

    score.min(1.0)
}

fn contains_keyword(token: &str) -> bool {
    let lowered = token.to_lowercase();
    BOT_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(ua: &str) -> DetectionResult {
        HeuristicDetector::new().detect(ua)
    }

    #[test]
    fn test_compatible_pattern_with_doc_url() {
        let r = detect("Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)");
        assert!(r.is_bot());
        assert!(r.confidence() >= 0.7);
        assert_eq!(r.bot_name(), Some("Googlebot"));
        assert_eq!(r.method(), DetectionMethod::Heuristic);
        assert!(r.indicators().contains(&"compatible_pattern".to_string()));
    }

    #[test]
    fn test_documentation_url() {
        let r = detect("CustomBot/1.0 (+https://example.com/bot-info)");
        assert!(r.is_confident());
        assert_eq!(r.bot_name(), Some("CustomBot"));
        assert!(r.indicators().contains(&"documentation_url".to_string()));
    }

    #[test]
    fn test_name_extraction() {
        let cases = [
            ("Mozilla/5.0 (compatible; BingBot/2.0; +http://www.bing.com/bingbot.htm)", "BingBot"),
            ("YandexBot/3.0 (+http://yandex.com/bots)", "YandexBot"),
            ("Slackbot-LinkExpanding 1.0 (+https://api.slack.com/robots)", "Slackbot-LinkExpanding"),
            ("curl/7.68.0", "curl"),
        ];
        for (ua, expected) in cases {
            assert_eq!(detect(ua).bot_name(), Some(expected), "{}", ua);
        }
    }

    #[test]
    fn test_keyword_and_version_alone_stay_below_confident() {
        let r = detect("Mozilla/5.0 CustomSpider/1.0");
        assert!(r.confidence() > 0.5);
        assert!(!r.is_confident());
        assert!(r.needs_review());
        assert_eq!(r.bot_name(), Some("CustomSpider"));
    }

    #[test]
    fn test_multiple_indicators_are_confident() {
        let r = detect("MyCustomBot/1.0 (crawler; +https://example.com/bot)");
        assert!(r.is_confident());
        assert!(r.indicators().len() >= 2);
    }

    #[test]
    fn test_clear_bots() {
        for ua in [
            "AhrefsBot/7.0; +http://ahrefs.com/robot/",
            "facebookexternalhit/1.1 (+http://www.facebook.com/externalhit_uatext.php)",
        ] {
            let r = detect(ua);
            assert!(r.is_bot() && r.is_confident(), "{}", ua);
        }
    }

    #[test]
    fn test_keywords_flagged() {
        for (kw, ua) in [
            ("bot", "CustomBot/1.0"),
            ("crawler", "MyCrawler/2.0"),
            ("spider", "WebSpider/1.5"),
            ("scraper", "ContentScraper/1.0"),
        ] {
            let r = detect(ua);
            assert!(r.is_bot(), "{}", ua);
            assert!(r.indicators().contains(&format!("keyword_{}", kw)));
        }
    }

    #[test]
    fn test_version_variants() {
        for ua in ["CustomBot/1.0", "MyBot/2.5.3", "TestBot/1.0.0-beta"] {
            assert!(detect(ua).indicators().contains(&"version_pattern".to_string()));
        }
    }

    #[test]
    fn test_regular_browsers_are_not_bots() {
        for ua in [
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
            "Mozilla/5.0 (X11; Linux x86_64; rv:89.0) Gecko/20100101 Firefox/89.0",
        ] {
            let r = detect(ua);
            assert!(!r.is_bot(), "{}", ua);
            assert!(r.confidence() < 0.4);
        }
    }

    #[test]
    fn test_browser_mimicry_indicators() {
        let r = detect("Mozilla/5.0 (Windows NT 10.0)");
        assert!(r.indicators().contains(&"missing_browser_engine".to_string()));

        let r = detect("Agent Mozilla/5.0 AppleWebKit/537.36");
        assert!(r.indicators().contains(&"suspicious_token_order".to_string()));
        assert!(!r.indicators().contains(&"missing_browser_engine".to_string()));
    }

    #[test]
    fn test_automation_tool() {
        let r = detect("python-requests/2.31.0");
        assert!(r.indicators().contains(&"automation_tool".to_string()));
        assert!(r.is_bot());
        assert_eq!(r.bot_name(), Some("python-requests"));
    }

    #[test]
    fn test_empty_identifier() {
        let r = detect("");
        assert_eq!(r.confidence(), 0.0);
        assert!(!r.is_bot());
        assert!(r.indicators().is_empty());
    }

    #[test]
    fn test_confidence_capped() {
        let r = detect("Mozilla/5.0 (compatible; SpiderBot-Crawler/1.0; +https://example.com/scraper)");
        assert_eq!(r.confidence(), 1.0);
    }
}
