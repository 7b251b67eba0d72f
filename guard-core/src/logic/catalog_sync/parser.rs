//! Feed payload parsing
//!
//! All formats reduce to a list of `(name?, pattern)` entries. Parsing is
//! all-or-nothing at the payload level: a malformed document or one with
//! no usable entries is an error, and the caller mutates nothing.

use serde_json::Value;

use super::types::FeedFormat;
use crate::error::SyncError;

/// Names longer than this are cut
const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub name: Option<String>,
    pub pattern: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub entries: Vec<FeedEntry>,
    /// Entries present in the payload but unusable (wrong shape, empty)
    pub malformed: usize,
}

impl ParsedFeed {
    fn push(&mut self, name: Option<String>, pattern: String) {
        if pattern.trim().is_empty() {
            self.malformed += 1;
        } else {
            let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
            self.entries.push(FeedEntry { name, pattern });
        }
    }

    fn non_empty(self, what: &str) -> Result<Self, SyncError> {
        if self.entries.is_empty() {
            Err(SyncError::Parse(format!("{} payload contains no patterns", what)))
        } else {
            Ok(self)
        }
    }
}

pub fn parse(body: &str, format: FeedFormat) -> Result<ParsedFeed, SyncError> {
    match format {
        FeedFormat::Json => parse_json(body),
        FeedFormat::PhpArray => parse_php_array(body),
        FeedFormat::Lines => parse_lines(body),
    }
}

/// Guess the layout when the source does not declare one
pub fn detect_format(body: &str) -> FeedFormat {
    let trimmed = body.trim_start();
    if (trimmed.starts_with('{') || trimmed.starts_with('[')) && serde_json::from_str::<Value>(trimmed).is_ok() {
        FeedFormat::Json
    } else if trimmed.starts_with("<?") || find_array_start(body).is_some() {
        FeedFormat::PhpArray
    } else {
        FeedFormat::Lines
    }
}

// ============================================================================
// JSON
// ============================================================================

pub fn parse_json(body: &str) -> Result<ParsedFeed, SyncError> {
    let value: Value = serde_json::from_str(body).map_err(|e| SyncError::Parse(format!("invalid JSON: {}", e)))?;
    let mut feed = ParsedFeed::default();

    match value {
        Value::Object(map) => {
            for (name, pattern) in map {
                match pattern {
                    Value::String(p) => feed.push(Some(name), p),
                    _ => feed.malformed += 1,
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(p) => feed.push(None, p),
                    Value::Object(obj) => match obj.get("pattern").and_then(Value::as_str) {
                        Some(p) => {
                            let name = obj.get("name").and_then(Value::as_str).map(str::to_string);
                            feed.push(name, p.to_string());
                        }
                        None => feed.malformed += 1,
                    },
                    _ => feed.malformed += 1,
                }
            }
        }
        _ => return Err(SyncError::Parse("JSON payload must be an object or an array".to_string())),
    }

    feed.non_empty("JSON")
}

// ============================================================================
// LINES
// ============================================================================

pub fn parse_lines(body: &str) -> Result<ParsedFeed, SyncError> {
    let mut feed = ParsedFeed::default();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        feed.push(None, line.to_string());
    }
    feed.non_empty("line")
}

// ============================================================================
// PHP ARRAY LITERAL
// ============================================================================

#[derive(Debug, PartialEq)]
enum Token {
    Str(String),
    Arrow,
    Comma,
    Close,
    /// Bare word or number (numeric keys, constants)
    Bare,
}

/// Byte offset just past the opening bracket of the first array literal
fn find_array_start(body: &str) -> Option<(usize, char)> {
    let lowered = body.to_ascii_lowercase();
    // Skip mentions of the word inside comments ("Array of patterns")
    let long_form = lowered.match_indices("array").find_map(|(idx, _)| {
        let rest = &body[idx + 5..];
        let skipped = rest.len() - rest.trim_start().len();
        rest.trim_start().starts_with('(').then_some((idx + 5 + skipped + 1, ')'))
    });

    let short_form = ["return [", "= [", "=["]
        .iter()
        .filter_map(|marker| lowered.find(marker).map(|idx| (idx + marker.len(), ']')))
        .min_by_key(|(idx, _)| *idx);

    match (long_form, short_form) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Parse the first `array(...)` / `[...]` literal of quoted strings.
///
/// Accepts `'pattern'` and `'name' => 'pattern'` entries; nested arrays
/// and non-string values are counted as malformed.
pub fn parse_php_array(body: &str) -> Result<ParsedFeed, SyncError> {
    let (start, close) = find_array_start(body)
        .ok_or_else(|| SyncError::Parse("no PHP array literal found".to_string()))?;

    let mut chars = body[start..].chars().peekable();
    let mut feed = ParsedFeed::default();
    let mut current: Vec<Token> = Vec::new();

    loop {
        let token = next_token(&mut chars, close)?;
        match token {
            Token::Comma | Token::Close => {
                flush_entry(&mut current, &mut feed);
                if token == Token::Close {
                    break;
                }
            }
            other => current.push(other),
        }
    }

    feed.non_empty("PHP array")
}

fn flush_entry(tokens: &mut Vec<Token>, feed: &mut ParsedFeed) {
    match tokens.as_slice() {
        [] => {}
        [Token::Str(pattern)] => feed.push(None, pattern.clone()),
        [Token::Str(name), Token::Arrow, Token::Str(pattern)] => feed.push(Some(name.clone()), pattern.clone()),
        [Token::Bare, Token::Arrow, Token::Str(pattern)] => feed.push(None, pattern.clone()),
        _ => feed.malformed += 1,
    }
    tokens.clear();
}

fn next_token<I: Iterator<Item = char>>(
    chars: &mut std::iter::Peekable<I>,
    close: char,
) -> Result<Token, SyncError> {
    loop {
        let c = chars
            .next()
            .ok_or_else(|| SyncError::Parse("unterminated PHP array".to_string()))?;
        match c {
            c if c.is_whitespace() => continue,
            '/' if chars.peek() == Some(&'/') => skip_line(chars),
            '#' => skip_line(chars),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                skip_block_comment(chars)?;
            }
            '\'' | '"' => return read_quoted(chars, c).map(Token::Str),
            ',' => return Ok(Token::Comma),
            '=' if chars.peek() == Some(&'>') => {
                chars.next();
                return Ok(Token::Arrow);
            }
            c if c == close => return Ok(Token::Close),
            '(' | '[' => return Err(SyncError::Parse("nested arrays are not supported".to_string())),
            c if c.is_alphanumeric() || c == '_' || c == '-' => {
                while chars.peek().map_or(false, |n| n.is_alphanumeric() || *n == '_' || *n == '.') {
                    chars.next();
                }
                return Ok(Token::Bare);
            }
            other => return Err(SyncError::Parse(format!("unexpected character {:?} in PHP array", other))),
        }
    }
}

fn skip_line<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) {
    for c in chars.by_ref() {
        if c == '\n' {
            break;
        }
    }
}

fn skip_block_comment<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) -> Result<(), SyncError> {
    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'/') {
            chars.next();
            return Ok(());
        }
    }
    Err(SyncError::Parse("unterminated comment in PHP array".to_string()))
}

/// PHP string unescaping: single quotes honour only `\'` and `\\`
fn read_quoted<I: Iterator<Item = char>>(
    chars: &mut std::iter::Peekable<I>,
    quote: char,
) -> Result<String, SyncError> {
    let mut out = String::new();
    while let Some(c) = chars.next() {
        if c == quote {
            return Ok(out);
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some(n) if n == quote || n == '\\' => {
                out.push(n);
                chars.next();
            }
            Some(n) if quote == '"' && matches!(n, 'n' | 't' | '$') => {
                out.push(match n {
                    'n' => '\n',
                    't' => '\t',
                    _ => '$',
                });
                chars.next();
            }
            _ => out.push('\\'),
        }
    }
    Err(SyncError::Parse("unterminated string in PHP array".to_string()))
}

// ============================================================================
// NAMES
// ============================================================================

/// Name for an unnamed entry: the leading literal run of the pattern
pub fn derive_name(pattern: &str) -> String {
    let body = pattern
        .trim_start_matches('/')
        .trim_start_matches("(?i)")
        .trim_start_matches('^');

    let literal: String = body
        .chars()
        .take_while(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ' '))
        .collect();
    let literal = literal.trim();

    let name = if literal.is_empty() { pattern.trim() } else { literal };
    name.chars().take(MAX_NAME_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_php_return_array_with_keys() {
        let body = "<?php\nreturn array(\n    'ClaudeBot' => '/ClaudeBot/i',\n    'GPTBot' => '/GPTBot/i'\n);";
        let feed = parse_php_array(body).unwrap();
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[0], FeedEntry { name: Some("ClaudeBot".into()), pattern: "/ClaudeBot/i".into() });
        assert_eq!(feed.malformed, 0);
    }

    #[test]
    fn test_php_class_property_list() {
        let body = r#"<?php
namespace Jaybizzle\CrawlerDetect\Fixtures;

class Crawlers extends AbstractProvider
{
    /**
     * Array of regex patterns
     */
    protected $data = array(
        ' YLT',
        '^Aether',
        'Amazon Simple Notification Service', // trailing comment
        "It\'s a \"test\"",
        'Mozilla\/5\.0 \(compatible; MSIE',
    );
}
"#;
        let feed = parse_php_array(body).unwrap();
        let patterns: Vec<&str> = feed.entries.iter().map(|e| e.pattern.as_str()).collect();
        assert_eq!(
            patterns,
            vec![" YLT", "^Aether", "Amazon Simple Notification Service", "It\\'s a \"test\"", "Mozilla\\/5\\.0 \\(compatible; MSIE"]
        );
        assert!(feed.entries.iter().all(|e| e.name.is_none()));
    }

    #[test]
    fn test_php_short_array() {
        let feed = parse_php_array("<?php return ['a' => 'AlphaBot', 'BetaBot'];").unwrap();
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[1].pattern, "BetaBot");
    }

    #[test]
    fn test_php_malformed_is_error() {
        assert!(parse_php_array("<?php return array('unterminated").is_err());
        assert!(parse_php_array("no array here").is_err());
        assert!(parse_php_array("<?php return array();").is_err());
        assert!(parse_php_array("<?php return array(array('x'));").is_err());
    }

    #[test]
    fn test_json_shapes() {
        let obj = parse_json(r#"{"NovaBot": "NovaBot", "Bad": 5}"#).unwrap();
        assert_eq!(obj.entries.len(), 1);
        assert_eq!(obj.malformed, 1);

        let arr = parse_json(r#"["AlphaBot", {"pattern": "BetaBot", "name": "Beta"}, {"nope": 1}]"#).unwrap();
        assert_eq!(arr.entries.len(), 2);
        assert_eq!(arr.entries[1].name.as_deref(), Some("Beta"));
        assert_eq!(arr.malformed, 1);

        assert!(parse_json("42").is_err());
        assert!(parse_json("[]").is_err());
        assert!(parse_json("{not json").is_err());
    }

    #[test]
    fn test_lines_skip_comments() {
        let feed = parse_lines("# header\nAlphaBot\n\n// note\n  BetaBot  \n").unwrap();
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[1].pattern, "BetaBot");
        assert!(parse_lines("# only comments\n").is_err());
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(r#"{"a": "b"}"#), FeedFormat::Json);
        assert_eq!(detect_format("<?php return array('x');"), FeedFormat::PhpArray);
        assert_eq!(detect_format("AlphaBot\nBetaBot"), FeedFormat::Lines);
    }

    #[test]
    fn test_derive_name() {
        assert_eq!(derive_name("^Aether"), "Aether");
        assert_eq!(derive_name("Amazon Simple Notification Service"), "Amazon Simple Notification Service");
        assert_eq!(derive_name("Mozilla\\/5\\.0"), "Mozilla");
        assert_eq!(derive_name("/GPTBot/i"), "GPTBot");
        assert_eq!(derive_name("(?i)foo-bar.*baz"), "foo-bar");
        assert_eq!(derive_name("[a-z]+bot"), "[a-z]+bot");
    }
}
