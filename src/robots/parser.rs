//! Robots.txt parser implementation
//!
//! Rules are collected for the wildcard agent only. Path evaluation uses
//! longest-match: an allow pattern overrides a disallow pattern when it also
//! matches and is strictly longer.

use regex::Regex;

/// Rules extracted from a robots.txt document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsTxtRules {
    pub allowed_paths: Vec<String>,
    pub disallowed_paths: Vec<String>,
    pub sitemap_urls: Vec<String>,
    /// Crawl delay in seconds
    pub crawl_delay: Option<u32>,
}

impl RobotsTxtRules {
    /// Checks whether a path may be fetched under these rules
    pub fn is_path_allowed(&self, path: &str) -> bool {
        is_path_allowed(path, self)
    }
}

/// Parses robots.txt content
///
/// # Arguments
///
/// * `content` - The raw robots.txt file content
///
/// # Returns
///
/// The allow/disallow rules that apply to `*` (or to no declared agent), every
/// sitemap URL, and the crawl delay if one was given as a positive integer.
pub fn parse_robots_txt(content: &str) -> RobotsTxtRules {
    let mut rules = RobotsTxtRules::default();
    let mut current_agent: Option<String> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        let applies = matches!(current_agent.as_deref(), None | Some("*"));

        match key.as_str() {
            "user-agent" => current_agent = Some(value.to_lowercase()),
            "allow" if applies && !value.is_empty() => {
                rules.allowed_paths.push(value.to_string())
            }
            "disallow" if applies && !value.is_empty() => {
                rules.disallowed_paths.push(value.to_string())
            }
            "sitemap" if !value.is_empty() => rules.sitemap_urls.push(value.to_string()),
            "crawl-delay" => {
                if let Some(delay) = parse_crawl_delay(value) {
                    rules.crawl_delay = Some(delay);
                }
            }
            _ => {}
        }
    }

    rules
}

/// Reads the leading digits of a crawl-delay value; zero is ignored
fn parse_crawl_delay(value: &str) -> Option<u32> {
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<u32>().ok().filter(|delay| *delay > 0)
}

/// Checks if a path is allowed by robots rules
///
/// # Returns
///
/// * `true` - No disallow pattern matches, or a longer allow pattern overrides it
/// * `false` - A disallow pattern matches and no longer allow pattern matches
pub fn is_path_allowed(path: &str, rules: &RobotsTxtRules) -> bool {
    for disallow in &rules.disallowed_paths {
        if !matches_pattern(path, disallow) {
            continue;
        }

        let overridden = rules
            .allowed_paths
            .iter()
            .any(|allow| allow.len() > disallow.len() && matches_pattern(path, allow));

        if !overridden {
            return false;
        }
    }

    true
}

/// Matches a path against one robots pattern
///
/// `*` matches any run of characters and the whole path must match. A trailing
/// `$` requires the path to end where the pattern ends. Anything else is a
/// prefix test.
pub fn matches_pattern(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    if pattern.contains('*') {
        let body = pattern.strip_suffix('$').unwrap_or(pattern);
        let escaped: Vec<String> = body.split('*').map(regex::escape).collect();
        let source = format!("^{}$", escaped.join(".*"));
        return match Regex::new(&source) {
            Ok(re) => re.is_match(path),
            Err(_) => false,
        };
    }

    if let Some(exact) = pattern.strip_suffix('$') {
        return path == exact;
    }

    path.starts_with(pattern)
}
