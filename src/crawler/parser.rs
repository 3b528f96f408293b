//! Document parser for fetched manifest content
//!
//! This module turns fetched bytes into the fields stored for a crawled
//! document:
//! - Title, meta description and keywords
//! - Headings in document order
//! - Same-origin links as paths
//! - Visible body text and its content hash

use crate::config::CrawlConfig;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

/// Elements whose text never counts as visible content
const HIDDEN_ELEMENTS: [&str; 5] = ["script", "style", "noscript", "iframe", "svg"];

/// Size caps applied while parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Maximum body length in characters
    pub max_body_size: usize,
    /// Maximum title length in characters
    pub max_title_size: usize,
    pub max_headings_count: usize,
    pub max_links_count: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self::from(&CrawlConfig::default())
    }
}

impl From<&CrawlConfig> for ParseLimits {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            max_body_size: config.max_body_size,
            max_title_size: config.max_title_size,
            max_headings_count: config.max_headings_count,
            max_links_count: config.max_links_count,
        }
    }
}

/// Fields extracted from one fetched document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub title: Option<String>,
    pub body: Option<String>,
    pub body_truncated: bool,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub headings: Vec<String>,
    /// Same-origin link paths, deduplicated, in document order
    pub links: Vec<String>,
    /// SHA-256 hex digest of the (possibly truncated) body
    pub content_hash: String,
    /// Length in bytes of the raw input
    pub content_length: usize,
}

/// Parses HTML and plain text into [`ParsedDocument`]s
#[derive(Debug, Clone, Default)]
pub struct ContentParser {
    limits: ParseLimits,
}

impl ContentParser {
    pub fn new(limits: ParseLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ParseLimits {
        &self.limits
    }

    /// Parses an HTML document
    ///
    /// # Arguments
    ///
    /// * `html` - The HTML content to parse
    /// * `base_url` - The URL the document was fetched from, used to resolve links
    ///
    /// # Returns
    ///
    /// The extracted fields. Text inside script, style, noscript, iframe and svg
    /// elements is ignored.
    pub fn parse_html(&self, html: &str, base_url: &str) -> ParsedDocument {
        let document = Html::parse_document(html);

        let title = first_element(&document, "title")
            .map(|element| visible_text(element).trim().to_string())
            .filter(|title| !title.is_empty())
            .map(|title| truncate_chars(&title, self.limits.max_title_size).0);

        let meta_description = meta_content(&document, "description");
        let meta_keywords = meta_content(&document, "keywords");

        let headings = self.extract_headings(&document);
        let links = self.extract_links(&document, base_url);

        let raw_body = first_element(&document, "body")
            .map(visible_text)
            .unwrap_or_default();
        let collapsed = collapse_whitespace(&raw_body);
        let (body, body_truncated) = truncate_chars(&collapsed, self.limits.max_body_size);

        ParsedDocument {
            title,
            content_hash: hash_content(&body),
            body: Some(body).filter(|b| !b.is_empty()),
            body_truncated,
            meta_description,
            meta_keywords,
            headings,
            links,
            content_length: html.len(),
        }
    }

    /// Parses a plain-text document
    pub fn parse_text(&self, text: &str) -> ParsedDocument {
        let (body, body_truncated) = truncate_chars(text.trim(), self.limits.max_body_size);

        ParsedDocument {
            title: None,
            content_hash: hash_content(&body),
            body: Some(body).filter(|b| !b.is_empty()),
            body_truncated,
            meta_description: None,
            meta_keywords: None,
            headings: Vec::new(),
            links: Vec::new(),
            content_length: text.len(),
        }
    }

    fn extract_headings(&self, document: &Html) -> Vec<String> {
        let mut headings = Vec::new();

        if let Ok(selector) = Selector::parse("h1, h2, h3, h4, h5, h6") {
            for element in document.select(&selector) {
                if headings.len() >= self.limits.max_headings_count {
                    break;
                }
                let text = visible_text(element).trim().to_string();
                if !text.is_empty() {
                    headings.push(text);
                }
            }
        }

        headings
    }

    fn extract_links(&self, document: &Html, base_url: &str) -> Vec<String> {
        let mut links: Vec<String> = Vec::new();

        if let Ok(selector) = Selector::parse("a[href]") {
            for element in document.select(&selector) {
                if links.len() >= self.limits.max_links_count {
                    break;
                }
                if let Some(href) = element.value().attr("href") {
                    if let Some(link) = normalize_link(href, base_url) {
                        if !links.contains(&link) {
                            links.push(link);
                        }
                    }
                }
            }
        }

        links
    }
}

fn first_element<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next()
}

fn meta_content(document: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse(&format!("meta[name=\"{}\"]", name)).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

/// Concatenates descendant text, skipping hidden subtrees
fn visible_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();

    for node in element.descendants() {
        let Node::Text(fragment) = node.value() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| HIDDEN_ELEMENTS.contains(&el.name()))
                .unwrap_or(false)
        });

        if !hidden {
            text.push_str(fragment);
        }
    }

    text
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max` characters, reporting whether anything was cut
fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((index, _)) => (text[..index].to_string(), true),
        None => (text.to_string(), false),
    }
}

/// SHA-256 hex digest of body text
pub fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Normalizes a link found on a page into a same-origin path
///
/// # Arguments
///
/// * `href` - The raw href attribute
/// * `base_url` - The URL of the page the link was found on
///
/// # Returns
///
/// * `Some(path)` - Root-relative path (with query for absolute links)
/// * `None` - Script, mail, phone, fragment, protocol-relative or cross-origin
///   links, and anything that fails to parse
pub fn normalize_link(href: &str, base_url: &str) -> Option<String> {
    let href = href.trim();

    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        let link = Url::parse(href).ok()?;
        let base = Url::parse(base_url).ok()?;
        if link.origin() != base.origin() {
            return None;
        }
        return Some(match link.query() {
            Some(query) => format!("{}?{}", link.path(), query),
            None => link.path().to_string(),
        });
    }

    if href.starts_with("//") {
        return None;
    }

    if href.starts_with('/') {
        return Some(href.to_string());
    }

    let base = Url::parse(base_url).ok()?;
    let path = base.path();
    let directory = match path.rfind('/') {
        Some(index) => &path[..=index],
        None => "/",
    };
    Some(format!("{}{}", directory, href))
}

/// Turns a root-relative link into a manifest path key
///
/// Drops the query and fragment, the leading `/`, and a leading
/// `<transaction_id>/` segment. Returns `None` when nothing is left.
pub fn manifest_relative_path(link: &str, transaction_id: &str) -> Option<String> {
    let end = link.find(|c| c == '?' || c == '#').unwrap_or(link.len());
    let path = link[..end].trim_start_matches('/');
    let prefix = format!("{}/", transaction_id);
    let path = path.strip_prefix(&prefix).unwrap_or(path);

    if path.is_empty() || path == transaction_id {
        None
    } else {
        Some(path.to_string())
    }
}

fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// True for `text/*` and `application/xhtml+xml`
pub fn is_crawlable_content_type(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let media = media_type(content_type);
    media.starts_with("text/") || media == "application/xhtml+xml"
}

/// True for `text/html` and `application/xhtml+xml`
pub fn is_html_content_type(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let media = media_type(content_type);
    media == "text/html" || media == "application/xhtml+xml"
}
