//! Sitemap parsing
//!
//! Handles both `<urlset>` sitemaps and `<sitemapindex>` documents. Entries are
//! only used to seed manifest-path crawls, so nested sitemaps are not followed.

use url::Url;
use xml::reader::{ParserConfig2, XmlEvent};
use xml::EventReader;

/// One `<url>` or `<sitemap>` entry
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
    pub priority: Option<f64>,
}

/// Outcome of parsing a sitemap document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SitemapValidation {
    pub is_valid: bool,
    pub entries: Vec<SitemapEntry>,
    pub error: Option<String>,
}

impl SitemapValidation {
    fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            entries: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Parses sitemap XML
///
/// # Returns
///
/// A valid result carrying `<url>` entries followed by `<sitemap>` entries, or an
/// invalid result with a message when nothing usable was found.
pub fn parse_sitemap_xml(content: &str) -> SitemapValidation {
    match extract_entries(content) {
        Ok(entries) if entries.is_empty() => {
            SitemapValidation::invalid("No valid entries found in sitemap")
        }
        Ok(entries) => SitemapValidation {
            is_valid: true,
            entries,
            error: None,
        },
        Err(error) => SitemapValidation::invalid(error),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum EntryKind {
    Url,
    Sitemap,
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Loc,
    Lastmod,
    Changefreq,
    Priority,
}

impl Field {
    fn from_local_name(name: &str) -> Option<Self> {
        match name {
            "loc" => Some(Field::Loc),
            "lastmod" => Some(Field::Lastmod),
            "changefreq" => Some(Field::Changefreq),
            "priority" => Some(Field::Priority),
            _ => None,
        }
    }
}

/// Entry under construction while its element is open
struct OpenEntry {
    kind: EntryKind,
    loc: Option<String>,
    lastmod: Option<String>,
    changefreq: Option<String>,
    priority: Option<String>,
}

impl OpenEntry {
    fn new(kind: EntryKind) -> Self {
        Self {
            kind,
            loc: None,
            lastmod: None,
            changefreq: None,
            priority: None,
        }
    }

    /// Keeps the first non-empty value seen for a field
    fn set(&mut self, field: Field, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let slot = match field {
            Field::Loc => &mut self.loc,
            Field::Lastmod => &mut self.lastmod,
            Field::Changefreq => &mut self.changefreq,
            Field::Priority => &mut self.priority,
        };
        if slot.is_none() {
            *slot = Some(text.to_string());
        }
    }

    fn finish(self) -> Option<SitemapEntry> {
        let loc = self.loc?;
        Some(match self.kind {
            EntryKind::Url => SitemapEntry {
                loc,
                lastmod: self.lastmod,
                changefreq: self.changefreq,
                priority: self.priority.and_then(|p| p.parse().ok()),
            },
            EntryKind::Sitemap => SitemapEntry {
                loc,
                lastmod: self.lastmod,
                changefreq: None,
                priority: None,
            },
        })
    }
}

fn extract_entries(content: &str) -> Result<Vec<SitemapEntry>, String> {
    let config = ParserConfig2::new()
        .ignore_invalid_encoding_declarations(true)
        .ignore_comments(true);
    let reader = EventReader::new_with_config(content.as_bytes(), config);

    let mut urls = Vec::new();
    let mut sitemaps = Vec::new();
    let mut open: Option<OpenEntry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    for event in reader {
        let event = event.map_err(|e| format!("Invalid sitemap XML: {}", e))?;
        match event {
            XmlEvent::StartElement { name, .. } => match name.local_name.as_str() {
                "url" => open = Some(OpenEntry::new(EntryKind::Url)),
                "sitemap" => open = Some(OpenEntry::new(EntryKind::Sitemap)),
                local if open.is_some() && field.is_none() => {
                    field = Field::from_local_name(local);
                    text.clear();
                }
                _ => {}
            },
            // CDATA sections carry the same text as plain character data
            XmlEvent::Characters(data) | XmlEvent::CData(data) => {
                if field.is_some() {
                    text.push_str(&data);
                }
            }
            XmlEvent::EndElement { name } => {
                let local = name.local_name.as_str();
                match (field, open.as_mut()) {
                    (Some(current), Some(entry))
                        if Field::from_local_name(local) == Some(current) =>
                    {
                        entry.set(current, &text);
                        field = None;
                    }
                    _ => {}
                }
                if local == "url" || local == "sitemap" {
                    field = None;
                    if let Some(entry) = open.take() {
                        let kind = entry.kind;
                        if let Some(entry) = entry.finish() {
                            match kind {
                                EntryKind::Url => urls.push(entry),
                                EntryKind::Sitemap => sitemaps.push(entry),
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    urls.extend(sitemaps);
    Ok(urls)
}

/// Keeps the entries served from the manifest's origin, as paths
///
/// # Arguments
///
/// * `entries` - Parsed sitemap entries
/// * `manifest_base_url` - The URL the manifest is served under
///
/// # Returns
///
/// The path of every same-origin absolute entry, plus every entry that is
/// already a root-relative path.
pub fn extract_manifest_paths(entries: &[SitemapEntry], manifest_base_url: &str) -> Vec<String> {
    let base = Url::parse(manifest_base_url).ok();
    let mut paths = Vec::new();

    for entry in entries {
        match (Url::parse(&entry.loc), base.as_ref()) {
            (Ok(url), Some(base)) => {
                if url.origin() == base.origin() {
                    paths.push(url.path().to_string());
                }
            }
            _ => {
                if entry.loc.starts_with('/') {
                    paths.push(entry.loc.clone());
                }
            }
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://arweave.net/tx/index.html</loc>
    <lastmod>2024-01-01</lastmod>
    <changefreq>weekly</changefreq>
    <priority>0.8</priority>
  </url>
  <url>
    <loc>/tx/about.html</loc>
  </url>
  <url>
    <lastmod>2024-01-01</lastmod>
  </url>
</urlset>"#;

    #[test]
    fn test_parse_urlset() {
        let result = parse_sitemap_xml(URLSET);
        assert!(result.is_valid);
        assert_eq!(result.entries.len(), 2);

        let first = &result.entries[0];
        assert_eq!(first.loc, "https://arweave.net/tx/index.html");
        assert_eq!(first.lastmod.as_deref(), Some("2024-01-01"));
        assert_eq!(first.changefreq.as_deref(), Some("weekly"));
        assert_eq!(first.priority, Some(0.8));

        assert_eq!(result.entries[1].priority, None);
    }

    #[test]
    fn test_parse_sitemap_index() {
        let xml = r#"<sitemapindex>
            <sitemap><loc>https://arweave.net/tx/pages.xml</loc><lastmod>2024-02-02</lastmod></sitemap>
        </sitemapindex>"#;
        let result = parse_sitemap_xml(xml);
        assert!(result.is_valid);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].lastmod.as_deref(), Some("2024-02-02"));
    }

    #[test]
    fn test_cdata_loc_is_read() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc><![CDATA[https://arweave.net/tx/a.html]]></loc></url>
  <url><loc> <![CDATA[/tx/b.html]]> </loc><priority><![CDATA[0.5]]></priority></url>
</urlset>"#;
        let result = parse_sitemap_xml(xml);
        assert!(result.is_valid, "{:?}", result);
        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.entries[0].loc, "https://arweave.net/tx/a.html");
        assert_eq!(result.entries[1].loc, "/tx/b.html");
        assert_eq!(result.entries[1].priority, Some(0.5));
    }

    #[test]
    fn test_nested_loc_does_not_replace_page_loc() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
            xmlns:image="http://www.google.com/schemas/sitemap-image/1.1">
          <url>
            <loc>https://arweave.net/tx/gallery.html</loc>
            <image:image><image:loc>https://arweave.net/tx/cat.png</image:loc></image:image>
          </url>
        </urlset>"#;
        let result = parse_sitemap_xml(xml);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].loc, "https://arweave.net/tx/gallery.html");
    }

    #[test]
    fn test_empty_sitemap_is_invalid() {
        let result = parse_sitemap_xml("<urlset></urlset>");
        assert!(!result.is_valid);
        assert_eq!(
            result.error.as_deref(),
            Some("No valid entries found in sitemap")
        );

        assert!(!parse_sitemap_xml("not xml at all").is_valid);
    }

    #[test]
    fn test_extract_manifest_paths() {
        let entries = parse_sitemap_xml(URLSET).entries;
        let mut all = entries.clone();
        all.push(SitemapEntry {
            loc: "https://elsewhere.example/page".to_string(),
            lastmod: None,
            changefreq: None,
            priority: None,
        });

        let paths = extract_manifest_paths(&all, "https://arweave.net/tx/");
        assert_eq!(
            paths,
            vec!["/tx/index.html".to_string(), "/tx/about.html".to_string()]
        );
    }
}
