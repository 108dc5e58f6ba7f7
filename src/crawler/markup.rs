//! Markup capability: links, text and media from HTML
//!
//! The frontier and the content pipeline only see the [`Markup`] trait. [`HtmlMarkup`]
//! is the scraper-backed implementation used by default.

use crate::storage::MediaType;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

/// Elements whose text never counts as page content
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "nav", "footer", "head", "noscript"];

/// A media reference found in a page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaLink {
    pub media_type: MediaType,
    pub url: Url,
}

/// Extraction of links, text and media from markup
pub trait Markup: Send + Sync {
    /// Returns absolute http(s) URLs referenced by anchors, link tags, images, scripts and iframes
    fn extract_links(&self, html: &str, base_url: &Url) -> Vec<Url>;

    /// Returns the visible text, one non-blank line per text run
    fn extract_text(&self, html: &str) -> String;

    /// Returns media references, deduplicated by URL
    fn extract_media(&self, html: &str, base_url: &Url) -> Vec<MediaLink>;
}

/// HTML extraction backed by the scraper crate
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlMarkup;

impl Markup for HtmlMarkup {
    /// # Link Extraction Rules
    ///
    /// **Include:**
    /// - `<a href>` and `<link href>`
    /// - `<img src>`, `<script src>`, `<iframe src>`
    ///
    /// **Exclude:**
    /// - `javascript:`, `mailto:`, `tel:` links
    /// - Data URIs
    /// - Fragment-only links
    /// - Anything that is not http(s) after resolution
    fn extract_links(&self, html: &str, base_url: &Url) -> Vec<Url> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for (selector, attr) in [
            ("a[href], link[href]", "href"),
            ("img[src], script[src], iframe[src]", "src"),
        ] {
            let Ok(selector) = Selector::parse(selector) else {
                continue;
            };
            for element in document.select(&selector) {
                if let Some(url) = element
                    .value()
                    .attr(attr)
                    .and_then(|value| resolve_link(value, base_url))
                {
                    if seen.insert(url.clone()) {
                        links.push(url);
                    }
                }
            }
        }

        links
    }

    fn extract_text(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        let mut lines = Vec::new();
        collect_text(document.root_element(), &mut lines);
        lines.join("\n")
    }

    fn extract_media(&self, html: &str, base_url: &Url) -> Vec<MediaLink> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut media = Vec::new();

        let mut push = |media_type: MediaType, url: Url| {
            if seen.insert(url.clone()) {
                media.push(MediaLink { media_type, url });
            }
        };

        for (selector, media_type) in [
            ("img[src]", MediaType::Image),
            ("video[src], video source[src]", MediaType::Video),
            ("audio[src], audio source[src]", MediaType::Audio),
            ("iframe[src]", MediaType::Embedded),
        ] {
            let Ok(selector) = Selector::parse(selector) else {
                continue;
            };
            for element in document.select(&selector) {
                if let Some(url) = element
                    .value()
                    .attr("src")
                    .and_then(|src| resolve_link(src, base_url))
                {
                    push(media_type, url);
                }
            }
        }

        if let (Ok(selector), Some(pattern)) = (Selector::parse("[style]"), style_url_pattern()) {
            for element in document.select(&selector) {
                let Some(style) = element.value().attr("style") else {
                    continue;
                };
                for capture in pattern.captures_iter(style) {
                    if let Some(url) = capture.get(1).and_then(|m| resolve_link(m.as_str(), base_url))
                    {
                        push(MediaType::BackgroundImage, url);
                    }
                }
            }
        }

        media
    }
}

/// Extracts `<loc>` entries from a sitemap document
///
/// Nested sitemap indexes are returned as plain URLs; the caller decides whether to
/// follow them.
pub fn extract_sitemap_locs(xml: &str) -> Vec<Url> {
    let document = Html::parse_document(xml);
    let Ok(selector) = Selector::parse("loc") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|loc| {
            let text = loc.text().collect::<String>();
            Url::parse(text.trim()).ok()
        })
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
        .collect()
}

fn style_url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).ok())
        .as_ref()
}

/// Walks the tree below `element`, skipping boilerplate subtrees
fn collect_text(element: ElementRef<'_>, lines: &mut Vec<String>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            lines.extend(
                text.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        } else if let Some(child_element) = ElementRef::wrap(child) {
            if !SKIPPED_ELEMENTS.contains(&child_element.value().name()) {
                collect_text(child_element, lines);
            }
        }
    }
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
        Some(absolute_url)
    } else {
        None
    }
}
