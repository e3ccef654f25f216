//! Pure URL/link classification (§4.4). No I/O, no shared state.

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

pub const DEFAULT_FILE_EXTS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "rtf",
];

pub const DEFAULT_KEYWORDS: &[&str] = &[
    "議事録", "会議録", "議会", "本会議", "委員会", "定例会", "臨時会", "会議結果",
];

pub const DEFAULT_URL_HINTS: &[&str] = &["gikai", "kaigi", "giji", "minutes", "council"];

/// How strongly a link looks like a meeting-minutes link (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MinuteScore {
    No = 0,
    Hint = 1,
    Keyword = 2,
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub file_exts: HashSet<String>,
    pub keywords: Vec<String>,
    pub url_hints: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            file_exts: DEFAULT_FILE_EXTS.iter().map(|s| s.to_string()).collect(),
            keywords: DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            url_hints: DEFAULT_URL_HINTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ClassifierConfig {
    /// True iff the URL path's last segment has an extension in `file_exts`.
    /// HTML never counts as a file (§4.4).
    pub fn is_minute_file(&self, url: &str) -> bool {
        is_minute_file_with(url, &self.file_exts)
    }

    /// Score in {0,1,2}: keyword match beats hint match beats no match.
    pub fn looks_like_minute(&self, url: &str, anchor_text: &str) -> MinuteScore {
        let haystack_url = url.to_lowercase();
        let haystack_anchor = anchor_text.to_lowercase();
        if self
            .keywords
            .iter()
            .any(|k| url.contains(k.as_str()) || anchor_text.contains(k.as_str()))
        {
            return MinuteScore::Keyword;
        }
        if self
            .url_hints
            .iter()
            .any(|h| haystack_url.contains(&h.to_lowercase()) || haystack_anchor.contains(&h.to_lowercase()))
        {
            return MinuteScore::Hint;
        }
        MinuteScore::No
    }
}

fn extension_of(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    let ext = last_segment.rsplit_once('.').map(|(_, ext)| ext)?;
    if ext.is_empty() || ext.contains('/') {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

fn is_minute_file_with(url: &str, file_exts: &HashSet<String>) -> bool {
    match extension_of(url) {
        Some(ext) => file_exts.contains(&ext),
        None => false,
    }
}

/// `is_minute_file` against the built-in default extension set, used where no
/// `ClassifierConfig` is in scope (e.g. `is_html`'s payload check in
/// [`crate::http_client`]).
pub fn is_minute_file(url: &str) -> bool {
    let exts: HashSet<String> = DEFAULT_FILE_EXTS.iter().map(|s| s.to_string()).collect();
    is_minute_file_with(url, &exts)
}

/// Resolve a (possibly relative) URL against `base`; lower-case scheme and
/// host; drop fragment; collapse duplicate path slashes; empty path -> `/`.
/// Query string and percent-encoding are left untouched (§4.4).
pub fn normalize(raw: &str, base: &Url) -> Option<Url> {
    let mut url = base.join(raw).ok()?;
    url.set_fragment(None);

    let scheme = url.scheme().to_ascii_lowercase();
    url.set_scheme(&scheme).ok()?;

    if let Some(host) = url.host_str() {
        let host = host.to_ascii_lowercase();
        url.set_host(Some(&host)).ok()?;
    }

    let collapsed = collapse_slashes(url.path());
    url.set_path(&collapsed);
    if url.path().is_empty() {
        url.set_path("/");
    }
    Some(url)
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out
}

/// Extracted anchor: absolute target URL plus its visible anchor text.
#[derive(Debug, Clone)]
pub struct ExtractedLink {
    pub url: Url,
    pub anchor_text: String,
}

/// Parses anchors out of `html`, resolving each `href` against `base`.
/// Ignores `javascript:`, `mailto:`, `tel:` and empty hrefs (§4.4).
pub fn extract_links(html: &str, base: &Url) -> Vec<ExtractedLink> {
    let document = Html::parse_document(html);
    let selector = match Selector::parse("a") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() {
            continue;
        }
        let lower = href.to_ascii_lowercase();
        if lower.starts_with("javascript:") || lower.starts_with("mailto:") || lower.starts_with("tel:") {
            continue;
        }
        let Some(url) = normalize(href, base) else {
            continue;
        };
        let anchor_text: String = element.text().collect::<Vec<_>>().join("").trim().to_string();
        links.push(ExtractedLink { url, anchor_text });
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_file_requires_known_extension() {
        let cfg = ClassifierConfig::default();
        assert!(cfg.is_minute_file("https://city.example/docs/minutes.pdf"));
        assert!(!cfg.is_minute_file("https://city.example/docs/minutes.html"));
        assert!(!cfg.is_minute_file("https://city.example/docs/minutes"));
    }

    #[test]
    fn keyword_outranks_hint() {
        let cfg = ClassifierConfig::default();
        assert_eq!(
            cfg.looks_like_minute("https://city.example/gikai/doc.pdf", "議事録"),
            MinuteScore::Keyword
        );
        assert_eq!(
            cfg.looks_like_minute("https://city.example/gikai/doc.pdf", ""),
            MinuteScore::Hint
        );
        assert_eq!(
            cfg.looks_like_minute("https://city.example/foo/doc.pdf", "plain"),
            MinuteScore::No
        );
    }

    #[test]
    fn normalize_lowercases_host_and_drops_fragment() {
        let base = Url::parse("https://City.Example/a/").unwrap();
        let got = normalize("//City.Example/a//b.html#frag", &base).unwrap();
        assert_eq!(got.as_str(), "https://city.example/a/b.html");
    }

    #[test]
    fn normalize_empty_path_becomes_root() {
        let base = Url::parse("https://city.example").unwrap();
        let got = normalize("https://city.example", &base).unwrap();
        assert_eq!(got.path(), "/");
    }

    #[test]
    fn extract_links_skips_non_navigable_schemes() {
        let base = Url::parse("https://city.example/idx").unwrap();
        let html = r#"
            <a href="mailto:foo@example.com">mail</a>
            <a href="javascript:void(0)">js</a>
            <a href="">empty</a>
            <a href="minutes.pdf">議事録</a>
        "#;
        let links = extract_links(html, &base);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].anchor_text, "議事録");
    }
}
