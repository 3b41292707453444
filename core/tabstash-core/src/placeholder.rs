//! Placeholder-page URL codec.
//!
//! A restored tab does not load its real page immediately. It points at an
//! internal placeholder page that carries the original tab's metadata in
//! its own query string and navigates to the real URL once the tab becomes
//! visible. The snapshot builder uses [`decode`] so a still-unloaded
//! restored tab snapshots as its original page, not as a placeholder.

use tabstash_protocol::HostTab;

/// URL prefix reserved for the internal placeholder page.
pub const PLACEHOLDER_PREFIX: &str = "tabstash://restore/?";

/// Original tab metadata carried by a placeholder URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMeta {
    pub url: String,
    pub title: String,
    pub favicon_url: Option<String>,
}

impl PlaceholderMeta {
    /// Captures the metadata a live tab would need to survive a restore.
    pub fn from_tab(tab: &HostTab) -> Self {
        PlaceholderMeta {
            url: tab.url.clone(),
            title: tab.title.clone(),
            favicon_url: tab.favicon_url.clone(),
        }
    }
}

/// True if `url` points at the internal placeholder page.
pub fn is_placeholder(url: &str) -> bool {
    url.starts_with(PLACEHOLDER_PREFIX)
}

/// Builds a placeholder URL carrying the given tab metadata.
pub fn encode(meta: &PlaceholderMeta) -> String {
    let mut out = format!("{}url={}", PLACEHOLDER_PREFIX, urlencoding::encode(&meta.url));
    if !meta.title.is_empty() {
        out.push_str("&title=");
        out.push_str(&urlencoding::encode(&meta.title));
    }
    if let Some(favicon) = &meta.favicon_url {
        out.push_str("&favicon=");
        out.push_str(&urlencoding::encode(favicon));
    }
    out
}

/// Decodes a placeholder URL back to the original tab metadata.
///
/// Tolerant: a missing title decodes to empty, a missing favicon to `None`.
/// Returns `None` if `url` is not a placeholder or carries no original URL.
pub fn decode(url: &str) -> Option<PlaceholderMeta> {
    let query = url.strip_prefix(PLACEHOLDER_PREFIX)?;

    let mut original_url = None;
    let mut title = String::new();
    let mut favicon_url = None;

    for pair in query.split('&') {
        let (key, raw) = pair.split_once('=')?;
        let value = urlencoding::decode(raw).ok()?.into_owned();
        match key {
            "url" => original_url = Some(value),
            "title" => title = value,
            "favicon" => favicon_url = Some(value),
            _ => {}
        }
    }

    original_url.map(|url| PlaceholderMeta {
        url,
        title,
        favicon_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(url: &str, title: &str, favicon: Option<&str>) -> PlaceholderMeta {
        PlaceholderMeta {
            url: url.to_string(),
            title: title.to_string(),
            favicon_url: favicon.map(|s| s.to_string()),
        }
    }

    #[test]
    fn encode_decode_round_trips() {
        let original = meta(
            "https://example.com/path?q=1&r=2",
            "Example — results",
            Some("https://example.com/favicon.ico"),
        );
        let url = encode(&original);
        assert!(is_placeholder(&url));
        assert_eq!(decode(&url), Some(original));
    }

    #[test]
    fn decode_without_title_or_favicon() {
        let url = encode(&meta("https://example.com", "", None));
        let decoded = decode(&url).unwrap();
        assert_eq!(decoded.url, "https://example.com");
        assert_eq!(decoded.title, "");
        assert!(decoded.favicon_url.is_none());
    }

    #[test]
    fn regular_url_is_not_placeholder() {
        assert!(!is_placeholder("https://example.com"));
        assert!(decode("https://example.com").is_none());
    }

    #[test]
    fn placeholder_without_url_param_does_not_decode() {
        let url = format!("{}title=Orphan", PLACEHOLDER_PREFIX);
        assert!(decode(&url).is_none());
    }

    #[test]
    fn reserved_characters_survive_the_round_trip() {
        let original = meta("https://example.com/?a=b&c=d#frag", "50% & rising", None);
        assert_eq!(decode(&encode(&original)), Some(original));
    }
}
