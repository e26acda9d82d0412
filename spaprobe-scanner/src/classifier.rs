//! Pure classification of network traffic.

use crate::result::UrlType;
use std::collections::BTreeMap;
use url::Url;

/// Substrings that mark a URL as an API call.
pub const API_PATTERNS: &[&str] = &[
    "/api/",
    "/v1/",
    "/v2/",
    "/v3/",
    "/rest/",
    "/graphql",
    "/rpc/",
    "/json",
    "/ajax",
    "/action",
    "/service",
    "/endpoint",
    ".json",
    "/like",
    "/comment",
    "/follow",
    "/favorite",
    "/share",
];

const JS_EXTENSIONS: &[&str] = &[".js", ".mjs", ".jsx"];
const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".ico", ".avif", ".bmp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub url_type: UrlType,
    pub is_api: bool,
}

pub fn is_api_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    API_PATTERNS.iter().any(|p| lower.contains(p))
}

/// API patterns win, then the path extension, then the content type.
pub fn url_type(url: &str, content_type: &str) -> UrlType {
    if is_api_url(url) {
        return UrlType::Api;
    }

    let path = url_path(url);
    if JS_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return UrlType::Js;
    }
    if path.ends_with(".css") {
        return UrlType::Css;
    }
    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return UrlType::Image;
    }

    let content_type = content_type.to_lowercase();
    if content_type.contains("javascript") || content_type.contains("ecmascript") {
        UrlType::Js
    } else if content_type.contains("css") {
        UrlType::Css
    } else if content_type.contains("image") {
        UrlType::Image
    } else if content_type.contains("json") || content_type.starts_with("application/") {
        UrlType::Api
    } else {
        UrlType::Other
    }
}

pub fn classify(url: &str, content_type: &str) -> Classification {
    Classification {
        url_type: url_type(url, content_type),
        is_api: is_api_url(url),
    }
}

/// Headers installed on every page so responses are fresh and comparable.
pub fn default_request_headers(accept_language: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Accept".to_string(), "*/*".to_string()),
        ("Accept-Language".to_string(), accept_language.to_string()),
        ("Cache-Control".to_string(), "no-cache".to_string()),
        ("Pragma".to_string(), "no-cache".to_string()),
    ])
}

/// Case-insensitive header lookup.
pub fn header<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Lowercased path without query or fragment.
fn url_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_lowercase(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_lowercase(),
    }
}
