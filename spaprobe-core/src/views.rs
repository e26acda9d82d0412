// Derived views over captured responses

use spaprobe_scanner::result::{CapturedResponse, UrlType};
use std::collections::BTreeMap;

/// Responses flagged as API calls.
pub fn filter_api<'a, I>(urls: I) -> Vec<&'a CapturedResponse>
where
    I: IntoIterator<Item = &'a CapturedResponse>,
{
    urls.into_iter().filter(|r| r.is_api).collect()
}

/// Responses bucketed by URL type. Order inside a bucket is capture order.
pub fn group_by_type<'a, I>(urls: I) -> BTreeMap<UrlType, Vec<&'a CapturedResponse>>
where
    I: IntoIterator<Item = &'a CapturedResponse>,
{
    let mut groups: BTreeMap<UrlType, Vec<&CapturedResponse>> = BTreeMap::new();
    for response in urls {
        groups.entry(response.url_type).or_default().push(response);
    }
    groups
}

/// Case-insensitive substring search over response URLs.
pub fn search_urls<'a, I>(urls: I, keyword: &str) -> Vec<&'a CapturedResponse>
where
    I: IntoIterator<Item = &'a CapturedResponse>,
{
    let needle = keyword.to_lowercase();
    urls.into_iter()
        .filter(|r| r.url.to_lowercase().contains(&needle))
        .collect()
}

/// Selection applied before a report is rendered.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    pub api_only: bool,
    pub search: Option<String>,
}

impl UrlFilter {
    pub fn is_empty(&self) -> bool {
        !self.api_only && self.search.is_none()
    }

    pub fn apply<'a>(&self, urls: &'a [CapturedResponse]) -> Vec<&'a CapturedResponse> {
        let selected = if self.api_only {
            filter_api(urls)
        } else {
            urls.iter().collect()
        };
        match self.search {
            Some(ref keyword) => search_urls(selected, keyword),
            None => selected,
        }
    }
}
