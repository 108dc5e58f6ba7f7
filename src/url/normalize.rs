use crate::UrlError;
use url::Url;

/// Query keys that only identify a campaign or click, never a resource
const TRACKING_KEYS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Normalizes a URL into the form used for deduplication
///
/// # Normalization Steps
///
/// 1. Parse; reject malformed input, non-http(s) schemes and missing hosts
/// 2. Lowercase the host and drop a default port (done by the parser)
/// 3. Collapse duplicate slashes and dot segments; an empty path becomes `/`
/// 4. Drop the fragment
/// 5. Drop tracking parameters (`utm_*`, `fbclid`, `gclid`, `mc_eid`)
/// 6. Sort the remaining parameters as written; an empty query is removed
///
/// Scheme and `www.` prefix are preserved: scheme+host is the crawl scope, so two URLs
/// that differ there are different sites.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.COM//a/./b?z=1&a=2#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/a/b?a=2&z=1");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::InvalidScheme(other.to_string())),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    let path = collapse_path(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    if let Some(query) = url.query() {
        // Parameters keep their original spelling; `?flag` must not become `?flag=`
        let mut params: Vec<&str> = query
            .split('&')
            .filter(|param| !param.is_empty() && !is_tracking_param(param))
            .collect();
        params.sort_unstable();
        let rebuilt = params.join("&");

        url.set_query((!rebuilt.is_empty()).then_some(rebuilt.as_str()));
    }

    Ok(url)
}

/// Resolves `.`/`..` and drops empty segments, keeping a trailing slash
///
/// `/docs/` and `/docs` are distinct resources on many servers.
fn collapse_path(path: &str) -> String {
    let segments = path.split('/').fold(Vec::new(), |mut kept, segment| {
        match segment {
            "" | "." => {}
            ".." => {
                kept.pop();
            }
            s => kept.push(s),
        }
        kept
    });

    if segments.is_empty() {
        return "/".to_string();
    }

    let trailing = if path.ends_with('/') { "/" } else { "" };
    format!("/{}{}", segments.join("/"), trailing)
}

fn is_tracking_param(param: &str) -> bool {
    let key = param.split_once('=').map_or(param, |(key, _)| key);
    key.starts_with("utm_") || TRACKING_KEYS.contains(&key)
}
