use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host, it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_harvest::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the `scheme://host[:port]` key of a URL
///
/// Pacing clocks and robots policies are kept per origin key, and two URLs are in the
/// same crawl scope exactly when their origin keys are equal.
pub fn origin_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}://{}:{}", url.scheme(), host, port)),
        None => Some(format!("{}://{}", url.scheme(), host)),
    }
}

/// Checks whether two URLs share scheme and host (no subdomain crossing)
pub fn same_origin(a: &Url, b: &Url) -> bool {
    match (origin_key(a), origin_key(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Generic validity check: the URL has an http(s) scheme and a non-empty host
pub fn is_valid_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.host_str().map_or(false, |h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_extract_simple_domain() {
        let url = parse("https://example.com/");
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_with_port() {
        let url = parse("https://example.com:8080/");
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_origin_key_includes_port() {
        assert_eq!(
            origin_key(&parse("http://127.0.0.1:9000/a")),
            Some("http://127.0.0.1:9000".to_string())
        );
        assert_eq!(
            origin_key(&parse("https://Example.test/b")),
            Some("https://example.test".to_string())
        );
    }

    #[test]
    fn test_same_origin() {
        let seed = parse("https://example.test/");
        assert!(same_origin(&seed, &parse("https://example.test/a")));
        assert!(!same_origin(&seed, &parse("http://example.test/a")));
        assert!(!same_origin(&seed, &parse("https://other.test/b")));
        assert!(!same_origin(&seed, &parse("https://sub.example.test/")));
        assert!(!same_origin(&seed, &parse("https://example.test:8443/")));
    }

    #[test]
    fn test_is_valid_url() {
        assert!(is_valid_url(&parse("https://example.com/x")));
        assert!(!is_valid_url(&parse("mailto:a@example.com")));
        assert!(!is_valid_url(&parse("data:text/plain,hi")));
    }
}
