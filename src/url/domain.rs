use url::Url;

/// Returns the key used to gate requests per host
///
/// The port is part of the key, so two servers on one machine are gated
/// independently.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use juris_harvest::url::host_key;
///
/// let url = Url::parse("https://PORTAL.STF.JUS.BR/jurisprudencia/").unwrap();
/// assert_eq!(host_key(&url), Some("portal.stf.jus.br".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(host_key(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Returns the `robots.txt` location for the URL's origin
pub fn robots_url(url: &Url) -> Option<Url> {
    url.join("/robots.txt").ok()
}

/// Resolves an `href` found on `base` into an absolute HTTP(S) URL
///
/// Fragment-only, `javascript:`, `mailto:` and `tel:` links resolve to `None`.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }

    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_key_lowercases() {
        let url = Url::parse("https://Www.Conjur.Com.Br/").unwrap();
        assert_eq!(host_key(&url), Some("www.conjur.com.br".to_string()));
    }

    #[test]
    fn test_host_key_default_port_omitted() {
        let url = Url::parse("https://example.com:443/").unwrap();
        assert_eq!(host_key(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_robots_url() {
        let url = Url::parse("https://www.stj.jus.br/sites/portalp/Jurisprudencia?x=1").unwrap();
        assert_eq!(
            robots_url(&url).unwrap().as_str(),
            "https://www.stj.jus.br/robots.txt"
        );
    }

    #[test]
    fn test_resolve_relative_link() {
        let base = Url::parse("https://www.migalhas.com.br/quentes").unwrap();
        let url = resolve_link(&base, "/noticia/123").unwrap();
        assert_eq!(url.as_str(), "https://www.migalhas.com.br/noticia/123");
    }

    #[test]
    fn test_resolve_absolute_link() {
        let base = Url::parse("https://example.com/").unwrap();
        let url = resolve_link(&base, "https://other.com/page").unwrap();
        assert_eq!(url.as_str(), "https://other.com/page");
    }

    #[test]
    fn test_skipped_links() {
        let base = Url::parse("https://example.com/").unwrap();
        assert!(resolve_link(&base, "#top").is_none());
        assert!(resolve_link(&base, "javascript:void(0)").is_none());
        assert!(resolve_link(&base, "mailto:a@b.com").is_none());
        assert!(resolve_link(&base, "").is_none());
    }
}
