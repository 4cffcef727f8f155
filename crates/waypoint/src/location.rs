//! URL helpers shared by the loader, history manager and link interception.

use url::{Position, Url};

use crate::error::NavigationError;

/// Resolve `candidate` against `base`.
///
/// # Errors
/// Returns [`NavigationError::InvalidUrl`] when `candidate` cannot be resolved.
pub fn resolve(base: &Url, candidate: &str) -> Result<Url, NavigationError> {
    base.join(candidate).map_err(|err| NavigationError::InvalidUrl {
        url: candidate.to_owned(),
        reason: err.to_string(),
    })
}

/// Path plus query string, e.g. `/page?x=1`.
pub fn path_and_query(url: &Url) -> String {
    url[Position::BeforePath..Position::AfterQuery].to_owned()
}

/// Whether `candidate`, resolved against `base`, shares `base`'s scheme, host and port.
pub fn is_same_origin(base: &Url, candidate: &str) -> bool {
    base.join(candidate)
        .is_ok_and(|resolved| resolved.origin() == base.origin())
}

/// Key under which an asset URL is tracked: the resolved absolute URL, or the raw text
/// when it cannot be resolved.
pub fn asset_key(base: &Url, candidate: &str) -> String {
    base.join(candidate)
        .map_or_else(|_| candidate.to_owned(), String::from)
}

/// `url` without its fragment.
pub fn without_fragment(url: &Url) -> &str {
    &url[..Position::AfterQuery]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Result<Url, url::ParseError> {
        Url::parse("https://site.test/dir/page?x=1#frag")
    }

    #[test]
    fn path_and_query_drops_origin_and_fragment() -> Result<(), url::ParseError> {
        assert_eq!(path_and_query(&base()?), "/dir/page?x=1");
        Ok(())
    }

    #[test]
    fn relative_urls_are_same_origin() -> Result<(), url::ParseError> {
        let page = base()?;
        assert!(is_same_origin(&page, "other.js"));
        assert!(is_same_origin(&page, "/root.js"));
        assert!(!is_same_origin(&page, "https://cdn.test/lib.js"));
        assert!(!is_same_origin(&page, "http://site.test/insecure.js"));
        Ok(())
    }

    #[test]
    fn asset_keys_are_absolute() -> Result<(), url::ParseError> {
        assert_eq!(asset_key(&base()?, "a.css"), "https://site.test/dir/a.css");
        Ok(())
    }
}
