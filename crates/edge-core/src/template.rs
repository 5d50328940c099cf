//! URL template helpers.
//!
//! Configured URLs are generated for one site/locale (the configuration's
//! `url_site_id`/`url_locale`). These helpers move such a URL to another
//! identity, strip the identity out for comparison, and append query
//! parameters. Relative URLs are resolved against the origin first (see
//! `WorkerConfig::absolute_url`); only the path is ever edited.

use url::Url;

use crate::identity::SiteLocale;

/// Replace the path of `url` with `segments`, keeping query and fragment.
fn with_segments(url: &Url, segments: &[&str]) -> Url {
    let mut out = url.clone();
    out.set_path(&format!("/{}", segments.join("/")));
    out
}

/// Rewrite the identity path segments of `url` from `from` to `to`.
///
/// Only the first segment equal to the site id and the first segment equal
/// to the locale are replaced.
pub fn localize_url(url: &Url, from: &SiteLocale, to: &SiteLocale) -> Url {
    if from == to {
        return url.clone();
    }
    let Some(segments) = url.path_segments() else {
        return url.clone();
    };

    let mut site_done = false;
    let mut locale_done = false;
    let segments: Vec<&str> = segments
        .map(|segment| {
            if !site_done && segment == from.site_id {
                site_done = true;
                to.site_id.as_str()
            } else if !locale_done && segment == from.locale {
                locale_done = true;
                to.locale.as_str()
            } else {
                segment
            }
        })
        .collect();

    with_segments(url, &segments)
}

/// Remove the identity path segments of `url`.
///
/// `/s/RefArch/en_US/Cart-Show?x=1` becomes `/s/Cart-Show?x=1`.
pub fn strip_identity(url: &Url, identity: &SiteLocale) -> Url {
    let Some(segments) = url.path_segments() else {
        return url.clone();
    };

    let mut site_done = false;
    let mut locale_done = false;
    let segments: Vec<&str> = segments
        .filter(|segment| {
            if !site_done && *segment == identity.site_id {
                site_done = true;
                false
            } else if !locale_done && *segment == identity.locale {
                locale_done = true;
                false
            } else {
                true
            }
        })
        .collect();

    with_segments(url, &segments)
}

/// Append form-encoded query parameters, keeping any fragment.
pub fn append_query(url: &Url, params: &[(&str, &str)]) -> Url {
    let mut out = url.clone();
    if !params.is_empty() {
        out.query_pairs_mut().extend_pairs(params.iter());
    }
    out
}

/// Path plus query (`/a/b?x=1`), the part of a URL compared across hosts.
pub fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
