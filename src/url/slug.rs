use crate::url::normalize::percent_decode;
use unicode_normalization::UnicodeNormalization;
use url::Url;

/// Slug used when a URL has nothing left after stripping the seed prefix
pub const INDEX_SLUG: &str = "index";

/// Turns arbitrary text into a filesystem-safe lowercase ASCII slug
///
/// The text is NFKD-decomposed and reduced to ASCII, so accented letters keep
/// their base letter. Alphanumerics, `-` and `_` are kept; whitespace, `/` and
/// `.` act as word separators; everything else is dropped. Runs of separators
/// collapse to a single `-` and leading or trailing dashes are trimmed.
///
/// # Examples
///
/// ```
/// use sumi_ingest::url::slugify;
///
/// assert_eq!(slugify("Guía Rápida / Intro"), "guia-rapida-intro");
/// assert_eq!(slugify("api_v2"), "api_v2");
/// ```
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.nfkd().filter(char::is_ascii) {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c == '-' || c == '/' || c == '.' || c.is_ascii_whitespace() {
            pending_dash = true;
        }
    }

    slug
}

/// Derives the artifact slug of a page URL relative to the seed
///
/// The path below the seed path (or the full path for URLs outside it) has
/// its file extension stripped; the query string, if any, is appended before
/// slugifying. An empty result becomes [`INDEX_SLUG`].
pub fn url_slug(url: &Url, seed: &Url) -> String {
    let seed_path = seed.path().trim_end_matches('/');
    let path = url.path();

    let relative = match path.strip_prefix(seed_path) {
        Some(rest) if seed_path.is_empty() || rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    };

    let mut source = strip_extension(relative.trim_matches('/')).to_string();
    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        source.push(' ');
        source.push_str(&query.replace(['&', '=', '+'], " "));
    }

    let decoded = percent_decode(&source);
    let slug = slugify(&String::from_utf8_lossy(&decoded));
    if slug.is_empty() {
        INDEX_SLUG.to_string()
    } else {
        slug
    }
}

/// Removes the extension of the last path segment, if it has one
fn strip_extension(path: &str) -> &str {
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[segment_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..segment_start + dot],
        _ => path,
    }
}
