use crate::UrlError;
use url::form_urlencoded;
use url::Url;

/// Maximum accepted length of a URL string
pub const MAX_URL_LENGTH: usize = 2048;

/// Normalizes a URL according to Sumi-Ingest's normalization rules
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Re-encode the path: percent-decode, then percent-encode everything
///    except unreserved characters and `/`
/// 3. Re-encode the query: split into key/value pairs (blank values kept)
///    and serialize again with `+` for spaces
/// 4. Scheme, host, port and fragment are carried over unchanged
///
/// The result is stable: normalizing an already normalized URL returns it
/// unchanged.
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(String)` - Normalized URL
/// * `Err(UrlError)` - Failed to parse or normalize the URL
///
/// # Examples
///
/// ```
/// use sumi_ingest::url::normalize_url;
///
/// let url = normalize_url("https://example.com/a%20b?q=hello world").unwrap();
/// assert_eq!(url, "https://example.com/a%20b?q=hello+world");
/// ```
pub fn normalize_url(url_str: &str) -> Result<String, UrlError> {
    let url = parse_http_url(url_str)?;
    Ok(normalize_parsed(url).into())
}

/// Normalizes an already parsed URL
pub fn normalize_parsed(mut url: Url) -> Url {
    let path = requote_path(url.path());
    url.set_path(&path);

    if let Some(query) = url.query() {
        let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if pairs.is_empty() {
            url.set_query(None);
        } else {
            let encoded = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            url.set_query(Some(&encoded));
        }
    }

    url
}

/// Parses a URL and checks that it is HTTP(S) with a host
pub fn parse_http_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim())
        .map_err(|e| UrlError::Parse(format!("{}: {}", url_str, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost(url_str.to_string()));
    }

    Ok(url)
}

/// Checks the shape of a URL before it is persisted
///
/// Accepts any URL with a scheme and a host whose length does not exceed
/// [`MAX_URL_LENGTH`] characters.
pub fn validate_url(url_str: &str) -> Result<(), UrlError> {
    let len = url_str.chars().count();
    if len > MAX_URL_LENGTH {
        return Err(UrlError::TooLong {
            len,
            max: MAX_URL_LENGTH,
        });
    }

    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(format!("{}: {}", url_str, e)))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost(url_str.to_string()));
    }

    Ok(())
}

/// Decodes then re-encodes a path, leaving unreserved characters and `/` literal
fn requote_path(path: &str) -> String {
    let decoded = percent_decode(path);
    let mut out = String::with_capacity(decoded.len());

    for byte in decoded {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'/' | b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }

    out
}

/// Decodes `%XX` escapes; malformed escapes are kept as-is
pub(crate) fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    out
}

/// Decodes `%XX` escapes into a string, replacing invalid UTF-8
pub fn percent_decode_str(input: &str) -> String {
    String::from_utf8_lossy(&percent_decode(input)).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
