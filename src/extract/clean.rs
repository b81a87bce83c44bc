//! HTML pre-cleaning ahead of Markdown conversion

use scraper::{Html, Selector};

/// Elements removed before text extraction
pub const NOISE_SELECTORS: &[&str] = &[
    "script",
    "style",
    "iframe",
    "svg",
    "meta",
    "link",
    "noscript",
    "form",
    "footer",
    "header",
    "nav",
    ".cookie-consent",
    ".ads",
    ".sidebar",
    ".popup",
    "#menu",
    ".menu",
];

/// Largest HTML document processed in full
pub const MAX_HTML_BYTES: usize = 5 * 1024 * 1024;

/// Strips navigation, scripts and other noise from a document
///
/// Oversized input is truncated first, see [`truncate_html`].
pub fn pre_clean(html: &str) -> String {
    let html = truncate_html(html, MAX_HTML_BYTES);
    let mut document = Html::parse_document(html);

    let mut doomed = Vec::new();
    for raw in NOISE_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        doomed.extend(document.select(&selector).map(|el| el.id()));
    }

    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    document.html()
}

/// Cuts `html` to at most `limit` bytes
///
/// When the last `>` before the cut lies in the final tenth of the kept
/// text, the cut moves just after it so no tag is split.
pub fn truncate_html(html: &str, limit: usize) -> &str {
    if html.len() <= limit {
        return html;
    }

    let mut end = limit;
    while !html.is_char_boundary(end) {
        end -= 1;
    }
    let head = &html[..end];

    match head.rfind('>') {
        Some(pos) if pos >= end - end / 10 => &head[..=pos],
        _ => head,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_noise() {
        let html = r#"<html><head><style>p{}</style><script>x()</script></head>
            <body><nav>menu</nav><header>top</header>
            <div class="sidebar">side</div><div id="menu">m</div>
            <main><h1>Title</h1><p>Body text</p></main>
            <footer>bottom</footer></body></html>"#;
        let cleaned = pre_clean(html);

        assert!(cleaned.contains("Body text"));
        assert!(cleaned.contains("<h1>Title</h1>"));
        for noise in ["x()", "menu", "top", "side", "bottom", "p{}"] {
            assert!(!cleaned.contains(noise), "{} survived", noise);
        }
    }

    #[test]
    fn test_nested_noise() {
        let html = "<body><nav><nav>inner</nav></nav><p>kept</p></body>";
        let cleaned = pre_clean(html);
        assert!(!cleaned.contains("inner"));
        assert!(cleaned.contains("kept"));
    }

    #[test]
    fn test_truncate_small_input_untouched() {
        assert_eq!(truncate_html("<p>x</p>", 100), "<p>x</p>");
    }

    #[test]
    fn test_truncate_at_tag_end() {
        let html = format!("{}<p>tail", "<b>x</b>".repeat(10));
        let cut = truncate_html(&html, 82);
        assert!(cut.ends_with('>'));
        assert!(cut.len() <= 82);
    }

    #[test]
    fn test_truncate_without_nearby_tag() {
        let html = format!("<p>{}", "a".repeat(100));
        assert_eq!(truncate_html(&html, 50).len(), 50);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let html = "é".repeat(10);
        let cut = truncate_html(&html, 5);
        assert_eq!(cut, "éé");
    }
}
