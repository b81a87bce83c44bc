//! HTML to Markdown conversion with `htmd`

use crate::extract::traits::TextExtractor;
use crate::extract::ExtractError;
use htmd::HtmlToMarkdown;

/// Tags dropped together with their content
const SKIP_TAGS: &[&str] = &["script", "style", "head"];

/// Converts cleaned HTML to Markdown
#[derive(Debug, Clone)]
pub struct HtmdTextExtractor {
    skip_tags: Vec<&'static str>,
}

impl HtmdTextExtractor {
    pub fn new() -> Self {
        Self {
            skip_tags: SKIP_TAGS.to_vec(),
        }
    }
}

impl Default for HtmdTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for HtmdTextExtractor {
    fn name(&self) -> &str {
        "htmd"
    }

    fn extract(&self, html: &str, url: &str) -> Result<String, ExtractError> {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(self.skip_tags.clone())
            .build();

        converter
            .convert(html)
            .map(|markdown| markdown.trim().to_string())
            .map_err(|e| ExtractError::Html(format!("{}: {}", url, e)))
    }
}
