//! Front-matter extraction with `scraper`

use crate::extract::traits::{Heading, MetadataExtractor, PageMetadata};
use crate::extract::ExtractError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Title used when a page offers none
pub const DEFAULT_TITLE: &str = "Document";

/// Engine identifier written into every front-matter block
pub fn ingestion_engine() -> String {
    format!("sumi-ingest {}", env!("CARGO_PKG_VERSION"))
}

/// Reads title, authorship, social cards, JSON-LD and the heading outline
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlMetadataExtractor;

impl MetadataExtractor for HtmlMetadataExtractor {
    fn extract(&self, html: &str, url: &str) -> Result<PageMetadata, ExtractError> {
        let document = Html::parse_document(html);

        let og_title = meta_content(&document, "property", "og:title");
        let title = og_title
            .as_deref()
            .or(first_text(&document, "title").as_deref())
            .map(trim_title)
            .filter(|t| !t.is_empty())
            .or_else(|| first_text(&document, "h1").map(|t| trim_title(&t)))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        let date = meta_content(&document, "property", "article:published_time")
            .or_else(|| meta_content(&document, "name", "date"))
            .or_else(|| first_attr(&document, "time[datetime]", "datetime"));

        let sitename = meta_content(&document, "property", "og:site_name").or_else(|| {
            Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
        });

        let keywords = meta_content(&document, "name", "keywords")
            .map(|k| {
                k.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(PageMetadata {
            url: url.to_string(),
            title,
            author: meta_content(&document, "name", "author"),
            date,
            sitename,
            description: meta_content(&document, "name", "description"),
            keywords,
            og_title,
            og_description: meta_content(&document, "property", "og:description"),
            og_image: meta_content(&document, "property", "og:image"),
            og_type: meta_content(&document, "property", "og:type"),
            twitter_card: meta_content(&document, "name", "twitter:card"),
            twitter_site: meta_content(&document, "name", "twitter:site"),
            json_ld: json_ld(&document),
            headers: outline(&document),
            ingestion_engine: ingestion_engine(),
        })
    }
}

/// Keeps the part of a title before the first `|` or ` - `
fn trim_title(title: &str) -> String {
    let cut = [title.find('|'), title.find(" - ")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(title.len());
    collapse_whitespace(&title[..cut])
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .map(element_text)
        .find(|t| !t.is_empty())
}

fn first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Content of `<meta {key}="{name}">`
fn meta_content(document: &Html, key: &str, name: &str) -> Option<String> {
    first_attr(document, &format!(r#"meta[{}="{}"]"#, key, name), "content")
}

/// First parsable `application/ld+json` block
fn json_ld(document: &Html) -> Option<serde_json::Value> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    document
        .select(&selector)
        .find_map(|el| serde_json::from_str(&el.text().collect::<String>()).ok())
}

fn outline(document: &Html) -> Vec<Heading> {
    let Ok(selector) = Selector::parse("h1, h2, h3, h4, h5, h6") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|el| {
            let level = el.value().name()[1..].parse().ok()?;
            let text = element_text(el);
            (!text.is_empty()).then_some(Heading { level, text })
        })
        .collect()
}
