//! Markdown post-processing
//!
//! Extracted text is tidied (trailing whitespace, runs of blank lines) and,
//! when the page has a heading outline, gets a table of contents after its
//! first paragraph.

use crate::extract::Heading;

/// Heading of the inserted table of contents
pub const TOC_TITLE: &str = "## Table of Contents";

/// Trims trailing whitespace and collapses 3+ blank lines to 2
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 2 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    let trimmed = out.trim_matches('\n');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}

/// GitHub-style anchor for a heading text
pub fn heading_anchor(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            c if c.is_whitespace() => Some('-'),
            _ => None,
        })
        .collect()
}

/// Renders the outline as a nested bullet list
fn render_toc(headers: &[Heading]) -> String {
    let top = headers.iter().map(|h| h.level).min().unwrap_or(1);

    let mut toc = String::new();
    toc.push_str(TOC_TITLE);
    toc.push_str("\n\n");
    for heading in headers {
        let indent = "  ".repeat(usize::from(heading.level.saturating_sub(top)));
        toc.push_str(&format!(
            "{}- [{}](#{})\n",
            indent,
            heading.text,
            heading_anchor(&heading.text)
        ));
    }
    toc
}

/// Inserts a table of contents after the first paragraph of `body`
///
/// A body without a paragraph break gets the table appended.
pub fn add_table_of_contents(body: &str, headers: &[Heading]) -> String {
    if headers.is_empty() {
        return body.to_string();
    }
    let toc = render_toc(headers);

    let start = body.len() - body.trim_start_matches('\n').len();
    match body[start..].find("\n\n") {
        Some(pos) => {
            let split = start + pos + 2;
            format!("{}{}\n{}", &body[..split], toc, &body[split..])
        }
        None if body.trim().is_empty() => toc,
        None => format!("{}\n\n{}", body.trim_end(), toc),
    }
}

/// Cleans the body and adds the table of contents
pub fn enhance_markdown(body: &str, headers: &[Heading]) -> String {
    add_table_of_contents(&clean_text(body), headers)
}
