//! Extraction of descriptive fields from HTML.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("static selector"));
static META_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"]"#).expect("static selector"));
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("static selector"));

/// Fields parsed out of a page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedHtml {
    pub title: Option<String>,
    pub description: Option<String>,
    pub h1: Option<String>,
}

/// Parse title, meta description and first `h1`. Missing or blank fields
/// come back as None.
pub fn parse_html(body: &str) -> ParsedHtml {
    let document = Html::parse_document(body);

    let title = document
        .select(&TITLE)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|s| !s.is_empty());

    let description = document
        .select(&META_DESCRIPTION)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty());

    let h1 = document
        .select(&H1)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|s| !s.is_empty());

    ParsedHtml {
        title,
        description,
        h1,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
