//! Page parsers: raw markup in, intermediate records out.
//!
//! Parsers are pure functions over the page text. They never touch
//! storage and never consult the clock; date arithmetic happens later,
//! in the ingest step. Structural mismatches fail with
//! [`AppError::MalformedPage`] naming the fragment that did not match.

pub mod conditions;
pub mod departures;
pub mod detail;
pub mod locations;

use scraper::{ElementRef, Selector};

/// Parse a selector literal. All call sites pass compile-time CSS.
fn selector(css: &'static str) -> Selector {
    Selector::parse(css).unwrap()
}

/// Concatenated, whitespace-trimmed text of an element.
fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Direct child elements with the given tag name, in document order.
fn child_elements<'a>(element: ElementRef<'a>, tag: &str) -> Vec<ElementRef<'a>> {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == tag)
        .collect()
}
