//! Headword extraction: select one element, take its text, clean it

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

/// Default selector for the headword label on a dictionary page
pub const DEFAULT_SELECTOR: &str = ".hwLabel";

/// Everything except letters, numbers, commas, spaces and hyphens, plus
/// modifier letters (which `\p{L}` would otherwise keep).
static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^, \-\p{L}\p{N}]|\p{Lm}").expect("invalid pattern"));

/// Why a document produced no value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// No element matched the selector
    MissingElement { selector: String },
    /// Matched element has no direct text child
    MissingText { selector: String },
    /// Selector string did not parse
    InvalidSelector { selector: String, message: String },
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingElement { selector } => write!(f, "no element matches {selector}"),
            Self::MissingText { selector } => write!(f, "{selector} has no direct text"),
            Self::InvalidSelector { selector, message } => {
                write!(f, "invalid selector {selector:?}: {message}")
            }
        }
    }
}

impl std::error::Error for ExtractError {}

/// Turns one fetched document into one cleaned value.
pub trait Extract: Send + Sync {
    fn extract(&self, document: &str) -> Result<String, ExtractError>;
}

/// Normalize a raw headword.
///
/// Drops disallowed characters, trims whitespace, then drops the trailing
/// comma. Trailing whitespace left behind by the comma is trimmed too, so
/// `clean(clean(s)) == clean(s)` for every input.
pub fn clean(raw: &str) -> String {
    let stripped = DISALLOWED.replace_all(raw, "");
    stripped
        .trim()
        .trim_end_matches(|c: char| c == ',' || c == ' ')
        .to_string()
}

/// Extracts the first direct text child of the first element matching a
/// CSS selector.
#[derive(Debug)]
pub struct SelectorExtractor {
    source: String,
    selector: Selector,
}

impl SelectorExtractor {
    pub fn new(selector: &str) -> Result<Self, ExtractError> {
        let parsed = Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
            selector: selector.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            source: selector.to_string(),
            selector: parsed,
        })
    }

    pub fn selector(&self) -> &str {
        &self.source
    }

    /// Raw (uncleaned) text of the matched element
    pub fn raw_text(&self, document: &str) -> Result<String, ExtractError> {
        let html = Html::parse_document(document);
        let element = html
            .select(&self.selector)
            .next()
            .ok_or_else(|| ExtractError::MissingElement {
                selector: self.source.clone(),
            })?;
        element
            .children()
            .find_map(|node| node.value().as_text().map(|t| t.to_string()))
            .ok_or_else(|| ExtractError::MissingText {
                selector: self.source.clone(),
            })
    }
}

impl Default for SelectorExtractor {
    fn default() -> Self {
        Self {
            source: DEFAULT_SELECTOR.to_string(),
            selector: Selector::parse(DEFAULT_SELECTOR).expect("invalid default selector"),
        }
    }
}

impl Extract for SelectorExtractor {
    fn extract(&self, document: &str) -> Result<String, ExtractError> {
        self.raw_text(document).map(|raw| clean(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(label: &str) -> String {
        format!(
            r#"<html><body><div class="entry"><span class="hwLabel">{label}<sup>1</sup></span></div></body></html>"#
        )
    }

    #[test]
    fn clean_example_word() {
        assert_eq!(clean("Example-Word, "), "Example-Word");
    }

    #[test]
    fn clean_strips_punctuation() {
        assert_eq!(clean("  ab'c!d (e) "), "abcd e");
        assert_eq!(clean("a.b;c"), "abc");
    }

    #[test]
    fn clean_strips_combining_marks() {
        // decomposed e + acute, o + diaeresis
        let raw = " he\u{301}llo, wo\u{308}rld,  ";
        assert_eq!(clean(raw), "hello, world");
    }

    #[test]
    fn clean_keeps_precomposed_letters_and_digits() {
        assert_eq!(clean("café 2nd"), "café 2nd");
    }

    #[test]
    fn clean_strips_modifier_letters() {
        // U+02BC modifier letter apostrophe, U+02B0 modifier small h
        assert_eq!(clean("o\u{2bc}clock k\u{2b0}"), "oclock k");
    }

    #[test]
    fn clean_drops_tabs_and_newlines() {
        assert_eq!(clean("\tword\n"), "word");
    }

    #[test]
    fn clean_is_idempotent() {
        for raw in [
            " he\u{301}llo, wo\u{308}rld,  ",
            "Example-Word, ",
            "a ,",
            "a,,",
            " , ",
            "",
            "x-y, z",
        ] {
            let once = clean(raw);
            assert_eq!(clean(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn extracts_first_direct_text() {
        let ex = SelectorExtractor::default();
        assert_eq!(ex.extract(&page("Example-Word, ")).unwrap(), "Example-Word");
        assert_eq!(ex.raw_text(&page("Example-Word, ")).unwrap(), "Example-Word, ");
    }

    #[test]
    fn takes_first_matching_element() {
        let doc = r#"<span class="hwLabel">first</span><span class="hwLabel">second</span>"#;
        assert_eq!(SelectorExtractor::default().extract(doc).unwrap(), "first");
    }

    #[test]
    fn skips_leading_child_elements() {
        let doc = r#"<span class="hwLabel"><b>bold</b>tail,</span>"#;
        assert_eq!(SelectorExtractor::default().extract(doc).unwrap(), "tail");
    }

    #[test]
    fn missing_element() {
        let err = SelectorExtractor::default()
            .extract("<html><body><p>nothing</p></body></html>")
            .unwrap_err();
        assert_eq!(
            err,
            ExtractError::MissingElement {
                selector: ".hwLabel".to_string()
            }
        );
    }

    #[test]
    fn missing_text() {
        let err = SelectorExtractor::default()
            .extract(r#"<span class="hwLabel"><b>x</b></span>"#)
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingText { .. }));
    }

    #[test]
    fn custom_selector() {
        let ex = SelectorExtractor::new("h1.title").unwrap();
        assert_eq!(ex.selector(), "h1.title");
        assert_eq!(ex.extract(r#"<h1 class="title">Zebra</h1>"#).unwrap(), "Zebra");
    }

    #[test]
    fn invalid_selector() {
        let err = SelectorExtractor::new("[[").unwrap_err();
        assert!(matches!(err, ExtractError::InvalidSelector { .. }));
        assert!(err.to_string().contains("invalid selector"));
    }
}
