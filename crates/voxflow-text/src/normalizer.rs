//! TTS-side text normalization
//!
//! Strips chat markup the model tends to produce (headers, emphasis, code,
//! quotes, links, rules), collapses whitespace, and runs the configured
//! pronunciation pipeline. Output is plain text for the TTS engine; SSML is
//! never produced.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use voxflow_core::Options;

use crate::pronounce::{lookup, Pronouncer};

const DICTIONARY_SEPARATOR: &str = "<|||>";
const FENCE_PLACEHOLDER: char = '\u{f8ff}';

static HEADERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*#{1,6}\s*").expect("headers"));
static QUOTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*>\s*").expect("quotes"));
static LINKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("links"));
static RULES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(-{3,}|\*{3,}|_{3,})\s*$").expect("rules"));
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]*)`").expect("inline code"));

/// Markdown-stripping, pronunciation-normalizing text preprocessor
pub struct SpeechNormalizer {
    language: String,
    normalizers: Vec<(String, Pronouncer)>,
}

impl SpeechNormalizer {
    /// Pipeline selection comes from `speaker.pronunciation.dictionaries`
    /// (`<|||>`-separated ids, applied in order); unknown ids are skipped.
    /// `speaker.language` defaults to `en`.
    pub fn new(options: &Options) -> Self {
        let language = options
            .get_string("speaker.language")
            .unwrap_or_else(|| "en".to_string());

        let mut normalizers = Vec::new();
        if let Some(selection) = options.get_string("speaker.pronunciation.dictionaries") {
            for id in selection.split(DICTIONARY_SEPARATOR) {
                let id = id.trim();
                if id.is_empty() {
                    continue;
                }
                match lookup(id) {
                    Some(f) => normalizers.push((id.to_string(), f)),
                    None => warn!(id, "unknown pronunciation normalizer, skipping"),
                }
            }
        }

        Self {
            language,
            normalizers,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn normalizer_count(&self) -> usize {
        self.normalizers.len()
    }

    /// Normalize one chunk of model text for synthesis
    pub fn normalize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let mut out = remove_markdown(text);
        for (_, normalizer) in &self.normalizers {
            out = normalizer(&out);
        }
        normalize_whitespace(&out)
    }
}

/// Strip chat markup, preserving the spoken words
pub(crate) fn remove_markdown(text: &str) -> String {
    // Fences shrink to double backticks, which are then shielded so the
    // inline-code pass only eats single-backtick spans
    let mut out = text.replace("```", "``");
    out = out.replace("``", &FENCE_PLACEHOLDER.to_string());
    out = INLINE_CODE.replace_all(&out, "$1").into_owned();
    out = out.replace(FENCE_PLACEHOLDER, "``");

    out = HEADERS.replace_all(&out, "").into_owned();
    out = RULES.replace_all(&out, "").into_owned();
    out = LINKS.replace_all(&out, "$1").into_owned();
    out = QUOTES.replace_all(&out, "").into_owned();

    // Emphasis markers are removed wherever they appear; identifiers with
    // underscores lose them too, which is the wanted reading for TTS
    out.replace(['*', '_'], "")
}

/// Collapse all whitespace runs to single spaces and trim the edges
pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain() -> SpeechNormalizer {
        SpeechNormalizer::new(&Options::new())
    }

    #[test]
    fn test_plain_text_untouched() {
        let n = plain();
        assert_eq!(n.normalize("Hello world"), "Hello world");
        assert_eq!(
            n.normalize("Hello world. How are you today?"),
            "Hello world. How are you today?"
        );
        assert_eq!(n.normalize(""), "");
    }

    #[test]
    fn test_headers_removed() {
        let n = plain();
        assert_eq!(n.normalize("# Main Title"), "Main Title");
        assert_eq!(n.normalize("###### Deepest Section"), "Deepest Section");
        assert_eq!(
            n.normalize("# Title\n## Subtitle\n### Section"),
            "Title Subtitle Section"
        );
    }

    #[test]
    fn test_emphasis_removed() {
        let n = plain();
        assert_eq!(n.normalize("This is **bold** text"), "This is bold text");
        assert_eq!(n.normalize("This is __bold__ text"), "This is bold text");
        assert_eq!(n.normalize("This is *italic* text"), "This is italic text");
        assert_eq!(
            n.normalize("This is ***bold italic*** text"),
            "This is bold italic text"
        );
    }

    #[test]
    fn test_code_removed_but_fences_survive_as_markers() {
        let n = plain();
        assert_eq!(n.normalize("Use the `print` function"), "Use the print function");
        assert_eq!(
            n.normalize("Example:\n```\ncode here\n```"),
            "Example: `` code here ``"
        );
        assert_eq!(
            n.normalize("Example:\n```python\nprint('hello')\n```"),
            "Example: ``python print('hello') ``"
        );
    }

    #[test]
    fn test_quotes_and_rules_removed() {
        let n = plain();
        assert_eq!(n.normalize("> This is a quote"), "This is a quote");
        assert_eq!(n.normalize("> Line one\n> Line two"), "Line one Line two");
        assert_eq!(n.normalize("Before\n---\nAfter"), "Before After");
        assert_eq!(n.normalize("Before\n***\nAfter"), "Before After");
        assert_eq!(n.normalize("Before\n___\nAfter"), "Before After");
    }

    #[test]
    fn test_links_and_images() {
        let n = plain();
        assert_eq!(n.normalize("Visit [Google](https://google.com)"), "Visit Google");
        assert_eq!(
            n.normalize("[First](url1) and [Second](url2) links"),
            "First and Second links"
        );
        assert_eq!(n.normalize("![Logo](https://example.com/logo.png)"), "!Logo");
    }

    #[test]
    fn test_whitespace_collapsed() {
        let n = plain();
        assert_eq!(n.normalize("Hello    world"), "Hello world");
        assert_eq!(n.normalize("Hello\t\nworld"), "Hello world");
        assert_eq!(n.normalize("   Hello world   "), "Hello world");
        assert_eq!(n.normalize("   \t\n   "), "");
    }

    #[test]
    fn test_underscored_identifiers_lose_underscores() {
        let n = plain();
        assert_eq!(n.normalize("variable_name_here"), "variablenamehere");
        assert_eq!(n.normalize("5*3=15"), "53=15");
    }

    #[test]
    fn test_unicode_preserved() {
        let n = plain();
        assert_eq!(
            n.normalize("Hello 世界 Привет مرحبا"),
            "Hello 世界 Привет مرحبا"
        );
    }

    #[test]
    fn test_full_document() {
        let n = plain();
        let input = "# Welcome\n\nThis is **important** information.\n\n## Features\n\n- Feature *one*\n- Feature **two**\n\nVisit [our site](https://example.com) for more.\n\n> A wise quote\n\n```\nsome code\n```\n\nThank you!";
        assert_eq!(
            n.normalize(input),
            "Welcome This is important information. Features - Feature one - Feature two Visit our site for more. A wise quote `` some code `` Thank you!"
        );
    }

    #[test]
    fn test_no_ssml_in_output() {
        let n = plain();
        for input in ["Use the <tag> element", "Tom & Jerry show", "5 < 10 is true"] {
            let out = n.normalize(input);
            assert!(!out.contains("<speak>"));
            assert!(!out.contains("<break"));
            assert!(!out.contains("&amp;"));
            assert!(!out.contains("&lt;"));
        }
    }

    #[test]
    fn test_pipeline_selection() {
        let options = Options::new().with(
            "speaker.pronunciation.dictionaries",
            json!("url<|||>unknown-normalizer<|||>currency"),
        );
        let n = SpeechNormalizer::new(&options);
        assert_eq!(n.normalizer_count(), 2);
        assert_eq!(n.language(), "en");
    }

    #[test]
    fn test_url_then_currency_pipeline() {
        let options = Options::new()
            .with("speaker.pronunciation.dictionaries", json!("url<|||>currency"));
        let n = SpeechNormalizer::new(&options);
        let out = n.normalize("Visit www.shop.com and pay $19.99");
        assert!(out.contains("dot"), "url pass ran: {out}");
        assert!(!out.is_empty());
    }

    #[test]
    fn test_language_override() {
        let options = Options::new().with("speaker.language", json!("es"));
        assert_eq!(SpeechNormalizer::new(&options).language(), "es");
    }
}
