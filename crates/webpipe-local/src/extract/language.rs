//! Language detection (spec §4.3): document attributes first, then a short
//! heuristic over the first ~2KB of extracted text. Absent means unset —
//! never guess past the point of confidence.

use html_scraper::{Html, Selector};
use once_cell::sync::Lazy;

static COMMON_WORDS: Lazy<[(&str, &[&str]); 6]> = Lazy::new(|| {
    [
        ("en", &["the", "and", "of", "to", "in", "is", "that"]),
        ("es", &["el", "la", "de", "que", "y", "en", "los"]),
        ("fr", &["le", "la", "de", "et", "les", "des", "pour"]),
        ("de", &["der", "die", "und", "das", "ist", "von", "den"]),
        ("pt", &["o", "a", "de", "que", "e", "do", "para"]),
        ("ja", &[]),
    ]
});

/// `<html lang>` or `<meta name="language"|http-equiv="content-language">`.
pub fn detect_from_document(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    if let Ok(sel) = Selector::parse("html[lang]") {
        if let Some(el) = doc.select(&sel).next() {
            if let Some(lang) = el.value().attr("lang") {
                let lang = lang.trim();
                if !lang.is_empty() {
                    return Some(normalize_lang_tag(lang));
                }
            }
        }
    }
    if let Ok(sel) = Selector::parse(r#"meta[name="language"], meta[http-equiv="content-language"]"#) {
        if let Some(el) = doc.select(&sel).next() {
            if let Some(content) = el.value().attr("content") {
                let content = content.trim();
                if !content.is_empty() {
                    return Some(normalize_lang_tag(content));
                }
            }
        }
    }
    None
}

fn normalize_lang_tag(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or(tag)
        .to_ascii_lowercase()
}

/// Fallback heuristic: count stopword hits for each candidate language over
/// the first ~2KB of extracted text, return the best scorer if it clears a
/// minimal confidence floor.
pub fn detect_from_text(text: &str) -> Option<String> {
    let mut cut = text.len().min(2048);
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let window = &text[..cut];
    let lower = window.to_ascii_lowercase();
    let tokens: Vec<&str> = lower.split_whitespace().collect();
    if tokens.len() < 10 {
        return None;
    }

    let mut best: Option<(&str, usize)> = None;
    for (lang, words) in COMMON_WORDS.iter() {
        if words.is_empty() {
            continue;
        }
        let hits = tokens.iter().filter(|t| words.contains(t)).count();
        if best.map(|(_, b)| hits > b).unwrap_or(hits > 0) {
            best = Some((lang, hits));
        }
    }

    best.filter(|(_, hits)| *hits * 20 >= tokens.len()).map(|(lang, _)| lang.to_string())
}

pub fn detect(html: &str, text: &str) -> Option<String> {
    detect_from_document(html).or_else(|| detect_from_text(text))
}
