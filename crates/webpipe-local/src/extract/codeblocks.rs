//! Shared `<pre><code>` to fenced-markdown conversion (spec §4.3: code
//! blocks survive extraction as fenced markdown). `html2text` has no concept
//! of a markdown fence, so each block's exact text is pulled out before
//! conversion, stashed behind an opaque placeholder token immune to
//! html2text's word-wrapping, then spliced back into the rendered markdown.

use html_scraper::{ElementRef, Html, Selector};
use once_cell::sync::Lazy;

static PRE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("pre").unwrap());
static CODE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("code").unwrap());

const PLACEHOLDER_MARK: char = '\u{e000}';

/// Replaces every `<pre>` in `html_fragment` with a whitespace-free
/// placeholder token, returning the rewritten fragment and the fenced
/// markdown each token stands for, in encounter order.
pub(crate) fn extract_code_blocks(html_fragment: &str) -> (String, Vec<String>) {
    let doc = Html::parse_fragment(html_fragment);
    let mut fences = Vec::new();
    let mut replaced = html_fragment.to_string();
    for pre in doc.select(&PRE_SELECTOR) {
        let lang = pre
            .select(&CODE_SELECTOR)
            .next()
            .and_then(|c| c.value().attr("class"))
            .and_then(language_from_class)
            .unwrap_or_default();
        let code_text = pre.text().collect::<String>();
        let code_text = code_text.strip_suffix('\n').unwrap_or(&code_text);
        let fence = format!("```{lang}\n{code_text}\n```");
        let token = placeholder(fences.len());
        fences.push(fence);
        replaced = replaced.replacen(&pre.html(), &token, 1);
    }
    (replaced, fences)
}

/// Restores the placeholder tokens produced by [`extract_code_blocks`] with
/// their fenced blocks in rendered markdown.
pub(crate) fn restore_code_blocks(markdown: &str, fences: &[String]) -> String {
    let mut out = markdown.to_string();
    for (i, fence) in fences.iter().enumerate() {
        out = out.replace(&placeholder(i), fence);
    }
    out
}

fn placeholder(index: usize) -> String {
    format!("{PLACEHOLDER_MARK}webpipe-codeblock-{index}{PLACEHOLDER_MARK}")
}

fn language_from_class(class: &str) -> Option<String> {
    class
        .split_whitespace()
        .find_map(|c| c.strip_prefix("language-").or_else(|| c.strip_prefix("lang-")))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_code_text_with_language_class() {
        let html = r#"<p>before</p><pre><code class="language-go">fmt.Println("x")</code></pre><p>after</p>"#;
        let (replaced, fences) = extract_code_blocks(html);
        assert!(!replaced.contains("<pre>"));
        assert_eq!(fences.len(), 1);
        assert_eq!(fences[0], "```go\nfmt.Println(\"x\")\n```");

        let restored = restore_code_blocks(&replaced, &fences);
        assert!(restored.contains("```go"));
        assert!(restored.contains("fmt.Println(\"x\")"));
    }

    #[test]
    fn handles_code_block_without_language_class() {
        let html = "<pre><code>plain text\nwith two lines</code></pre>";
        let (_, fences) = extract_code_blocks(html);
        assert_eq!(fences[0], "```\nplain text\nwith two lines\n```");
    }

    #[test]
    fn survives_placeholder_through_a_wrapping_pass() {
        let html = r#"<pre><code class="language-rust">fn main() {}</code></pre>"#;
        let (replaced, fences) = extract_code_blocks(html);
        let wrapped = format!("<html><body>{replaced}</body></html>");
        let rendered = html2text::from_read(wrapped.as_bytes(), 120).unwrap_or_default();
        let restored = restore_code_blocks(&rendered, &fences);
        assert!(restored.contains("```rust"));
        assert!(restored.contains("fn main() {}"));
    }
}
