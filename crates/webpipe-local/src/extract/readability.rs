//! Readability strategy (spec §4.3): pick the dominant article node by
//! text-density vs link-density scoring, strip boilerplate, emit title +
//! markdown.

use super::pick_main_node;
use html_scraper::{ElementRef, Html, Selector};
use once_cell::sync::Lazy;

static BOILERPLATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("nav, aside, footer, script, style, form, header").unwrap());
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static OG_TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static H1_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static MARKDOWN_LINK_RE: Lazy<regex::Regex> = Lazy::new(|| regex::Regex::new(r"\]\(([^)]+)\)").unwrap());

pub struct ReadabilityOutput {
    pub title: Option<String>,
    pub markdown: String,
    pub text: String,
}

pub fn extract(html: &str, base_url: Option<&str>) -> ReadabilityOutput {
    let doc = Html::parse_document(html);
    let title = extract_title(&doc);

    let main_html = pick_main_node(&doc)
        .map(|el| strip_boilerplate_html(el.html().as_str()))
        .unwrap_or_else(|| html.to_string());

    let markdown = html_to_markdown(&main_html, base_url);
    let text = markdown_to_plain_text(&markdown);

    ReadabilityOutput { title, markdown, text }
}

fn extract_title(doc: &Html) -> Option<String> {
    if let Some(el) = doc.select(&TITLE_SELECTOR).next() {
        let t = el.text().collect::<String>().trim().to_string();
        if !t.is_empty() {
            return Some(t);
        }
    }
    if let Some(el) = doc.select(&OG_TITLE_SELECTOR).next() {
        if let Some(c) = el.value().attr("content") {
            let c = c.trim().to_string();
            if !c.is_empty() {
                return Some(c);
            }
        }
    }
    if let Some(el) = doc.select(&H1_SELECTOR).next() {
        let t = el.text().collect::<String>().trim().to_string();
        if !t.is_empty() {
            return Some(t);
        }
    }
    None
}

/// Drops boilerplate descendants by re-parsing without them. `scraper`
/// doesn't support mutation in place, so the simplest correct approach is
/// a fresh fragment parse that walks and skips matched subtrees while
/// serializing.
fn strip_boilerplate_html(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    let boilerplate: std::collections::HashSet<_> = doc.select(&BOILERPLATE_SELECTOR).map(|e| e.id()).collect();

    let mut out = String::new();
    for child in doc.tree.root().children() {
        render_node_skipping(child, &boilerplate, &mut out);
    }
    out
}

fn render_node_skipping(
    node: ego_tree::NodeRef<html_scraper::Node>,
    skip: &std::collections::HashSet<ego_tree::NodeId>,
    out: &mut String,
) {
    if skip.contains(&node.id()) {
        return;
    }
    if let Some(el) = ElementRef::wrap(node) {
        out.push_str(&el.html());
    } else if let Some(text) = node.value().as_text() {
        out.push_str(text);
    }
}

fn html_to_markdown(html_fragment: &str, base_url: Option<&str>) -> String {
    let (fragment, fences) = super::codeblocks::extract_code_blocks(html_fragment);
    let wrapped = format!("<html><body>{fragment}</body></html>");
    let width = 120;
    let rendered = html2text::from_read(wrapped.as_bytes(), width).unwrap_or_default();
    let rendered = super::codeblocks::restore_code_blocks(&rendered, &fences);
    match base_url {
        Some(base) => resolve_relative_markdown_links(&rendered, base),
        None => rendered,
    }
}

/// `html2text` renders anchors as `[text](href)`; relative hrefs are resolved
/// against `base` so markdown consumers never see a dangling relative link.
fn resolve_relative_markdown_links(markdown: &str, base: &str) -> String {
    let Ok(base) = url::Url::parse(base) else {
        return markdown.to_string();
    };
    MARKDOWN_LINK_RE.replace_all(markdown, |caps: &regex::Captures| {
        let href = &caps[1];
        if url::Url::parse(href).is_ok() || href.starts_with('#') {
            format!("]({href})")
        } else {
            match base.join(href) {
                Ok(abs) => format!("]({abs})"),
                Err(_) => format!("]({href})"),
            }
        }
    })
    .to_string()
}

fn markdown_to_plain_text(markdown: &str) -> String {
    markdown
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_from_title_tag() {
        let html = "<html><head><title>Hello</title></head><body><p>x</p></body></html>";
        let out = extract(html, None);
        assert_eq!(out.title, Some("Hello".to_string()));
    }

    #[test]
    fn falls_back_to_h1_when_no_title_tag() {
        let html = "<html><body><h1>Only Heading</h1><p>content here that is reasonably long for scoring purposes to win</p></body></html>";
        let out = extract(html, None);
        assert_eq!(out.title, Some("Only Heading".to_string()));
    }

    #[test]
    fn strips_nav_and_footer_boilerplate() {
        let html = r#"<html><body>
            <nav>Home About Contact</nav>
            <article><p>The quick brown fox jumps over the lazy dog in a long sentence that should dominate scoring easily here.</p></article>
            <footer>Copyright 2024</footer>
        </body></html>"#;
        let out = extract(html, None);
        assert!(out.markdown.contains("quick brown fox"));
        assert!(!out.markdown.to_lowercase().contains("copyright"));
    }

    #[test]
    fn preserves_code_blocks_as_markdown_fences() {
        let html = r#"<html><body><article>
            <p>An article with a setup snippet that is long enough to dominate the scoring pass reliably.</p>
            <pre><code class="language-rust">fn main() {
    println!("hi");
}</code></pre>
        </article></body></html>"#;
        let out = extract(html, None);
        assert!(out.markdown.contains("```rust"));
        assert!(out.markdown.contains("println!(\"hi\");"));
    }
}
