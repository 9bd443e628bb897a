//! Docs strategy (spec §4.3): preserve the full heading tree as an ordered
//! `doc_sections` list, prune sidebar/nav regions by position and
//! link-density, collapse wide tables to a placeholder.

use super::pick_main_node;
use html_scraper::{ElementRef, Html, Selector};
use once_cell::sync::Lazy;
use webpipe_core::DocSection;

static HEADING_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").unwrap());
static NAV_LIKE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("nav, aside, [role=navigation]").unwrap());
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static TABLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());
static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static CELL_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("th, td").unwrap());

const SIDEBAR_LINK_DENSITY_THRESHOLD: f64 = 0.6;
const MAX_TABLE_COLUMNS: usize = 8;

pub struct DocsOutput {
    pub title: Option<String>,
    pub markdown: String,
    pub text: String,
    pub sections: Vec<DocSection>,
}

pub fn extract(html: &str, base_url: Option<&str>) -> DocsOutput {
    let doc = Html::parse_document(html);
    let title = super::title_from_document(&doc);

    let main_el = pick_main_node(&doc);
    let main_html = main_el.map(|e| e.html()).unwrap_or_else(|| html.to_string());
    let pruned_html = prune_sidebars(&main_html);

    let sections = build_sections(&pruned_html, base_url);
    let markdown = sections
        .iter()
        .map(|s| format!("{} {}\n\n{}", "#".repeat(s.heading_level as usize), s.heading_text, s.body_markdown))
        .collect::<Vec<_>>()
        .join("\n\n");
    let text = sections
        .iter()
        .map(|s| format!("{}\n{}", s.heading_text, strip_markdown_marks(&s.body_markdown)))
        .collect::<Vec<_>>()
        .join("\n\n");

    DocsOutput {
        title,
        markdown,
        text,
        sections,
    }
}

/// `<nav>`/`aside`/`role=navigation` elements whose link-density exceeds the
/// threshold are dropped outright; others are left (some docs sites use
/// `<nav>` for in-page breadcrumbs with prose around it).
fn prune_sidebars(html_fragment: &str) -> String {
    let doc = Html::parse_fragment(html_fragment);
    let mut drop = std::collections::HashSet::new();
    for el in doc.select(&NAV_LIKE_SELECTOR) {
        if link_density(el) > SIDEBAR_LINK_DENSITY_THRESHOLD {
            drop.insert(el.id());
        }
    }

    let mut out = String::new();
    for child in doc.tree.root().children() {
        render_skipping(child, &drop, &mut out);
    }
    out
}

fn render_skipping(
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

fn link_density(el: ElementRef) -> f64 {
    let total_text: usize = el.text().map(|t| t.len()).sum();
    if total_text == 0 {
        return 1.0;
    }
    let link_text: usize = el
        .select(&LINK_SELECTOR)
        .flat_map(|a| a.text())
        .map(|t| t.len())
        .sum();
    link_text as f64 / total_text as f64
}

/// Flat ordered list where each section runs from a heading to the next
/// heading of equal or higher level.
fn build_sections(html_fragment: &str, base_url: Option<&str>) -> Vec<DocSection> {
    let doc = Html::parse_fragment(html_fragment);
    let headings: Vec<_> = doc.select(&HEADING_SELECTOR).collect();
    if headings.is_empty() {
        let body_markdown = html_to_markdown_with_tables(html_fragment, base_url);
        let links = collect_links(&doc, base_url);
        return vec![DocSection {
            heading_level: 1,
            heading_text: String::new(),
            body_markdown,
            links,
        }];
    }

    let mut sections = Vec::new();
    for (i, heading) in headings.iter().enumerate() {
        let level = heading_level(heading.value().name());
        let heading_text = heading.text().collect::<String>().trim().to_string();

        let body_html = html_between(heading, headings.get(i + 1).copied());
        let body_markdown = html_to_markdown_with_tables(&body_html, base_url);
        let body_doc = Html::parse_fragment(&body_html);
        let links = collect_links(&body_doc, base_url);

        sections.push(DocSection {
            heading_level: level,
            heading_text,
            body_markdown,
            links,
        });
    }
    sections
}

fn heading_level(tag: &str) -> u8 {
    tag.trim_start_matches('h').parse().unwrap_or(6)
}

/// Serializes the HTML of every sibling node between `heading` (exclusive)
/// and `next_heading` (exclusive), walking up through ancestors when the
/// heading has no further siblings at its own level.
fn html_between(heading: &ElementRef, next_heading: Option<&ElementRef>) -> String {
    let mut out = String::new();
    let mut node = heading.next_sibling();
    while let Some(n) = node {
        if let Some(next) = next_heading {
            if n.id() == next.id() {
                break;
            }
        }
        if let Some(el) = ElementRef::wrap(n) {
            out.push_str(&el.html());
        } else if let Some(text) = n.value().as_text() {
            out.push_str(text);
        }
        node = n.next_sibling();
    }
    out
}

fn collect_links(doc: &Html, base_url: Option<&str>) -> Vec<String> {
    let base = base_url.and_then(|u| url::Url::parse(u).ok());
    let mut out = Vec::new();
    for el in doc.select(&LINK_SELECTOR) {
        let Some(href) = el.value().attr("href") else { continue };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let resolved = if let Ok(u) = url::Url::parse(href) {
            u.to_string()
        } else if let Some(b) = &base {
            match b.join(href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            }
        } else {
            href.to_string()
        };
        if !out.contains(&resolved) {
            out.push(resolved);
        }
    }
    out
}

fn html_to_markdown_with_tables(html_fragment: &str, base_url: Option<&str>) -> String {
    let (fragment, fences) = super::codeblocks::extract_code_blocks(html_fragment);
    let doc = Html::parse_fragment(&fragment);
    let mut replaced = fragment.clone();
    for table in doc.select(&TABLE_SELECTOR) {
        let placeholder = table_to_gfm_or_placeholder(table);
        replaced = replaced.replacen(&table.html(), &placeholder, 1);
    }
    let wrapped = format!("<html><body>{replaced}</body></html>");
    let _ = base_url;
    let markdown = html2text::from_read(wrapped.as_bytes(), 120).unwrap_or_default();
    super::codeblocks::restore_code_blocks(&markdown, &fences)
}

fn table_to_gfm_or_placeholder(table: ElementRef) -> String {
    let rows: Vec<Vec<String>> = table
        .select(&ROW_SELECTOR)
        .map(|tr| {
            tr.select(&CELL_SELECTOR)
                .map(|c| c.text().collect::<String>().trim().to_string())
                .collect()
        })
        .filter(|r: &Vec<String>| !r.is_empty())
        .collect();

    let cols = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if cols == 0 {
        return String::new();
    }
    if cols > MAX_TABLE_COLUMNS {
        return format!("\n\n[table omitted: {} rows \u{d7} {} cols]\n\n", rows.len(), cols);
    }

    let mut out = String::from("\n\n");
    if let Some(header) = rows.first() {
        out.push_str(&format!("| {} |\n", header.join(" | ")));
        out.push_str(&format!("|{}|\n", " --- |".repeat(header.len())));
        for row in &rows[1..] {
            out.push_str(&format!("| {} |\n", row.join(" | ")));
        }
    }
    out.push('\n');
    out
}

fn strip_markdown_marks(markdown: &str) -> String {
    markdown
        .lines()
        .map(|l| l.trim_start_matches(['#', '-', '*', '>']).trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Docs-site signal detection (spec §4.3 `auto` dispatch rule).
pub fn looks_like_docs_site(html: &str, base_url: Option<&str>) -> bool {
    let doc = Html::parse_document(html);

    let nav_with_siblings = doc
        .select(&Selector::parse("nav").unwrap())
        .any(|nav| nav.children().count() >= 5);

    let main_selector = Selector::parse(r#"main, [role="main"]"#).unwrap();
    let heading_dense_main = doc.select(&main_selector).any(|main| {
        let text_len = main.text().map(|t| t.len()).max(1);
        let heading_count = main.select(&HEADING_SELECTOR).count();
        (heading_count as f64) / (text_len as f64 / 2000.0).max(1.0) >= 4.0
    });

    let has_code_blocks = doc.select(&Selector::parse("pre code, pre > code").unwrap()).next().is_some();

    let path_signal = base_url
        .and_then(|u| url::Url::parse(u).ok())
        .map(|u| {
            u.path_segments()
                .into_iter()
                .flatten()
                .any(|seg| matches!(seg, "docs" | "api" | "reference" | "guide" | "manual"))
        })
        .unwrap_or(false);

    nav_with_siblings || heading_dense_main || has_code_blocks || path_signal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_docs_site_from_path_segment() {
        assert!(looks_like_docs_site("<html></html>", Some("https://example.com/docs/intro")));
    }

    #[test]
    fn detects_docs_site_from_code_blocks() {
        let html = "<html><body><pre><code>fn main() {}</code></pre></body></html>";
        assert!(looks_like_docs_site(html, None));
    }

    #[test]
    fn builds_ordered_sections_with_links() {
        let html = r#"<html><body><main>
            <h2>Intro</h2><p>Some text with a <a href="/ref">ref</a>.</p>
            <h2>Usage</h2><p><pre><code class="language-go">fmt.Println("x")</code></pre></p>
        </main></body></html>"#;
        let out = extract(html, Some("https://example.com/docs/intro"));
        assert_eq!(out.sections.len(), 2);
        assert_eq!(out.sections[0].heading_text, "Intro");
        assert!(out.sections[0].links.iter().any(|l| l.ends_with("/ref")));
        assert!(out.sections[1].body_markdown.contains("```go"));
        assert!(out.sections[1].body_markdown.contains("fmt.Println"));
    }

    #[test]
    fn collapses_wide_tables_to_placeholder() {
        let mut header = String::from("<tr>");
        for i in 0..10 {
            header.push_str(&format!("<th>c{i}</th>"));
        }
        header.push_str("</tr>");
        let html = format!("<html><body><table>{header}</table></body></html>");
        let md = html_to_markdown_with_tables(&html, None);
        assert!(md.contains("table omitted"));
    }
}
