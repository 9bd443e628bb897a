//! Truncation (spec §4.3): applied in order — chars, then approximate
//! tokens. Both emit a `truncated: chars=X of Y` warning and always cut on
//! a UTF-8 char boundary.

/// `--max-chars N`: hard cut at N characters with an ellipsis marker.
/// Returns `(output, warning)`.
pub fn truncate_chars(markdown: &str, max_chars: Option<usize>) -> (String, Option<String>) {
    let Some(max_chars) = max_chars else {
        return (markdown.to_string(), None);
    };
    let total = markdown.chars().count();
    if total <= max_chars {
        return (markdown.to_string(), None);
    }
    let mut out: String = markdown.chars().take(max_chars).collect();
    out.push_str("\u{2026}");
    (out, Some(format!("truncated: chars={max_chars} of {total}")))
}

/// `--max-tokens N`: whitespace+punctuation approximation (chars/4),
/// truncated section-wise (docs) or paragraph-wise (readability). The
/// caller passes already-split units (sections or paragraphs); this
/// greedily keeps whole units until the token budget is spent.
pub fn truncate_by_units(units: &[String], max_tokens: Option<usize>, join_with: &str) -> (String, Option<String>) {
    let Some(max_tokens) = max_tokens else {
        return (units.join(join_with), None);
    };
    let max_chars = max_tokens.saturating_mul(4);
    let total_chars: usize = units.iter().map(|u| u.chars().count()).sum();
    if total_chars <= max_chars {
        return (units.join(join_with), None);
    }

    let mut kept = Vec::new();
    let mut used = 0usize;
    for unit in units {
        let len = unit.chars().count();
        if used + len > max_chars && !kept.is_empty() {
            break;
        }
        used += len;
        kept.push(unit.clone());
    }
    if kept.is_empty() && !units.is_empty() {
        kept.push(units[0].clone());
    }
    let kept_chars: usize = kept.iter().map(|u| u.chars().count()).sum();
    (
        kept.join(join_with),
        Some(format!("truncated: chars={kept_chars} of {total_chars}")),
    )
}

pub fn approx_tokens(text: &str) -> usize {
    (text.chars().count() as f64 / 4.0).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_cuts_on_boundary_and_warns() {
        let (out, warning) = truncate_chars("hello world", Some(5));
        assert_eq!(out, "hello\u{2026}");
        assert_eq!(warning.unwrap(), "truncated: chars=5 of 11");
    }

    #[test]
    fn truncate_chars_no_op_when_under_budget() {
        let (out, warning) = truncate_chars("hi", Some(50));
        assert_eq!(out, "hi");
        assert!(warning.is_none());
    }

    #[test]
    fn truncate_by_units_keeps_whole_units() {
        let units = vec!["a".repeat(10), "b".repeat(10), "c".repeat(10)];
        let (out, warning) = truncate_by_units(&units, Some(4), "\n");
        assert!(warning.is_some());
        assert!(out.contains("aaaaaaaaaa"));
        assert!(!out.contains("cccccccccc"));
    }

    #[test]
    fn truncate_by_units_always_keeps_at_least_one_unit() {
        let units = vec!["a".repeat(1000)];
        let (out, warning) = truncate_by_units(&units, Some(1), "\n");
        assert!(warning.is_some());
        assert!(!out.is_empty());
    }
}
