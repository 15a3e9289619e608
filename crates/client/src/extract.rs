//! Visible-text extraction from HTML.
//!
//! Comparison works on what a reader sees, so markup, scripts, and
//! styles must not leak into diffs. The output is one trimmed text run
//! per line, which keeps line-oriented diffs stable across whitespace
//! and attribute churn.

use ego_tree::NodeRef;
use scraper::{Html, Node};

/// Elements whose text content is never reader-visible.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Reduce an HTML document to its visible text, one text run per line.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();
    collect_text(document.tree.root(), &mut lines);
    lines.join("\n")
}

fn collect_text(node: NodeRef<'_, Node>, lines: &mut Vec<String>) {
    match node.value() {
        Node::Element(element) => {
            if SKIPPED_ELEMENTS.contains(&element.name()) {
                return;
            }
            for child in node.children() {
                collect_text(child, lines);
            }
        }
        Node::Text(text) => {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
        _ => {
            for child in node.children() {
                collect_text(child, lines);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_visible_text() {
        let html = "<html><body><h1>Pricing</h1><p>Pro plan: $49</p></body></html>";
        assert_eq!(html_to_text(html), "Pricing\nPro plan: $49");
    }

    #[test]
    fn test_skips_scripts_and_styles() {
        let html = r#"<html><head><title>t</title><style>.a{color:red}</style></head>
            <body><script>var x = 1;</script><p>Visible</p><noscript>js off</noscript></body></html>"#;
        assert_eq!(html_to_text(html), "Visible");
    }

    #[test]
    fn test_markup_changes_do_not_change_text() {
        let before = "<p class=\"old\">Same words</p>";
        let after = "<div id=\"new\"><span>Same words</span></div>";
        assert_eq!(html_to_text(before), html_to_text(after));
    }

    #[test]
    fn test_whitespace_collapsed_per_run() {
        let html = "<p>  padded  </p><p>next</p>";
        assert_eq!(html_to_text(html), "padded\nnext");
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(html_to_text(""), "");
    }
}
