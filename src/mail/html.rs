//! HTML to plain text for message bodies.
//!
//! Parsing goes through html5ever's tag-soup rules, so malformed markup
//! (unclosed tags, bad nesting, unknown elements) degrades to whatever text
//! can be recovered instead of failing.

use std::collections::BTreeSet;

use scraper::Html;
use serde::{Deserialize, Serialize};

/// Elements whose text sits on its own line.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "center", "dd", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table",
    "tbody", "thead", "tfoot", "tr", "ul",
];

/// Table cells get a space so adjacent cells don't run together.
const CELL_ELEMENTS: &[&str] = &["td", "th"];

/// Document metadata, never body text whatever `strip_elements` says.
const METADATA_ELEMENTS: &[&str] = &["head", "title"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlOptions {
    /// Elements detached from the tree, subtree included, before extraction.
    pub strip_elements: BTreeSet<String>,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            strip_elements: ["script", "style"].into_iter().map(String::from).collect(),
        }
    }
}

impl HtmlOptions {
    /// Also drops generic layout containers (`span`, `div`) with their content.
    pub fn strict() -> Self {
        let mut opts = Self::default();
        opts.strip_elements
            .extend(["span", "div"].into_iter().map(String::from));
        opts
    }

    fn strips(&self, name: &str) -> bool {
        self.strip_elements
            .iter()
            .any(|s| s.eq_ignore_ascii_case(name))
    }
}

/// Convert an HTML document or fragment to text, one line per block.
pub fn html_to_text(html: &str, opts: &HtmlOptions) -> String {
    let mut doc = Html::parse_document(html);

    let doomed: Vec<_> = doc
        .tree
        .root()
        .descendants()
        .filter(|n| n.value().as_element().is_some_and(|e| opts.strips(e.name())))
        .map(|n| n.id())
        .collect();
    for id in doomed {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }

    let mut out = String::new();
    // (node, closing) pairs; closing entries emit the trailing separator.
    let mut stack = vec![(doc.tree.root(), false)];
    while let Some((node, closing)) = stack.pop() {
        if let Some(text) = node.value().as_text() {
            out.push_str(text);
            continue;
        }
        let name = node.value().as_element().map(|e| e.name());
        if name.is_some_and(|n| METADATA_ELEMENTS.contains(&n)) {
            continue;
        }
        match (name, closing) {
            (Some("br"), false) => out.push('\n'),
            (Some(n), _) if BLOCK_ELEMENTS.contains(&n) => push_newline(&mut out),
            (Some(n), true) if CELL_ELEMENTS.contains(&n) => out.push(' '),
            _ => {}
        }
        if !closing {
            stack.push((node, true));
            stack.extend(node.children().rev().map(|c| (c, false)));
        }
    }

    strip_backslash_escapes(&tidy_lines(&out))
}

fn push_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Trim each line and fold runs of blank lines into one.
fn tidy_lines(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() && lines.last().is_none_or(|l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Drop `\x` pairs (a backslash and the non-whitespace char after it).
fn strip_backslash_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek().is_some_and(|n| !n.is_whitespace()) {
            chars.next();
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(html: &str) -> String {
        html_to_text(html, &HtmlOptions::default())
    }

    #[test]
    fn paragraphs_are_split_by_a_line_break() {
        let text = convert("<p>Hello</p><p>World</p>");
        assert_eq!(text, "Hello\nWorld");
        assert!(!text.contains('<'));
    }

    #[test]
    fn script_and_style_are_removed() {
        let html = "<html><head><style>p { color: red }</style></head>\
                    <body><p>Before</p><script>alert('x')</script><p>After</p></body></html>";
        let text = convert(html);
        assert_eq!(text, "Before\nAfter");
    }

    #[test]
    fn strict_mode_drops_layout_containers() {
        let html = "<p>Keep</p><div>layout <span>noise</span></div><p>me <span>not this</span></p>";
        assert_eq!(convert(html), "Keep\nlayout noise\nme not this");
        assert_eq!(html_to_text(html, &HtmlOptions::strict()), "Keep\nme");
    }

    #[test]
    fn head_and_title_are_not_body_text() {
        let html = "<html><head><title>Tracking title</title></head><body><p>Hi</p></body></html>";
        assert_eq!(convert(html), "Hi");
        let opts = HtmlOptions {
            strip_elements: BTreeSet::new(),
        };
        assert_eq!(html_to_text("<title>Stray</title><p>Hi</p>", &opts), "Hi");
    }

    #[test]
    fn br_and_list_items_break_lines() {
        let text = convert("one<br>two<ul><li>a</li><li>b</li></ul>");
        assert_eq!(text, "one\ntwo\na\nb");
    }

    #[test]
    fn inline_markup_does_not_split_words() {
        assert_eq!(convert("<p>Hello <b>big</b> <i>world</i></p>"), "Hello big world");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(convert("Tom &amp; Jerry &lt;3&gt;"), "Tom & Jerry <3>");
    }

    #[test]
    fn malformed_markup_still_yields_text() {
        let text = convert("<div><p>unclosed <b>bold<p>next</div></i><blink>old</blink>");
        assert!(text.contains("unclosed"));
        assert!(text.contains("bold"));
        assert!(text.contains("next"));
        assert!(text.contains("old"));
    }

    #[test]
    fn backslash_artifacts_are_cleaned() {
        assert_eq!(convert(r"<p>line\none it\'s</p>"), "lineone its");
        assert_eq!(strip_backslash_escapes(r"a \ b\"), r"a \ b\");
    }

    #[test]
    fn table_cells_are_spaced() {
        let text = convert("<table><tr><td>a</td><td>b</td></tr><tr><td>c</td></tr></table>");
        assert_eq!(text, "a b\nc");
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: HtmlOptions = toml::from_str("").unwrap();
        assert_eq!(opts, HtmlOptions::default());
        let opts: HtmlOptions = toml::from_str(r#"strip_elements = ["nav"]"#).unwrap();
        assert!(opts.strips("NAV"));
        assert!(!opts.strips("script"));
    }
}
