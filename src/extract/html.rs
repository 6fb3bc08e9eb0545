use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static BODY_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

/// Subtrees dropped wholesale before body-text extraction.
const BOILERPLATE_TAGS: [&str; 7] = [
    "script", "style", "nav", "header", "footer", "aside", "noscript",
];
const BOILERPLATE_CLASSES: [&str; 3] = ["menu", "sidebar", "footer"];

/// Flatten an HTML fragment (one API `t` field) to plain text: tags
/// stripped, whitespace collapsed to single spaces.
pub fn flatten_fragment(markup: &str) -> String {
    let fragment = Html::parse_fragment(markup);
    let mut pieces = Vec::new();
    for text in fragment.root_element().text() {
        let collapsed = WHITESPACE_RE.replace_all(text, " ");
        let trimmed = collapsed.trim();
        if !trimmed.is_empty() {
            pieces.push(trimmed.to_string());
        }
    }
    pieces.join(" ")
}

/// Extract the body text of a rendered page, skipping script/style/
/// navigation/boilerplate subtrees.
pub fn body_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = document
        .select(&BODY_SELECTOR)
        .next()
        .unwrap_or_else(|| document.root_element());
    let mut out = Vec::new();
    collect_text(root, &mut out);
    normalize_lines(&out.join("\n"))
}

fn collect_text(el: ElementRef, out: &mut Vec<String>) {
    if is_boilerplate(&el) {
        return;
    }
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            collect_text(child_el, out);
        } else if let Some(text) = child.value().as_text() {
            out.push(text.to_string());
        }
    }
}

fn is_boilerplate(el: &ElementRef) -> bool {
    let name = el.value().name();
    if BOILERPLATE_TAGS.contains(&name) {
        return true;
    }
    el.value()
        .attr("class")
        .map(|classes| {
            classes
                .split_whitespace()
                .any(|c| BOILERPLATE_CLASSES.iter().any(|b| c.eq_ignore_ascii_case(b)))
        })
        .unwrap_or(false)
}

/// Strip rendering whitespace noise without collapsing paragraph structure:
/// trim each line, drop empty lines, rejoin with newlines.
pub fn normalize_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
