use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static EXTERNAL_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:https?|ftp)://[^\s\[\]<>"{}|]+|\[(//[^\s\[\]<>"{}|]+)"#)
        .expect("static regex is valid")
});

static REDIRECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*#\s*redirect\s*:?\s*\[\[([^\]]*)\]\]")
        .expect("static regex is valid")
});

static BOTS_TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\{\{\s*(no)?bots\s*(?:\|\s*(deny|allow)\s*=\s*(.*?))?\s*\}\}")
        .expect("static regex is valid")
});

/// An internal `[[link]]` as written in the markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikiLink {
    /// Link target with the fragment and label removed and whitespace
    /// collapsed. Underscores become spaces.
    pub title: String,
    /// `[[:Category:X]]` style links point at a page instead of adding the
    /// page to a category or embedding a file.
    pub leading_colon: bool,
}

impl WikiLink {
    /// Namespace prefix as written, if the target has one.
    pub fn prefix(&self) -> Option<&str> {
        self.title.split_once(':').map(|(prefix, _)| prefix.trim())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedMarkup {
    pub templates: Vec<String>,
    pub links: Vec<WikiLink>,
    pub external_links: Vec<String>,
}

/// Extracts structure from page source. The client only needs template
/// names and link targets, so implementations may be shallow.
pub trait MarkupParser: Send + Sync {
    fn parse(&self, text: &str) -> ParsedMarkup;
}

/// Single-pass scanner over wikitext. It understands nested templates,
/// triple-brace parameters and bracketed links, and ignores everything else.
#[derive(Debug, Default, Clone, Copy)]
pub struct WikitextScanner;

impl MarkupParser for WikitextScanner {
    fn parse(&self, text: &str) -> ParsedMarkup {
        ParsedMarkup {
            templates: extract_templates(text),
            links: extract_wikilinks(text),
            external_links: extract_external_links(text),
        }
    }
}

fn extract_templates(content: &str) -> Vec<String> {
    let bytes = content.as_bytes();
    let mut open: Vec<(usize, bool)> = Vec::new();
    let mut found: Vec<(usize, String)> = Vec::new();
    let mut cursor = 0usize;

    while cursor < bytes.len() {
        if bytes[cursor..].starts_with(b"{{{") {
            open.push((cursor, true));
            cursor += 3;
            continue;
        }
        if bytes[cursor..].starts_with(b"{{") {
            open.push((cursor, false));
            cursor += 2;
            continue;
        }
        if bytes[cursor..].starts_with(b"}}") {
            match open.last() {
                Some(&(_, true)) if bytes[cursor..].starts_with(b"}}}") => {
                    open.pop();
                    cursor += 3;
                }
                Some(&(start, _)) => {
                    open.pop();
                    let inner = &content[start + 2..cursor];
                    if let Some(name) = template_name(inner) {
                        found.push((start, name));
                    }
                    cursor += 2;
                }
                None => cursor += 2,
            }
            continue;
        }
        cursor += 1;
    }

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, name)| name).collect()
}

fn template_name(inner: &str) -> Option<String> {
    let head = inner.split('|').next().unwrap_or("");
    let name = normalize_spaces(&head.replace('_', " "));
    if name.is_empty() || name.starts_with('#') || name.starts_with('{') {
        return None;
    }
    Some(name)
}

fn extract_wikilinks(content: &str) -> Vec<WikiLink> {
    let bytes = content.as_bytes();
    let mut out = Vec::new();
    let mut cursor = 0usize;

    while cursor + 1 < bytes.len() {
        if bytes[cursor] == b'[' && bytes[cursor + 1] == b'[' {
            let start = cursor + 2;
            let mut end = start;
            while end + 1 < bytes.len() {
                if bytes[end] == b']' && bytes[end + 1] == b']' {
                    break;
                }
                // nested link inside a file caption
                if bytes[end] == b'[' && bytes[end + 1] == b'[' {
                    break;
                }
                end += 1;
            }
            if end + 1 >= bytes.len() {
                break;
            }
            if bytes[end] == b'[' {
                if let Some(link) = parse_wikilink(&content[start..end]) {
                    out.push(link);
                }
                cursor = end;
                continue;
            }

            if let Some(link) = parse_wikilink(&content[start..end]) {
                out.push(link);
            }
            cursor = end + 2;
            continue;
        }
        cursor += 1;
    }

    out
}

fn parse_wikilink(inner: &str) -> Option<WikiLink> {
    let mut target = inner.split('|').next().unwrap_or("").trim();
    let mut leading_colon = false;
    while let Some(stripped) = target.strip_prefix(':') {
        leading_colon = true;
        target = stripped.trim_start();
    }
    if let Some((without_fragment, _)) = target.split_once('#') {
        target = without_fragment.trim_end();
    }
    if target.starts_with("http://") || target.starts_with("https://") || target.starts_with("//") {
        return None;
    }

    let title = normalize_spaces(&target.replace('_', " "));
    if title.is_empty() {
        return None;
    }
    Some(WikiLink {
        title,
        leading_colon,
    })
}

fn extract_external_links(content: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for capture in EXTERNAL_URL.captures_iter(content) {
        let url = capture
            .get(1)
            .or_else(|| capture.get(0))
            .map(|matched| matched.as_str().trim_end_matches(['.', ',', ')', ';', ':', '\'']))
            .unwrap_or_default();
        if !url.is_empty() && !out.iter().any(|existing| existing == url) {
            out.push(url.to_string());
        }
    }
    out
}

/// Target of a `#REDIRECT [[...]]` page, without fragment or label.
pub fn parse_redirect(content: &str) -> Option<String> {
    let captures = REDIRECT.captures(content)?;
    let raw = captures.get(1)?.as_str();
    parse_wikilink(raw).map(|link| link.title)
}

/// Whether `{{bots}}`/`{{nobots}}` markup in `content` asks `username` to
/// stay away from the page.
pub fn is_excluded(content: &str, username: &str) -> bool {
    let Some(captures) = BOTS_TEMPLATE.captures(content) else {
        return false;
    };
    let mut excluded = captures.get(1).is_some();
    if let (Some(kind), Some(list)) = (captures.get(2), captures.get(3)) {
        let user = username.trim().to_lowercase();
        let listed = list.as_str().split(',').map(|entry| entry.trim().to_lowercase());
        let mut named = false;
        let mut all = false;
        let mut none = false;
        for entry in listed {
            named |= entry == user;
            all |= entry == "all";
            none |= entry == "none";
        }
        match kind.as_str().to_ascii_lowercase().as_str() {
            "allow" => excluded = !(named || all) || none,
            "deny" => excluded = (named || all) && !none,
            _ => {}
        }
    }
    excluded
}

fn normalize_spaces(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut previous_was_space = false;

    for ch in value.chars() {
        if ch.is_whitespace() {
            if !previous_was_space {
                output.push(' ');
                previous_was_space = true;
            }
        } else {
            output.push(ch);
            previous_was_space = false;
        }
    }

    output.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::{MarkupParser, WikitextScanner, is_excluded, parse_redirect};

    #[test]
    fn scanner_collects_nested_templates_in_document_order() {
        let parsed = WikitextScanner.parse(
            "{{Infobox person|name={{lang|fr|Jean}}|age={{{age|}}}}}\n{{#if:x|y}} {{ Cite_web |url=x}}",
        );
        assert_eq!(parsed.templates, vec!["Infobox person", "lang", "Cite web"]);
    }

    #[test]
    fn scanner_parses_link_targets() {
        let parsed = WikitextScanner.parse(
            "See [[Alpha_Beta#History|alpha]], [[:Category:Gamma]] and [[Category:Delta]]. \
             [[File:Pic.png|thumb|A [[linked]] caption]]",
        );
        let titles = parsed
            .links
            .iter()
            .map(|link| link.title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            titles,
            vec!["Alpha Beta", "Category:Gamma", "Category:Delta", "File:Pic.png", "linked"]
        );
        assert!(parsed.links[1].leading_colon);
        assert!(!parsed.links[2].leading_colon);
        assert_eq!(parsed.links[2].prefix(), Some("Category"));
    }

    #[test]
    fn scanner_finds_bare_and_bracketed_urls_once() {
        let parsed = WikitextScanner.parse(
            "[https://example.org/a Example] https://example.org/a, [//cdn.example.org/x y] ftp://files.example.org/z.",
        );
        assert_eq!(
            parsed.external_links,
            vec![
                "https://example.org/a",
                "//cdn.example.org/x",
                "ftp://files.example.org/z"
            ]
        );
    }

    #[test]
    fn redirect_target_strips_fragment_and_label() {
        assert_eq!(
            parse_redirect("#REDIRECT [[Target_page#Section|label]]\n{{R from move}}").as_deref(),
            Some("Target page")
        );
        assert_eq!(parse_redirect("  #redirect:[[Other]]").as_deref(), Some("Other"));
        assert!(parse_redirect("Text mentioning #REDIRECT [[X]]").is_none());
    }

    #[test]
    fn bots_markup_controls_exclusion() {
        assert!(!is_excluded("plain text", "ExampleBot"));
        assert!(is_excluded("{{nobots}}", "ExampleBot"));
        assert!(!is_excluded("{{bots}}", "ExampleBot"));
        assert!(is_excluded("{{bots|deny=OtherBot, ExampleBot}}", "ExampleBot"));
        assert!(!is_excluded("{{bots|deny=OtherBot}}", "ExampleBot"));
        assert!(!is_excluded("{{bots|allow=ExampleBot}}", "ExampleBot"));
        assert!(is_excluded("{{bots|allow=none}}", "ExampleBot"));
        assert!(is_excluded("{{bots|deny=all}}", "ExampleBot"));
        assert!(!is_excluded("{{nobots|allow=examplebot}}", "ExampleBot"));
    }
}
