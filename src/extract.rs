//! Turning an HTML document into a prompt-sized plain-text excerpt.

use html2text::render::text_renderer::TrivialDecorator;
use regex::Regex;
use std::sync::OnceLock;

/// A selection must be longer than this to be used instead of the page.
pub const MIN_SELECTION_CHARS: usize = 40;

/// Anything shorter is not worth summarizing.
pub const MIN_PAGE_CHARS: usize = 20;

/// Render width for html2text; wide enough that it never wraps prose.
const RENDER_WIDTH: usize = 1000;

/// Collapses whitespace runs to one space, trims, and keeps at most `cap` characters.
pub fn collapse_whitespace(text: &str, cap: usize) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(cap)
        .collect()
}

fn tag_pattern(tag: &str) -> Regex {
    // Opening or closing tag with this exact name; group 1 is the slash.
    Regex::new(&format!(r"(?i)<(/?){tag}(?:\s[^>]*)?>")).expect("valid tag regex")
}

fn regions() -> &'static [Regex; 3] {
    static REGIONS: OnceLock<[Regex; 3]> = OnceLock::new();
    REGIONS.get_or_init(|| [tag_pattern("article"), tag_pattern("main"), tag_pattern("body")])
}

/// Inner HTML of the first element matched by `tags`, nested elements of the
/// same name included. An unclosed element runs to the end of the document.
fn first_element<'h>(html: &'h str, tags: &Regex) -> Option<&'h str> {
    let mut start = None;
    let mut depth = 0usize;
    for caps in tags.captures_iter(html) {
        let tag = caps.get(0)?;
        let closing = caps.get(1).is_some_and(|m| !m.is_empty());
        match (start, closing) {
            (None, true) => {}
            (None, false) => {
                start = Some(tag.end());
                depth = 1;
            }
            (Some(_), false) => depth += 1,
            (Some(inner_start), true) => {
                depth -= 1;
                if depth == 0 {
                    return Some(&html[inner_start..tag.start()]);
                }
            }
        }
    }
    start.map(|inner_start| &html[inner_start..])
}

fn render_text(html: &str) -> String {
    html2text::from_read_with_decorator(html.as_bytes(), RENDER_WIDTH, TrivialDecorator::new())
}

/// Readable text of the most specific content region: the first `<article>`,
/// then `<main>`, then `<body>`, then the whole document.
pub fn main_content_text(html: &str) -> String {
    for pattern in regions() {
        if let Some(inner) = first_element(html, pattern) {
            let text = render_text(inner);
            if !text.trim().is_empty() {
                return text;
            }
        }
    }
    render_text(html)
}

/// Picks the text to summarize: a long enough selection wins over the page.
pub fn page_excerpt(html: &str, selection: Option<&str>, max_chars: usize) -> String {
    if let Some(selection) = selection.map(str::trim) {
        if selection.chars().count() > MIN_SELECTION_CHARS {
            return collapse_whitespace(selection, max_chars);
        }
    }
    collapse_whitespace(&main_content_text(html), max_chars)
}

pub fn build_summary_prompt(text: &str) -> String {
    [
        "Summarize the following webpage content.",
        "Return:",
        "1) A 1-sentence overview",
        "2) 3-6 key bullet points",
        "3) Any notable names/figures (if present)",
        "",
        "WEBPAGE CONTENT:",
        text,
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace_and_cap() {
        assert_eq!(collapse_whitespace("  a \n\n b\t\tc  ", 100), "a b c");
        assert_eq!(collapse_whitespace("héllo world", 4), "héll");
        assert_eq!(collapse_whitespace("   ", 10), "");
    }

    #[test]
    fn test_article_preferred_over_body() {
        let html = "<html><body><nav>Menu Links</nav><article class=\"post\"><h1>Title</h1><p>Article text here.</p></article><footer>Footer</footer></body></html>";
        let text = collapse_whitespace(&main_content_text(html), 1000);
        assert!(text.contains("Article text here."));
        assert!(text.contains("Title"));
        assert!(!text.contains("Menu Links"));
        assert!(!text.contains("Footer"));
    }

    #[test]
    fn test_nested_article_keeps_outer_content() {
        let html = "<body><article><h1>Story</h1><p>Intro paragraph.</p><section><article><p>Related teaser.</p></article></section><p>The actual conclusion of the story.</p></article><footer>Footer</footer></body>";
        let text = collapse_whitespace(&main_content_text(html), 1000);
        assert!(text.contains("Related teaser."));
        assert!(text.ends_with("The actual conclusion of the story."));
        assert!(!text.contains("Footer"));
    }

    #[test]
    fn test_similar_tag_names_not_confused() {
        let html = "<body><articles>List</articles><main><p>Main text.</p><main-nav>x</main-nav></main></body>";
        assert_eq!(
            first_element(html, &tag_pattern("main")),
            Some("<p>Main text.</p><main-nav>x</main-nav>")
        );
        assert_eq!(first_element(html, &tag_pattern("article")), None);
    }

    #[test]
    fn test_unclosed_body_runs_to_end() {
        let html = "<html><body><p>No closing tag here.</p>";
        let text = collapse_whitespace(&main_content_text(html), 1000);
        assert_eq!(text, "No closing tag here.");
    }

    #[test]
    fn test_main_used_without_article() {
        let html = "<body><header>Site header</header><main id=\"x\"><p>Main content.</p></main></body>";
        let text = collapse_whitespace(&main_content_text(html), 1000);
        assert_eq!(text, "Main content.");
    }

    #[test]
    fn test_body_fallback() {
        let html = "<html><head><title>t</title></head><BODY><p>Just the body.</p></BODY></html>";
        let text = collapse_whitespace(&main_content_text(html), 1000);
        assert!(text.contains("Just the body."));
    }

    #[test]
    fn test_fragment_without_body() {
        let text = collapse_whitespace(&main_content_text("<p>Loose paragraph</p>"), 1000);
        assert_eq!(text, "Loose paragraph");
    }

    #[test]
    fn test_long_selection_wins() {
        let selection = "  This selected passage is definitely longer than forty characters.  ";
        let text = page_excerpt("<body><p>Page body</p></body>", Some(selection), 1000);
        assert_eq!(
            text,
            "This selected passage is definitely longer than forty characters."
        );
    }

    #[test]
    fn test_short_selection_ignored() {
        let text = page_excerpt("<body><p>Page body text</p></body>", Some("tiny"), 1000);
        assert_eq!(text, "Page body text");
    }

    #[test]
    fn test_excerpt_is_capped() {
        let html = format!("<body><p>{}</p></body>", "word ".repeat(5000));
        let text = page_excerpt(&html, None, 12000);
        assert_eq!(text.chars().count(), 12000);
    }

    #[test]
    fn test_summary_prompt_layout() {
        let prompt = build_summary_prompt("X");
        assert!(prompt.contains("1) A 1-sentence overview"));
        assert!(prompt.contains("2) 3-6 key bullet points"));
        assert!(prompt.contains("3) Any notable names/figures (if present)"));
        assert!(prompt.ends_with("\nX"));
        assert!(prompt.contains("WEBPAGE CONTENT:\nX"));
    }
}
