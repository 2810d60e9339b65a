//! HTML helpers for feed bodies and article pages. `scraper::Html` is not
//! `Send`, so everything here is synchronous and returns owned values.

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "nav", "header", "footer", "noscript", "iframe", "form"];
const SKIPPED_CLASSES: &[&str] = &["ad", "ads", "advertisement"];
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "article", "section",
    "blockquote", "pre", "tr", "table", "figure", "figcaption", "main",
];

/// Containers tried, in order, when pulling the main text out of a page.
const ARTICLE_SELECTORS: &[&str] = &[
    "article", ".post-content", ".entry-content", ".article-content", ".post-body", ".article-body",
    ".story-body", ".story", ".content", "main", "#content", "#main",
];

/// Below this many characters a container is not considered the article.
const SUBSTANTIAL_TEXT: usize = 500;

/// Reduces an HTML fragment to plain text, one paragraph per block element.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    element_text(fragment.root_element())
}

fn is_skipped(element: &scraper::node::Element) -> bool {
    SKIPPED_ELEMENTS.contains(&element.name()) || element.classes().any(|c| SKIPPED_CLASSES.contains(&c))
}

fn element_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(text) => {
                let hidden = node
                    .ancestors()
                    .filter_map(|a| a.value().as_element())
                    .any(is_skipped);
                if !hidden {
                    raw.push_str(text);
                }
            }
            Node::Element(e) if BLOCK_ELEMENTS.contains(&e.name()) => raw.push('\n'),
            _ => {}
        }
    }

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// `<img src>` / `<img data-src>` URLs in document order, resolved against
/// `base`. Inline `data:` images are ignored.
pub fn extract_image_urls(html: &str, base: Option<&str>) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    let base = base.and_then(|b| Url::parse(b).ok());
    let mut urls = Vec::new();

    if let Ok(selector) = Selector::parse("img") {
        for img in fragment.select(&selector) {
            let src = img
                .value()
                .attr("src")
                .filter(|s| !s.trim().is_empty())
                .or_else(|| img.value().attr("data-src"));
            if let Some(url) = src.and_then(|s| resolve(s, base.as_ref())) {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }
    }

    urls
}

fn resolve(src: &str, base: Option<&Url>) -> Option<String> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    let url = match Url::parse(src) {
        Ok(url) => url,
        Err(_) => base?.join(src).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// What an article page adds to its feed entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageExtract {
    pub text: Option<String>,
    pub image: Option<String>,
}

/// Pulls the main text and the `og:image` out of a full article page.
pub fn extract_page(html: &str, page_url: &str) -> PageExtract {
    let document = Html::parse_document(html);

    let mut text = String::new();
    for css in ARTICLE_SELECTORS {
        let Ok(selector) = Selector::parse(css) else { continue };
        if let Some(element) = document.select(&selector).next() {
            text = element_text(element);
            if text.chars().count() > SUBSTANTIAL_TEXT {
                break;
            }
        }
    }
    if text.chars().count() < SUBSTANTIAL_TEXT {
        if let Ok(selector) = Selector::parse("body") {
            if let Some(body) = document.select(&selector).next() {
                let body_text = element_text(body);
                if body_text.len() > text.len() {
                    text = body_text;
                }
            }
        }
    }

    let base = Url::parse(page_url).ok();
    let image = Selector::parse("meta[property='og:image'], meta[name='twitter:image']")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .filter_map(|m| m.value().attr("content"))
                .find_map(|src| resolve(src, base.as_ref()))
        });

    PageExtract {
        text: (!text.is_empty()).then_some(text),
        image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_paragraphs() {
        let html = "<p>Hello <b>world</b></p><p>Second&nbsp;line</p><script>var x = 1;</script>";
        assert_eq!(html_to_text(html), "Hello world\n\nSecond line");
    }

    #[test]
    fn test_html_to_text_plain_input() {
        assert_eq!(html_to_text("  just   text  "), "just text");
        assert_eq!(html_to_text(""), "");
    }

    #[test]
    fn test_extract_image_urls_resolves_relative() {
        let html = r#"<img src="/img/a.png"><img data-src="https://cdn.example.com/b.jpg">
            <img src="data:image/png;base64,AAAA"><img src="/img/a.png">"#;
        let urls = extract_image_urls(html, Some("https://example.com/posts/1"));
        assert_eq!(
            urls,
            vec!["https://example.com/img/a.png", "https://cdn.example.com/b.jpg"]
        );
    }

    #[test]
    fn test_extract_page_prefers_article_container() {
        let body = "Long paragraph. ".repeat(50);
        let html = format!(
            r#"<html><head><meta property="og:image" content="/cover.jpg"></head>
            <body><nav>Menu Home About</nav><article><p>{}</p><div class="ad">Buy now</div></article>
            <footer>Copyright</footer></body></html>"#,
            body
        );
        let page = extract_page(&html, "https://example.com/story");
        let text = page.text.unwrap();
        assert!(text.starts_with("Long paragraph."));
        assert!(!text.contains("Menu"));
        assert!(!text.contains("Buy now"));
        assert_eq!(page.image.as_deref(), Some("https://example.com/cover.jpg"));
    }

    #[test]
    fn test_extract_page_falls_back_to_body() {
        let html = "<html><body><div><p>Short body text</p></div></body></html>";
        let page = extract_page(html, "https://example.com/x");
        assert_eq!(page.text.as_deref(), Some("Short body text"));
        assert_eq!(page.image, None);
    }
}
