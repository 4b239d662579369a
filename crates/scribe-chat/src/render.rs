//! Message rendering.
//!
//! Every piece of text reaches the presentation as
//! `sanitize(render(text))`. `render` may produce unsafe markup; only the
//! output of `sanitize` is handed to a [`PresentationSink`].
//!
//! [`PresentationSink`]: crate::presentation::PresentationSink

use std::sync::Arc;

use pulldown_cmark::{html, Options, Parser};

pub trait MessageRenderer: Send + Sync {
    /// Turn raw message text into markup. The result is not safe to display.
    fn render(&self, text: &str) -> String;

    /// Make rendered markup safe to display.
    fn sanitize(&self, rendered: &str) -> String;

    fn present(&self, text: &str) -> String {
        self.sanitize(&self.render(text))
    }
}

/// Markdown to HTML with an allowlist sanitizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownHtml;

/// Plain text, HTML-escaped, newlines as `<br>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscapedText;

/// Plain text for a terminal. Escape sequences and control characters
/// other than newline and tab are removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalText;

const ALLOWED_TAGS: &[&str] = &[
    "a", "blockquote", "br", "code", "del", "em", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "li",
    "ol", "p", "pre", "strong", "table", "tbody", "td", "th", "thead", "tr", "ul",
];

const VOID_TAGS: &[&str] = &["br", "hr"];

const LINK_SCHEMES: &[&str] = &["http://", "https://", "mailto:"];

impl MessageRenderer for MarkdownHtml {
    fn render(&self, text: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);

        let parser = Parser::new_ext(text, options);
        let mut out = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }

    fn sanitize(&self, rendered: &str) -> String {
        sanitize_html(rendered)
    }
}

impl MessageRenderer for EscapedText {
    fn render(&self, text: &str) -> String {
        html_escape::encode_text(text).replace('\n', "<br>")
    }

    fn sanitize(&self, rendered: &str) -> String {
        rendered.to_string()
    }
}

impl MessageRenderer for TerminalText {
    fn render(&self, text: &str) -> String {
        text.to_string()
    }

    fn sanitize(&self, rendered: &str) -> String {
        strip_control(rendered)
    }
}

/// Renderer selection by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Terminal,
    Markdown,
    Escaped,
}

impl RenderMode {
    pub fn renderer(self) -> Arc<dyn MessageRenderer> {
        match self {
            RenderMode::Terminal => Arc::new(TerminalText),
            RenderMode::Markdown => Arc::new(MarkdownHtml),
            RenderMode::Escaped => Arc::new(EscapedText),
        }
    }
}

impl std::str::FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "terminal" | "text" => Ok(RenderMode::Terminal),
            "markdown" | "html" => Ok(RenderMode::Markdown),
            "escaped" => Ok(RenderMode::Escaped),
            other => Err(format!("unknown render mode: {}", other)),
        }
    }
}

/// Re-emit allowlisted tags without attributes, escape every other tag.
fn sanitize_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('<') {
        push_text(&mut out, &rest[..start]);
        let tail = &rest[start..];
        match tail.find('>') {
            Some(end) => {
                match clean_tag(&tail[1..end]) {
                    Some(tag) => out.push_str(&tag),
                    None => out.push_str(&html_escape::encode_text(&tail[..=end])),
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(&html_escape::encode_text(tail));
                rest = "";
            }
        }
    }
    push_text(&mut out, rest);
    out
}

// text between tags is already entity-encoded
fn push_text(out: &mut String, text: &str) {
    out.push_str(&text.replace('>', "&gt;"));
}

fn clean_tag(tag: &str) -> Option<String> {
    let (closing, body) = match tag.strip_prefix('/') {
        Some(body) => (true, body),
        None => (false, tag),
    };

    let name_len = body
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(body.len());
    let name = body[..name_len].to_ascii_lowercase();
    if !ALLOWED_TAGS.contains(&name.as_str()) {
        return None;
    }

    let attrs = &body[name_len..];
    if !(attrs.is_empty() || attrs.starts_with(|c: char| c.is_whitespace() || c == '/')) {
        return None;
    }

    if closing {
        return Some(format!("</{}>", name));
    }

    if name == "a" {
        return Some(match attribute(attrs, "href").and_then(safe_href) {
            Some(href) => format!(
                "<a href=\"{}\">",
                html_escape::encode_double_quoted_attribute(&href)
            ),
            None => "<a>".to_string(),
        });
    }

    if VOID_TAGS.contains(&name.as_str()) {
        Some(format!("<{} />", name))
    } else {
        Some(format!("<{}>", name))
    }
}

fn attribute<'a>(attrs: &'a str, wanted: &str) -> Option<&'a str> {
    let mut rest = attrs;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '/');
        if rest.is_empty() {
            return None;
        }

        let name_end = rest
            .find(|c: char| c == '=' || c == '/' || c.is_whitespace())
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        rest = rest[name_end..].trim_start();

        let value = match rest.strip_prefix('=') {
            Some(after_eq) => {
                let after_eq = after_eq.trim_start();
                match after_eq.chars().next() {
                    Some(quote @ ('"' | '\'')) => {
                        let inner = &after_eq[1..];
                        let close = inner.find(quote).unwrap_or(inner.len());
                        rest = inner.get(close + 1..).unwrap_or("");
                        &inner[..close]
                    }
                    _ => {
                        let end = after_eq.find(char::is_whitespace).unwrap_or(after_eq.len());
                        rest = &after_eq[end..];
                        &after_eq[..end]
                    }
                }
            }
            None => "",
        };

        if name.eq_ignore_ascii_case(wanted) {
            return Some(value);
        }
    }
}

fn safe_href(raw: &str) -> Option<String> {
    let href = html_escape::decode_html_entities(raw).trim().to_string();
    let lower = href.to_ascii_lowercase();
    LINK_SCHEMES
        .iter()
        .any(|scheme| lower.starts_with(scheme))
        .then_some(href)
}

fn strip_control(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\u{1b}' => match chars.peek() {
                // CSI: parameters up to a final byte
                Some('[') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if ('\u{40}'..='\u{7e}').contains(&c) {
                            break;
                        }
                    }
                }
                // OSC: up to BEL or ST
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\u{7}' {
                            break;
                        }
                        if c == '\u{1b}' {
                            if chars.peek() == Some(&'\\') {
                                chars.next();
                            }
                            break;
                        }
                    }
                }
                Some(_) => {
                    chars.next();
                }
                None => {}
            },
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}
