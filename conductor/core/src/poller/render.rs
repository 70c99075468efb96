//! Markdown flattening for text-mode results

use pulldown_cmark::{Event, Parser, TagEnd};

/// Flatten markdown into plain prose
///
/// Markup is dropped; text, inline code and code block contents are kept.
/// Embedded HTML keeps the text between its tags. Block boundaries, table
/// rows and `<br>` become newlines; table cells are separated by a space.
#[must_use]
pub fn markdown_to_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut html = HtmlText::default();

    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::Html(raw) | Event::InlineHtml(raw) => html.push(&mut out, &raw),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::HtmlBlock,
            ) => end_block(&mut out),
            _ => {}
        }
    }

    out.trim_end().to_string()
}

fn end_block(out: &mut String) {
    let trimmed = out.trim_end_matches([' ', '\t']).len();
    out.truncate(trimmed);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Tags whose end starts a new line
const LINE_TAGS: &[&str] = &[
    "p", "div", "tr", "li", "table", "thead", "tbody", "tfoot", "ul", "ol", "h1", "h2", "h3",
    "h4", "h5", "h6", "blockquote", "pre", "caption",
];

/// Tag stripper for raw HTML events
///
/// HTML blocks arrive one line per event, so comment state survives
/// between calls.
#[derive(Debug, Default)]
struct HtmlText {
    in_comment: bool,
}

impl HtmlText {
    fn push(&mut self, out: &mut String, raw: &str) {
        let mut rest = raw;
        while !rest.is_empty() {
            if self.in_comment {
                match rest.find("-->") {
                    Some(end) => {
                        self.in_comment = false;
                        rest = &rest[end + 3..];
                    }
                    None => return,
                }
            } else if let Some(after) = rest.strip_prefix("<!--") {
                self.in_comment = true;
                rest = after;
            } else if rest.starts_with('<') {
                let Some(close) = rest.find('>') else {
                    push_collapsed(out, rest);
                    return;
                };
                tag_break(out, &rest[1..close]);
                rest = &rest[close + 1..];
            } else {
                let end = rest.find('<').unwrap_or(rest.len());
                push_collapsed(out, &decode_entities(&rest[..end]));
                rest = &rest[end..];
            }
        }
    }
}

fn tag_break(out: &mut String, tag: &str) {
    let closing = tag.starts_with('/');
    let name = tag
        .trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    if name == "br" || (closing && LINE_TAGS.contains(&name.as_str())) {
        end_block(out);
    } else if closing && (name == "td" || name == "th") && !out.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

/// Append HTML text with whitespace runs collapsed to one space
fn push_collapsed(out: &mut String, text: &str) {
    for c in text.chars() {
        if c.is_whitespace() {
            if !out.is_empty() && !out.ends_with(char::is_whitespace) {
                out.push(' ');
            }
        } else {
            out.push(c);
        }
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
