//! Word Document Handling
//!
//! The OCR provider accepts PDFs and images only. A `.docx` source is
//! opened here instead: its paragraphs are read straight from
//! `word/document.xml`, and when markdown is wanted they are laid out as a
//! plain PDF the provider can recognize.

use std::io::{Cursor, Read};

use pdf_writer::{Content, Finish, Name, Pdf, Rect, Ref, Str};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::GenerationError;

/// Main document part inside the package
const DOCUMENT_PART: &str = "word/document.xml";

/// A4 in points
const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const FONT_SIZE: f32 = 12.0;
const LEADING: f32 = 14.0;

/// Characters per rendered line at [`FONT_SIZE`] within the margins
const LINE_CHARS: usize = 80;

fn unreadable(detail: impl std::fmt::Display) -> GenerationError {
    GenerationError::validation(format!("source is not a readable docx document ({detail})"))
}

/// Paragraph texts of a `.docx` package in document order
///
/// Runs are concatenated; tabs and line breaks inside a paragraph are kept
/// as `\t` and `\n`. Paragraphs inside tables are included.
///
/// # Errors
///
/// Returns [`GenerationError::Validation`] when the bytes are not a zip
/// package with a well-formed main document part.
pub(crate) fn paragraphs(bytes: &[u8]) -> Result<Vec<String>, GenerationError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(unreadable)?;
    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(unreadable)?
        .read_to_string(&mut xml)
        .map_err(unreadable)?;

    let mut reader = Reader::from_str(&xml);
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(unreadable)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"p" => paragraphs.extend(current.take()),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"tab" => current.iter_mut().for_each(|p| p.push('\t')),
                b"br" | b"cr" => current.iter_mut().for_each(|p| p.push('\n')),
                _ => {}
            },
            Event::Text(text) if in_text => {
                let text = text.unescape().map_err(unreadable)?;
                if let Some(p) = current.as_mut() {
                    p.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}

/// Plain text: every paragraph followed by a newline
pub(crate) fn text(paragraphs: &[String]) -> String {
    paragraphs.iter().fold(String::new(), |mut out, p| {
        out.push_str(p);
        out.push('\n');
        out
    })
}

/// Lay paragraphs out as a Helvetica PDF, one line per wrapped segment
///
/// Characters outside Latin-1 are rendered as `?`.
pub(crate) fn render_pdf(paragraphs: &[String]) -> Vec<u8> {
    let lines: Vec<String> = paragraphs.iter().flat_map(|p| wrap(p)).collect();
    let per_page = ((PAGE_HEIGHT - 2.0 * MARGIN) / LEADING) as usize;
    let pages: Vec<&[String]> = if lines.is_empty() {
        vec![lines.as_slice()]
    } else {
        lines.chunks(per_page).collect()
    };

    let catalog_id = Ref::new(1);
    let tree_id = Ref::new(2);
    let font_id = Ref::new(3);
    let font_name = Name(b"F1");
    let page_ids: Vec<Ref> = (0..pages.len())
        .map(|i| Ref::new(4 + 2 * i as i32))
        .collect();

    let mut pdf = Pdf::new();
    pdf.catalog(catalog_id).pages(tree_id);
    pdf.pages(tree_id)
        .kids(page_ids.iter().copied())
        .count(page_ids.len() as i32);
    pdf.type1_font(font_id)
        .base_font(Name(b"Helvetica"))
        .encoding_predefined(Name(b"WinAnsiEncoding"));

    for (page_id, page_lines) in page_ids.iter().zip(pages) {
        let content_id = Ref::new(page_id.get() + 1);

        let mut page = pdf.page(*page_id);
        page.media_box(Rect::new(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT));
        page.parent(tree_id);
        page.contents(content_id);
        page.resources().fonts().pair(font_name, font_id);
        page.finish();

        let mut content = Content::new();
        content.begin_text();
        content.set_font(font_name, FONT_SIZE);
        content.set_leading(LEADING);
        content.next_line(MARGIN, PAGE_HEIGHT - MARGIN);
        for line in page_lines {
            content.show(Str(&latin1(line)));
            content.next_line_using_leading();
        }
        content.end_text();
        pdf.stream(content_id, &content.finish());
    }

    pdf.finish()
}

/// Break one paragraph into lines of at most [`LINE_CHARS`] characters
fn wrap(paragraph: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for segment in paragraph.split('\n') {
        let mut line = String::new();
        let mut width = 0;
        for word in segment.replace('\t', "    ").split(' ') {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > LINE_CHARS {
                if width > 0 {
                    lines.push(std::mem::take(&mut line));
                }
                lines.push(word.drain(..LINE_CHARS).collect());
                width = 0;
            }
            let needed = if width == 0 { word.len() } else { width + 1 + word.len() };
            if needed > LINE_CHARS {
                lines.push(std::mem::take(&mut line));
                width = 0;
            }
            if width > 0 {
                line.push(' ');
                width += 1;
            }
            line.extend(word.iter());
            width += word.len();
        }
        lines.push(line);
    }
    lines
}

fn latin1(line: &str) -> Vec<u8> {
    line.chars()
        .map(|c| match u8::try_from(u32::from(c)) {
            Ok(b) if b >= 0x20 && !(0x7f..0xa0).contains(&b) => b,
            _ => b'?',
        })
        .collect()
}
