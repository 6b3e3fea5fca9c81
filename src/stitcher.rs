//! Output stitching for narrated documents
//!
//! Segments come back from the model as complete SSML documents. To join
//! them, each loses its outer `<speak>` element and the concatenation is
//! wrapped in exactly one new one. The wrapper is located with a real markup
//! reader and depth tracking, so nested `<speak>` elements inside a segment
//! survive untouched.

use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Name of the wrapper element of a narrated document
pub const WRAPPER_TAG: &str = "speak";

/// Opening tag carrying the SSML namespace and version attributes
pub const WRAPPER_OPEN: &str =
    r#"<speak version="1.0" xmlns="http://www.w3.org/2001/10/synthesis" xml:lang="en-US">"#;

/// Closing tag matching [`WRAPPER_OPEN`]
pub const WRAPPER_CLOSE: &str = "</speak>";

/// Byte offsets of one matched open/close element pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ElementSpan {
    open_start: usize,
    open_end: usize,
    close_start: usize,
    close_end: usize,
}

/// Removes the first `<tag …>…</tag>` pair, keeping everything else byte for byte
///
/// Text without such a pair, or text the reader rejects before the pair
/// closes, is returned unchanged.
pub fn strip_outer_wrapper(text: &str, tag: &str) -> String {
    match find_first_element(text, tag) {
        Some(span) => {
            let mut stripped = String::with_capacity(text.len());
            stripped.push_str(&text[..span.open_start]);
            stripped.push_str(&text[span.open_end..span.close_start]);
            stripped.push_str(&text[span.close_end..]);
            stripped
        }
        None => {
            debug!("No <{}> wrapper found, passing fragment through", tag);
            text.to_string()
        }
    }
}

/// Wraps `inner` in a single SSML `<speak>` element
pub fn wrap(inner: &str) -> String {
    format!("{}{}{}", WRAPPER_OPEN, inner, WRAPPER_CLOSE)
}

/// Strips each fragment's wrapper and joins them, in order, under one wrapper
pub fn stitch<S: AsRef<str>>(fragments: &[S]) -> String {
    let inner: Vec<String> = fragments
        .iter()
        .map(|f| strip_outer_wrapper(f.as_ref(), WRAPPER_TAG))
        .collect();
    wrap(&inner.join("\n"))
}

/// Removes a surrounding Markdown code fence and a leading XML declaration
///
/// Models like to return ```` ```xml ```` blocks even when told not to.
pub fn normalize_fragment(text: &str) -> String {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix("```") {
        let rest = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest,
        };
        body = rest.trim_end().strip_suffix("```").unwrap_or(rest).trim();
    }

    if body.starts_with("<?xml") {
        if let Some(end) = body.find("?>") {
            body = body[end + 2..].trim_start();
        }
    }

    body.to_string()
}

/// Whether `text` is one well-formed element named `root`, with only
/// whitespace, comments or processing instructions around it
pub fn is_single_root_document(text: &str, root: &str) -> bool {
    let mut reader = Reader::from_str(text);
    reader.config_mut().check_end_names = true;

    let mut depth = 0usize;
    let mut roots = 0usize;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if depth == 0 {
                    roots += 1;
                    if roots > 1 || e.name().as_ref() != root.as_bytes() {
                        return false;
                    }
                }
                depth += 1;
            }
            Ok(Event::End(_)) => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Ok(Event::Empty(_)) if depth == 0 => return false,
            Ok(Event::Text(t)) if depth == 0 => {
                if !t.iter().all(u8::is_ascii_whitespace) {
                    return false;
                }
            }
            Ok(Event::CData(_)) if depth == 0 => return false,
            Ok(Event::Eof) => return depth == 0 && roots == 1,
            Err(e) => {
                debug!("Markup rejected at byte {}: {}", reader.error_position(), e);
                return false;
            }
            _ => {}
        }
    }
}

fn find_first_element(text: &str, tag: &str) -> Option<ElementSpan> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().check_end_names = true;

    let open_marker = format!("<{}", tag);
    let mut open: Option<(usize, usize)> = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == tag.as_bytes() => {
                if open.is_none() {
                    let open_end = reader.buffer_position() as usize;
                    let open_start = text[..open_end].rfind(&open_marker)?;
                    open = Some((open_start, open_end));
                }
                depth += 1;
            }
            Ok(Event::End(e)) if open.is_some() && e.name().as_ref() == tag.as_bytes() => {
                depth -= 1;
                if depth == 0 {
                    let (open_start, open_end) = open?;
                    let close_end = reader.buffer_position() as usize;
                    let close_start = text[..close_end].rfind("</")?;
                    return Some(ElementSpan { open_start, open_end, close_start, close_end });
                }
            }
            Ok(Event::Eof) => return None,
            Err(e) => {
                debug!("Cannot locate <{}> wrapper: {}", tag, e);
                return None;
            }
            _ => {}
        }
    }
}
