//! Minimal CAP and Atom text extraction.
//!
//! The classifier consumes bulletins as free text, so this module never
//! builds a document tree. It slices out the per-bulletin blocks (`<entry>`
//! for Atom, `<alert>`/`<info>` for CAP, `<item>` for RSS), strips markup,
//! and decodes entities. Documents without any recognized block degrade to
//! a single whole-document bulletin, which the extractor then resolves or
//! counts as unresolved.

use crate::model::RawBulletin;

/// Per-bulletin container tags, tried in order. The first tag with any
/// matches wins, so CAP `<info>` blocks nested inside `<alert>` are never
/// double-counted.
const BLOCK_TAGS: &[&str] = &["entry", "alert", "item", "info"];

/// Splits a feed document into bulletins.
///
/// `source_file` is carried onto every bulletin so the extractor can fall
/// back to file-name province fragments.
pub fn extract_entries(xml: &str, source_file: Option<&str>) -> Vec<RawBulletin> {
    let mut blocks: Vec<&str> = Vec::new();
    for tag in BLOCK_TAGS {
        blocks = element_blocks(xml, tag);
        if !blocks.is_empty() {
            break;
        }
    }
    if blocks.is_empty() {
        blocks.push(xml);
    }
    blocks
        .into_iter()
        .filter_map(|block| bulletin_from_block(block, source_file))
        .collect()
}

fn bulletin_from_block(block: &str, source_file: Option<&str>) -> Option<RawBulletin> {
    let title = element_text(block, "title")
        .or_else(|| element_text(block, "headline"))
        .or_else(|| element_text(block, "event"))
        .unwrap_or_default();
    // The summary keeps every text node in the block. The title may repeat
    // in it; classification scans the concatenation either way.
    let summary = flatten_text(block);
    if title.is_empty() && summary.is_empty() {
        return None;
    }
    Some(RawBulletin {
        title,
        summary,
        province_hint: None,
        source_file: source_file.map(String::from),
    })
}

// ---------------------------------------------------------------------------
// Element slicing
// ---------------------------------------------------------------------------

/// Returns the inner text spans of every non-nested `<tag ...>...</tag>`
/// occurrence, in document order. Self-closing elements yield nothing.
fn element_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let close_tag = format!("</{}>", tag);
    let mut blocks = Vec::new();
    let mut rest = xml;
    loop {
        let Some(open_at) = find_open_tag(rest, tag) else {
            break;
        };
        let after_open = &rest[open_at..];
        let Some(gt) = after_open.find('>') else {
            break;
        };
        let body = &after_open[gt + 1..];
        let Some(close_at) = body.find(&close_tag) else {
            break;
        };
        blocks.push(&body[..close_at]);
        rest = &body[close_at + close_tag.len()..];
    }
    blocks
}

/// Finds `<tag` followed by whitespace or `>`, so `<info` does not match
/// `<informacion`. Namespace declarations on the element are fine; prefixed
/// tag names (`<atom:entry>`) are not matched and fall through to the
/// whole-document path.
fn find_open_tag(xml: &str, tag: &str) -> Option<usize> {
    let needle = format!("<{}", tag);
    let bytes = xml.as_bytes();
    let mut from = 0;
    while let Some(pos) = xml[from..].find(&needle) {
        let at = from + pos;
        let next = at + needle.len();
        match bytes.get(next) {
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') => return Some(at),
            _ => from = at + 1,
        }
    }
    None
}

/// First occurrence of `tag` inside `block`, flattened to plain text.
pub(crate) fn element_text(block: &str, tag: &str) -> Option<String> {
    let inner = element_blocks(block, tag).into_iter().next()?;
    let text = flatten_text(inner);
    if text.is_empty() { None } else { Some(text) }
}

// ---------------------------------------------------------------------------
// Markup stripping
// ---------------------------------------------------------------------------

/// Strips tags and comments, keeps CDATA contents, decodes entities and
/// collapses whitespace to single spaces.
pub(crate) fn flatten_text(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut rest = fragment;
    loop {
        let Some(at) = rest.find('<') else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..at]);
        let after = &rest[at..];
        if let Some(stripped) = after.strip_prefix("<!--") {
            match stripped.find("-->") {
                Some(end) => {
                    out.push(' ');
                    rest = &stripped[end + 3..];
                }
                None => break,
            }
        } else if let Some(stripped) = after.strip_prefix("<![CDATA[") {
            match stripped.find("]]>") {
                Some(end) => {
                    out.push_str(&stripped[..end]);
                    rest = &stripped[end + 3..];
                }
                None => {
                    out.push_str(stripped);
                    break;
                }
            }
        } else {
            match after.find('>') {
                Some(end) => {
                    out.push(' ');
                    rest = &after[end + 1..];
                }
                // Truncated tag at end of input: drop the tail.
                None => break,
            }
        }
    }
    let decoded = decode_entities(&out);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decodes the named entities CAP feeds actually use plus numeric character
/// references. Unknown entities and bare ampersands pass through verbatim.
pub(crate) fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(amp) = rest.find('&') else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        let semi = after[1..].find(';').map(|p| p + 1);
        match semi {
            Some(end) if end <= 10 => {
                match decode_entity(&after[1..end]) {
                    Some(decoded) => out.push_str(&decoded),
                    None => out.push_str(&after[..end + 1]),
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }
    out
}

fn decode_entity(name: &str) -> Option<String> {
    match name {
        "amp" => return Some("&".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "quot" => return Some("\"".to_string()),
        "apos" => return Some("'".to_string()),
        "nbsp" => return Some(" ".to_string()),
        _ => {}
    }
    let digits = name.strip_prefix('#')?;
    let code = if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(code).map(String::from)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
