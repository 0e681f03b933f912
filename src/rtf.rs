//! Best-effort RTF to plain text.
//!
//! Not a full RTF reader: a fixed sequence of rewrites that is good enough
//! for resumes exported from word processors. Rules run in order and each
//! one assumes the previous ones already ran.

use regex::{Captures, Regex};
use std::sync::LazyLock;

// expect() is fine in these initializers: the patterns are literals.
static HEX_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\\'[0-9a-fA-F]{2})+").expect("hex escape pattern"));
static PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\pard?\b ?").expect("paragraph pattern"));
static UNICODE_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\u-?[0-9]+ ?\??").expect("unicode escape pattern"));
static CONTROL_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[a-zA-Z]+-?[0-9]* ?").expect("control word pattern"));
static CONTROL_SYMBOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\(.)").expect("control symbol pattern"));
static NEWLINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("newline run pattern"));

/// Destinations whose content is never display text.
const IGNORABLE_DESTINATIONS: [&[u8]; 5] = [b"fonttbl", b"colortbl", b"stylesheet", b"info", b"pict"];

// Private-use placeholders for escaped literals, so the brace and
// control-word rules leave them alone.
const LITERAL_BACKSLASH: char = '\u{E000}';
const LITERAL_OPEN: char = '\u{E001}';
const LITERAL_CLOSE: char = '\u{E002}';

/// Converts RTF bytes to plain text. Returns an empty string when nothing
/// readable remains.
pub fn strip_rtf(bytes: &[u8]) -> String {
    let source = drop_ignorable_groups(bytes);

    // 1. Latin-1: every byte maps to the code point of the same value.
    let text: String = source.iter().map(|&b| char::from(b)).collect();
    let text = protect_literals(&text);

    // 2. Hex escapes carry the non-ASCII bytes.
    let text = HEX_RUN.replace_all(&text, |caps: &Captures| decode_hex_run(&caps[0]));

    // 3. Paragraph breaks.
    let text = PARAGRAPH.replace_all(&text, "\n");

    // 4. Unicode escapes are dropped: without font/codepage state they
    //    don't reliably map to display text.
    let text = UNICODE_ESCAPE.replace_all(&text, "");

    // 5. Remaining control words, then control symbols.
    let text = CONTROL_WORD.replace_all(&text, "");
    let text = CONTROL_SYMBOL.replace_all(&text, |caps: &Captures| {
        if &caps[1] == "~" {
            " ".to_string()
        } else {
            String::new()
        }
    });

    // 6. Group delimiters.
    let text: String = text.chars().filter(|c| *c != '{' && *c != '}').collect();
    let text = restore_literals(&text);

    // 7-8.
    NEWLINE_RUN.replace_all(&text, "\n").trim().to_string()
}

/// Removes `{\*...}` and known non-text destination groups, and raw line
/// breaks (insignificant in RTF source).
fn drop_ignorable_groups(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;
    while i < src.len() {
        match src[i] {
            b'\\' if i + 1 < src.len() => {
                out.extend_from_slice(&src[i..i + 2]);
                i += 2;
            }
            b'{' if starts_ignorable_group(&src[i + 1..]) => {
                i = skip_group(src, i);
            }
            b'\r' | b'\n' => i += 1,
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

fn starts_ignorable_group(rest: &[u8]) -> bool {
    let rest = match rest.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(start) => &rest[start..],
        None => return false,
    };
    if rest.starts_with(b"\\*") {
        return true;
    }
    let Some(word) = rest.strip_prefix(b"\\") else {
        return false;
    };
    let len = word.iter().take_while(|b| b.is_ascii_alphabetic()).count();
    IGNORABLE_DESTINATIONS.contains(&&word[..len])
}

/// Index just past the `}` closing the group opened at `open`.
fn skip_group(src: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < src.len() {
        match src[i] {
            b'\\' => i += 1,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    src.len()
}

fn protect_literals(text: &str) -> String {
    text.replace("\\\\", &LITERAL_BACKSLASH.to_string())
        .replace("\\{", &LITERAL_OPEN.to_string())
        .replace("\\}", &LITERAL_CLOSE.to_string())
}

fn restore_literals(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            LITERAL_BACKSLASH => '\\',
            LITERAL_OPEN => '{',
            LITERAL_CLOSE => '}',
            other => other,
        })
        .collect()
}

/// Decodes a run like `\'e5\'bc\'a0` as one UTF-8 sequence, falling back to
/// Latin-1 when the bytes are not valid UTF-8.
fn decode_hex_run(run: &str) -> String {
    let bytes: Vec<u8> = run
        .split("\\'")
        .filter(|hex| !hex.is_empty())
        .filter_map(|hex| u8::from_str_radix(hex, 16).ok())
        .collect();
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().into_iter().map(char::from).collect(),
    }
}
