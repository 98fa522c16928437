//! Deterministic cleanup of transcribed text.
//!
//! Vision models sometimes wrap output in code fences despite the prompt,
//! emit CRLF line endings or sprinkle zero-width characters that break the
//! keyword and regex matching downstream. Every rule here is a pure
//! `&str → String` pass.
//!
//! Rules (applied in order):
//! 1. Strip outer code fences
//! 2. Normalise line endings (CRLF → LF)
//! 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 4. Trim trailing whitespace per line
//! 5. Collapse runs of blank lines to a single blank line
//! 6. Drop the "no text" marker the prompt asks for on blank pages
//! 7. Trim leading and trailing blank lines

use crate::prompts::NO_TEXT_MARKER;
use once_cell::sync::Lazy;
use regex::Regex;

pub fn clean_text(input: &str) -> String {
    let s = strip_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = drop_no_text_marker(&s);
    s.trim_matches('\n').to_string()
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:[a-zA-Z]+)?\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

fn drop_no_text_marker(input: &str) -> String {
    if input.trim() == NO_TEXT_MARKER {
        String::new()
    } else {
        input.to_string()
    }
}
