//! Markdown cleanup applied to raw OCR output before it is returned.
//!
//! Pure functions, no async. The passes run in a fixed order and the result
//! always ends with exactly one newline:
//!
//! 1. drop markdown image references (`![alt](url)`)
//! 2. drop raw `<img ...>` tags
//! 3. one space between a heading's hash run and its text
//! 4. cap blank-line runs at two blank lines
//! 5. strip trailing spaces/tabs per line
//! 6. strip leading whitespace of the document
//! 7. strip trailing whitespace of the document, append one newline

use once_cell::sync::Lazy;
use regex::Regex;

static RE_MARKDOWN_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());

static RE_IMG_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<img[^>]*>").unwrap());

// The optional `\A\s*` group lets a heading preceded only by document-leading
// whitespace be normalized too; that whitespace is removed later anyway.
static RE_HEADING_SPACED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^((?:\A\s*)?)(#{1,6})[ \t]+").unwrap());

static RE_HEADING_TIGHT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^((?:\A\s*)?)(#{1,6})([^#\s])").unwrap());

// A run of 4+ newlines, where the lines in between hold only spaces, tabs or
// carriage returns (anything the trailing-whitespace pass would empty out).
static RE_BLANK_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n(?:[ \t\r]*\n){3,}").unwrap());

/// Run every cleanup pass over `input`.
pub fn normalize_markdown(input: &str) -> String {
    let s = strip_images(input);
    let s = normalize_headings(&s);
    let s = collapse_blank_lines(&s);
    let s = trim_line_ends(&s);
    finish_document(&s)
}

/// Steps 1 and 2. Repeated until stable, since removing one image can splice
/// the surrounding text into another.
fn strip_images(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let without_md = RE_MARKDOWN_IMAGE.replace_all(&current, "");
        let without_tags = RE_IMG_TAG.replace_all(&without_md, "").into_owned();
        if without_tags == current {
            return current;
        }
        current = without_tags;
    }
}

fn normalize_headings(input: &str) -> String {
    let s = RE_HEADING_SPACED.replace_all(input, "${1}${2} ");
    RE_HEADING_TIGHT.replace_all(&s, "${1}${2} ${3}").into_owned()
}

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n\n").into_owned()
}

/// Drop trailing spaces/tabs on every line. A CRLF line keeps its single
/// `\r`; stray carriage returns among the trailing whitespace go with it.
fn trim_line_ends(input: &str) -> String {
    input
        .split('\n')
        .map(|line| {
            let trimmed = line.trim_end_matches([' ', '\t', '\r']);
            if line.ends_with('\r') {
                format!("{}\r", trimmed)
            } else {
                trimmed.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Steps 6 and 7.
fn finish_document(input: &str) -> String {
    let mut out = input.trim().to_string();
    out.push('\n');
    out
}
