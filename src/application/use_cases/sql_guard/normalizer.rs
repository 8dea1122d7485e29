//! Extracts one candidate SQL statement from free-form model output.
//!
//! The extraction is an ordered list of pure string transforms. Each step
//! works on the previous step's output and the order is part of the
//! contract: comments are removed before whitespace is collapsed, and the
//! text is cut to start at SELECT before shell prompts are stripped.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

static LABELED_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```\s*(?:sql|sqlite)\b[^\n]*\n(.*?)```").unwrap());

static ANY_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(.*?)```").unwrap());

static SELECT_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bselect\b").unwrap());

static SELECT_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^select\b").unwrap());

static SHELL_PROMPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:sqlite>|\.[a-z]\w*>|\.[a-z]\w*)\s*").unwrap());

static CONTINUATION_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\.\.\.>\s*").unwrap());

static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"--[^\n]*").unwrap());

static BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

static UNTERMINATED_BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*$").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

type Step = fn(&str) -> String;

const STEPS: [(&str, Step); 6] = [
    ("select_fenced_block", select_fenced_block),
    ("truncate_to_select", truncate_to_select),
    ("strip_shell_prompts", strip_shell_prompts),
    ("strip_comments", strip_comments),
    ("trim_wrapping", trim_wrapping),
    ("collapse_whitespace", collapse_whitespace),
];

/// Returns the extracted statement, or an empty string when the text holds
/// no statement starting with SELECT.
pub fn normalize_sql(text: &str) -> String {
    let mut current = text.trim().to_string();

    for (name, step) in STEPS {
        current = step(&current);
        trace!(step = name, len = current.len(), "normalizer step");
        if current.is_empty() {
            return String::new();
        }
    }

    if starts_with_select(&current) {
        current
    } else {
        String::new()
    }
}

pub fn starts_with_select(sql: &str) -> bool {
    SELECT_PREFIX.is_match(sql)
}

/// Prefer a fence labelled sql/sqlite, then any fence mentioning SELECT,
/// otherwise the text as-is.
pub(crate) fn select_fenced_block(text: &str) -> String {
    if let Some(caps) = LABELED_FENCE.captures(text) {
        return caps[1].trim().to_string();
    }

    ANY_FENCE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .find(|block| SELECT_TOKEN.is_match(block))
        .map(|block| block.trim().to_string())
        .unwrap_or_else(|| text.to_string())
}

/// Drop everything before the first SELECT. No SELECT yields empty.
pub(crate) fn truncate_to_select(text: &str) -> String {
    match SELECT_TOKEN.find(text) {
        Some(m) => text[m.start()..].trim().to_string(),
        None => String::new(),
    }
}

pub(crate) fn strip_shell_prompts(text: &str) -> String {
    text.lines()
        .map(|line| {
            let line = SHELL_PROMPT.replace(line, "");
            CONTINUATION_PROMPT.replace(&line, "").into_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn strip_comments(text: &str) -> String {
    let without_line = LINE_COMMENT.replace_all(text, "");
    let without_block = BLOCK_COMMENT.replace_all(&without_line, "");
    UNTERMINATED_BLOCK_COMMENT
        .replace(&without_block, "")
        .into_owned()
}

/// Trim backticks and whitespace, then a single trailing `;`. A second
/// terminator is left for the validator to reject.
pub(crate) fn trim_wrapping(text: &str) -> String {
    let is_wrapping = |c: char| c == '`' || c.is_whitespace();
    let trimmed = text.trim_matches(is_wrapping);
    trimmed
        .strip_suffix(';')
        .unwrap_or(trimmed)
        .trim_end()
        .to_string()
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}
