use serde::{Deserialize, Serialize};

use super::literals::{is_word_byte, mask_string_literals};
use super::GuardViolation;

pub const DEFAULT_ROW_LIMIT: u64 = 50;
pub const MAX_ROW_LIMIT: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitPolicy {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_ROW_LIMIT,
            max_limit: MAX_ROW_LIMIT,
        }
    }
}

/// A LIMIT keyword found outside string literals.
#[derive(Debug)]
struct LimitClause {
    depth: usize,
    /// Byte range of the row-count numeral, when it is a plain integer.
    count: Option<(usize, usize)>,
}

/// Caps every row-count numeral at `max_limit` and appends
/// `LIMIT default_limit` when the outermost statement has no limit.
/// Everything else in the statement is left untouched, including OFFSET.
pub fn enforce_limit(sql: &str, policy: &LimitPolicy) -> Result<String, GuardViolation> {
    let sql = sql.trim();
    let masked = mask_string_literals(sql).ok_or(GuardViolation::UnclosedQuote)?;
    let clauses = find_limit_clauses(&masked);

    let top_level = clauses.iter().filter(|c| c.depth == 0).count();
    if top_level > 1 {
        return Err(GuardViolation::MultipleLimits);
    }

    let mut replacements = Vec::new();
    for clause in &clauses {
        match clause.count {
            Some((start, end)) => {
                let requested = sql[start..end].parse::<u64>().unwrap_or(u64::MAX);
                if requested > policy.max_limit {
                    replacements.push((start, end, policy.max_limit.to_string()));
                }
            }
            None if clause.depth == 0 => return Err(GuardViolation::NonNumericLimit),
            None => {}
        }
    }

    let mut limited = sql.to_string();
    for (start, end, value) in replacements.into_iter().rev() {
        limited.replace_range(start..end, &value);
    }

    if top_level == 0 {
        limited.push_str(&format!(" LIMIT {}", policy.default_limit));
    }

    Ok(limited)
}

fn find_limit_clauses(masked: &str) -> Vec<LimitClause> {
    let bytes = masked.as_bytes();
    let mut clauses = Vec::new();
    let mut depth: usize = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'(' => {
                depth += 1;
                i += 1;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b'"' | b'`' | b'[' => {
                let close = if b == b'[' { b']' } else { b };
                i += 1;
                while i < bytes.len() && bytes[i] != close {
                    i += 1;
                }
                i += 1;
            }
            _ if b.is_ascii_alphabetic() || b == b'_' => {
                let start = i;
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                if masked[start..i].eq_ignore_ascii_case("limit") {
                    clauses.push(LimitClause {
                        depth,
                        count: row_count_span(bytes, i),
                    });
                }
            }
            _ => i += 1,
        }
    }

    clauses
}

/// Locates the row-count numeral following a LIMIT keyword ending at `from`.
/// `LIMIT n`, `LIMIT n OFFSET m` and `LIMIT m, n` are understood; in the
/// comma form the second numeral is the row count. Anything else after the
/// count, such as arithmetic, means the bound is not a plain integer.
fn row_count_span(bytes: &[u8], from: usize) -> Option<(usize, usize)> {
    let first = integer_at(bytes, skip_spaces(bytes, from))?;

    let after_first = skip_spaces(bytes, first.1);
    let count = if bytes.get(after_first) == Some(&b',') {
        integer_at(bytes, skip_spaces(bytes, after_first + 1))?
    } else {
        first
    };

    let next = skip_spaces(bytes, count.1);
    if ends_limit_clause(bytes, next) {
        Some(count)
    } else {
        None
    }
}

fn ends_limit_clause(bytes: &[u8], at: usize) -> bool {
    if at >= bytes.len() || bytes[at] == b')' {
        return true;
    }
    let word_end = at + "offset".len();
    word_end <= bytes.len()
        && bytes[at..word_end].eq_ignore_ascii_case(b"offset")
        && bytes.get(word_end).map_or(true, |b| !is_word_byte(*b))
}

fn integer_at(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == start {
        return None;
    }
    if bytes.get(end).is_some_and(|b| is_word_byte(*b) || *b == b'.') {
        return None;
    }
    Some((start, end))
}

fn skip_spaces(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}
