use once_cell::sync::Lazy;
use regex::Regex;

use super::literals::{is_word_byte, mask_string_literals};
use super::normalizer::starts_with_select;
use super::GuardViolation;

/// Statement verbs that change data, schema or connection state.
pub const FORBIDDEN_VERBS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "attach", "detach", "replace",
    "vacuum", "pragma", "grant", "revoke",
];

static FORBIDDEN_VERB: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(r"(?i)\b(?:{})\b", FORBIDDEN_VERBS.join("|"));
    Regex::new(&pattern).unwrap()
});

static TABLE_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(from|join)\b\s*(\(|[^\s(),;]+)").unwrap());

/// Keywords that end a FROM clause at the current nesting depth.
const FROM_CLAUSE_TERMINATORS: &[&str] = &[
    "where", "group", "having", "order", "limit", "window", "union", "intersect", "except",
    "select", "values",
];

/// Checks a normalized statement against the read-only policy for `table`.
pub fn validate_sql(sql: &str, table: &str) -> Result<(), GuardViolation> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(GuardViolation::Empty);
    }

    if !starts_with_select(trimmed) {
        return Err(GuardViolation::NotSelect);
    }

    if trimmed.contains(';') {
        return Err(GuardViolation::MultipleStatements);
    }

    let masked = mask_string_literals(trimmed).ok_or(GuardViolation::UnclosedQuote)?;

    if let Some(m) = FORBIDDEN_VERB.find(&masked) {
        return Err(GuardViolation::ForbiddenKeyword(m.as_str().to_lowercase()));
    }

    for caps in TABLE_REFERENCE.captures_iter(&masked) {
        let Some(target) = caps.get(2) else {
            continue;
        };
        if target.as_str() == "(" {
            check_parenthesized_source(&masked[target.end()..], table)?;
            continue;
        }
        check_table_name(target.as_str(), table)?;
    }

    if has_comma_join(&masked) {
        return Err(GuardViolation::CommaJoin);
    }

    Ok(())
}

pub fn is_safe_sql(sql: &str, table: &str) -> bool {
    validate_sql(sql, table).is_ok()
}

fn check_table_name(token: &str, table: &str) -> Result<(), GuardViolation> {
    let name = unquote_identifier(token);
    if name.eq_ignore_ascii_case(table) {
        Ok(())
    } else {
        Err(GuardViolation::ForeignTable(name.to_string()))
    }
}

/// `rest` follows the `(` of a FROM/JOIN source. Only a subquery or the bare
/// table wrapped in parentheses is accepted; SQLite also reads `(other)` and
/// `(a, b)` as sources, which would bypass the table check.
fn check_parenthesized_source(rest: &str, table: &str) -> Result<(), GuardViolation> {
    let mut inner = rest.trim_start();
    while let Some(stripped) = inner.strip_prefix('(') {
        inner = stripped.trim_start();
    }

    if starts_with_select(inner) {
        return Ok(());
    }

    let end = inner
        .find(|c: char| c.is_whitespace() || "(),;".contains(c))
        .unwrap_or(inner.len());
    let token = &inner[..end];
    if token.is_empty() {
        return Err(GuardViolation::ParenthesizedSource);
    }
    check_table_name(token, table)?;

    if inner[end..].trim_start().starts_with(')') {
        Ok(())
    } else {
        Err(GuardViolation::ParenthesizedSource)
    }
}

fn unquote_identifier(token: &str) -> &str {
    let pairs = [('"', '"'), ('`', '`'), ('[', ']')];
    for (open, close) in pairs {
        if token.len() >= 2 && token.starts_with(open) && token.ends_with(close) {
            return &token[1..token.len() - 1];
        }
    }
    token
}

/// True when a FROM clause lists sources separated by commas at any
/// nesting depth, e.g. `FROM listings, other` or `FROM (SELECT ...) t, other`.
fn has_comma_join(masked: &str) -> bool {
    let bytes = masked.as_bytes();
    // One flag per parenthesis depth: are we inside that depth's FROM clause?
    let mut in_from = vec![false];
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'(' => {
                in_from.push(false);
                i += 1;
            }
            b')' => {
                if in_from.len() > 1 {
                    in_from.pop();
                }
                i += 1;
            }
            b',' => {
                if in_from.last().copied().unwrap_or(false) {
                    return true;
                }
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
                let word = masked[start..i].to_ascii_lowercase();
                if let Some(flag) = in_from.last_mut() {
                    if word == "from" || word == "join" {
                        *flag = true;
                    } else if FROM_CLAUSE_TERMINATORS.contains(&word.as_str()) {
                        *flag = false;
                    }
                }
            }
            _ => i += 1,
        }
    }

    false
}
