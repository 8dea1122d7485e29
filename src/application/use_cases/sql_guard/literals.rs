/// Blank out the contents of single-quoted string literals, keeping the
/// quotes and every byte offset intact. Quoted identifiers (`"x"`, `` `x` ``,
/// `[x]`) are copied through unchanged, so a `'` inside one never opens a
/// literal. SQLite escapes a quote by doubling it; there are no backslash
/// escapes. Returns `None` when a literal or quoted identifier is not closed.
pub(crate) fn mask_string_literals(sql: &str) -> Option<String> {
    let mut masked = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        masked.push(c);
        let close = match c {
            '\'' | '"' | '`' => c,
            '[' => ']',
            _ => continue,
        };
        let blank = c == '\'';

        loop {
            let next = chars.next()?;
            if next == close {
                if close != ']' && chars.peek() == Some(&close) {
                    chars.next();
                    if blank {
                        masked.push_str("  ");
                    } else {
                        masked.push(close);
                        masked.push(close);
                    }
                    continue;
                }
                masked.push(next);
                break;
            }
            if blank {
                for _ in 0..next.len_utf8() {
                    masked.push(' ');
                }
            } else {
                masked.push(next);
            }
        }
    }

    Some(masked)
}

pub(crate) fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
