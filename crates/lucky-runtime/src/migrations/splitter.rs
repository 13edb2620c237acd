//! Cutting migration bodies into executable statements.

use lucky_core::migration::SplitMode;

/// Split `sql` into statements according to `mode`.
///
/// Blank and comment-only fragments are never returned.
pub fn split_statements(sql: &str, mode: SplitMode) -> Vec<String> {
    match mode {
        SplitMode::Naive => split_naive(sql),
        SplitMode::Quoted => split_quoted(sql),
        SplitMode::Whole => {
            if split_quoted(sql).is_empty() {
                Vec::new()
            } else {
                vec![sql.trim().to_string()]
            }
        }
    }
}

/// Split on every `;` regardless of context.
///
/// A `;` inside a string literal, a dollar-quoted body or a comment still
/// ends the fragment, and a fragment whose first line is a `--` comment is
/// dropped even when SQL follows it.
pub fn split_naive(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with("--"))
        .map(String::from)
        .collect()
}

/// Split on `;` outside string literals, quoted identifiers, dollar-quoted
/// blocks and comments.
pub fn split_quoted(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                has_code = true;
                let backslash_escapes = c == '\'' && ends_with_escape_prefix(&current);
                current.push(c);
                // A doubled quote is an escaped quote, not the end.
                while let Some(n) = chars.next() {
                    current.push(n);
                    if backslash_escapes && n == '\\' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                        continue;
                    }
                    if n == c {
                        if chars.peek() == Some(&c) {
                            current.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                current.push(c);
                while let Some(&n) = chars.peek() {
                    if n == '\n' {
                        break;
                    }
                    current.push(n);
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                current.push(c);
                current.push('*');
                chars.next();
                // Postgres block comments nest.
                let mut depth = 1;
                let mut prev = '\0';
                while let Some(n) = chars.next() {
                    current.push(n);
                    if prev == '/' && n == '*' {
                        depth += 1;
                        prev = '\0';
                    } else if prev == '*' && n == '/' {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                        prev = '\0';
                    } else {
                        prev = n;
                    }
                }
            }
            '$' => {
                has_code = true;
                current.push(c);

                let tag = dollar_tag(&chars);
                if let Some(tag) = tag {
                    // Opening tag: consume the rest of it, then everything up to the closing tag.
                    for _ in 1..tag.chars().count() {
                        if let Some(n) = chars.next() {
                            current.push(n);
                        }
                    }
                    let body_start = current.len();
                    for n in chars.by_ref() {
                        current.push(n);
                        if current.len() - body_start >= tag.len() && current.ends_with(&tag) {
                            break;
                        }
                    }
                }
            }
            ';' => {
                if has_code {
                    statements.push(current.trim().to_string());
                }
                current.clear();
                has_code = false;
            }
            c => {
                if !c.is_whitespace() {
                    has_code = true;
                }
                current.push(c);
            }
        }
    }

    if has_code {
        statements.push(current.trim().to_string());
    }

    statements
}

/// Whether the text so far ends in the `E` of an `E'...'` escape string
/// (and not in an identifier that happens to end with `e`).
fn ends_with_escape_prefix(current: &str) -> bool {
    let mut rev = current.chars().rev();
    match rev.next() {
        Some('E') | Some('e') => rev
            .next()
            .map_or(true, |p| !(p.is_alphanumeric() || p == '_')),
        _ => false,
    }
}

/// If the characters after a `$` complete a dollar-quote tag (`$$`, `$body$`),
/// return the full tag including both dollars.
fn dollar_tag<I>(rest: &std::iter::Peekable<I>) -> Option<String>
where
    I: Iterator<Item = char> + Clone,
{
    let mut tag = String::from("$");
    let mut lookahead = rest.clone();

    for n in lookahead.by_ref() {
        if n == '$' {
            tag.push('$');
            return Some(tag);
        }
        if tag.len() == 1 && n.is_ascii_digit() {
            // `$1` is a positional parameter.
            return None;
        }
        if n.is_alphanumeric() || n == '_' {
            tag.push(n);
        } else {
            return None;
        }
    }

    None
}
