use std::borrow::Cow;

/// Flattens feed-supplied text to a single printable line.
///
/// Removes ANSI escape sequences and other control characters (a hostile
/// feed could otherwise rewrite the terminal), and turns line breaks and
/// tabs into single spaces. Returns `Cow::Borrowed` when nothing changes.
pub fn single_line(s: &str) -> Cow<'_, str> {
    if !s.chars().any(char::is_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            // CSI sequence: ESC [ params final-byte
            if chars.peek() == Some(&'[') {
                chars.next();
                for c in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c) {
                        break;
                    }
                }
            }
            continue;
        }
        if matches!(c, '\n' | '\r' | '\t') {
            pending_space = true;
            continue;
        }
        if c.is_control() {
            continue;
        }
        if pending_space {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
            pending_space = false;
        }
        out.push(c);
    }

    Cow::Owned(out)
}
