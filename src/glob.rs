//! fnmatch-style wildcard matching for one path segment.
//!
//! Supports `*`, `?`, and `[...]` character classes (with ranges and `!`/`^`
//! negation). [`segment_match`] additionally applies the Unix dotfile rule:
//! wildcards never match a name starting with `.` unless the pattern itself
//! starts with `.`.

/// Match `name` against `pattern`, honoring the dotfile rule.
pub fn segment_match(pattern: &str, name: &str) -> bool {
    if name.starts_with('.') && !pattern.starts_with('.') {
        return false;
    }
    wildcard_match(pattern.as_bytes(), name.as_bytes())
}

/// Raw fnmatch without dotfile protection (used by exclude rules, where
/// `*.pyc` is expected to match `.hidden.pyc`).
pub fn wildcard_match(pat: &[u8], name: &[u8]) -> bool {
    if pat.is_empty() {
        return name.is_empty();
    }

    match pat[0] {
        b'*' => {
            let rest = &pat[1..];
            (0..=name.len()).any(|i| wildcard_match(rest, &name[i..]))
        }
        b'?' => !name.is_empty() && wildcard_match(&pat[1..], &name[1..]),
        b'[' => match parse_class(&pat[1..]) {
            Some((class, rest)) => {
                !name.is_empty() && class.matches(name[0]) && wildcard_match(rest, &name[1..])
            }
            // Unterminated class: treat '[' as a literal, per fnmatch.
            None => !name.is_empty() && name[0] == b'[' && wildcard_match(&pat[1..], &name[1..]),
        },
        c => !name.is_empty() && name[0] == c && wildcard_match(&pat[1..], &name[1..]),
    }
}

struct CharClass<'a> {
    body: &'a [u8],
    negated: bool,
}

impl CharClass<'_> {
    fn matches(&self, ch: u8) -> bool {
        let mut i = 0;
        let mut hit = false;
        while i < self.body.len() {
            if i + 2 < self.body.len() && self.body[i + 1] == b'-' {
                if (self.body[i]..=self.body[i + 2]).contains(&ch) {
                    hit = true;
                }
                i += 3;
            } else {
                if self.body[i] == ch {
                    hit = true;
                }
                i += 1;
            }
        }
        hit != self.negated
    }
}

/// Split a class body from the pattern tail. `pat` starts just past the
/// opening `[`. A `]` in the first body position is a literal member.
fn parse_class(pat: &[u8]) -> Option<(CharClass<'_>, &[u8])> {
    let (negated, body_start) = match pat.first() {
        Some(b'!') | Some(b'^') => (true, 1),
        _ => (false, 0),
    };

    let mut end = body_start;
    if pat.get(end) == Some(&b']') {
        end += 1; // literal ']' member
    }
    while end < pat.len() && pat[end] != b']' {
        end += 1;
    }
    if end >= pat.len() {
        return None;
    }

    Some((
        CharClass {
            body: &pat[body_start..end],
            negated,
        },
        &pat[end + 1..],
    ))
}
