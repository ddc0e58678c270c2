//! Line unfolding and content-line splitting.
//!
//! RFC 5545 folds long lines by inserting CRLF followed by a single space or
//! tab. [`Unfolder`] reverses that over any `BufRead`, so a document can be
//! consumed line by line without holding the whole thing in memory.

use std::io::{self, BufRead};

/// Iterator over logical (unfolded) content lines of a line source.
pub struct Unfolder<R> {
    reader: R,
    pending: Option<String>,
    raw: Vec<u8>,
    done: bool,
}

impl<R: BufRead> Unfolder<R> {
    pub fn new(reader: R) -> Self {
        Unfolder {
            reader,
            pending: None,
            raw: Vec::new(),
            done: false,
        }
    }

    /// Read one physical line with its terminator stripped. `None` at EOF.
    fn next_physical(&mut self) -> io::Result<Option<String>> {
        self.raw.clear();
        if self.reader.read_until(b'\n', &mut self.raw)? == 0 {
            return Ok(None);
        }
        while matches!(self.raw.last(), Some(b'\n' | b'\r')) {
            self.raw.pop();
        }
        Ok(Some(String::from_utf8_lossy(&self.raw).into_owned()))
    }
}

impl<R: BufRead> Iterator for Unfolder<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return self.pending.take().map(Ok);
        }

        loop {
            let line = match self.next_physical() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.done = true;
                    return self.pending.take().map(Ok);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            if let Some(continuation) = line.strip_prefix([' ', '\t']) {
                match self.pending.as_mut() {
                    Some(pending) => pending.push_str(continuation),
                    None => self.pending = Some(continuation.to_string()),
                }
                continue;
            }

            if line.is_empty() {
                continue;
            }

            if let Some(previous) = self.pending.replace(line) {
                return Some(Ok(previous));
            }
        }
    }
}

/// Unfold a whole in-memory document into logical lines.
pub fn logical_lines(text: &str) -> Unfolder<&[u8]> {
    Unfolder::new(text.as_bytes())
}

/// Unfold a document and join the logical lines with `\n`.
///
/// Unfolding is idempotent: applying it to its own output is a no-op.
pub fn unfold(text: &str) -> String {
    logical_lines(text)
        .filter_map(Result::ok)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A property parameter such as `TZID=Europe/Berlin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: String,
}

/// One logical `NAME[;PARAMS]:VALUE` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLine {
    pub name: String,
    pub params: Vec<Param>,
    pub value: String,
}

impl ContentLine {
    /// Split a logical line into name, parameters and raw value.
    ///
    /// The value starts after the first `:` that is not inside a quoted
    /// parameter value. Returns `None` when there is no such colon or the
    /// name is empty.
    pub fn parse(line: &str) -> Option<ContentLine> {
        let colon = find_unquoted(line, ':')?;
        let head = &line[..colon];
        let value = &line[colon + 1..];

        let (name, params) = match find_unquoted(head, ';') {
            Some(semi) => (&head[..semi], &head[semi + 1..]),
            None => (head, ""),
        };

        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        Some(ContentLine {
            name: name.to_ascii_uppercase(),
            params: parse_params(params),
            value: strip_quotes(value).to_string(),
        })
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.key.eq_ignore_ascii_case(key))
            .map(|p| p.value.as_str())
    }

    pub fn has_param_value(&self, key: &str, value: &str) -> bool {
        self.param(key).is_some_and(|v| v.eq_ignore_ascii_case(value))
    }

    /// The value with text escapes resolved.
    pub fn text(&self) -> String {
        unescape_text(&self.value)
    }
}

fn find_unquoted(s: &str, needle: char) -> Option<usize> {
    let mut in_quotes = false;
    for (idx, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c == needle && !in_quotes => return Some(idx),
            _ => {}
        }
    }
    None
}

fn parse_params(s: &str) -> Vec<Param> {
    let mut params = Vec::new();
    let mut rest = s;

    while !rest.is_empty() {
        let (item, tail) = match find_unquoted(rest, ';') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };
        rest = tail;

        if item.trim().is_empty() {
            continue;
        }
        let (key, value) = item.split_once('=').unwrap_or((item, ""));
        params.push(Param {
            key: key.trim().to_ascii_uppercase(),
            value: strip_quotes(value.trim()).to_string(),
        });
    }

    params
}

fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s)
}

/// Resolve `\n`, `\N`, `\,`, `\;` and `\\` in a single left-to-right pass,
/// so an escaped backslash is never re-read as the start of another escape.
pub fn unescape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(',') => out.push(','),
            Some(';') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}
