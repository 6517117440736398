use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{DecodeError, ParseError, ParseErrorKind};
use crate::model::{Entry, KeyParsingMode};

/// Parse dotenv entries from UTF-8 text.
pub fn parse_str(input: &str) -> Result<Vec<Entry>, DecodeError> {
    parse_str_with_mode(input, KeyParsingMode::Strict)
}

/// Parse dotenv entries from UTF-8 text using a specific key parsing mode.
pub fn parse_str_with_mode(
    input: &str,
    key_parsing_mode: KeyParsingMode,
) -> Result<Vec<Entry>, DecodeError> {
    Ok(parse_with_source(input, None, key_parsing_mode, false)?)
}

/// Parse dotenv entries from UTF-8 bytes.
pub fn parse_bytes(input: &[u8]) -> Result<Vec<Entry>, DecodeError> {
    parse_bytes_with_mode(input, KeyParsingMode::Strict)
}

/// Parse dotenv entries from UTF-8 bytes using a specific key parsing mode.
pub fn parse_bytes_with_mode(
    input: &[u8],
    key_parsing_mode: KeyParsingMode,
) -> Result<Vec<Entry>, DecodeError> {
    let text = std::str::from_utf8(input)?;
    parse_str_with_mode(text, key_parsing_mode)
}

/// Parses `input`, keeping the first position and the last value of a
/// repeated key.
///
/// With `escape_literals`, every value is returned in escaped form for the
/// expander: a literal `\` becomes `\\` and a `$` that must not expand
/// (single-quoted, backtick-quoted, or `\$` in double quotes) becomes `\$`.
pub(crate) fn parse_with_source(
    input: &str,
    source: Option<&Path>,
    key_parsing_mode: KeyParsingMode,
    escape_literals: bool,
) -> Result<Vec<Entry>, ParseError> {
    let normalized = normalize_newlines(input);

    let mut entries: Vec<Entry> = Vec::new();
    let mut positions = HashMap::<String, usize>::new();

    for statement in Statements::new(&normalized) {
        let parsed = parse_statement(&statement, source, key_parsing_mode, escape_literals)?;
        let Some(entry) = parsed else {
            continue;
        };

        match positions.get(&entry.key) {
            Some(&idx) => entries[idx] = entry,
            None => {
                positions.insert(entry.key.clone(), entries.len());
                entries.push(entry);
            }
        }
    }

    Ok(entries)
}

fn normalize_newlines(input: &str) -> Cow<'_, str> {
    if !input.contains('\r') {
        return Cow::Borrowed(input);
    }
    Cow::Owned(input.replace("\r\n", "\n").replace('\r', "\n"))
}

/// One logical `KEY=VALUE` statement; quoted values may span lines.
struct Statement<'a> {
    text: &'a str,
    line: u32,
}

struct Statements<'a> {
    input: &'a str,
    offset: usize,
    line: u32,
}

impl<'a> Statements<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
            line: 1,
        }
    }
}

impl<'a> Iterator for Statements<'a> {
    type Item = Statement<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.input.as_bytes();
        if self.offset >= bytes.len() {
            return None;
        }

        let start = self.offset;
        let end = statement_end(bytes, start);
        let statement = Statement {
            text: &self.input[start..end],
            line: self.line,
        };

        self.line += bytes[start..end].iter().filter(|b| **b == b'\n').count() as u32;
        self.offset = end;
        if self.offset < bytes.len() {
            // Step over the terminating newline.
            self.offset += 1;
            self.line += 1;
        }

        Some(statement)
    }
}

fn statement_end(bytes: &[u8], start: usize) -> usize {
    let line_end = |from: usize| {
        bytes[from..]
            .iter()
            .position(|b| *b == b'\n')
            .map_or(bytes.len(), |pos| from + pos)
    };

    let first_line_end = line_end(start);
    if bytes[start..first_line_end].trim_ascii_start().starts_with(b"#") {
        return first_line_end;
    }
    let Some(eq) = bytes[start..first_line_end].iter().position(|b| *b == b'=') else {
        return first_line_end;
    };

    let mut idx = start + eq + 1;
    while idx < first_line_end && matches!(bytes[idx], b' ' | b'\t') {
        idx += 1;
    }
    if idx >= first_line_end || !is_quote(bytes[idx]) {
        return first_line_end;
    }

    match closing_quote(bytes, idx) {
        Some(close) => line_end(close),
        // Reported as an unterminated quote on the opening line.
        None => first_line_end,
    }
}

fn is_quote(byte: u8) -> bool {
    matches!(byte, b'"' | b'\'' | b'`')
}

/// Index of the quote closing the one at `open`, skipping backslash escapes.
fn closing_quote(bytes: &[u8], open: usize) -> Option<usize> {
    let quote = bytes[open];
    let mut idx = open + 1;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 2,
            byte if byte == quote => return Some(idx),
            _ => idx += 1,
        }
    }
    None
}

fn parse_statement(
    statement: &Statement<'_>,
    source: Option<&Path>,
    key_parsing_mode: KeyParsingMode,
    escape_literals: bool,
) -> Result<Option<Entry>, ParseError> {
    let line = statement.line;
    let mut working = statement.text.trim_start();
    if working.is_empty() || working.starts_with('#') {
        return Ok(None);
    }

    if let Some(rest) = working.strip_prefix("export")
        && rest.starts_with(char::is_whitespace)
    {
        working = rest.trim_start();
    }

    let Some((raw_key, raw_value)) = working.split_once('=') else {
        if working.is_empty() {
            return Err(ParseError::new(line, 1, ParseErrorKind::MissingKey));
        }
        let column = working.chars().count() as u32 + 1;
        return Err(ParseError::new(line, column, ParseErrorKind::InvalidSyntax));
    };

    let key = raw_key.trim_end();
    if key.is_empty() {
        return Err(ParseError::new(line, 1, ParseErrorKind::MissingKey));
    }
    if !is_valid_key(key, key_parsing_mode) {
        return Err(ParseError::new(line, 1, ParseErrorKind::InvalidKey));
    }

    let value_input = raw_value.trim_start();
    let value_column = (statement.text.len() - value_input.len()) as u32 + 1;
    let value = parse_value(value_input, line, value_column, escape_literals)?;

    Ok(Some(Entry {
        key: key.to_owned(),
        value,
        source: source.map(Path::to_path_buf),
        line,
    }))
}

fn parse_value(
    input: &str,
    line: u32,
    column: u32,
    escape_literals: bool,
) -> Result<String, ParseError> {
    let bytes = input.as_bytes();
    let Some(&first) = bytes.first() else {
        return Ok(String::new());
    };
    if !is_quote(first) {
        let value = unquoted(input);
        return Ok(if escape_literals {
            escape(value, &['\\'])
        } else {
            value.to_owned()
        });
    }

    let Some(close) = closing_quote(bytes, 0) else {
        return Err(ParseError::new(
            line,
            column,
            ParseErrorKind::UnterminatedQuote,
        ));
    };

    let tail = input[close + 1..].trim_start();
    if !tail.is_empty() && !tail.starts_with('#') {
        return Err(ParseError::new(
            line,
            column + close as u32 + 1,
            ParseErrorKind::InvalidSyntax,
        ));
    }

    let body = &input[1..close];
    Ok(match (first, escape_literals) {
        (b'"', _) => unescape(body, escape_literals),
        (_, true) => escape(body, &['\\', '$']),
        (_, false) => body.to_owned(),
    })
}

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if special.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// An unquoted value ends at a `#` that opens the value or follows whitespace.
fn unquoted(input: &str) -> &str {
    let mut prev_is_space = true;
    for (idx, ch) in input.char_indices() {
        if ch == '#' && prev_is_space {
            return input[..idx].trim_end();
        }
        prev_is_space = ch.is_whitespace();
    }
    input.trim_end()
}

/// Resolves double-quote escapes. With `escape_literals`, `\\` and `\$`
/// stay escaped for the expander.
fn unescape(body: &str, escape_literals: bool) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(ch @ ('\\' | '$')) if escape_literals => {
                out.push('\\');
                out.push(ch);
            }
            Some(other) => out.push(other),
            None if escape_literals => out.push_str("\\\\"),
            None => out.push('\\'),
        }
    }
    out
}

fn is_valid_key(key: &str, key_parsing_mode: KeyParsingMode) -> bool {
    match key_parsing_mode {
        KeyParsingMode::Strict => key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-')),
        KeyParsingMode::Permissive => key
            .chars()
            .all(|ch| ch.is_ascii_graphic() && ch != '='),
    }
}
