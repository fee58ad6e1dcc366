//! Parser for the authorized_keys line format.
//!
//! ```text
//! # comment lines and blank lines pass through untouched
//! ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAI... alice@laptop
//! no-pty,from="10.0.0.1,10.0.0.2" ssh-rsa AAAAB3NzaC1yc2E... deploy
//! command="echo hello world" ssh-ed25519 AAAAC3Nza... restricted
//! ```

use super::Entry;
use crate::error::{ParseError, ParseErrorKind};
use crate::record::{KeyRecord, is_key_type};

/// Parse the whole content of a file. Stops at the first malformed line.
pub fn parse_string(content: &str) -> Result<Vec<Entry>, ParseError> {
    content
        .lines()
        .enumerate()
        .map(|(idx, line)| parse_line(line, idx + 1))
        .collect()
}

/// Parse a single line. `line_num` is 1-based and only used for errors.
pub fn parse_line(line: &str, line_num: usize) -> Result<Entry, ParseError> {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(Entry::Passthrough(line.to_string()));
    }

    let error = |kind| ParseError {
        kind,
        line: line_num,
    };

    let first = trimmed.split_whitespace().next().unwrap_or_default();
    let (options, rest) = if is_key_type(first) {
        (Vec::new(), trimmed)
    } else {
        let (segment, rest) =
            take_options_segment(trimmed).ok_or(error(ParseErrorKind::MalformedOptions))?;
        let options = split_options(segment).ok_or(error(ParseErrorKind::MalformedOptions))?;
        (options, rest)
    };

    let (key_type, rest) =
        next_token(rest).ok_or(error(ParseErrorKind::MissingTypeOrContent))?;
    let (content, rest) =
        next_token(rest).ok_or(error(ParseErrorKind::MissingTypeOrContent))?;

    Ok(Entry::Key(KeyRecord::from_parts(
        options,
        key_type.to_string(),
        content.to_string(),
        rest.trim().to_string(),
    )))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    Quoted,
}

/// Split off the leading options segment, which ends at the first
/// whitespace outside double quotes.
fn take_options_segment(line: &str) -> Option<(&str, &str)> {
    let mut state = State::Normal;
    let mut escaped = false;

    for (idx, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (state, c) {
            (State::Quoted, '\\') => escaped = true,
            (State::Quoted, '"') => state = State::Normal,
            (State::Normal, '"') => state = State::Quoted,
            (State::Normal, c) if c.is_whitespace() => return Some((&line[..idx], &line[idx..])),
            _ => {}
        }
    }

    match state {
        State::Normal => Some((line, "")),
        State::Quoted => None,
    }
}

/// Split an options segment on commas that are not inside double quotes.
///
/// Returns `None` when a quote is left open.
pub(crate) fn split_options(segment: &str) -> Option<Vec<String>> {
    let mut options = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let mut escaped = false;

    for c in segment.chars() {
        if escaped {
            escaped = false;
            current.push(c);
            continue;
        }
        match (state, c) {
            (State::Normal, ',') => options.push(std::mem::take(&mut current)),
            (State::Normal, '"') => {
                state = State::Quoted;
                current.push(c);
            }
            (State::Quoted, '"') => {
                state = State::Normal;
                current.push(c);
            }
            (State::Quoted, '\\') => {
                escaped = true;
                current.push(c);
            }
            _ => current.push(c),
        }
    }

    if state == State::Quoted || escaped {
        return None;
    }
    options.push(current);
    Some(options)
}

/// Next whitespace-delimited token and the remainder after it.
fn next_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    Some((&s[..end], &s[end..]))
}
