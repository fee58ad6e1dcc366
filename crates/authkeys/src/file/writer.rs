//! Writer for authorized_keys content.

use super::Entry;
use crate::record::KeyRecord;
use std::borrow::Cow;
use std::fmt::Write;

/// Render entries in order, one line each, newline-terminated.
pub fn write_string(entries: &[Entry]) -> String {
    let mut output = String::new();
    for entry in entries {
        match entry {
            Entry::Key(record) => output.push_str(&record_line(record)),
            Entry::Passthrough(text) => output.push_str(text),
        }
        output.push('\n');
    }
    output
}

/// Render one record without the line terminator.
///
/// Options are written exactly as stored; quoting happens when a record is
/// built, never here.
pub fn record_line(record: &KeyRecord) -> String {
    let mut line = String::new();

    if !record.options().is_empty() {
        write!(line, "{} ", record.options().join(",")).unwrap();
    }

    write!(line, "{} {}", record.key_type(), record.content()).unwrap();

    if !record.comment().is_empty() {
        write!(line, " {}", record.comment()).unwrap();
    }

    line
}

/// Quote the value of a `name=value` option when it holds a comma or
/// whitespace and is not quoted already.
pub(crate) fn quote_option(option: &str) -> Cow<'_, str> {
    match option.split_once('=') {
        Some((name, value))
            if !value.starts_with('"')
                && value.contains(|c: char| c == ',' || c.is_whitespace()) =>
        {
            Cow::Owned(format!("{name}=\"{}\"", value.replace('"', "\\\"")))
        }
        _ => Cow::Borrowed(option),
    }
}
