//! Key records: one authorization entry of an authorized_keys file.

use crate::error::{Error, Result};
use crate::file::parser::split_options;
use crate::file::writer::quote_option;
use std::fmt;

/// Key algorithm identifiers accepted as the leading token of an entry.
pub const KEY_TYPES: &[&str] = &[
    "ssh-rsa",
    "ssh-dss",
    "ssh-ed25519",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "sk-ecdsa-sha2-nistp256@openssh.com",
    "sk-ssh-ed25519@openssh.com",
];

const CERT_SUFFIX: &str = "-cert-v01@openssh.com";

/// Whether `token` is a recognized key algorithm, including certificate forms.
pub fn is_key_type(token: &str) -> bool {
    if KEY_TYPES.contains(&token) {
        return true;
    }
    // sk-ssh-ed25519@openssh.com -> sk-ssh-ed25519-cert-v01@openssh.com
    token.strip_suffix(CERT_SUFFIX).is_some_and(|base| {
        KEY_TYPES
            .iter()
            .any(|t| t.strip_suffix("@openssh.com").unwrap_or(t) == base)
    })
}

/// One authorization entry.
///
/// Records are values: the builder methods consume the record and return a
/// new one. Two records describe "the same key" when their `content` is
/// equal; `==` compares every field including option order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyRecord {
    options: Vec<String>,
    key_type: String,
    content: String,
    comment: String,
}

impl KeyRecord {
    /// Create a record with no options and no comment.
    pub fn new(key_type: impl Into<String>, content: impl Into<String>) -> Result<Self> {
        let key_type = key_type.into();
        let content = content.into();

        if !is_key_type(&key_type) {
            return Err(Error::InvalidRecord(format!(
                "unrecognized key type '{key_type}'"
            )));
        }
        if content.is_empty() || content.chars().any(char::is_whitespace) {
            return Err(Error::InvalidRecord(
                "key content must be a non-empty token without whitespace".to_string(),
            ));
        }

        Ok(Self {
            options: Vec::new(),
            key_type,
            content,
            comment: String::new(),
        })
    }

    /// Build a record straight from parsed fields.
    pub(crate) fn from_parts(
        options: Vec<String>,
        key_type: String,
        content: String,
        comment: String,
    ) -> Self {
        Self {
            options,
            key_type,
            content,
            comment,
        }
    }

    /// Replace the options.
    ///
    /// `name=value` options whose value holds a comma or whitespace are
    /// quoted, so `command=echo hi` becomes `command="echo hi"`.
    pub fn with_options<I, S>(mut self, options: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.options = options
            .into_iter()
            .map(|o| normalize_option(o.as_ref()))
            .collect::<Result<_>>()?;
        Ok(self)
    }

    /// Drop all options.
    pub fn without_options(mut self) -> Self {
        self.options.clear();
        self
    }

    /// Replace the comment. Surrounding whitespace is trimmed.
    pub fn with_comment(mut self, comment: impl AsRef<str>) -> Result<Self> {
        let comment = comment.as_ref();
        if comment.contains(['\n', '\r']) {
            return Err(Error::InvalidRecord(
                "comment must not contain a line break".to_string(),
            ));
        }
        self.comment = comment.trim().to_string();
        Ok(self)
    }

    /// Options in file order.
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Key algorithm identifier.
    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    /// Base64 key blob.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Trailing comment, empty if none.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Whether `other` holds the same key blob.
    pub fn same_key(&self, other: &Self) -> bool {
        self.content == other.content
    }
}

impl fmt::Display for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::file::writer::record_line(self))
    }
}

/// Validate one option and quote its value when needed.
fn normalize_option(option: &str) -> Result<String> {
    let option = option.trim();
    if option.is_empty() {
        return Err(Error::InvalidRecord("empty option".to_string()));
    }
    if option.contains(['\n', '\r']) {
        return Err(Error::InvalidRecord(format!(
            "option '{option}' contains a line break"
        )));
    }
    if is_key_type(option) {
        return Err(Error::InvalidRecord(format!(
            "option '{option}' would be read back as a key type"
        )));
    }

    let normalized = quote_option(option).into_owned();

    // The option must survive the tokenizer as a single token.
    match split_options(&normalized) {
        Some(tokens) if tokens.len() == 1 && is_quoted_whitespace_only(&normalized) => {
            Ok(normalized)
        }
        _ => Err(Error::InvalidRecord(format!(
            "option '{option}' is not a single well-formed option"
        ))),
    }
}

/// Whitespace in `option` only appears inside a quoted value.
fn is_quoted_whitespace_only(option: &str) -> bool {
    let mut quoted = false;
    let mut escaped = false;
    for c in option.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => return false,
            _ => {}
        }
    }
    true
}
