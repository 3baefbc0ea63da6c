//! Client input tokens forwarded to the supervised program.

use std::fmt::{Display, Formatter};

use crate::{AppError, Result};

/// A syntactically valid input token: an integer, whitespace-trimmed.
///
/// The supervised program reads one integer per line (`-99` stops it early,
/// `0` means "not interested"); the server checks only that the token is an
/// integer and never interprets its meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputToken(String);

impl InputToken {
    /// Validate raw client input.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` unless the input is an optional sign
    /// followed by ASCII digits. Magnitude is not limited.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if !is_integer_literal(trimmed) {
            return Err(AppError::Validation(format!(
                "input must be an integer, got {raw:?}"
            )));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Token text as it will be written to the process.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Optional `+`/`-` followed by at least one ASCII digit.
fn is_integer_literal(text: &str) -> bool {
    let digits = text.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

impl Display for InputToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
