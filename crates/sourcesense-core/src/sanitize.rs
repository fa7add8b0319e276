//! Text sanitization for encodable output
//!
//! Characters outside the safe set of the target encoding are replaced by
//! [`PLACEHOLDER`]. Sanitization never fails.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Replacement for characters that cannot be safely encoded
pub const PLACEHOLDER: char = '?';

/// Target text encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Valid UTF-8 without control characters or decode-replacement marks
    #[default]
    Utf8,

    /// Printable ASCII plus tab and newlines
    Ascii,
}

impl Encoding {
    pub fn is_safe(&self, c: char) -> bool {
        if matches!(c, '\t' | '\n' | '\r') {
            return true;
        }
        match self {
            Self::Ascii => c.is_ascii() && !c.is_ascii_control(),
            Self::Utf8 => !c.is_control() && c != char::REPLACEMENT_CHARACTER && !is_noncharacter(c),
        }
    }
}

/// Sanitized text and the number of replaced characters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized<'a> {
    pub text: Cow<'a, str>,
    pub replaced: usize,
}

impl Sanitized<'_> {
    pub fn is_clean(&self) -> bool {
        self.replaced == 0
    }
}

/// Replace every character unsafe for `encoding` with [`PLACEHOLDER`]
pub fn sanitize_text(text: &str, encoding: Encoding) -> Sanitized<'_> {
    if text.chars().all(|c| encoding.is_safe(c)) {
        return Sanitized {
            text: Cow::Borrowed(text),
            replaced: 0,
        };
    }

    let mut replaced = 0;
    let cleaned = text
        .chars()
        .map(|c| {
            if encoding.is_safe(c) {
                c
            } else {
                replaced += 1;
                PLACEHOLDER
            }
        })
        .collect();

    Sanitized {
        text: Cow::Owned(cleaned),
        replaced,
    }
}

fn is_noncharacter(c: char) -> bool {
    let cp = c as u32;
    (0xFDD0..=0xFDEF).contains(&cp) || (cp & 0xFFFE) == 0xFFFE
}
