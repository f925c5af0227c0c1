//! Classification of raw SMTP response payloads.
//!
//! The classifier never looks at connection state: it only inspects the text
//! a server sent back, so the same payload always yields the same verdict.

use std::fmt;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

/// Coarse verdict for a single SMTP response.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Accept,
    Reject,
    Undetermined,
}

/// A status code and the verdict it maps to when found at the start of the
/// payload or at the start of any later line.
struct Rule {
    code: u16,
    prefix: &'static str,
    verdict: Classification,
}

// Order matters: acceptance codes win over a 550 further down the payload.
const RULES: &[Rule] = &[
    Rule {
        code: 220,
        prefix: "220",
        verdict: Classification::Accept,
    },
    Rule {
        code: 250,
        prefix: "250",
        verdict: Classification::Accept,
    },
    Rule {
        code: 550,
        prefix: "550",
        verdict: Classification::Reject,
    },
];

/// Maps a raw response to [`Classification`].
///
/// A code counts when the payload starts with it or when it follows a `\n`
/// anywhere in the payload, which covers multi-line replies. Everything else,
/// greylisting (`450`), unexpected codes and empty payloads included, is
/// [`Classification::Undetermined`].
pub fn classify(raw: &str) -> Classification {
    matching_rule(raw)
        .map(|rule| rule.verdict)
        .unwrap_or(Classification::Undetermined)
}

fn matching_rule(raw: &str) -> Option<&'static Rule> {
    RULES.iter().find(|rule| {
        raw.starts_with(rule.prefix) || raw.contains(&format!("\n{}", rule.prefix))
    })
}

/// Extracts the leading three-digit status code of a payload, if any.
pub fn reply_code(raw: &str) -> Option<u16> {
    let head = raw.trim_start().get(..3)?;
    if head.bytes().all(|b| b.is_ascii_digit()) {
        head.parse().ok()
    } else {
        None
    }
}

/// Tagged outcome of one SMTP command, keeping the raw text for diagnostics.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Accept,
    Reject { code: u16, raw: String },
    Undetermined { raw: String },
}

impl ProbeOutcome {
    pub fn from_response(raw: &str) -> Self {
        match matching_rule(raw) {
            Some(rule) if rule.verdict == Classification::Accept => Self::Accept,
            Some(rule) => Self::Reject {
                code: rule.code,
                raw: raw.to_string(),
            },
            None => Self::Undetermined {
                raw: raw.to_string(),
            },
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }

    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::Accept => None,
            Self::Reject { raw, .. } | Self::Undetermined { raw } => Some(raw.as_str()),
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => f.write_str("accept"),
            Self::Reject { code, raw } => write!(f, "reject {code} ({})", raw.trim_end()),
            Self::Undetermined { raw } => write!(f, "undetermined ({})", raw.trim_end()),
        }
    }
}
