//! # Event argument bundle.
//!
//! [`Args`] is the payload carried by every [`Event`](crate::Event) and
//! stored by timers. It is a closed tagged variant over the argument shapes
//! the runtime actually uses, with the full capability set events require:
//! deep copy (`Clone`), equality (`PartialEq`), rendering (`Display`), and
//! release (`Drop`).

use std::fmt;

/// Payload attached to an event.
///
/// Timers deep-copy their bundle at creation and again at every firing, so
/// a recurring timer hands each synthesized event an independent payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Args {
    /// No payload.
    #[default]
    Empty,
    /// A single line of text, e.g. raw user input or an agent utterance.
    Text(String),
}

impl Args {
    /// Creates a text payload.
    pub fn text(s: impl Into<String>) -> Self {
        Args::Text(s.into())
    }

    /// Returns true when the bundle carries no payload.
    pub fn is_empty(&self) -> bool {
        matches!(self, Args::Empty)
    }

    /// Returns the text payload, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Args::Empty => None,
            Args::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Args::Empty => Ok(()),
            Args::Text(s) => f.write_str(s),
        }
    }
}

impl From<String> for Args {
    fn from(s: String) -> Self {
        Args::Text(s)
    }
}

impl From<&str> for Args {
    fn from(s: &str) -> Self {
        Args::Text(s.to_string())
    }
}
