//! Typed selector predicates and the `<kind>:<value>` parser.
//!
//! Parsing is pure: it never touches the accessibility backend, and a
//! malformed selector fails immediately with [`SelectorParseError`] instead of
//! being retried.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SelectorParseError;

/// How a [`Selector::Name`] value is compared against an element's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NameMatch {
    /// Case-insensitive equality.
    Exact,
    /// Case-insensitive substring match.
    Contains,
}

/// A single typed match predicate over UI elements.
///
/// Selectors are cheap, immutable values; chains of them are held by
/// [`crate::Locator`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    /// Match by control role, e.g. `role:button`.
    Role(String),
    /// Match by accessible name, e.g. `name:Save` or `name-exact:Save`.
    Name { value: String, match_kind: NameMatch },
    /// Match by the backend's stable identifier, e.g. `id:submit-btn`.
    Id(String),
    /// Match by readable text content, e.g. `text:Welcome`.
    Text(String),
    /// Match a window by title, e.g. `window:Calculator`.
    WindowTitle(String),
    /// Match the n-th direct child of the current scope, e.g. `index:2`.
    Index(usize),
    /// All terms must match the same element, e.g. `role:button && name:OK`.
    Composite(Vec<Selector>),
}

const COMPOSITE_SEPARATOR: &str = "&&";

impl Selector {
    /// Parse a selector expression of the form `<kind>:<value>`.
    ///
    /// Multiple terms joined by `&&` form a [`Selector::Composite`] which
    /// requires every term to match the same element.
    pub fn parse(input: &str) -> Result<Selector, SelectorParseError> {
        let terms: Vec<&str> = input.split(COMPOSITE_SEPARATOR).collect();
        if terms.len() > 1 {
            let parsed = terms
                .into_iter()
                .map(|t| Self::parse_term(t.trim()))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Selector::Composite(parsed));
        }
        Self::parse_term(input.trim())
    }

    fn parse_term(term: &str) -> Result<Selector, SelectorParseError> {
        let (kind, value) = term.split_once(':').ok_or_else(|| {
            SelectorParseError::MissingColon {
                input: term.to_string(),
            }
        })?;

        let kind = kind.trim();
        let value = value.trim();
        if value.is_empty() {
            return Err(SelectorParseError::EmptyValue {
                kind: kind.to_string(),
            });
        }

        match kind.to_ascii_lowercase().as_str() {
            "role" => Ok(Selector::Role(value.to_string())),
            "name" => Ok(Selector::Name {
                value: value.to_string(),
                match_kind: NameMatch::Contains,
            }),
            "name-exact" => Ok(Selector::Name {
                value: value.to_string(),
                match_kind: NameMatch::Exact,
            }),
            // `nativeid` is the historical alias used by older callers.
            "id" | "nativeid" => Ok(Selector::Id(value.to_string())),
            "text" => Ok(Selector::Text(value.to_string())),
            "window" => Ok(Selector::WindowTitle(value.to_string())),
            "index" => value
                .parse::<usize>()
                .map(Selector::Index)
                .map_err(|_| SelectorParseError::InvalidIndex {
                    value: value.to_string(),
                }),
            other => Err(SelectorParseError::UnknownKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// Renders the canonical textual form, so that `parse(render(parse(s)))`
/// round-trips to an equal selector.
impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Role(role) => write!(f, "role:{role}"),
            Selector::Name {
                value,
                match_kind: NameMatch::Contains,
            } => write!(f, "name:{value}"),
            Selector::Name {
                value,
                match_kind: NameMatch::Exact,
            } => write!(f, "name-exact:{value}"),
            Selector::Id(id) => write!(f, "id:{id}"),
            Selector::Text(text) => write!(f, "text:{text}"),
            Selector::WindowTitle(title) => write!(f, "window:{title}"),
            Selector::Index(n) => write!(f, "index:{n}"),
            Selector::Composite(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", rendered.join(" && "))
            }
        }
    }
}

impl FromStr for Selector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}
