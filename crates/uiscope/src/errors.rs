use std::time::Duration;

use crate::selector::Selector;

/// Malformed selector syntax. Pure parse failures are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorParseError {
    #[error("unknown selector kind '{kind}'")]
    UnknownKind { kind: String },

    #[error("selector kind '{kind}' requires a non-empty value")]
    EmptyValue { kind: String },

    #[error("selector '{input}' is missing a ':' between kind and value")]
    MissingColon { input: String },

    #[error("selector index '{value}' is not a valid non-negative integer")]
    InvalidIndex { value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error(transparent)]
    InvalidSelector(#[from] SelectorParseError),

    /// A chain segment stayed unresolved for the whole timeout.
    ///
    /// `depth_reached` counts the segments that did resolve, so a failure on
    /// the third segment of a four-segment chain reports `depth_reached == 2`.
    #[error(
        "no element matched `{selector}` after {elapsed:?} \
         (resolved {depth_reached} of {chain_len} chain segments)"
    )]
    ElementNotFound {
        selector: Selector,
        depth_reached: usize,
        chain_len: usize,
        elapsed: Duration,
    },

    /// An expectation predicate was never satisfied within its timeout.
    ///
    /// `last_observed` carries the last predicate state that was seen (e.g.
    /// the last text read), which is what makes a flaky wait diagnosable.
    #[error("timed out after {elapsed:?} {operation}{}", format_last_observed(.last_observed))]
    Timeout {
        operation: String,
        elapsed: Duration,
        last_observed: Option<String>,
    },

    /// The backend reference no longer points at a live element. Never retried.
    #[error("stale element handle: {0}")]
    StaleHandle(String),

    /// Opaque platform failure, surfaced as-is. Callers may retry at a higher
    /// level; the engine does not.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

fn format_last_observed(last: &Option<String>) -> String {
    match last {
        Some(state) => format!(" (last observed: {state})"),
        None => String::new(),
    }
}

impl AutomationError {
    /// Whether a polling loop may swallow this error and try again.
    ///
    /// Parse and stale-handle failures are permanent; retrying them would only
    /// hide a caller bug.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AutomationError::ElementNotFound { .. } | AutomationError::Backend(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_selector_and_depth() {
        let err = AutomationError::ElementNotFound {
            selector: Selector::parse("name:Equals").unwrap(),
            depth_reached: 1,
            chain_len: 2,
            elapsed: Duration::from_secs(3),
        };
        let msg = err.to_string();
        assert!(msg.contains("name:Equals"), "message was: {msg}");
        assert!(msg.contains("1 of 2"), "message was: {msg}");
    }

    #[test]
    fn timeout_message_includes_last_observed_state() {
        let err = AutomationError::Timeout {
            operation: "waiting for text to equal '4'".to_string(),
            elapsed: Duration::from_secs(5),
            last_observed: Some("text was '3'".to_string()),
        };
        assert!(err.to_string().contains("text was '3'"));
    }

    #[test]
    fn transient_classification() {
        assert!(AutomationError::Backend("com glitch".into()).is_transient());
        assert!(!AutomationError::StaleHandle("gone".into()).is_transient());
        assert!(!AutomationError::InvalidSelector(SelectorParseError::UnknownKind {
            kind: "xpath".into()
        })
        .is_transient());
    }
}
