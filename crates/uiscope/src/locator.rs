//! Chainable locators and the expectation engine.
//!
//! A [`Locator`] is an immutable value: `locator(..)` and `timeout(..)` return
//! new instances and never mutate the receiver, so locators can be shared and
//! specialized freely across call sites.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::backend::{AccessibilityBackend, ElementRef};
use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::resolve::{Resolver, DEFAULT_TIMEOUT, POLL_INTERVAL};
use crate::selector::Selector;

/// Per-iteration resolution budget inside expectation polls. Each iteration
/// re-resolves the whole chain, so the budget stays short; the outer loop owns
/// the real deadline.
const EXPECT_ATTEMPT_BUDGET: Duration = Duration::from_millis(100);

/// An immutable, chainable reference to a not-yet-resolved UI element.
#[derive(Clone)]
pub struct Locator {
    backend: Arc<dyn AccessibilityBackend>,
    root: ElementRef,
    chain: Vec<Selector>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locator")
            .field("chain", &self.render_chain())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Locator {
    pub(crate) fn new(
        backend: Arc<dyn AccessibilityBackend>,
        root: ElementRef,
        selector: Selector,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            root,
            chain: vec![selector],
            timeout: DEFAULT_TIMEOUT,
            cancel,
        }
    }

    /// A locator rooted at an already-resolved element's subtree.
    pub(crate) fn scoped(
        backend: Arc<dyn AccessibilityBackend>,
        root: ElementRef,
        selector: Selector,
    ) -> Self {
        Self::new(backend, root, selector, CancellationToken::new())
    }

    /// Append a segment to the chain, returning a new locator. The parent's
    /// timeout is inherited; the parent itself is untouched.
    pub fn locator(&self, selector: Selector) -> Locator {
        let mut chain = self.chain.clone();
        chain.push(selector);
        Locator {
            backend: self.backend.clone(),
            root: self.root,
            chain,
            timeout: self.timeout,
            cancel: self.cancel.clone(),
        }
    }

    /// Return a new locator with the given default timeout.
    pub fn timeout(&self, timeout: Duration) -> Locator {
        Locator {
            backend: self.backend.clone(),
            root: self.root,
            chain: self.chain.clone(),
            timeout,
            cancel: self.cancel.clone(),
        }
    }

    /// The selector chain in canonical textual form.
    pub fn render_chain(&self) -> Vec<String> {
        self.chain.iter().map(|s| s.to_string()).collect()
    }

    /// Resolve to the first match of the terminal segment.
    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn first(&self, timeout: Option<Duration>) -> Result<UIElement, AutomationError> {
        let effective = timeout.unwrap_or(self.timeout);
        debug!(chain = ?self.render_chain(), ?effective, "resolving first match");
        self.resolver()
            .resolve_first(self.root, &self.chain, effective)
            .await
    }

    /// Resolve to every match of the terminal segment, in backend order.
    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn all(&self, timeout: Option<Duration>) -> Result<Vec<UIElement>, AutomationError> {
        let effective = timeout.unwrap_or(self.timeout);
        debug!(chain = ?self.render_chain(), ?effective, "resolving all matches");
        self.resolver()
            .resolve_all(self.root, &self.chain, effective)
            .await
    }

    // --- Convenience pass-through actions ---

    /// Resolve the first match and click it.
    pub async fn click(&self, timeout: Option<Duration>) -> Result<(), AutomationError> {
        self.first(timeout).await?.click().await
    }

    /// Resolve the first match and type text into it.
    pub async fn type_text(
        &self,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<(), AutomationError> {
        self.first(timeout).await?.type_text(text).await
    }

    /// Resolve the first match and press a key on it.
    pub async fn press_key(
        &self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<(), AutomationError> {
        self.first(timeout).await?.press_key(key).await
    }

    /// Resolve the first match and read its text content.
    pub async fn text(
        &self,
        max_depth: usize,
        timeout: Option<Duration>,
    ) -> Result<String, AutomationError> {
        self.first(timeout).await?.text(max_depth).await
    }

    // --- Expectation engine ---

    /// Wait until the matched element reports visible.
    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn expect_visible(
        &self,
        timeout: Option<Duration>,
    ) -> Result<UIElement, AutomationError> {
        self.expect("waiting for element to be visible", timeout, |element| async move {
            let visible = element.is_visible().await?;
            Ok(if visible {
                PredicateOutcome::Satisfied
            } else {
                PredicateOutcome::Unsatisfied("element is not visible".to_string())
            })
        })
        .await
    }

    /// Wait until the matched element reports enabled.
    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn expect_enabled(
        &self,
        timeout: Option<Duration>,
    ) -> Result<UIElement, AutomationError> {
        self.expect("waiting for element to be enabled", timeout, |element| async move {
            let enabled = element.is_enabled().await?;
            Ok(if enabled {
                PredicateOutcome::Satisfied
            } else {
                PredicateOutcome::Unsatisfied("element is not enabled".to_string())
            })
        })
        .await
    }

    /// Wait until the matched element's text equals `expected`.
    ///
    /// The comparison is exact and case-sensitive after normalizing line
    /// endings (`\r\n` and `\r` become `\n`) on both sides.
    #[instrument(level = "debug", skip(self, expected, timeout))]
    pub async fn expect_text_equals(
        &self,
        expected: &str,
        max_depth: usize,
        timeout: Option<Duration>,
    ) -> Result<UIElement, AutomationError> {
        let expected = normalize_line_endings(expected);
        let operation = format!("waiting for text to equal '{expected}'");
        self.expect(&operation, timeout, move |element| {
            let expected = expected.clone();
            async move {
                let actual = normalize_line_endings(&element.text(max_depth).await?);
                Ok(if actual == expected {
                    PredicateOutcome::Satisfied
                } else {
                    PredicateOutcome::Unsatisfied(format!("text was '{actual}'"))
                })
            }
        })
        .await
    }

    /// Poll a predicate through the resolution engine until satisfied.
    ///
    /// Every iteration redoes the whole resolve-then-check, because the target
    /// may disappear and reappear between polls. Transient failures
    /// (not-found, opaque backend errors) are swallowed and retried; parse and
    /// stale-handle failures propagate immediately.
    async fn expect<F, Fut>(
        &self,
        operation: &str,
        timeout: Option<Duration>,
        predicate: F,
    ) -> Result<UIElement, AutomationError>
    where
        F: Fn(UIElement) -> Fut,
        Fut: std::future::Future<Output = Result<PredicateOutcome, AutomationError>>,
    {
        let effective = timeout.unwrap_or(self.timeout);
        let start = Instant::now();
        let mut last_observed: Option<String> = None;

        loop {
            let attempt = self
                .resolver()
                .resolve_first(self.root, &self.chain, EXPECT_ATTEMPT_BUDGET)
                .await;
            match attempt {
                Ok(element) => match predicate(element.clone()).await {
                    Ok(PredicateOutcome::Satisfied) => return Ok(element),
                    Ok(PredicateOutcome::Unsatisfied(state)) => {
                        last_observed = Some(state);
                    }
                    Err(e) if e.is_transient() => {
                        last_observed = Some(e.to_string());
                    }
                    Err(e) => return Err(e),
                },
                Err(e) if e.is_transient() => {
                    last_observed.get_or_insert_with(|| "element not found".to_string());
                }
                Err(e) => return Err(e),
            }

            if start.elapsed() >= effective {
                return Err(AutomationError::Timeout {
                    operation: operation.to_string(),
                    elapsed: start.elapsed(),
                    last_observed,
                });
            }
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(AutomationError::Timeout {
                        operation: format!("{operation} (cancelled)"),
                        elapsed: start.elapsed(),
                        last_observed,
                    });
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.backend, &self.cancel)
    }
}

enum PredicateOutcome {
    Satisfied,
    /// Carries a description of the last observed state for the timeout error.
    Unsatisfied(String),
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
