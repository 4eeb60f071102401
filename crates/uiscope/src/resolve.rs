//! The resolution engine: executes a selector chain against the live tree.
//!
//! Each chain segment narrows the search scope to the descendants of the
//! previous segment's match. A segment with zero matches is retried at the
//! poll interval until the deadline, then surfaced as `ElementNotFound` with
//! the deepest chain depth reached, which is what makes multi-segment chains
//! diagnosable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{attrs, all_children, AccessibilityBackend, ElementRef};
use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::selector::{NameMatch, Selector};

/// Engine-wide default timeout when a locator specifies none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sleep between retry iterations of an unresolved segment.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Child enumeration batch size during resolution.
const CHILD_BATCH: usize = 50;

/// Search depth cap per segment. Chains scope searches, so one segment rarely
/// needs to see more than a handful of levels; the cap keeps a pathological
/// backend from pinning the resolver.
const MAX_SEARCH_DEPTH: usize = 64;

pub(crate) struct Resolver<'a> {
    backend: &'a Arc<dyn AccessibilityBackend>,
    cancel: &'a CancellationToken,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(
        backend: &'a Arc<dyn AccessibilityBackend>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self { backend, cancel }
    }

    /// Resolve the chain to its first match.
    pub(crate) async fn resolve_first(
        &self,
        root: ElementRef,
        chain: &[Selector],
        timeout: Duration,
    ) -> Result<UIElement, AutomationError> {
        let matches = self.resolve(root, chain, timeout, true).await?;
        // resolve() with first_only returns exactly one element on success.
        let raw = matches.into_iter().next().ok_or_else(|| {
            AutomationError::Backend("resolution returned an empty match set".to_string())
        })?;
        UIElement::from_ref(self.backend.clone(), raw).await
    }

    /// Resolve the chain to every match of the terminal segment, in backend
    /// enumeration order.
    pub(crate) async fn resolve_all(
        &self,
        root: ElementRef,
        chain: &[Selector],
        timeout: Duration,
    ) -> Result<Vec<UIElement>, AutomationError> {
        let matches = self.resolve(root, chain, timeout, false).await?;
        let mut out = Vec::with_capacity(matches.len());
        for raw in matches {
            out.push(UIElement::from_ref(self.backend.clone(), raw).await?);
        }
        Ok(out)
    }

    async fn resolve(
        &self,
        root: ElementRef,
        chain: &[Selector],
        timeout: Duration,
        first_only: bool,
    ) -> Result<Vec<ElementRef>, AutomationError> {
        if chain.is_empty() {
            return Err(AutomationError::InvalidArgument(
                "cannot resolve an empty selector chain".to_string(),
            ));
        }

        let start = Instant::now();
        let mut scope = root;
        for (depth, selector) in chain.iter().enumerate() {
            let is_last = depth == chain.len() - 1;
            debug!(segment = %selector, depth, "resolving chain segment");

            loop {
                let matches = self
                    .collect_matches(scope, selector, if is_last && !first_only { None } else { Some(1) })
                    .await?;

                if let Some(first) = matches.first() {
                    if is_last {
                        return Ok(if first_only { vec![*first] } else { matches });
                    }
                    // Adopt the first match, in the backend's native stable
                    // order, as the new scope. Repeated resolution against an
                    // unchanged tree therefore picks the same candidate.
                    scope = *first;
                    break;
                }

                if start.elapsed() >= timeout {
                    return Err(AutomationError::ElementNotFound {
                        selector: selector.clone(),
                        depth_reached: depth,
                        chain_len: chain.len(),
                        elapsed: start.elapsed(),
                    });
                }
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return Err(AutomationError::Timeout {
                            operation: format!("resolution of `{selector}` (cancelled)"),
                            elapsed: start.elapsed(),
                            last_observed: None,
                        });
                    }
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                }
            }
        }
        unreachable!("the terminal chain segment always returns")
    }

    /// Depth-first match collection within `scope`, in backend enumeration
    /// order. `limit` short-circuits the walk once enough matches are found.
    async fn collect_matches(
        &self,
        scope: ElementRef,
        selector: &Selector,
        limit: Option<usize>,
    ) -> Result<Vec<ElementRef>, AutomationError> {
        // Index selects among the scope's direct children, not descendants.
        if let Selector::Index(n) = selector {
            let children = all_children(self.backend.as_ref(), &scope, CHILD_BATCH).await?;
            return Ok(children.get(*n).map(|r| vec![*r]).unwrap_or_default());
        }

        let mut matches = Vec::new();
        self.search(scope, selector, limit, 0, &mut matches).await?;
        Ok(matches)
    }

    async fn search(
        &self,
        node: ElementRef,
        selector: &Selector,
        limit: Option<usize>,
        depth: usize,
        matches: &mut Vec<ElementRef>,
    ) -> Result<(), AutomationError> {
        if depth >= MAX_SEARCH_DEPTH {
            return Ok(());
        }
        let children = all_children(self.backend.as_ref(), &node, CHILD_BATCH).await?;
        for child in children {
            if limit.is_some_and(|l| matches.len() >= l) {
                return Ok(());
            }
            if self.matches(&child, selector).await? {
                matches.push(child);
                if limit.is_some_and(|l| matches.len() >= l) {
                    return Ok(());
                }
            }
            Box::pin(self.search(child, selector, limit, depth + 1, matches)).await?;
        }
        Ok(())
    }

    /// Whether one element satisfies one selector. Read-only.
    async fn matches(
        &self,
        element: &ElementRef,
        selector: &Selector,
    ) -> Result<bool, AutomationError> {
        match selector {
            Selector::Role(role) => {
                let actual = self.read_str(element, attrs::ROLE).await?;
                Ok(actual.eq_ignore_ascii_case(role)
                    || actual.to_lowercase().contains(&role.to_lowercase()))
            }
            Selector::Name { value, match_kind } => {
                let actual = self.read_str(element, attrs::NAME).await?;
                Ok(match match_kind {
                    NameMatch::Exact => actual.eq_ignore_ascii_case(value),
                    NameMatch::Contains => {
                        actual.to_lowercase().contains(&value.to_lowercase())
                    }
                })
            }
            Selector::Id(id) => {
                let actual = self.read_str(element, attrs::ID).await?;
                Ok(!actual.is_empty() && actual == *id)
            }
            Selector::Text(text) => {
                let name = self.read_str(element, attrs::NAME).await?;
                let value = self.read_str(element, attrs::VALUE).await?;
                let needle = text.to_lowercase();
                Ok(name.to_lowercase().contains(&needle)
                    || value.to_lowercase().contains(&needle))
            }
            Selector::WindowTitle(title) => {
                let role = self.read_str(element, attrs::ROLE).await?;
                if !is_window_role(&role) {
                    return Ok(false);
                }
                let name = self.read_str(element, attrs::NAME).await?;
                Ok(name.to_lowercase().contains(&title.to_lowercase()))
            }
            // Handled in collect_matches; an Index nested inside a Composite
            // has no positional meaning.
            Selector::Index(_) => Ok(false),
            Selector::Composite(parts) => {
                for part in parts {
                    if !Box::pin(self.matches(element, part)).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    async fn read_str(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<String, AutomationError> {
        Ok(self
            .backend
            .read_attribute(element, name)
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}

fn is_window_role(role: &str) -> bool {
    let role = role.to_lowercase();
    role.contains("window") || role.contains("pane") || role.contains("frame")
}
