//! Desktop UI automation through accessibility APIs
//!
//! This crate resolves declarative, chainable selector expressions into
//! concrete nodes of a live, externally-owned accessibility tree, inspired by
//! Playwright's web automation model. The platform backend is consumed purely
//! through the [`AccessibilityBackend`] capability trait; resolution,
//! expectations and tree snapshotting are platform-agnostic.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

pub mod backend;
pub mod element;
pub mod errors;
pub mod locator;
mod resolve;
pub mod selector;
pub mod tree;
pub mod wire;

pub use backend::{AccessibilityBackend, AttributeValue, ElementRef};
pub use element::{UIElement, UIElementAttributes};
pub use errors::{AutomationError, SelectorParseError};
pub use locator::Locator;
pub use resolve::{DEFAULT_TIMEOUT, POLL_INTERVAL};
pub use selector::{NameMatch, Selector};
pub use tree::{build_tree, PropertyLoadingMode, TreeBuildConfig, UINode};

/// The main entry point for UI automation.
///
/// Wraps an injected backend capability plus a cancellation token that every
/// polling loop observes; cancelling it stops in-flight resolutions and
/// expectations within one poll interval.
#[derive(Clone)]
pub struct Desktop {
    backend: Arc<dyn AccessibilityBackend>,
    cancel: CancellationToken,
}

impl Desktop {
    pub fn new(backend: Arc<dyn AccessibilityBackend>) -> Self {
        info!("initializing desktop automation engine");
        Self {
            backend,
            cancel: CancellationToken::new(),
        }
    }

    /// The desktop root element.
    pub async fn root(&self) -> Result<UIElement, AutomationError> {
        UIElement::from_ref(self.backend.clone(), self.backend.root()).await
    }

    /// Create a locator whose first chain segment scopes to the desktop root.
    #[instrument(level = "debug", skip(self, selector))]
    pub fn locator(&self, selector: Selector) -> Locator {
        debug!(%selector, "creating locator");
        Locator::new(
            self.backend.clone(),
            self.backend.root(),
            selector,
            self.cancel.clone(),
        )
    }

    /// Materialize a bounded snapshot of the subtree rooted at `root`.
    #[instrument(level = "debug", skip(self, root, config))]
    pub async fn build_tree(
        &self,
        root: &UIElement,
        config: &TreeBuildConfig,
    ) -> Result<UINode, AutomationError> {
        let start = Instant::now();
        let node = tree::build_tree(root, config).await?;
        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            nodes = node.len(),
            "tree snapshot built"
        );
        Ok(node)
    }

    /// The token observed by every polling loop created from this desktop.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
