//! Bounded snapshotting of a live subtree.
//!
//! The builder walks depth-first (predictable peak memory on deep trees),
//! bounds every individual backend call with `timeout_per_operation`, fetches
//! children in batches, yields cooperatively on large trees and guards against
//! cyclic or shared backend links with a visited-set keyed on backend-native
//! identity. Partial data beats total failure: only an unreadable root is
//! fatal.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::backend::{attrs, AccessibilityBackend, AttributeValue, ElementRef};
use crate::element::{UIElement, UIElementAttributes};
use crate::errors::AutomationError;

/// Defines how much element property data to load per node.
///
/// The labels are part of the wire contract and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyLoadingMode {
    /// Only role + name. Fastest.
    Fast,
    /// Every known attribute, including bounds, keyboard focusability,
    /// description and platform extras. Slower but comprehensive.
    Complete,
    /// Complete for leaf/content roles, Fast for container roles.
    Smart,
}

/// Tunable parameters for the completeness/latency trade-off when
/// materializing a subtree snapshot.
///
/// `timeout_per_operation` bounds one backend call, never the traversal as a
/// whole; the traversal has no implicit global deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeBuildConfig {
    pub property_mode: PropertyLoadingMode,
    pub timeout_per_operation: Duration,
    pub yield_every_n_elements: usize,
    pub batch_size: usize,
}

impl Default for TreeBuildConfig {
    fn default() -> Self {
        Self {
            property_mode: PropertyLoadingMode::Smart,
            timeout_per_operation: Duration::from_millis(50),
            yield_every_n_elements: 50,
            batch_size: 50,
        }
    }
}

/// One node of a materialized snapshot.
///
/// Snapshots are immutable values, never re-synced with live state. `id` is a
/// preorder index within this snapshot and `parent` is a lookup-only
/// back-reference to it; every node has exactly one parent except the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UINode {
    pub id: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
    pub attributes: UIElementAttributes,
    pub children: Vec<UINode>,
}

impl UINode {
    /// Total node count of this subtree, root included.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(UINode::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Depth-first iterator over this subtree.
    pub fn iter(&self) -> impl Iterator<Item = &UINode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// Look up the parent of a node in this snapshot by its id.
    pub fn parent_of(&self, id: usize) -> Option<&UINode> {
        let parent_id = self.iter().find(|n| n.id == id)?.parent?;
        self.iter().find(|n| n.id == parent_id)
    }
}

/// Materialize a snapshot of the subtree rooted at `root`.
///
/// Fails only if the root itself cannot be read; deeper failures degrade to
/// missing fields or skipped subtrees.
#[instrument(level = "debug", skip(root, config), fields(root = %root.raw()))]
pub async fn build_tree(
    root: &UIElement,
    config: &TreeBuildConfig,
) -> Result<UINode, AutomationError> {
    let mut builder = TreeBuilder {
        backend: root.backend().clone(),
        config,
        visited: HashSet::new(),
        visited_count: 0,
        next_id: 0,
    };

    // The root read is the one fatal path: a stale handle here means there is
    // nothing to snapshot.
    let root_attrs = builder.read_attributes(&root.raw()).await?;
    let node = builder.build_node(root.raw(), root_attrs, None).await?;
    debug!(nodes = node.len(), "tree snapshot complete");
    Ok(node)
}

struct TreeBuilder<'a> {
    backend: Arc<dyn AccessibilityBackend>,
    config: &'a TreeBuildConfig,
    visited: HashSet<ElementRef>,
    visited_count: usize,
    next_id: usize,
}

impl TreeBuilder<'_> {
    async fn build_node(
        &mut self,
        raw: ElementRef,
        attributes: UIElementAttributes,
        parent: Option<usize>,
    ) -> Result<UINode, AutomationError> {
        let id = self.next_id;
        self.next_id += 1;
        self.visited.insert(raw);

        self.visited_count += 1;
        if self.visited_count % self.config.yield_every_n_elements.max(1) == 0 {
            // Responsiveness valve for very large trees: lets a concurrent
            // cancellation check interleave with an otherwise tight loop.
            tokio::task::yield_now().await;
        }

        let mut node = UINode {
            id,
            parent,
            attributes,
            children: Vec::new(),
        };

        let mut start = 0;
        loop {
            let batch = match self
                .bounded(self.backend.enumerate_children(&raw, start, self.config.batch_size))
                .await
            {
                Some(Ok(batch)) => batch,
                // A failed or timed-out enumeration ends this node's child
                // list; the snapshot keeps whatever was already gathered.
                Some(Err(e)) => {
                    warn!(element = %raw, error = %e, "child enumeration failed; truncating");
                    break;
                }
                None => {
                    warn!(element = %raw, "child enumeration timed out; truncating");
                    break;
                }
            };
            let exhausted = batch.len() < self.config.batch_size;
            start += batch.len();

            for child in batch {
                // Backends may report shared or self-referential links;
                // the visited-guard keeps the descent finite.
                if self.visited.contains(&child) {
                    continue;
                }
                let child_attrs = match self.read_attributes(&child).await {
                    Ok(a) => a,
                    Err(e) => {
                        warn!(element = %child, error = %e, "skipping unreadable child");
                        self.visited.insert(child);
                        continue;
                    }
                };
                let child_node =
                    Box::pin(self.build_node(child, child_attrs, Some(id))).await?;
                node.children.push(child_node);
            }

            if exhausted {
                break;
            }
        }

        Ok(node)
    }

    /// Read a node's attributes according to the configured property mode.
    async fn read_attributes(
        &self,
        raw: &ElementRef,
    ) -> Result<UIElementAttributes, AutomationError> {
        let role = self.required_str(raw, attrs::ROLE).await?;
        let name = self.optional_str(raw, attrs::NAME).await;

        let complete = match self.config.property_mode {
            PropertyLoadingMode::Fast => false,
            PropertyLoadingMode::Complete => true,
            PropertyLoadingMode::Smart => !is_container_role(&role),
        };

        let mut attributes = UIElementAttributes {
            role,
            name,
            ..Default::default()
        };
        if complete {
            attributes.value = self.optional_str(raw, attrs::VALUE).await;
            attributes.description = self.optional_str(raw, attrs::DESCRIPTION).await;
            attributes.bounds = self
                .optional_value(raw, attrs::BOUNDS)
                .await
                .and_then(|v| serde_json::from_value(v).ok());
            attributes.is_keyboard_focusable = self
                .optional_value(raw, attrs::IS_KEYBOARD_FOCUSABLE)
                .await
                .and_then(|v| v.as_bool());
        }
        Ok(attributes)
    }

    /// A read that distinguishes stale handles (fatal for the root, skip for
    /// children) from attribute absence.
    async fn required_str(
        &self,
        raw: &ElementRef,
        name: &str,
    ) -> Result<String, AutomationError> {
        match self.bounded(self.backend.read_attribute(raw, name)).await {
            Some(Ok(value)) => Ok(value.as_str().unwrap_or_default().to_string()),
            Some(Err(e)) => Err(e),
            None => Ok(String::new()),
        }
    }

    /// Best-effort read: timeouts, errors and unknowns all degrade to None.
    async fn optional_str(&self, raw: &ElementRef, name: &str) -> Option<String> {
        self.optional_value(raw, name).await?.as_str().map(str::to_string)
    }

    async fn optional_value(&self, raw: &ElementRef, name: &str) -> Option<serde_json::Value> {
        match self.bounded(self.backend.read_attribute(raw, name)).await {
            Some(Ok(AttributeValue::Value(v))) => Some(v),
            Some(Ok(AttributeValue::Unknown)) | Some(Err(_)) | None => None,
        }
    }

    /// Bound one backend call by `timeout_per_operation`. `None` means the
    /// call exceeded its budget and its result should be treated as unknown.
    async fn bounded<F, T>(&self, call: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.config.timeout_per_operation, call)
            .await
            .ok()
    }
}

/// Roles treated as containers by [`PropertyLoadingMode::Smart`]: structure,
/// not content, so the cheap property set suffices.
fn is_container_role(role: &str) -> bool {
    const CONTAINER_ROLES: &[&str] = &[
        "window", "pane", "group", "panel", "toolbar", "menubar", "tree", "list",
        "table", "tabcontrol", "scrollbar", "titlebar", "frame", "desktop",
    ];
    let role = role.to_lowercase();
    CONTAINER_ROLES.iter().any(|c| role == *c || role.contains(c))
}

/// Serde helper retained for callers that configure from JSON where the mode
/// arrives as a bare string.
impl std::str::FromStr for PropertyLoadingMode {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Fast" => Ok(PropertyLoadingMode::Fast),
            "Complete" => Ok(PropertyLoadingMode::Complete),
            "Smart" => Ok(PropertyLoadingMode::Smart),
            other => Err(AutomationError::InvalidArgument(format!(
                "unknown property loading mode '{other}' (expected Fast, Complete or Smart)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = TreeBuildConfig::default();
        assert_eq!(config.property_mode, PropertyLoadingMode::Smart);
        assert_eq!(config.timeout_per_operation, Duration::from_millis(50));
        assert_eq!(config.yield_every_n_elements, 50);
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn property_mode_labels_are_stable() {
        for (mode, label) in [
            (PropertyLoadingMode::Fast, "\"Fast\""),
            (PropertyLoadingMode::Complete, "\"Complete\""),
            (PropertyLoadingMode::Smart, "\"Smart\""),
        ] {
            assert_eq!(serde_json::to_string(&mode).unwrap(), label);
            assert_eq!(
                serde_json::from_str::<PropertyLoadingMode>(label).unwrap(),
                mode
            );
        }
    }

    #[test]
    fn smart_mode_role_classification() {
        assert!(is_container_role("Window"));
        assert!(is_container_role("pane"));
        assert!(!is_container_role("Button"));
        assert!(!is_container_role("Edit"));
    }
}
