//! The platform capability interface consumed by the engine.
//!
//! Everything that touches a live accessibility tree goes through
//! [`AccessibilityBackend`]: child enumeration, attribute reads, state checks
//! and primitive actions. The engine never talks to a platform API directly,
//! which is what makes resolution and tree-building testable against an
//! in-memory fake.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::AutomationError;

/// Opaque backend-native identity for one node of the live tree.
///
/// Backends issue these from whatever their platform uses as element identity
/// (a UIA runtime id hash, an AT-SPI object path hash, ...). Equality and
/// hashing on this key is what the tree builder's visited-guard relies on, so
/// two refs must compare equal iff the backend considers them the same node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef(pub u64);

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of a single attribute read.
///
/// `Unknown` is a normal outcome, not an error: backends report it for
/// attributes a node simply does not carry, and the tree builder degrades
/// timed-out reads to it as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Value(serde_json::Value),
    Unknown,
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Value(v) => v.as_str(),
            AttributeValue::Unknown => None,
        }
    }

    pub fn into_value(self) -> Option<serde_json::Value> {
        match self {
            AttributeValue::Value(v) => Some(v),
            AttributeValue::Unknown => None,
        }
    }
}

/// Well-known attribute names shared between the engine and backends.
pub mod attrs {
    pub const ROLE: &str = "role";
    pub const NAME: &str = "name";
    pub const ID: &str = "id";
    pub const VALUE: &str = "value";
    pub const DESCRIPTION: &str = "description";
    pub const BOUNDS: &str = "bounds";
    pub const IS_KEYBOARD_FOCUSABLE: &str = "is_keyboard_focusable";
}

/// The common trait every accessibility backend must implement.
///
/// Backends must support concurrent reads: the engine may run overlapping
/// resolutions against overlapping subtrees. Stale references surface as
/// [`AutomationError::StaleHandle`], never as undefined behavior.
#[async_trait::async_trait]
pub trait AccessibilityBackend: Send + Sync {
    /// The desktop root, scope of every chain's first segment.
    fn root(&self) -> ElementRef;

    /// Enumerate up to `max` children of `scope`, starting at `start`, in the
    /// backend's native, stable order.
    ///
    /// Returning fewer than `max` refs means the end of the child list was
    /// reached. Batching keeps the engine from holding unbounded result sets
    /// while still amortizing per-call overhead.
    async fn enumerate_children(
        &self,
        scope: &ElementRef,
        start: usize,
        max: usize,
    ) -> Result<Vec<ElementRef>, AutomationError>;

    /// Read one named attribute of an element.
    async fn read_attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<AttributeValue, AutomationError>;

    async fn is_visible(&self, element: &ElementRef) -> Result<bool, AutomationError>;

    async fn is_enabled(&self, element: &ElementRef) -> Result<bool, AutomationError>;

    /// Perform a primitive action ("click", "type_text", "press_key", ...).
    ///
    /// The engine passes actions through verbatim; it does not serialize
    /// concurrent actions racing for input focus.
    async fn perform_action(
        &self,
        element: &ElementRef,
        action: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), AutomationError>;
}

/// Convenience: enumerate the full child list of `scope` in `batch_size`
/// chunks. Used by resolution, which needs the whole ordered list anyway.
pub(crate) async fn all_children(
    backend: &dyn AccessibilityBackend,
    scope: &ElementRef,
    batch_size: usize,
) -> Result<Vec<ElementRef>, AutomationError> {
    let mut out = Vec::new();
    loop {
        let batch = backend
            .enumerate_children(scope, out.len(), batch_size)
            .await?;
        let done = batch.len() < batch_size;
        out.extend(batch);
        if done {
            return Ok(out);
        }
    }
}
