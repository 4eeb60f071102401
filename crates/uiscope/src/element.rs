//! Resolved element handles and their attribute model.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{attrs, all_children, AccessibilityBackend, AttributeValue, ElementRef};
use crate::errors::AutomationError;
use crate::locator::Locator;
use crate::selector::Selector;

/// Attributes associated with a UI element.
///
/// A closed set of well-known fields plus an open string-keyed bag for
/// platform-specific extras.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UIElementAttributes {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// (x, y, width, height) in logical screen coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<(f64, f64, f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_keyboard_focusable: Option<bool>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, Option<serde_json::Value>>,
}

/// A resolved, possibly-stale reference to one concrete UI element.
///
/// Holds the opaque backend reference plus the identity read at resolve time
/// (role, name, stable id). The handle stays owned by the caller; if the
/// underlying element is destroyed, every subsequent operation fails with
/// [`AutomationError::StaleHandle`].
#[derive(Clone)]
pub struct UIElement {
    backend: Arc<dyn AccessibilityBackend>,
    raw: ElementRef,
    role: String,
    name: Option<String>,
    id: Option<String>,
}

impl fmt::Debug for UIElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UIElement")
            .field("raw", &self.raw)
            .field("role", &self.role)
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

impl PartialEq for UIElement {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for UIElement {}

impl std::hash::Hash for UIElement {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl UIElement {
    /// Construct a handle by reading the element's identity from the backend.
    pub(crate) async fn from_ref(
        backend: Arc<dyn AccessibilityBackend>,
        raw: ElementRef,
    ) -> Result<Self, AutomationError> {
        let role = backend
            .read_attribute(&raw, attrs::ROLE)
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let name = backend
            .read_attribute(&raw, attrs::NAME)
            .await?
            .as_str()
            .map(str::to_string);
        let id = backend
            .read_attribute(&raw, attrs::ID)
            .await?
            .as_str()
            .map(str::to_string);
        Ok(Self {
            backend,
            raw,
            role,
            name,
            id,
        })
    }

    /// The opaque backend reference underlying this handle.
    pub fn raw(&self) -> ElementRef {
        self.raw
    }

    /// The element's role as cached at resolve time (e.g. "Button").
    pub fn role(&self) -> &str {
        &self.role
    }

    /// The element's accessible name as cached at resolve time.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The backend's stable identifier, if the element carries one.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub(crate) fn backend(&self) -> &Arc<dyn AccessibilityBackend> {
        &self.backend
    }

    /// Direct children as handles, in backend enumeration order.
    pub async fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        let refs = all_children(self.backend.as_ref(), &self.raw, DEFAULT_CHILD_BATCH).await?;
        let mut out = Vec::with_capacity(refs.len());
        for r in refs {
            out.push(UIElement::from_ref(self.backend.clone(), r).await?);
        }
        Ok(out)
    }

    /// Read the full attribute record for this element, live from the backend.
    pub async fn attributes(&self) -> Result<UIElementAttributes, AutomationError> {
        let mut attributes = UIElementAttributes {
            role: self.role.clone(),
            name: self.name.clone(),
            ..Default::default()
        };
        attributes.value = self.read_string(attrs::VALUE).await?;
        attributes.description = self.read_string(attrs::DESCRIPTION).await?;
        attributes.bounds = match self.backend.read_attribute(&self.raw, attrs::BOUNDS).await? {
            AttributeValue::Value(v) => serde_json::from_value(v).ok(),
            AttributeValue::Unknown => None,
        };
        attributes.is_keyboard_focusable = match self
            .backend
            .read_attribute(&self.raw, attrs::IS_KEYBOARD_FOCUSABLE)
            .await?
        {
            AttributeValue::Value(v) => v.as_bool(),
            AttributeValue::Unknown => None,
        };
        Ok(attributes)
    }

    async fn read_string(&self, name: &str) -> Result<Option<String>, AutomationError> {
        Ok(self
            .backend
            .read_attribute(&self.raw, name)
            .await?
            .as_str()
            .map(str::to_string))
    }

    /// Readable text content of this element and its descendants, down to
    /// `max_depth` levels. Name and value contribute, one line per piece, in
    /// depth-first order.
    pub async fn text(&self, max_depth: usize) -> Result<String, AutomationError> {
        let mut pieces = Vec::new();
        self.collect_text(&mut pieces, 0, max_depth).await?;
        Ok(pieces.join("\n"))
    }

    async fn collect_text(
        &self,
        pieces: &mut Vec<String>,
        depth: usize,
        max_depth: usize,
    ) -> Result<(), AutomationError> {
        if let Some(name) = self.read_string(attrs::NAME).await? {
            if !name.is_empty() {
                pieces.push(name);
            }
        }
        if let Some(value) = self.read_string(attrs::VALUE).await? {
            if !value.is_empty() {
                pieces.push(value);
            }
        }
        if depth < max_depth {
            for child in self.children().await? {
                Box::pin(child.collect_text(pieces, depth + 1, max_depth)).await?;
            }
        }
        Ok(())
    }

    pub async fn is_visible(&self) -> Result<bool, AutomationError> {
        self.backend.is_visible(&self.raw).await
    }

    pub async fn is_enabled(&self) -> Result<bool, AutomationError> {
        self.backend.is_enabled(&self.raw).await
    }

    /// Click this element via the backend's primitive action.
    pub async fn click(&self) -> Result<(), AutomationError> {
        self.perform_action("click", None).await
    }

    /// Type text into this element.
    pub async fn type_text(&self, text: &str) -> Result<(), AutomationError> {
        self.perform_action("type_text", Some(serde_json::json!({ "text": text })))
            .await
    }

    /// Press a key while this element has focus.
    pub async fn press_key(&self, key: &str) -> Result<(), AutomationError> {
        self.perform_action("press_key", Some(serde_json::json!({ "key": key })))
            .await
    }

    /// Perform a named backend action with optional parameters.
    pub async fn perform_action(
        &self,
        action: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), AutomationError> {
        self.backend.perform_action(&self.raw, action, params).await
    }

    /// A locator scoped to this element's subtree.
    pub fn locator(&self, selector: Selector) -> Locator {
        Locator::scoped(self.backend.clone(), self.raw, selector)
    }
}

const DEFAULT_CHILD_BATCH: usize = 50;
