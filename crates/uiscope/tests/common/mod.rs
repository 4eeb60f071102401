//! In-memory fake accessibility backend shared by the integration tests.
//!
//! Backs the engine with a mutable node table plus call counters, so tests can
//! assert not just outcomes but which backend calls were issued (batch sizes,
//! attribute read counts) and can mutate the "live" tree mid-test to exercise
//! transient absence and staleness.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uiscope::{AccessibilityBackend, AttributeValue, AutomationError, ElementRef};

/// Install a test subscriber once per binary; `RUST_LOG=debug cargo test`
/// then shows the engine's tracing output for a failing scenario.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Clone)]
pub struct FakeNode {
    pub role: String,
    pub name: Option<String>,
    pub id: Option<String>,
    pub value: Option<String>,
    pub description: Option<String>,
    pub bounds: Option<(f64, f64, f64, f64)>,
    pub visible: bool,
    pub enabled: bool,
    pub children: Vec<u64>,
}

impl FakeNode {
    pub fn new(role: &str, name: Option<&str>) -> Self {
        Self {
            role: role.to_string(),
            name: name.map(str::to_string),
            id: None,
            value: None,
            description: None,
            bounds: None,
            visible: true,
            enabled: true,
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_bounds(mut self, bounds: (f64, f64, f64, f64)) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn invisible(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

pub const ROOT: u64 = 0;

#[derive(Default)]
pub struct FakeBackend {
    nodes: Mutex<HashMap<u64, FakeNode>>,
    next_id: AtomicU64,
    pub enumerate_calls: AtomicUsize,
    /// The `max` argument of every enumerate_children call, in order.
    pub enumerate_batch_sizes: Mutex<Vec<usize>>,
    attribute_reads: Mutex<HashMap<String, usize>>,
    pub actions: Mutex<Vec<(u64, String, Option<serde_json::Value>)>>,
    /// Attribute name -> artificial latency, for per-operation timeout tests.
    slow_attributes: Mutex<HashMap<String, Duration>>,
}

impl FakeBackend {
    /// A backend holding only a desktop root.
    pub fn new() -> Self {
        let backend = Self {
            next_id: AtomicU64::new(1),
            ..Default::default()
        };
        backend
            .nodes
            .lock()
            .unwrap()
            .insert(ROOT, FakeNode::new("Desktop", None));
        backend
    }

    /// Insert a node under `parent`, returning its backend-native key.
    pub fn add(&self, parent: u64, node: FakeNode) -> u64 {
        let key = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut nodes = self.nodes.lock().unwrap();
        nodes.insert(key, node);
        nodes
            .get_mut(&parent)
            .expect("parent must exist")
            .children
            .push(key);
        key
    }

    /// Add an extra parent->child edge without creating a node. Used to make
    /// the reported tree cyclic or to share a subtree between parents.
    pub fn link(&self, parent: u64, child: u64) {
        self.nodes
            .lock()
            .unwrap()
            .get_mut(&parent)
            .expect("parent must exist")
            .children
            .push(child);
    }

    /// Destroy a node; subsequent operations on it report a stale handle.
    pub fn remove(&self, key: u64) {
        let mut nodes = self.nodes.lock().unwrap();
        nodes.remove(&key);
        for node in nodes.values_mut() {
            node.children.retain(|c| *c != key);
        }
    }

    pub fn set_value(&self, key: u64, value: &str) {
        self.nodes
            .lock()
            .unwrap()
            .get_mut(&key)
            .expect("node must exist")
            .value = Some(value.to_string());
    }

    pub fn set_visible(&self, key: u64, visible: bool) {
        self.nodes
            .lock()
            .unwrap()
            .get_mut(&key)
            .expect("node must exist")
            .visible = visible;
    }

    pub fn set_enabled(&self, key: u64, enabled: bool) {
        self.nodes
            .lock()
            .unwrap()
            .get_mut(&key)
            .expect("node must exist")
            .enabled = enabled;
    }

    /// Make every read of `attribute` take `latency`.
    pub fn slow_down_attribute(&self, attribute: &str, latency: Duration) {
        self.slow_attributes
            .lock()
            .unwrap()
            .insert(attribute.to_string(), latency);
    }

    /// How many times `attribute` has been read, across all elements.
    pub fn reads_of(&self, attribute: &str) -> usize {
        *self
            .attribute_reads
            .lock()
            .unwrap()
            .get(attribute)
            .unwrap_or(&0)
    }

    fn stale(key: &ElementRef) -> AutomationError {
        AutomationError::StaleHandle(format!("element {key} no longer exists"))
    }
}

#[async_trait]
impl AccessibilityBackend for FakeBackend {
    fn root(&self) -> ElementRef {
        ElementRef(ROOT)
    }

    async fn enumerate_children(
        &self,
        scope: &ElementRef,
        start: usize,
        max: usize,
    ) -> Result<Vec<ElementRef>, AutomationError> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        self.enumerate_batch_sizes.lock().unwrap().push(max);

        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(&scope.0).ok_or_else(|| Self::stale(scope))?;
        Ok(node
            .children
            .iter()
            .skip(start)
            .take(max)
            .map(|c| ElementRef(*c))
            .collect())
    }

    async fn read_attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<AttributeValue, AutomationError> {
        let latency = self.slow_attributes.lock().unwrap().get(name).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        *self
            .attribute_reads
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert(0) += 1;

        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(&element.0).ok_or_else(|| Self::stale(element))?;

        let value = match name {
            "role" => Some(serde_json::json!(node.role)),
            "name" => node.name.as_ref().map(|n| serde_json::json!(n)),
            "id" => node.id.as_ref().map(|i| serde_json::json!(i)),
            "value" => node.value.as_ref().map(|v| serde_json::json!(v)),
            "description" => node.description.as_ref().map(|d| serde_json::json!(d)),
            "bounds" => node
                .bounds
                .map(|b| serde_json::to_value(b).expect("bounds serialize")),
            _ => None,
        };
        Ok(value.map(AttributeValue::Value).unwrap_or(AttributeValue::Unknown))
    }

    async fn is_visible(&self, element: &ElementRef) -> Result<bool, AutomationError> {
        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(&element.0).ok_or_else(|| Self::stale(element))?;
        Ok(node.visible)
    }

    async fn is_enabled(&self, element: &ElementRef) -> Result<bool, AutomationError> {
        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(&element.0).ok_or_else(|| Self::stale(element))?;
        Ok(node.enabled)
    }

    async fn perform_action(
        &self,
        element: &ElementRef,
        action: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), AutomationError> {
        let nodes = self.nodes.lock().unwrap();
        if !nodes.contains_key(&element.0) {
            return Err(Self::stale(element));
        }
        drop(nodes);
        self.actions
            .lock()
            .unwrap()
            .push((element.0, action.to_string(), params));
        Ok(())
    }
}

/// A calculator-shaped tree used by several scenarios: one window titled
/// "Calculator" holding a display field and an "Equals" button.
pub fn calculator_backend() -> (std::sync::Arc<FakeBackend>, u64, u64, u64) {
    let backend = std::sync::Arc::new(FakeBackend::new());
    let window = backend.add(
        ROOT,
        FakeNode::new("Window", Some("Calculator")).with_bounds((0.0, 0.0, 320.0, 480.0)),
    );
    let display = backend.add(
        window,
        FakeNode::new("Edit", Some("Display")).with_id("display").with_value("0"),
    );
    let equals = backend.add(
        window,
        FakeNode::new("Button", Some("Equals")).with_id("equals-btn"),
    );
    (backend, window, display, equals)
}
