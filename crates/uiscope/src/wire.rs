//! Serializable request/response model for the engine boundary.
//!
//! Any transport (HTTP, IPC, language bindings) can sit behind these types
//! untouched: requests carry selector chains as canonical strings plus plain
//! data, responses carry only snapshot state, never live handles.

use serde::{Deserialize, Serialize};

use crate::element::UIElement;
use crate::errors::SelectorParseError;
use crate::selector::Selector;
use crate::tree::{TreeBuildConfig, UINode};

/// Base request shape: a selector chain in canonical textual form plus an
/// optional timeout override in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainedRequest {
    pub selector_chain: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ChainedRequest {
    /// Parse the chain into typed selectors. Fails fast on the first
    /// malformed segment; parse failures are never retried.
    pub fn parse_chain(&self) -> Result<Vec<Selector>, SelectorParseError> {
        self.selector_chain.iter().map(|s| Selector::parse(s)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeTextRequest {
    #[serde(flatten)]
    pub chain: ChainedRequest,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressKeyRequest {
    #[serde(flatten)]
    pub chain: ChainedRequest,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTextRequest {
    #[serde(flatten)]
    pub chain: ChainedRequest,
    #[serde(default = "default_text_depth")]
    pub max_depth: usize,
}

/// Expectation request for the text-equals predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectTextRequest {
    #[serde(flatten)]
    pub chain: ChainedRequest,
    pub expected_text: String,
    #[serde(default = "default_text_depth")]
    pub max_depth: usize,
}

fn default_text_depth() -> usize {
    5
}

/// Snapshot request: where to start and how aggressively to load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeRequest {
    #[serde(flatten)]
    pub chain: ChainedRequest,
    #[serde(default)]
    pub config: TreeBuildConfig,
}

// --- Responses ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BooleanResponse {
    pub result: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextResponse {
    pub text: String,
}

/// Identity snapshot of one resolved element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementResponse {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl From<&UIElement> for ElementResponse {
    fn from(element: &UIElement) -> Self {
        Self {
            role: element.role().to_string(),
            label: element.name().map(str::to_string),
            id: element.id().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementsResponse {
    pub elements: Vec<ElementResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeResponse {
    pub tree: UINode,
}
