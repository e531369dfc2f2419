//! Session handshake payload and tool-reference block construction (spec §6).

use super::{SearchResult, ToolDescriptor, ToolRegistry};
use serde::{Deserialize, Serialize};

/// Advertised at session initialisation: only the non-deferred subset of the
/// catalogue. Deferred tools are discoverable only through `tool_search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub server_info: ServerInfo,
    pub tools: Vec<HandshakeTool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// The wire shape of a non-deferred tool entry. `defer_loading` is always
/// `false` here by construction — a deferred descriptor never appears in a
/// handshake payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub defer_loading: bool,
}

impl From<&ToolDescriptor> for HandshakeTool {
    fn from(d: &ToolDescriptor) -> Self {
        Self {
            name: d.name.clone(),
            description: d.description.clone(),
            input_schema: d.input_schema.clone(),
            defer_loading: false,
        }
    }
}

pub async fn build_handshake(registry: &ToolRegistry, name: &str, version: &str) -> Handshake {
    let tools = registry
        .list_non_deferred()
        .await
        .iter()
        .map(HandshakeTool::from)
        .collect();
    Handshake {
        server_info: ServerInfo {
            name: name.to_string(),
            version: version.to_string(),
        },
        tools,
    }
}

/// A `tool_reference` content block. Wire form must match this exactly — a
/// wrong `type` field silently disables client-side discovery (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolReferenceBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub tool_name: String,
}

impl ToolReferenceBlock {
    pub fn for_tool(name: &str) -> Self {
        Self {
            block_type: "tool_reference".to_string(),
            tool_name: name.to_string(),
        }
    }
}

/// Materialise one `tool_reference` block per matched search result,
/// preserving the search's own ranking order.
pub fn tool_reference_blocks(results: &[SearchResult]) -> Vec<ToolReferenceBlock> {
    results
        .iter()
        .map(|r| ToolReferenceBlock::for_tool(&r.tool_descriptor.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MatchReason, ToolCategory};

    fn descriptor(name: &str, defer_loading: bool) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("{name} description"),
            category: ToolCategory::Search,
            defer_loading,
            keywords: vec![],
            input_schema: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn handshake_advertises_only_non_deferred_tools() {
        let registry = ToolRegistry::new();
        registry.register(descriptor("tool_search", false)).await.unwrap();
        registry.register(descriptor("memory_search", false)).await.unwrap();
        registry.register(descriptor("memory_record", true)).await.unwrap();

        let handshake = build_handshake(&registry, "contextd", "0.1.0").await;
        let names: Vec<&str> = handshake.tools.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"tool_search"));
        assert!(names.contains(&"memory_search"));
        assert!(!names.contains(&"memory_record"));
        assert!(handshake.tools.iter().all(|t| !t.defer_loading));
    }

    #[test]
    fn tool_reference_block_has_exact_wire_shape() {
        let block = ToolReferenceBlock::for_tool("memory_search");
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "tool_reference");
        assert_eq!(value["tool_name"], "memory_search");
    }

    #[test]
    fn tool_reference_blocks_preserve_search_order() {
        let results = vec![
            SearchResult {
                tool_descriptor: descriptor("b_tool", true),
                score: 2,
                match_reason: MatchReason::NameContainsQuery,
            },
            SearchResult {
                tool_descriptor: descriptor("a_tool", true),
                score: 1,
                match_reason: MatchReason::DescriptionContainsQuery,
            },
        ];
        let blocks = tool_reference_blocks(&results);
        assert_eq!(blocks[0].tool_name, "b_tool");
        assert_eq!(blocks[1].tool_name, "a_tool");
    }
}
