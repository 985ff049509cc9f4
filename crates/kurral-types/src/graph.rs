use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::canonical;

/// Declared shape of one tool as presented to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: Value,
}

/// Per-tool versioning entry stored on the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolVersion {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Fingerprint of the agent's graph structure and tool surface.
///
/// Lets the comparator detect that two artifacts were produced by different
/// agent topologies even when their outputs happen to agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphVersion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_schemas_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolVersion>>,
}

impl GraphVersion {
    /// Hash a node set + edge list plus each tool's declared schema and
    /// description. Node order is normalized; edge order is structural.
    pub fn compute(nodes: &[String], edges: &[(String, String)], tools: &[ToolSpec]) -> Self {
        let graph_hash = if nodes.is_empty() && edges.is_empty() {
            None
        } else {
            let mut sorted_nodes = nodes.to_vec();
            sorted_nodes.sort();
            let edge_list: Vec<Value> = edges
                .iter()
                .map(|(from, to)| json!([from, to]))
                .collect();
            Some(canonical::canonical_hash(&json!({
                "nodes": sorted_nodes,
                "edges": edge_list,
            })))
        };

        let (tool_schemas_hash, tool_versions) = if tools.is_empty() {
            (None, None)
        } else {
            let mut versions = Vec::with_capacity(tools.len());
            let mut per_tool_material = Vec::with_capacity(tools.len());
            for tool in tools {
                let material = canonical::canonical_json(&json!({
                    "name": tool.name,
                    "description": tool.description,
                    "schema": tool.schema,
                }));
                versions.push(ToolVersion {
                    name: tool.name.clone(),
                    schema_hash: Some(canonical::sha256_hex(material.as_bytes())),
                    description: tool.description.clone(),
                });
                per_tool_material.push(material);
            }
            // Combined hash is order-independent so tool registration order
            // does not change the fingerprint.
            per_tool_material.sort();
            let combined = per_tool_material.concat();
            (Some(canonical::sha256_hex(combined.as_bytes())), Some(versions))
        };

        Self {
            graph_hash,
            tool_schemas_hash,
            tools: tool_versions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, desc: &str) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: Some(desc.to_string()),
            schema: json!({"type": "object", "properties": {"q": {"type": "string"}}}),
        }
    }

    #[test]
    fn test_tool_order_does_not_change_combined_hash() {
        let a = GraphVersion::compute(&[], &[], &[spec("search", "s"), spec("fetch", "f")]);
        let b = GraphVersion::compute(&[], &[], &[spec("fetch", "f"), spec("search", "s")]);
        assert_eq!(a.tool_schemas_hash, b.tool_schemas_hash);
    }

    #[test]
    fn test_schema_change_changes_hash() {
        let base = GraphVersion::compute(&[], &[], &[spec("search", "s")]);
        let changed = GraphVersion::compute(&[], &[], &[spec("search", "different")]);
        assert_ne!(base.tool_schemas_hash, changed.tool_schemas_hash);
    }

    #[test]
    fn test_node_order_normalized() {
        let nodes_a = vec!["plan".to_string(), "act".to_string()];
        let nodes_b = vec!["act".to_string(), "plan".to_string()];
        let edges = vec![("plan".to_string(), "act".to_string())];
        let a = GraphVersion::compute(&nodes_a, &edges, &[]);
        let b = GraphVersion::compute(&nodes_b, &edges, &[]);
        assert_eq!(a.graph_hash, b.graph_hash);
    }

    #[test]
    fn test_empty_graph_has_no_hashes() {
        let version = GraphVersion::compute(&[], &[], &[]);
        assert!(version.graph_hash.is_none());
        assert!(version.tool_schemas_hash.is_none());
        assert!(version.tools.is_none());
    }
}
