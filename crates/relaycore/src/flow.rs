use crate::adapter::AdapterId;
use crate::context::keys;
use crate::error::FlowError;
use crate::value::Value;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub type FlowId = Uuid;

/// Versioned definition of an integration flow: a directed graph of nodes
/// and edges as produced by the visual editor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: FlowId,
    pub name: String,
    pub description: Option<String>,
    pub version: u32,
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

impl FlowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            version: 1,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: FlowNode) -> &mut Self {
        self.nodes.push(node);
        self
    }

    pub fn connect(&mut self, source: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.edges.push(FlowEdge {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The unique start node, if present (either recognized spelling
    /// deserializes to `NodeKind::Start`)
    pub fn start_node(&self) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.kind == NodeKind::Start)
    }

    /// Target node ids of all edges leaving `id`, in edge declaration order
    pub fn outgoing(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.source == id)
            .map(|e| e.target.as_str())
            .collect()
    }

    /// Structural validation with zero side effects.
    ///
    /// Errors block deployment and execution; warnings are advisory
    /// (unreachable nodes never run but do not make the graph invalid).
    pub fn validate(&self) -> FlowValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.nodes.is_empty() {
            errors.push(FlowError::EmptyGraph.to_string());
            return FlowValidation { errors, warnings };
        }

        let start_count = self
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Start)
            .count();
        match start_count {
            0 => errors.push(FlowError::MissingStartNode.to_string()),
            1 => {}
            n => errors.push(FlowError::MultipleStartNodes(n).to_string()),
        }

        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !ids.contains(endpoint.as_str()) {
                    errors.push(
                        FlowError::DanglingEdge {
                            from: edge.source.clone(),
                            target: edge.target.clone(),
                            missing: endpoint.clone(),
                        }
                        .to_string(),
                    );
                }
            }
        }

        // Graph-level checks only make sense once the edge list is sane
        if errors.is_empty() {
            let graph = self.build_graph();
            if toposort(&graph, None).is_err() {
                errors.push(FlowError::CyclicGraph.to_string());
            } else if let Some(start) = self.start_node() {
                let mut reachable = HashSet::new();
                let mut stack = vec![start.id.as_str()];
                while let Some(id) = stack.pop() {
                    if reachable.insert(id) {
                        stack.extend(self.outgoing(id));
                    }
                }
                for node in &self.nodes {
                    if !reachable.contains(node.id.as_str()) {
                        warnings.push(format!(
                            "Node '{}' ({}) is unreachable from the start node",
                            node.id, node.kind
                        ));
                    }
                }
            }
        }

        FlowValidation { errors, warnings }
    }

    /// Every adapter id referenced anywhere in the graph: adapter nodes plus
    /// the legacy sender/receiver fields still carried by start and end
    /// nodes from older editor versions. Order of first reference is kept;
    /// duplicates are dropped.
    pub fn referenced_adapter_ids(&self) -> Vec<AdapterId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for node in &self.nodes {
            let fields: &[&str] = match node.kind {
                NodeKind::Adapter => &[keys::ADAPTER_ID],
                NodeKind::Start => &[keys::SENDER_ADAPTER_ID],
                NodeKind::End | NodeKind::MessageEnd => &[keys::RECEIVER_ADAPTER_ID],
                _ => &[],
            };
            for &field in fields {
                let Some(raw) = node.data.get(field).and_then(Value::as_str) else {
                    continue;
                };
                match raw.parse::<AdapterId>() {
                    Ok(id) => {
                        if seen.insert(id) {
                            out.push(id);
                        }
                    }
                    Err(_) => {
                        tracing::warn!(
                            node = %node.id,
                            field,
                            value = raw,
                            "ignoring unparseable adapter reference"
                        );
                    }
                }
            }
        }
        out
    }

    fn build_graph(&self) -> DiGraph<&str, ()> {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::new();
        for node in &self.nodes {
            let idx = graph.add_node(node.id.as_str());
            index_of.insert(node.id.as_str(), idx);
        }
        for edge in &self.edges {
            if let (Some(&from), Some(&to)) = (
                index_of.get(edge.source.as_str()),
                index_of.get(edge.target.as_str()),
            ) {
                graph.add_edge(from, to, ());
            }
        }
        graph
    }
}

/// Outcome of structural validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl FlowValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One node of a flow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, Value>,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            name: None,
            data: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Display name falling back to the node id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Directed edge between two nodes, referencing node ids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEdge {
    pub source: String,
    pub target: String,
}

/// Node kinds understood by the engine. The aliases cover the older editor
/// spellings still present in long-lived flow definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    #[serde(alias = "startEvent")]
    Start,
    #[serde(alias = "endEvent")]
    End,
    #[serde(alias = "messageEndEvent")]
    MessageEnd,
    Adapter,
    Utility,
    Decision,
    ParallelSplit,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::MessageEnd => "message-end",
            NodeKind::Adapter => "adapter",
            NodeKind::Utility => "utility",
            NodeKind::Decision => "decision",
            NodeKind::ParallelSplit => "parallel-split",
        };
        write!(f, "{}", s)
    }
}
