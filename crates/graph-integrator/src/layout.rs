//! Layout graph mirrored from a context's nodes and connections.
//!
//! A directed multigraph whose vertices are audio nodes and whose edges are keyed by
//! `(source, destination, name)`. Setting an existing key replaces its value, and removing a
//! vertex drops every edge touching it.

use std::collections::HashMap;

use cdp_adapter::GraphObjectId;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Directed;
use serde::{Deserialize, Serialize};

pub const VERTEX_WIDTH: f64 = 150.0;
pub const VERTEX_HEIGHT: f64 = 50.0;

/// Vertex label: the node's id, type and fixed layout dimensions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutVertex {
    pub id: GraphObjectId,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub color: Option<String>,
    pub width: f64,
    pub height: f64,
}

impl LayoutVertex {
    pub fn new(id: GraphObjectId, node_type: impl Into<String>) -> Self {
        let node_type = node_type.into();
        Self {
            label: node_type.clone(),
            id,
            node_type,
            color: None,
            width: VERTEX_WIDTH,
            height: VERTEX_HEIGHT,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutEdgeKind {
    Node,
    Param,
}

/// Edge label; param edges carry input index -1 and node edges an empty param id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutEdge {
    #[serde(rename = "type")]
    pub kind: LayoutEdgeKind,
    pub source_output_index: u32,
    pub destination_input_index: i32,
    pub destination_param_id: String,
}

impl LayoutEdge {
    pub fn node(source_output_index: u32, destination_input_index: u32) -> Self {
        Self {
            kind: LayoutEdgeKind::Node,
            source_output_index,
            destination_input_index: destination_input_index as i32,
            destination_param_id: String::new(),
        }
    }

    pub fn param(source_output_index: u32, destination_param_id: &GraphObjectId) -> Self {
        Self {
            kind: LayoutEdgeKind::Param,
            source_output_index,
            destination_input_index: -1,
            destination_param_id: destination_param_id.to_string(),
        }
    }
}

/// Name distinguishing parallel node edges: `"<output>,<input>"`.
pub fn node_edge_name(source_output_index: u32, destination_input_index: u32) -> String {
    format!("{source_output_index},{destination_input_index}")
}

/// Name distinguishing parallel param edges: `"<output>"`.
pub fn param_edge_name(source_output_index: u32) -> String {
    source_output_index.to_string()
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
struct EdgeKey {
    source: GraphObjectId,
    destination: GraphObjectId,
    name: String,
}

#[derive(Clone, Debug)]
struct NamedEdge {
    name: String,
    value: LayoutEdge,
}

/// Edge as seen from outside: endpoints, name and label.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeView<'a> {
    pub source: &'a GraphObjectId,
    pub destination: &'a GraphObjectId,
    pub name: &'a str,
    pub value: &'a LayoutEdge,
}

#[derive(Clone, Debug)]
pub struct LayoutGraph {
    inner: StableGraph<LayoutVertex, NamedEdge, Directed>,
    vertices: HashMap<GraphObjectId, NodeIndex>,
    edges: HashMap<EdgeKey, EdgeIndex>,
}

impl Default for LayoutGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutGraph {
    pub fn new() -> Self {
        Self {
            inner: StableGraph::new(),
            vertices: HashMap::new(),
            edges: HashMap::new(),
        }
    }

    /// Insert the vertex, or replace the label of an existing one.
    pub fn set_vertex(&mut self, vertex: LayoutVertex) {
        match self.vertices.get(&vertex.id) {
            Some(&index) => {
                if let Some(weight) = self.inner.node_weight_mut(index) {
                    *weight = vertex;
                }
            }
            None => {
                let id = vertex.id.clone();
                let index = self.inner.add_node(vertex);
                self.vertices.insert(id, index);
            }
        }
    }

    /// Remove a vertex together with its incident edges.
    pub fn remove_vertex(&mut self, id: &GraphObjectId) -> bool {
        let Some(index) = self.vertices.remove(id) else {
            return false;
        };
        self.inner.remove_node(index);
        self.edges
            .retain(|key, _| &key.source != id && &key.destination != id);
        true
    }

    pub fn has_vertex(&self, id: &GraphObjectId) -> bool {
        self.vertices.contains_key(id)
    }

    pub fn vertex(&self, id: &GraphObjectId) -> Option<&LayoutVertex> {
        self.vertices
            .get(id)
            .and_then(|&index| self.inner.node_weight(index))
    }

    /// Insert or relabel the edge keyed by `(source, destination, name)`. Both endpoints must
    /// already be vertices.
    pub fn set_edge(
        &mut self,
        source: &GraphObjectId,
        destination: &GraphObjectId,
        name: impl Into<String>,
        value: LayoutEdge,
    ) -> bool {
        let (Some(&from), Some(&to)) = (self.vertices.get(source), self.vertices.get(destination))
        else {
            return false;
        };
        let key = EdgeKey {
            source: source.clone(),
            destination: destination.clone(),
            name: name.into(),
        };
        if let Some(&index) = self.edges.get(&key) {
            if let Some(weight) = self.inner.edge_weight_mut(index) {
                weight.value = value;
                return true;
            }
        }
        let index = self.inner.add_edge(
            from,
            to,
            NamedEdge {
                name: key.name.clone(),
                value,
            },
        );
        self.edges.insert(key, index);
        true
    }

    pub fn remove_edge(
        &mut self,
        source: &GraphObjectId,
        destination: &GraphObjectId,
        name: &str,
    ) -> bool {
        let key = EdgeKey {
            source: source.clone(),
            destination: destination.clone(),
            name: name.to_string(),
        };
        match self.edges.remove(&key) {
            Some(index) => self.inner.remove_edge(index).is_some(),
            None => false,
        }
    }

    pub fn edge(
        &self,
        source: &GraphObjectId,
        destination: &GraphObjectId,
        name: &str,
    ) -> Option<&LayoutEdge> {
        let key = EdgeKey {
            source: source.clone(),
            destination: destination.clone(),
            name: name.to_string(),
        };
        self.edges
            .get(&key)
            .and_then(|&index| self.inner.edge_weight(index))
            .map(|edge| &edge.value)
    }

    pub fn vertex_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Vertices in slot order. Slots vacated by removals are reused, so this is not insertion
    /// order once a vertex has been removed.
    pub fn vertices(&self) -> impl Iterator<Item = &LayoutVertex> + '_ {
        self.inner
            .node_indices()
            .filter_map(|index| self.inner.node_weight(index))
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> + '_ {
        self.inner.edge_references().filter_map(|edge| {
            let source = &self.inner.node_weight(edge.source())?.id;
            let destination = &self.inner.node_weight(edge.target())?.id;
            Some(EdgeView {
                source,
                destination,
                name: &edge.weight().name,
                value: &edge.weight().value,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> GraphObjectId {
        GraphObjectId::from(raw)
    }

    fn graph_with(ids: &[&str]) -> LayoutGraph {
        let mut graph = LayoutGraph::new();
        for raw in ids {
            graph.set_vertex(LayoutVertex::new(id(raw), "GainNode"));
        }
        graph
    }

    #[test]
    fn vertex_carries_fixed_dimensions() {
        let vertex = LayoutVertex::new(id("n1"), "OscillatorNode");
        assert_eq!(vertex.label, "OscillatorNode");
        assert_eq!(vertex.width, VERTEX_WIDTH);
        assert_eq!(vertex.height, VERTEX_HEIGHT);
        assert!(vertex.color.is_none());
    }

    #[test]
    fn set_edge_is_keyed_by_name() {
        let mut graph = graph_with(&["a", "b"]);
        assert!(graph.set_edge(&id("a"), &id("b"), node_edge_name(0, 0), LayoutEdge::node(0, 0)));
        assert!(graph.set_edge(&id("a"), &id("b"), node_edge_name(0, 1), LayoutEdge::node(0, 1)));
        assert!(graph.set_edge(&id("a"), &id("b"), node_edge_name(0, 0), LayoutEdge::node(0, 0)));
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(
            graph.edge(&id("a"), &id("b"), "0,1").map(|edge| edge.destination_input_index),
            Some(1)
        );
    }

    #[test]
    fn vertices_reuse_vacated_slots() {
        let mut graph = graph_with(&["a", "b", "c"]);
        graph.remove_vertex(&id("a"));
        graph.set_vertex(LayoutVertex::new(id("d"), "GainNode"));

        let ids: Vec<_> = graph.vertices().map(|vertex| vertex.id.as_str()).collect();
        assert_eq!(ids, ["d", "b", "c"]);
    }

    #[test]
    fn set_edge_requires_both_vertices() {
        let mut graph = graph_with(&["a"]);
        assert!(!graph.set_edge(&id("a"), &id("ghost"), "0,0", LayoutEdge::node(0, 0)));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn removing_vertex_drops_incident_edges() {
        let mut graph = graph_with(&["a", "b", "c"]);
        graph.set_edge(&id("a"), &id("b"), "0,0", LayoutEdge::node(0, 0));
        graph.set_edge(&id("b"), &id("c"), "0", LayoutEdge::param(0, &id("p1")));
        graph.set_edge(&id("a"), &id("c"), "0,0", LayoutEdge::node(0, 0));

        assert!(graph.remove_vertex(&id("b")));
        assert!(!graph.remove_vertex(&id("b")));
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.edge(&id("a"), &id("c"), "0,0").is_some());

        // Re-adding the vertex must not resurrect stale keys.
        graph.set_vertex(LayoutVertex::new(id("b"), "GainNode"));
        assert!(graph.edge(&id("a"), &id("b"), "0,0").is_none());
    }

    #[test]
    fn param_edges_use_sentinel_input() {
        let edge = LayoutEdge::param(2, &id("p9"));
        assert_eq!(edge.kind, LayoutEdgeKind::Param);
        assert_eq!(edge.destination_input_index, -1);
        assert_eq!(edge.destination_param_id, "p9");
        assert_eq!(param_edge_name(2), "2");

        let json = serde_json::to_value(LayoutEdge::node(1, 0)).unwrap();
        assert_eq!(json["type"], "node");
        assert_eq!(json["destinationParamId"], "");
    }

    #[test]
    fn edges_iterate_with_endpoint_ids() {
        let mut graph = graph_with(&["a", "b"]);
        graph.set_edge(&id("a"), &id("b"), "0,0", LayoutEdge::node(0, 0));
        let edges: Vec<_> = graph.edges().collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source.as_str(), "a");
        assert_eq!(edges[0].destination.as_str(), "b");
        assert_eq!(edges[0].name, "0,0");
    }
}
