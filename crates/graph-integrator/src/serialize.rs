//! Plain-data form of a context snapshot, as handed to the panel.

use std::collections::BTreeMap;

use cdp_adapter::events::{BaseAudioContext, ContextRealtimeData};
use cdp_adapter::{GraphObjectId, RouteLookup};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::layout::{LayoutEdge, LayoutGraph, LayoutVertex};
use crate::model::{ContextUpdate, GraphNode, GraphParam};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphOptions {
    pub directed: bool,
    pub multigraph: bool,
    pub compound: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            directed: true,
            multigraph: true,
            compound: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedVertex {
    pub v: GraphObjectId,
    pub value: LayoutVertex,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedEdge {
    pub v: GraphObjectId,
    pub w: GraphObjectId,
    pub name: String,
    pub value: LayoutEdge,
}

/// Layout graph in the graphlib JSON interchange shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedGraph {
    pub options: GraphOptions,
    pub nodes: Vec<SerializedVertex>,
    pub edges: Vec<SerializedEdge>,
    #[serde(default)]
    pub value: Map<String, Value>,
}

impl SerializedGraph {
    pub fn write(graph: &LayoutGraph) -> Self {
        Self {
            options: GraphOptions::default(),
            nodes: graph
                .vertices()
                .map(|vertex| SerializedVertex {
                    v: vertex.id.clone(),
                    value: vertex.clone(),
                })
                .collect(),
            edges: graph
                .edges()
                .map(|edge| SerializedEdge {
                    v: edge.source.clone(),
                    w: edge.destination.clone(),
                    name: edge.name.to_string(),
                    value: edge.value.clone(),
                })
                .collect(),
            value: Map::new(),
        }
    }
}

/// A context snapshot with its layout graph flattened. Terminal snapshots keep only the id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedGraphContext {
    pub id: GraphObjectId,
    pub context: Option<BaseAudioContext>,
    pub realtime_data: Option<ContextRealtimeData>,
    pub nodes: Option<BTreeMap<GraphObjectId, GraphNode>>,
    pub params: Option<BTreeMap<GraphObjectId, GraphParam>>,
    pub graph: Option<SerializedGraph>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_iframe: Option<bool>,
}

impl SerializedGraphContext {
    pub fn terminal(id: GraphObjectId) -> Self {
        Self {
            id,
            context: None,
            realtime_data: None,
            nodes: None,
            params: None,
            graph: None,
            is_iframe: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.graph.is_none()
    }
}

pub fn serialize_graph_context(
    update: &ContextUpdate,
    routes: &dyn RouteLookup,
) -> SerializedGraphContext {
    match update {
        ContextUpdate::Destroyed(id) => SerializedGraphContext::terminal(id.clone()),
        ContextUpdate::Active(context) => SerializedGraphContext {
            id: context.id.clone(),
            context: Some(context.context.clone()),
            realtime_data: Some(context.realtime_data),
            nodes: Some(context.nodes.clone()),
            params: Some(context.params.clone()),
            graph: Some(SerializedGraph::write(&context.graph)),
            is_iframe: Some(routes.frame_for_context(&context.id).is_some()),
        },
    }
}
