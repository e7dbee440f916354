//! Per-context graph state.
//!
//! Every mutation goes through one method on [`GraphContext`] so the node table, the param index
//! and the layout graph change together.

use std::collections::BTreeMap;

use cdp_adapter::events::{
    AudioNode, AudioParam, BaseAudioContext, ContextRealtimeData, NodeParamConnectionParams,
    NodesConnectionParams,
};
use cdp_adapter::GraphObjectId;
use serde::{Deserialize, Serialize};

use crate::layout::{node_edge_name, param_edge_name, LayoutEdge, LayoutGraph, LayoutVertex};

/// Where a connection lands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectionDestination {
    #[serde(rename_all = "camelCase")]
    Node {
        destination_id: GraphObjectId,
        destination_input_index: u32,
    },
    #[serde(rename_all = "camelCase")]
    Param { destination_param_id: GraphObjectId },
}

/// Outgoing connection recorded on its source node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub source_id: GraphObjectId,
    pub source_output_index: u32,
    #[serde(flatten)]
    pub destination: ConnectionDestination,
}

impl ConnectionRecord {
    pub fn to_node(params: &NodesConnectionParams) -> Self {
        Self {
            source_id: params.source_id.clone(),
            source_output_index: params.source_output_index,
            destination: ConnectionDestination::Node {
                destination_id: params.destination_id.clone(),
                destination_input_index: params.destination_input_index,
            },
        }
    }

    pub fn to_param(params: &NodeParamConnectionParams) -> Self {
        Self {
            source_id: params.source_id.clone(),
            source_output_index: params.source_output_index,
            destination: ConnectionDestination::Param {
                destination_param_id: params.destination_id.clone(),
            },
        }
    }

    pub fn targets_param(&self, param_id: &GraphObjectId) -> bool {
        matches!(&self.destination, ConnectionDestination::Param { destination_param_id } if destination_param_id == param_id)
    }

    pub fn targets_node(&self, node_id: &GraphObjectId) -> bool {
        matches!(&self.destination, ConnectionDestination::Node { destination_id, .. } if destination_id == node_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub node: AudioNode,
    pub params: Vec<GraphObjectId>,
    pub edges: Vec<ConnectionRecord>,
}

impl GraphNode {
    pub fn new(node: AudioNode) -> Self {
        Self {
            node,
            params: Vec::new(),
            edges: Vec::new(),
        }
    }
}

/// Param index entry, naming the node that owns the param.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphParam {
    pub param: AudioParam,
    pub node_id: GraphObjectId,
}

#[derive(Clone, Debug)]
pub struct GraphContext {
    pub id: GraphObjectId,
    pub context: BaseAudioContext,
    pub realtime_data: ContextRealtimeData,
    pub nodes: BTreeMap<GraphObjectId, GraphNode>,
    pub params: BTreeMap<GraphObjectId, GraphParam>,
    pub graph: LayoutGraph,
}

impl GraphContext {
    pub fn new(context: BaseAudioContext) -> Self {
        Self {
            id: context.context_id.clone(),
            context,
            realtime_data: ContextRealtimeData::default(),
            nodes: BTreeMap::new(),
            params: BTreeMap::new(),
            graph: LayoutGraph::new(),
        }
    }

    /// Replace the context descriptor, keeping the graph.
    pub fn update_context(&mut self, context: BaseAudioContext) {
        self.context = context;
    }

    pub fn set_realtime_data(&mut self, data: ContextRealtimeData) {
        self.realtime_data = data;
    }

    /// Track a node and add its layout vertex. A repeated creation only refreshes the descriptor.
    pub fn insert_node(&mut self, node: AudioNode) {
        self.graph
            .set_vertex(LayoutVertex::new(node.node_id.clone(), node.node_type.clone()));
        match self.nodes.get_mut(&node.node_id) {
            Some(existing) => existing.node = node,
            None => {
                self.nodes.insert(node.node_id.clone(), GraphNode::new(node));
            }
        }
    }

    /// Drop a node with its params, its layout vertex and every record pointing at either.
    pub fn remove_node(&mut self, node_id: &GraphObjectId) -> bool {
        if self.nodes.remove(node_id).is_none() {
            return false;
        }
        self.graph.remove_vertex(node_id);

        let mut removed_params = Vec::new();
        self.params.retain(|param_id, param| {
            let owned = &param.node_id == node_id;
            if owned {
                removed_params.push(param_id.clone());
            }
            !owned
        });
        for node in self.nodes.values_mut() {
            node.edges.retain(|record| {
                !record.targets_node(node_id)
                    && !removed_params
                        .iter()
                        .any(|param_id| record.targets_param(param_id))
            });
        }
        true
    }

    /// Index a param under its owning node. Requires the node to be tracked.
    pub fn insert_param(&mut self, param: AudioParam) -> bool {
        let Some(node) = self.nodes.get_mut(&param.node_id) else {
            return false;
        };
        if !node.params.contains(&param.param_id) {
            node.params.push(param.param_id.clone());
        }
        self.params.insert(
            param.param_id.clone(),
            GraphParam {
                node_id: param.node_id.clone(),
                param,
            },
        );
        true
    }

    /// Remove a param tracked under `node_id` from the node and from the index, together with
    /// every record targeting it. A shared layout edge goes once no other param keeps it mapped.
    pub fn remove_param(&mut self, node_id: &GraphObjectId, param_id: &GraphObjectId) -> bool {
        let Some(node) = self.nodes.get_mut(node_id) else {
            return false;
        };
        if !node.params.contains(param_id) {
            return false;
        }
        node.params.retain(|id| id != param_id);
        self.params.remove(param_id);

        let mut orphaned = Vec::new();
        for (source_id, source) in self.nodes.iter_mut() {
            source.edges.retain(|record| {
                if record.targets_param(param_id) {
                    orphaned.push((source_id.clone(), record.source_output_index));
                    false
                } else {
                    true
                }
            });
        }
        orphaned.sort();
        orphaned.dedup();
        for (source_id, output) in orphaned {
            if !self.param_edge_mapped(&source_id, node_id, output) {
                self.graph
                    .remove_edge(&source_id, node_id, &param_edge_name(output));
            }
        }
        true
    }

    pub fn connect_nodes(&mut self, params: &NodesConnectionParams) -> bool {
        if !self.nodes.contains_key(&params.destination_id) {
            return false;
        }
        let Some(source) = self.nodes.get_mut(&params.source_id) else {
            return false;
        };
        source.edges.push(ConnectionRecord::to_node(params));
        self.graph.set_edge(
            &params.source_id,
            &params.destination_id,
            node_edge_name(params.source_output_index, params.destination_input_index),
            LayoutEdge::node(params.source_output_index, params.destination_input_index),
        );
        true
    }

    /// Remove one matching record; the layout edge goes once no identical record remains.
    pub fn disconnect_nodes(&mut self, params: &NodesConnectionParams) -> bool {
        if !self.nodes.contains_key(&params.destination_id) {
            return false;
        }
        let Some(source) = self.nodes.get_mut(&params.source_id) else {
            return false;
        };
        let record = ConnectionRecord::to_node(params);
        if let Some(position) = source.edges.iter().position(|existing| existing == &record) {
            source.edges.remove(position);
        }
        if !source.edges.contains(&record) {
            self.graph.remove_edge(
                &params.source_id,
                &params.destination_id,
                &node_edge_name(params.source_output_index, params.destination_input_index),
            );
        }
        true
    }

    /// Connect a node output to a param; the layout edge lands on the param's owner.
    pub fn connect_param(&mut self, params: &NodeParamConnectionParams) -> bool {
        let Some(owner) = self.param_owner(&params.destination_id) else {
            return false;
        };
        let Some(source) = self.nodes.get_mut(&params.source_id) else {
            return false;
        };
        source.edges.push(ConnectionRecord::to_param(params));
        self.graph.set_edge(
            &params.source_id,
            &owner,
            param_edge_name(params.source_output_index),
            LayoutEdge::param(params.source_output_index, &params.destination_id),
        );
        true
    }

    /// Remove one matching param record. The layout edge is shared by every param of the owner
    /// on the same output, so it goes only when none of them is still connected.
    pub fn disconnect_param(&mut self, params: &NodeParamConnectionParams) -> bool {
        let Some(owner) = self.param_owner(&params.destination_id) else {
            return false;
        };
        let Some(source) = self.nodes.get_mut(&params.source_id) else {
            return false;
        };
        let record = ConnectionRecord::to_param(params);
        if let Some(position) = source.edges.iter().position(|existing| existing == &record) {
            source.edges.remove(position);
        }
        if !self.param_edge_mapped(&params.source_id, &owner, params.source_output_index) {
            self.graph.remove_edge(
                &params.source_id,
                &owner,
                &param_edge_name(params.source_output_index),
            );
        }
        true
    }

    /// Whether `source` still feeds some tracked param of `owner` from `output`.
    fn param_edge_mapped(&self, source: &GraphObjectId, owner: &GraphObjectId, output: u32) -> bool {
        let Some(source) = self.nodes.get(source) else {
            return false;
        };
        source.edges.iter().any(|record| {
            record.source_output_index == output
                && match &record.destination {
                    ConnectionDestination::Param {
                        destination_param_id,
                    } => self
                        .params
                        .get(destination_param_id)
                        .is_some_and(|param| &param.node_id == owner),
                    ConnectionDestination::Node { .. } => false,
                }
        })
    }

    /// Owning node of a tracked param, provided that node is tracked too.
    fn param_owner(&self, param_id: &GraphObjectId) -> Option<GraphObjectId> {
        let param = self.params.get(param_id)?;
        self.nodes
            .contains_key(&param.node_id)
            .then(|| param.node_id.clone())
    }
}

/// Snapshot handed downstream after a context changes.
#[derive(Clone, Debug)]
pub enum ContextUpdate {
    Active(Box<GraphContext>),
    /// Terminal marker: the context is gone and its lane completes.
    Destroyed(GraphObjectId),
}

impl ContextUpdate {
    pub fn active(context: &GraphContext) -> Self {
        Self::Active(Box::new(context.clone()))
    }

    pub fn id(&self) -> &GraphObjectId {
        match self {
            Self::Active(context) => &context.id,
            Self::Destroyed(id) => id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Destroyed(_))
    }

    pub fn as_active(&self) -> Option<&GraphContext> {
        match self {
            Self::Active(context) => Some(context.as_ref()),
            Self::Destroyed(_) => None,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    fn id(raw: &str) -> GraphObjectId {
        GraphObjectId::from(raw)
    }

    fn chain() -> GraphContext {
        let mut ctx = GraphContext::new(context("c"));
        ctx.insert_node(node("c", "osc", "OscillatorNode"));
        ctx.insert_node(node("c", "gain", "GainNode"));
        ctx.insert_node(node("c", "lfo", "OscillatorNode"));
        assert!(ctx.insert_param(param("c", "gain", "gain.gain")));
        assert!(ctx.insert_param(param("c", "osc", "osc.frequency")));
        ctx
    }

    #[test]
    fn node_connection_adds_record_and_layout_edge() {
        let mut ctx = chain();
        assert!(ctx.connect_nodes(&link("c", "osc", "gain", 0, 0)));
        assert_eq!(ctx.nodes[&id("osc")].edges.len(), 1);
        assert!(ctx.graph.edge(&id("osc"), &id("gain"), "0,0").is_some());
    }

    #[test]
    fn connection_to_unknown_node_is_rejected() {
        let mut ctx = chain();
        assert!(!ctx.connect_nodes(&link("c", "osc", "ghost", 0, 0)));
        assert!(!ctx.connect_nodes(&link("c", "ghost", "gain", 0, 0)));
        assert!(ctx.nodes[&id("osc")].edges.is_empty());
        assert_eq!(ctx.graph.edge_count(), 0);
    }

    #[test]
    fn disconnect_removes_exactly_one_record() {
        let mut ctx = chain();
        ctx.connect_nodes(&link("c", "osc", "gain", 0, 0));
        ctx.connect_nodes(&link("c", "osc", "gain", 0, 0));
        ctx.connect_nodes(&link("c", "osc", "gain", 0, 1));

        assert!(ctx.disconnect_nodes(&link("c", "osc", "gain", 0, 0)));
        assert_eq!(ctx.nodes[&id("osc")].edges.len(), 2);
        assert!(ctx.graph.edge(&id("osc"), &id("gain"), "0,0").is_some());

        ctx.disconnect_nodes(&link("c", "osc", "gain", 0, 0));
        assert!(ctx.graph.edge(&id("osc"), &id("gain"), "0,0").is_none());
        assert!(ctx.graph.edge(&id("osc"), &id("gain"), "0,1").is_some());
    }

    #[test]
    fn disconnect_without_record_leaves_state() {
        let mut ctx = chain();
        ctx.connect_nodes(&link("c", "osc", "gain", 0, 0));
        assert!(ctx.disconnect_nodes(&link("c", "osc", "gain", 1, 0)));
        assert_eq!(ctx.nodes[&id("osc")].edges.len(), 1);
        assert_eq!(ctx.graph.edge_count(), 1);
    }

    #[test]
    fn param_connection_lands_on_owner() {
        let mut ctx = chain();
        assert!(ctx.connect_param(&param_link("c", "lfo", "gain.gain", 0)));
        let edge = ctx.graph.edge(&id("lfo"), &id("gain"), "0").expect("param edge");
        assert_eq!(edge.destination_param_id, "gain.gain");
        assert_eq!(edge.destination_input_index, -1);
        assert!(!ctx.connect_param(&param_link("c", "lfo", "missing", 0)));
    }

    #[test]
    fn shared_param_edge_survives_partial_disconnect() {
        let mut ctx = chain();
        ctx.insert_param(param("c", "gain", "gain.detune"));
        ctx.connect_param(&param_link("c", "lfo", "gain.gain", 0));
        ctx.connect_param(&param_link("c", "lfo", "gain.detune", 0));

        assert!(ctx.disconnect_param(&param_link("c", "lfo", "gain.gain", 0)));
        assert!(ctx.graph.edge(&id("lfo"), &id("gain"), "0").is_some());

        assert!(ctx.disconnect_param(&param_link("c", "lfo", "gain.detune", 0)));
        assert!(ctx.graph.edge(&id("lfo"), &id("gain"), "0").is_none());
        assert!(ctx.nodes[&id("lfo")].edges.is_empty());
    }

    #[test]
    fn removing_node_prunes_params_and_inbound_records() {
        let mut ctx = chain();
        ctx.connect_nodes(&link("c", "osc", "gain", 0, 0));
        ctx.connect_param(&param_link("c", "lfo", "gain.gain", 0));
        ctx.connect_param(&param_link("c", "lfo", "osc.frequency", 0));

        assert!(ctx.remove_node(&id("gain")));
        assert!(!ctx.nodes.contains_key(&id("gain")));
        assert!(!ctx.params.contains_key(&id("gain.gain")));
        assert!(ctx.nodes[&id("osc")].edges.is_empty());
        assert_eq!(ctx.nodes[&id("lfo")].edges.len(), 1);
        assert!(!ctx.graph.has_vertex(&id("gain")));
        assert_eq!(ctx.graph.edge_count(), 1);
        assert!(!ctx.remove_node(&id("gain")));
    }

    #[test]
    fn param_lifecycle_updates_node_and_index() {
        let mut ctx = chain();
        assert!(!ctx.insert_param(param("c", "ghost", "ghost.gain")));
        assert!(ctx.remove_param(&id("gain"), &id("gain.gain")));
        assert!(ctx.nodes[&id("gain")].params.is_empty());
        assert!(!ctx.params.contains_key(&id("gain.gain")));
        assert!(!ctx.remove_param(&id("gain"), &id("gain.gain")));
        assert!(!ctx.remove_param(&id("gain"), &id("osc.frequency")));
        assert!(ctx.params.contains_key(&id("osc.frequency")));
    }

    #[test]
    fn destroying_connected_param_clears_records_and_edge() {
        let mut ctx = chain();
        ctx.connect_nodes(&link("c", "lfo", "gain", 0, 0));
        ctx.connect_param(&param_link("c", "lfo", "gain.gain", 0));

        assert!(ctx.remove_param(&id("gain"), &id("gain.gain")));
        assert_eq!(ctx.nodes[&id("lfo")].edges.len(), 1);
        assert!(ctx.nodes[&id("lfo")].edges[0].targets_node(&id("gain")));
        assert!(ctx.graph.edge(&id("lfo"), &id("gain"), "0").is_none());
        assert!(ctx.graph.edge(&id("lfo"), &id("gain"), "0,0").is_some());
        assert!(!ctx.disconnect_param(&param_link("c", "lfo", "gain.gain", 0)));
    }

    #[test]
    fn destroying_one_of_shared_params_keeps_edge() {
        let mut ctx = chain();
        ctx.insert_param(param("c", "gain", "gain.detune"));
        ctx.connect_param(&param_link("c", "lfo", "gain.gain", 0));
        ctx.connect_param(&param_link("c", "lfo", "gain.detune", 0));

        ctx.remove_param(&id("gain"), &id("gain.gain"));
        assert!(ctx.graph.edge(&id("lfo"), &id("gain"), "0").is_some());
        assert_eq!(ctx.nodes[&id("lfo")].edges.len(), 1);

        ctx.remove_param(&id("gain"), &id("gain.detune"));
        assert!(ctx.graph.edge(&id("lfo"), &id("gain"), "0").is_none());
        assert!(ctx.nodes[&id("lfo")].edges.is_empty());
    }

    #[test]
    fn params_then_node_teardown_leaves_no_residue() {
        let mut ctx = chain();
        ctx.connect_nodes(&link("c", "osc", "gain", 0, 0));
        ctx.connect_param(&param_link("c", "lfo", "gain.gain", 0));
        ctx.connect_param(&param_link("c", "lfo", "osc.frequency", 0));

        assert!(ctx.remove_param(&id("gain"), &id("gain.gain")));
        assert!(ctx.remove_node(&id("gain")));

        assert!(ctx.params.get(&id("gain.gain")).is_none());
        assert!(ctx.nodes[&id("osc")].edges.is_empty());
        let lfo_edges = &ctx.nodes[&id("lfo")].edges;
        assert_eq!(lfo_edges.len(), 1);
        assert!(lfo_edges[0].targets_param(&id("osc.frequency")));
        assert_eq!(ctx.graph.edge_count(), 1);
        assert!(ctx.graph.edge(&id("lfo"), &id("osc"), "0").is_some());
    }

    #[test]
    fn repeated_node_creation_keeps_relations() {
        let mut ctx = chain();
        ctx.connect_nodes(&link("c", "osc", "gain", 0, 0));
        let mut refreshed = node("c", "osc", "OscillatorNode");
        refreshed.channel_count = 1.0;
        ctx.insert_node(refreshed);
        let osc = &ctx.nodes[&id("osc")];
        assert_eq!(osc.node.channel_count, 1.0);
        assert_eq!(osc.edges.len(), 1);
        assert_eq!(osc.params, vec![id("osc.frequency")]);
    }

    #[test]
    fn records_serialize_flat() {
        let node_record = ConnectionRecord::to_node(&link("c", "a", "b", 1, 2));
        assert_eq!(
            serde_json::to_value(&node_record).unwrap(),
            json!({"sourceId": "a", "sourceOutputIndex": 1, "destinationId": "b", "destinationInputIndex": 2})
        );
        let param_record = ConnectionRecord::to_param(&param_link("c", "a", "p", 0));
        let value = serde_json::to_value(&param_record).unwrap();
        assert_eq!(value["destinationParamId"], "p");
        let back: ConnectionRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, param_record);
    }
}
