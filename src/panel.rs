//! Messages exchanged with the rendering panel.

use std::collections::BTreeMap;

use audion_graph::SerializedGraphContext;
use cdp_adapter::GraphObjectId;
use serde::{Deserialize, Serialize};

/// Garbage collection command relayed to the inspected tab.
pub const COLLECT_GARBAGE_METHOD: &str = "HeapProfiler.collectGarbage";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DevtoolsMessage {
    /// Every live context, sent when a panel connects or resyncs.
    AllGraphs {
        #[serde(rename = "allGraphs")]
        all_graphs: BTreeMap<GraphObjectId, SerializedGraphContext>,
    },
    /// One context changed or was destroyed.
    GraphContext {
        #[serde(rename = "graphContext")]
        graph_context: SerializedGraphContext,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DevtoolsRequest {
    CollectGarbage,
    #[serde(other)]
    Unknown,
}
