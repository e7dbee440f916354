//! Standing map of every live context, fanned out to connected panels.

use std::collections::BTreeMap;
use std::sync::Arc;

use audion_graph::SerializedGraphContext;
use cdp_adapter::GraphObjectId;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

use crate::panel::DevtoolsMessage;

type GraphMap = BTreeMap<GraphObjectId, SerializedGraphContext>;

struct Shared {
    graphs: RwLock<GraphMap>,
    updates: broadcast::Sender<SerializedGraphContext>,
}

impl Shared {
    /// Snapshot the map and subscribe under one lock so no update falls between the two.
    fn snapshot_and_subscribe(&self) -> (GraphMap, broadcast::Receiver<SerializedGraphContext>) {
        let graphs = self.graphs.read();
        (graphs.clone(), self.updates.subscribe())
    }
}

#[derive(Clone)]
pub struct SessionAggregator {
    shared: Arc<Shared>,
}

impl SessionAggregator {
    pub fn new(buffer: usize) -> Self {
        let (updates, _) = broadcast::channel(buffer.max(1));
        Self {
            shared: Arc::new(Shared {
                graphs: RwLock::new(BTreeMap::new()),
                updates,
            }),
        }
    }

    /// Replace the context's entry, or evict it for a terminal snapshot, then notify panels.
    pub fn apply(&self, snapshot: SerializedGraphContext) {
        let mut graphs = self.shared.graphs.write();
        if snapshot.is_terminal() {
            graphs.remove(&snapshot.id);
            debug!(target: "audion-session", context_id = %snapshot.id, "context evicted");
        } else {
            graphs.insert(snapshot.id.clone(), snapshot.clone());
        }
        // No connected panel is fine.
        let _ = self.shared.updates.send(snapshot);
    }

    pub fn all_graphs(&self) -> GraphMap {
        self.shared.graphs.read().clone()
    }

    pub fn graph(&self, id: &GraphObjectId) -> Option<SerializedGraphContext> {
        self.shared.graphs.read().get(id).cloned()
    }

    pub fn connect(&self) -> PanelConnection {
        let (graphs, updates) = self.shared.snapshot_and_subscribe();
        PanelConnection {
            shared: Arc::clone(&self.shared),
            updates,
            pending: Some(DevtoolsMessage::AllGraphs { all_graphs: graphs }),
        }
    }

    pub fn panel_count(&self) -> usize {
        self.shared.updates.receiver_count()
    }
}

/// One panel's view: the full map first, then incremental updates.
pub struct PanelConnection {
    shared: Arc<Shared>,
    updates: broadcast::Receiver<SerializedGraphContext>,
    pending: Option<DevtoolsMessage>,
}

impl PanelConnection {
    pub async fn next(&mut self) -> Option<DevtoolsMessage> {
        if let Some(message) = self.pending.take() {
            return Some(message);
        }
        match self.updates.recv().await {
            Ok(graph_context) => Some(DevtoolsMessage::GraphContext { graph_context }),
            Err(RecvError::Lagged(skipped)) => Some(self.resync(skipped)),
            Err(RecvError::Closed) => None,
        }
    }

    /// Next message if one is ready without waiting.
    pub fn try_next(&mut self) -> Option<DevtoolsMessage> {
        if let Some(message) = self.pending.take() {
            return Some(message);
        }
        match self.updates.try_recv() {
            Ok(graph_context) => Some(DevtoolsMessage::GraphContext { graph_context }),
            Err(TryRecvError::Lagged(skipped)) => Some(self.resync(skipped)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    fn resync(&mut self, skipped: u64) -> DevtoolsMessage {
        warn!(target: "audion-session", skipped, "panel lagged; resending all graphs");
        let (graphs, updates) = self.shared.snapshot_and_subscribe();
        self.updates = updates;
        DevtoolsMessage::AllGraphs { all_graphs: graphs }
    }
}
