//! Incremental reconstruction of WebAudio graphs from a debugging session.
//!
//! [`GraphIntegrator`] folds protocol events into one [`GraphContext`] per audio context and
//! merges in realtime telemetry polled by a [`RealtimeSource`]. Its snapshots pass through the
//! per-context debounce lanes in [`partition`] and are flattened by [`serialize_graph_context`]
//! for the panel.

pub mod config;
pub mod error;
pub mod integrator;
pub mod layout;
pub mod metrics;
pub mod model;
pub mod partition;
pub mod realtime;
pub mod serialize;

pub use config::IntegratorConfig;
pub use error::{invariant, InvariantError, RealtimeDataError};
pub use integrator::GraphIntegrator;
pub use layout::{LayoutEdge, LayoutEdgeKind, LayoutGraph, LayoutVertex};
pub use model::{ConnectionDestination, ConnectionRecord, ContextUpdate, GraphContext, GraphNode, GraphParam};
pub use partition::{run_lanes, LaneItem, PartitionDebounce};
pub use realtime::{
    DisabledRealtime, RealtimePoller, RealtimeSample, RealtimeSink, RealtimeSource,
    RealtimeSubscription,
};
pub use serialize::{serialize_graph_context, SerializedGraph, SerializedGraphContext};
