//! Folds `WebAudio` protocol events into per-context graphs.

use std::collections::HashMap;
use std::sync::Arc;

use cdp_adapter::{GraphObjectId, TransportEvent, WebAudioEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::model::{ContextUpdate, GraphContext};
use crate::realtime::{RealtimeSample, RealtimeSink, RealtimeSource, RealtimeSubscription};

const SAMPLE_BUFFER: usize = 64;

struct ContextEntry {
    graph_context: GraphContext,
    subscription: RealtimeSubscription,
    subscription_id: u64,
}

/// Owns every live context and its telemetry subscription.
pub struct GraphIntegrator {
    contexts: HashMap<GraphObjectId, ContextEntry>,
    realtime: Arc<dyn RealtimeSource>,
    samples_tx: mpsc::Sender<RealtimeSample>,
    samples_rx: mpsc::Receiver<RealtimeSample>,
    next_subscription: u64,
}

enum Input {
    Event(Option<TransportEvent>),
    Sample(RealtimeSample),
}

impl GraphIntegrator {
    pub fn new(realtime: Arc<dyn RealtimeSource>) -> Self {
        let (samples_tx, samples_rx) = mpsc::channel(SAMPLE_BUFFER);
        Self {
            contexts: HashMap::new(),
            realtime,
            samples_tx,
            samples_rx,
            next_subscription: 0,
        }
    }

    pub fn context(&self, id: &GraphObjectId) -> Option<&GraphContext> {
        self.contexts.get(id).map(|entry| &entry.graph_context)
    }

    pub fn context_ids(&self) -> impl Iterator<Item = &GraphObjectId> + '_ {
        self.contexts.keys()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Parse and apply a raw protocol event. Methods outside the graph domain and malformed
    /// payloads are dropped.
    pub fn apply_transport(&mut self, event: &TransportEvent) -> Option<ContextUpdate> {
        match WebAudioEvent::from_transport(event) {
            Ok(Some(parsed)) => self.apply(parsed),
            Ok(None) => {
                metrics::record_event_ignored();
                None
            }
            Err(err) => {
                metrics::record_event_ignored();
                warn!(
                    target: "audion-integrator",
                    method = %event.method,
                    error = %err,
                    "malformed WebAudio event dropped"
                );
                None
            }
        }
    }

    pub fn apply(&mut self, event: WebAudioEvent) -> Option<ContextUpdate> {
        let method = event.method();
        let update = match event {
            WebAudioEvent::ContextCreated(params) => self.create_context(params.context),
            WebAudioEvent::ContextChanged(params) => {
                let id = params.context.context_id.clone();
                self.mutate(&id, method, |ctx| {
                    ctx.update_context(params.context);
                    true
                })
            }
            WebAudioEvent::ContextWillBeDestroyed(params) => self.destroy_context(&params.context_id),
            WebAudioEvent::AudioNodeCreated(params) => {
                let id = params.node.context_id.clone();
                self.mutate(&id, method, |ctx| {
                    ctx.insert_node(params.node);
                    true
                })
            }
            WebAudioEvent::AudioNodeWillBeDestroyed(params) => {
                self.mutate(&params.context_id, method, |ctx| ctx.remove_node(&params.node_id))
            }
            WebAudioEvent::AudioParamCreated(params) => {
                let id = params.param.context_id.clone();
                self.mutate(&id, method, |ctx| ctx.insert_param(params.param))
            }
            WebAudioEvent::AudioParamWillBeDestroyed(params) => {
                self.mutate(&params.context_id, method, |ctx| {
                    ctx.remove_param(&params.node_id, &params.param_id)
                })
            }
            WebAudioEvent::NodesConnected(params) => {
                self.mutate(&params.context_id, method, |ctx| ctx.connect_nodes(&params))
            }
            WebAudioEvent::NodesDisconnected(params) => {
                self.mutate(&params.context_id, method, |ctx| ctx.disconnect_nodes(&params))
            }
            WebAudioEvent::NodeParamConnected(params) => {
                self.mutate(&params.context_id, method, |ctx| ctx.connect_param(&params))
            }
            WebAudioEvent::NodeParamDisconnected(params) => {
                self.mutate(&params.context_id, method, |ctx| ctx.disconnect_param(&params))
            }
        };
        match &update {
            Some(_) => metrics::record_event_integrated(method),
            None => metrics::record_event_ignored(),
        }
        update
    }

    /// Store a telemetry reading. Samples for a destroyed context, or from a subscription that
    /// has since been replaced, are discarded.
    pub fn apply_realtime(&mut self, sample: RealtimeSample) -> Option<ContextUpdate> {
        let Some(entry) = self.contexts.get_mut(&sample.context_id) else {
            debug!(
                target: "audion-integrator",
                context_id = %sample.context_id,
                "late realtime sample discarded"
            );
            return None;
        };
        if entry.subscription_id != sample.subscription {
            debug!(
                target: "audion-integrator",
                context_id = %sample.context_id,
                subscription = sample.subscription,
                "stale realtime sample discarded"
            );
            return None;
        }
        entry.graph_context.set_realtime_data(sample.data);
        Some(ContextUpdate::active(&entry.graph_context))
    }

    /// Cancel every telemetry subscription. Graph state is kept.
    pub fn shutdown(&mut self) {
        for entry in self.contexts.values_mut() {
            entry.subscription.cancel();
        }
    }

    /// Drive the integrator until the event stream ends or the update receiver goes away.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<TransportEvent>,
        updates: mpsc::Sender<ContextUpdate>,
    ) {
        debug!(target: "audion-integrator", "integrator loop entered");
        loop {
            let input = tokio::select! {
                biased;
                event = events.recv() => Input::Event(event),
                Some(sample) = self.samples_rx.recv() => Input::Sample(sample),
            };
            let update = match input {
                Input::Event(Some(event)) => self.apply_transport(&event),
                Input::Event(None) => break,
                Input::Sample(sample) => self.apply_realtime(sample),
            };
            if let Some(update) = update {
                if updates.send(update).await.is_err() {
                    debug!(target: "audion-integrator", "update receiver dropped");
                    break;
                }
            }
        }
        self.shutdown();
        debug!(
            target: "audion-integrator",
            contexts = self.contexts.len(),
            "integrator loop exited"
        );
    }

    fn create_context(
        &mut self,
        context: cdp_adapter::events::BaseAudioContext,
    ) -> Option<ContextUpdate> {
        let id = context.context_id.clone();
        if self.contexts.contains_key(&id) {
            debug!(
                target: "audion-integrator",
                context_id = %id,
                "duplicate context creation ignored"
            );
            return None;
        }

        self.next_subscription += 1;
        let subscription_id = self.next_subscription;
        let subscription = self.realtime.subscribe(RealtimeSink::new(
            id.clone(),
            subscription_id,
            self.samples_tx.clone(),
        ));
        let graph_context = GraphContext::new(context);
        let update = ContextUpdate::active(&graph_context);
        info!(target: "audion-integrator", context_id = %id, "audio context created");
        self.contexts.insert(
            id,
            ContextEntry {
                graph_context,
                subscription,
                subscription_id,
            },
        );
        Some(update)
    }

    fn destroy_context(&mut self, id: &GraphObjectId) -> Option<ContextUpdate> {
        let Some(mut entry) = self.contexts.remove(id) else {
            debug!(
                target: "audion-integrator",
                context_id = %id,
                "destroy for unknown context ignored"
            );
            return None;
        };
        entry.subscription.cancel();
        info!(target: "audion-integrator", context_id = %id, "audio context destroyed");
        Some(ContextUpdate::Destroyed(id.clone()))
    }

    fn mutate<F>(&mut self, context_id: &GraphObjectId, method: &str, mutation: F) -> Option<ContextUpdate>
    where
        F: FnOnce(&mut GraphContext) -> bool,
    {
        let Some(entry) = self.contexts.get_mut(context_id) else {
            debug!(
                target: "audion-integrator",
                context_id = %context_id,
                method,
                "event for unknown context skipped"
            );
            return None;
        };
        if !mutation(&mut entry.graph_context) {
            debug!(
                target: "audion-integrator",
                context_id = %context_id,
                method,
                "event references untracked id; skipped"
            );
            return None;
        }
        Some(ContextUpdate::active(&entry.graph_context))
    }
}
