//! Wires a debugging transport through the integrator, the debounce lanes and the serializer
//! into a [`SessionAggregator`].

use std::sync::Arc;

use audion_graph::{
    run_lanes, serialize_graph_context, ContextUpdate, DisabledRealtime, GraphIntegrator,
    IntegratorConfig, RealtimePoller, RealtimeSource,
};
use cdp_adapter::{CdpTransport, CommandTarget, FrameRoutes, TransportEvent};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregator::{PanelConnection, SessionAggregator};
use crate::errors::SessionError;
use crate::panel::{DevtoolsRequest, COLLECT_GARBAGE_METHOD};

pub const DEFAULT_PANEL_BUFFER: usize = 256;

pub struct DevtoolSession {
    transport: Arc<dyn CdpTransport>,
    routes: Arc<FrameRoutes>,
    aggregator: SessionAggregator,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DevtoolSession {
    /// Start the transport and spawn the pipeline tasks.
    pub async fn start(
        config: &IntegratorConfig,
        transport: Arc<dyn CdpTransport>,
        routes: Arc<FrameRoutes>,
    ) -> Result<Self, SessionError> {
        Self::start_with_aggregator(
            config,
            transport,
            routes,
            SessionAggregator::new(DEFAULT_PANEL_BUFFER),
        )
        .await
    }

    pub async fn start_with_aggregator(
        config: &IntegratorConfig,
        transport: Arc<dyn CdpTransport>,
        routes: Arc<FrameRoutes>,
        aggregator: SessionAggregator,
    ) -> Result<Self, SessionError> {
        transport.start().await?;

        let realtime: Arc<dyn RealtimeSource> = if config.realtime_enabled {
            Arc::new(RealtimePoller::new(
                Arc::clone(&transport),
                routes.clone(),
                config,
            ))
        } else {
            Arc::new(DisabledRealtime)
        };

        let buffer = config.event_buffer.max(1);
        let (events_tx, events_rx) = mpsc::channel::<TransportEvent>(buffer);
        let (updates_tx, updates_rx) = mpsc::channel::<ContextUpdate>(buffer);
        let (lanes_tx, mut lanes_rx) = mpsc::channel::<ContextUpdate>(buffer);
        let shutdown = CancellationToken::new();

        let pump = {
            let transport = Arc::clone(&transport);
            let routes = Arc::clone(&routes);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        event = transport.next_event() => match event {
                            Some(event) => {
                                routes.observe(&event);
                                if events_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                debug!(target: "audion-session", "transport stream ended");
                                break;
                            }
                        },
                    }
                }
            })
        };

        let integrator = tokio::spawn(GraphIntegrator::new(realtime).run(events_rx, updates_tx));
        let lanes = tokio::spawn(run_lanes(config.debounce_window(), updates_rx, lanes_tx));

        let sink = {
            let aggregator = aggregator.clone();
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                while let Some(update) = lanes_rx.recv().await {
                    aggregator.apply(serialize_graph_context(&update, routes.as_ref()));
                }
            })
        };

        info!(
            target: "audion-session",
            realtime = config.realtime_enabled,
            debounce_ms = config.debounce_ms,
            "devtool session started"
        );
        Ok(Self {
            transport,
            routes,
            aggregator,
            shutdown,
            tasks: vec![pump, integrator, lanes, sink],
        })
    }

    pub fn aggregator(&self) -> &SessionAggregator {
        &self.aggregator
    }

    pub fn routes(&self) -> &Arc<FrameRoutes> {
        &self.routes
    }

    pub fn connect(&self) -> PanelConnection {
        self.aggregator.connect()
    }

    /// Relay a panel request to the inspected tab. Unknown requests are ignored.
    pub async fn handle_request(&self, request: DevtoolsRequest) -> Result<(), SessionError> {
        match request {
            DevtoolsRequest::CollectGarbage => {
                self.transport
                    .send_command(CommandTarget::Tab, COLLECT_GARBAGE_METHOD, json!({}))
                    .await?;
                debug!(target: "audion-session", "garbage collection requested");
            }
            DevtoolsRequest::Unknown => {
                debug!(target: "audion-session", "unknown panel request ignored");
            }
        }
        Ok(())
    }

    /// Wait for the pipeline to drain after the transport stream ends.
    pub async fn closed(mut self) -> Result<(), SessionError> {
        self.join_all().await
    }

    /// Stop reading from the transport, then let the pipeline drain.
    pub async fn shutdown(mut self) -> Result<(), SessionError> {
        self.shutdown.cancel();
        self.join_all().await
    }

    async fn join_all(&mut self) -> Result<(), SessionError> {
        for task in self.tasks.drain(..) {
            match task.await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {}
                Err(err) => return Err(err.into()),
            }
        }
        info!(target: "audion-session", "devtool session closed");
        Ok(())
    }
}

impl Drop for DevtoolSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
