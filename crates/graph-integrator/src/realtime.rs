//! Periodic `getRealtimeData` polling, one lane per live context.

use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::events::{ContextRealtimeData, GET_REALTIME_DATA};
use cdp_adapter::{CdpTransport, CommandTarget, GraphObjectId, RouteLookup};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::IntegratorConfig;
use crate::error::{invariant, InvariantError, RealtimeDataError};
use crate::metrics;

/// Telemetry reading tagged with the subscription that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct RealtimeSample {
    pub context_id: GraphObjectId,
    pub subscription: u64,
    pub data: ContextRealtimeData,
}

/// Delivery end of one subscription.
#[derive(Clone, Debug)]
pub struct RealtimeSink {
    context_id: GraphObjectId,
    subscription: u64,
    tx: mpsc::Sender<RealtimeSample>,
}

impl RealtimeSink {
    pub fn new(context_id: GraphObjectId, subscription: u64, tx: mpsc::Sender<RealtimeSample>) -> Self {
        Self {
            context_id,
            subscription,
            tx,
        }
    }

    pub fn context_id(&self) -> &GraphObjectId {
        &self.context_id
    }

    pub fn subscription(&self) -> u64 {
        self.subscription
    }

    /// Returns `false` once the receiving side is gone.
    pub async fn send(&self, data: ContextRealtimeData) -> bool {
        self.tx
            .send(RealtimeSample {
                context_id: self.context_id.clone(),
                subscription: self.subscription,
                data,
            })
            .await
            .is_ok()
    }
}

/// Handle to a polling lane. Cancelling or dropping it stops the lane before its next request.
#[derive(Debug)]
pub struct RealtimeSubscription {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RealtimeSubscription {
    pub fn spawned(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Subscription tracking only a cancellation token, with no task of its own.
    pub fn detached(cancel: CancellationToken) -> Self {
        Self { cancel, task: None }
    }

    /// Subscription with no lane behind it.
    pub fn inert() -> Self {
        Self::detached(CancellationToken::new())
    }

    pub fn cancel(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Starts telemetry lanes for newly created contexts.
pub trait RealtimeSource: Send + Sync {
    fn subscribe(&self, sink: RealtimeSink) -> RealtimeSubscription;
}

/// Source used when telemetry polling is switched off.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledRealtime;

impl RealtimeSource for DisabledRealtime {
    fn subscribe(&self, sink: RealtimeSink) -> RealtimeSubscription {
        debug!(
            target: "audion-realtime",
            context_id = %sink.context_id(),
            "realtime polling disabled"
        );
        RealtimeSubscription::inert()
    }
}

#[derive(Clone)]
pub struct RealtimePoller {
    transport: Arc<dyn CdpTransport>,
    routes: Arc<dyn RouteLookup>,
    interval: Duration,
    timeout: Duration,
}

impl RealtimePoller {
    pub fn new(
        transport: Arc<dyn CdpTransport>,
        routes: Arc<dyn RouteLookup>,
        config: &IntegratorConfig,
    ) -> Self {
        Self::with_timing(
            transport,
            routes,
            config.realtime_interval(),
            config.realtime_timeout(),
        )
    }

    pub fn with_timing(
        transport: Arc<dyn CdpTransport>,
        routes: Arc<dyn RouteLookup>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            routes,
            interval,
            timeout,
        }
    }

    /// One `getRealtimeData` round trip, bounded by the request timeout.
    pub async fn request(
        &self,
        target: CommandTarget,
        context_id: &GraphObjectId,
    ) -> Result<ContextRealtimeData, RealtimeDataError> {
        metrics::record_realtime_request();
        let command = self.transport.send_command(
            target,
            GET_REALTIME_DATA,
            json!({ "contextId": context_id }),
        );
        let response = match timeout(self.timeout, command).await {
            Ok(result) => result.map_err(RealtimeDataError::from_transport)?,
            Err(_) => return Err(RealtimeDataError::Timeout(self.timeout)),
        };

        let data = response.get("realtimeData").cloned().unwrap_or(Value::Null);
        invariant(
            !data.is_null(),
            "ContextRealtimeData not returned for WebAudio context %0.",
            [context_id],
        )?;
        serde_json::from_value(data).map_err(|err| {
            RealtimeDataError::from(InvariantError::new(
                "ContextRealtimeData for WebAudio context %0 is malformed: %1",
                [context_id.to_string(), err.to_string()],
            ))
        })
    }

    async fn run_lane(self, sink: RealtimeSink, cancel: CancellationToken) {
        let context_id = sink.context_id().clone();
        let target = self.routes.command_target(&context_id);
        debug!(
            target: "audion-realtime",
            context_id = %context_id,
            ?target,
            "realtime lane started"
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.request(target.clone(), &context_id) => result,
            };
            match result {
                Ok(data) => {
                    let delivered = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        delivered = sink.send(data) => delivered,
                    };
                    if !delivered {
                        break;
                    }
                }
                Err(err) => {
                    metrics::record_realtime_failure(err.reason());
                    if !err.terminates_lane() {
                        warn!(
                            target: "audion-realtime",
                            context_id = %context_id,
                            error = %err,
                            "realtime sample skipped"
                        );
                        continue;
                    }
                    match &err {
                        RealtimeDataError::ContextNotFound | RealtimeDataError::RealtimeOnly => {
                            info!(
                                target: "audion-realtime",
                                context_id = %context_id,
                                error = %err,
                                "realtime lane closed"
                            );
                        }
                        _ => {
                            error!(
                                target: "audion-realtime",
                                context_id = %context_id,
                                error = %err,
                                "realtime lane failed"
                            );
                        }
                    }
                    break;
                }
            }
        }
        debug!(target: "audion-realtime", context_id = %context_id, "realtime lane stopped");
    }
}

impl RealtimeSource for RealtimePoller {
    fn subscribe(&self, sink: RealtimeSink) -> RealtimeSubscription {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.clone().run_lane(sink, cancel.clone()));
        RealtimeSubscription::spawned(cancel, task)
    }
}
