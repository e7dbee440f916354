//! Routing tables tracking nested frames attached through auto-attach and the audio contexts
//! they created.

use dashmap::DashMap;
use serde::Deserialize;
use tracing::debug;

use crate::events::{CONTEXT_CREATED, CONTEXT_WILL_BE_DESTROYED};
use crate::ids::GraphObjectId;
use crate::transport::{CommandTarget, TransportEvent};

const ATTACHED_TO_TARGET: &str = "Target.attachedToTarget";
const DETACHED_FROM_TARGET: &str = "Target.detachedFromTarget";

/// Read-only view of the routing tables.
pub trait RouteLookup: Send + Sync {
    /// Frame target that created the audio context, if it lives in a nested frame.
    fn frame_for_context(&self, context: &GraphObjectId) -> Option<String>;
    /// Child session currently attached to the frame target.
    fn session_for_frame(&self, frame: &str) -> Option<String>;

    /// Session a context's commands must be addressed to.
    ///
    /// A context is routed to its frame's session only while both the context→frame binding and
    /// the frame's session exist; everything else goes to the top-level tab.
    fn command_target(&self, context: &GraphObjectId) -> CommandTarget {
        self.frame_for_context(context)
            .and_then(|frame| self.session_for_frame(&frame))
            .map(CommandTarget::Session)
            .unwrap_or(CommandTarget::Tab)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachedToTargetParams {
    session_id: String,
    target_info: TargetInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetInfo {
    target_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetachedFromTargetParams {
    session_id: String,
}

#[derive(Deserialize)]
struct ContextCreatedParams {
    context: ContextRef,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextRef {
    context_id: GraphObjectId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextDestroyedParams {
    context_id: GraphObjectId,
}

/// Concurrent frame/session/context routing registry.
#[derive(Default)]
pub struct FrameRoutes {
    frame_sessions: DashMap<String, String>,
    session_frames: DashMap<String, String>,
    context_frames: DashMap<GraphObjectId, String>,
}

impl FrameRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_frame(&self, frame: impl Into<String>, session: impl Into<String>) {
        let frame = frame.into();
        let session = session.into();
        self.session_frames.insert(session.clone(), frame.clone());
        self.frame_sessions.insert(frame, session);
    }

    pub fn detach_session(&self, session: &str) {
        if let Some((_, frame)) = self.session_frames.remove(session) {
            self.frame_sessions
                .remove_if(&frame, |_, current| current == session);
        }
    }

    pub fn bind_context(&self, context: GraphObjectId, frame: impl Into<String>) {
        self.context_frames.insert(context, frame.into());
    }

    pub fn unbind_context(&self, context: &GraphObjectId) {
        self.context_frames.remove(context);
    }

    pub fn frame_for_session(&self, session: &str) -> Option<String> {
        self.session_frames
            .get(session)
            .map(|entry| entry.value().clone())
    }

    /// Update the tables from an event on the merged stream. Unrelated or malformed events are
    /// ignored; the integrator reports malformed `WebAudio` payloads on its own.
    pub fn observe(&self, event: &TransportEvent) {
        match event.method.as_str() {
            ATTACHED_TO_TARGET => {
                if let Ok(params) = AttachedToTargetParams::deserialize(&event.params) {
                    debug!(
                        target: "cdp-adapter",
                        frame = %params.target_info.target_id,
                        session = %params.session_id,
                        "nested target attached"
                    );
                    self.attach_frame(params.target_info.target_id, params.session_id);
                }
            }
            DETACHED_FROM_TARGET => {
                if let Ok(params) = DetachedFromTargetParams::deserialize(&event.params) {
                    self.detach_session(&params.session_id);
                }
            }
            CONTEXT_CREATED => {
                let Some(session) = event.session_id.as_deref() else {
                    return;
                };
                let Some(frame) = self.frame_for_session(session) else {
                    return;
                };
                if let Ok(params) = ContextCreatedParams::deserialize(&event.params) {
                    self.bind_context(params.context.context_id, frame);
                }
            }
            CONTEXT_WILL_BE_DESTROYED => {
                if let Ok(params) = ContextDestroyedParams::deserialize(&event.params) {
                    self.unbind_context(&params.context_id);
                }
            }
            _ => {}
        }
    }
}

impl RouteLookup for FrameRoutes {
    fn frame_for_context(&self, context: &GraphObjectId) -> Option<String> {
        self.context_frames
            .get(context)
            .map(|entry| entry.value().clone())
    }

    fn session_for_frame(&self, frame: &str) -> Option<String> {
        self.frame_sessions
            .get(frame)
            .map(|entry| entry.value().clone())
    }
}
