//! Typed subset of the `WebAudio` protocol domain.
//!
//! Only the events the graph integrator reacts to are modelled; every other method on the
//! stream (target and page lifecycle, audio listener events) parses to `None`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AdapterError, AdapterErrorKind};
use crate::ids::GraphObjectId;
use crate::transport::TransportEvent;

pub const CONTEXT_CREATED: &str = "WebAudio.contextCreated";
pub const CONTEXT_CHANGED: &str = "WebAudio.contextChanged";
pub const CONTEXT_WILL_BE_DESTROYED: &str = "WebAudio.contextWillBeDestroyed";
pub const AUDIO_NODE_CREATED: &str = "WebAudio.audioNodeCreated";
pub const AUDIO_NODE_WILL_BE_DESTROYED: &str = "WebAudio.audioNodeWillBeDestroyed";
pub const AUDIO_PARAM_CREATED: &str = "WebAudio.audioParamCreated";
pub const AUDIO_PARAM_WILL_BE_DESTROYED: &str = "WebAudio.audioParamWillBeDestroyed";
pub const NODES_CONNECTED: &str = "WebAudio.nodesConnected";
pub const NODES_DISCONNECTED: &str = "WebAudio.nodesDisconnected";
pub const NODE_PARAM_CONNECTED: &str = "WebAudio.nodeParamConnected";
pub const NODE_PARAM_DISCONNECTED: &str = "WebAudio.nodeParamDisconnected";

/// Command polling a context's render statistics.
pub const GET_REALTIME_DATA: &str = "WebAudio.getRealtimeData";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Realtime,
    Offline,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
    Interrupted,
}

/// Render statistics of a realtime context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRealtimeData {
    #[serde(default)]
    pub current_time: f64,
    #[serde(default)]
    pub render_capacity: f64,
    #[serde(default)]
    pub callback_interval_mean: f64,
    #[serde(default)]
    pub callback_interval_variance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseAudioContext {
    pub context_id: GraphObjectId,
    pub context_type: ContextType,
    pub context_state: ContextState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime_data: Option<ContextRealtimeData>,
    #[serde(default)]
    pub callback_buffer_size: f64,
    #[serde(default)]
    pub max_output_channel_count: f64,
    #[serde(default)]
    pub sample_rate: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioNode {
    pub node_id: GraphObjectId,
    pub context_id: GraphObjectId,
    pub node_type: String,
    #[serde(default)]
    pub number_of_inputs: f64,
    #[serde(default)]
    pub number_of_outputs: f64,
    #[serde(default)]
    pub channel_count: f64,
    #[serde(default)]
    pub channel_count_mode: String,
    #[serde(default)]
    pub channel_interpretation: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioParam {
    pub param_id: GraphObjectId,
    pub param_type: String,
    #[serde(default)]
    pub rate: String,
    #[serde(default)]
    pub default_value: f64,
    #[serde(default)]
    pub min_value: f64,
    #[serde(default)]
    pub max_value: f64,
    pub context_id: GraphObjectId,
    pub node_id: GraphObjectId,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ContextParams {
    pub context: BaseAudioContext,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextWillBeDestroyedParams {
    pub context_id: GraphObjectId,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AudioNodeCreatedParams {
    pub node: AudioNode,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioNodeWillBeDestroyedParams {
    pub context_id: GraphObjectId,
    pub node_id: GraphObjectId,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AudioParamCreatedParams {
    pub param: AudioParam,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioParamWillBeDestroyedParams {
    pub context_id: GraphObjectId,
    pub node_id: GraphObjectId,
    pub param_id: GraphObjectId,
}

/// `nodesConnected` / `nodesDisconnected` payload.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodesConnectionParams {
    pub context_id: GraphObjectId,
    pub source_id: GraphObjectId,
    pub destination_id: GraphObjectId,
    #[serde(default)]
    pub source_output_index: u32,
    #[serde(default)]
    pub destination_input_index: u32,
}

/// `nodeParamConnected` / `nodeParamDisconnected` payload; `destination_id` names a param.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeParamConnectionParams {
    pub context_id: GraphObjectId,
    pub source_id: GraphObjectId,
    pub destination_id: GraphObjectId,
    #[serde(default)]
    pub source_output_index: u32,
}

/// Closed set of `WebAudio` events folded into the graph.
#[derive(Clone, Debug, PartialEq)]
pub enum WebAudioEvent {
    ContextCreated(ContextParams),
    ContextChanged(ContextParams),
    ContextWillBeDestroyed(ContextWillBeDestroyedParams),
    AudioNodeCreated(AudioNodeCreatedParams),
    AudioNodeWillBeDestroyed(AudioNodeWillBeDestroyedParams),
    AudioParamCreated(AudioParamCreatedParams),
    AudioParamWillBeDestroyed(AudioParamWillBeDestroyedParams),
    NodesConnected(NodesConnectionParams),
    NodesDisconnected(NodesConnectionParams),
    NodeParamConnected(NodeParamConnectionParams),
    NodeParamDisconnected(NodeParamConnectionParams),
}

impl WebAudioEvent {
    /// Parse a raw protocol event. Methods outside the modelled set yield `Ok(None)`.
    pub fn from_transport(event: &TransportEvent) -> Result<Option<Self>, AdapterError> {
        Self::parse(&event.method, &event.params)
    }

    pub fn parse(method: &str, params: &Value) -> Result<Option<Self>, AdapterError> {
        let event = match method {
            CONTEXT_CREATED => Self::ContextCreated(decode(method, params)?),
            CONTEXT_CHANGED => Self::ContextChanged(decode(method, params)?),
            CONTEXT_WILL_BE_DESTROYED => Self::ContextWillBeDestroyed(decode(method, params)?),
            AUDIO_NODE_CREATED => Self::AudioNodeCreated(decode(method, params)?),
            AUDIO_NODE_WILL_BE_DESTROYED => Self::AudioNodeWillBeDestroyed(decode(method, params)?),
            AUDIO_PARAM_CREATED => Self::AudioParamCreated(decode(method, params)?),
            AUDIO_PARAM_WILL_BE_DESTROYED => {
                Self::AudioParamWillBeDestroyed(decode(method, params)?)
            }
            NODES_CONNECTED => Self::NodesConnected(decode(method, params)?),
            NODES_DISCONNECTED => Self::NodesDisconnected(decode(method, params)?),
            NODE_PARAM_CONNECTED => Self::NodeParamConnected(decode(method, params)?),
            NODE_PARAM_DISCONNECTED => Self::NodeParamDisconnected(decode(method, params)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::ContextCreated(_) => CONTEXT_CREATED,
            Self::ContextChanged(_) => CONTEXT_CHANGED,
            Self::ContextWillBeDestroyed(_) => CONTEXT_WILL_BE_DESTROYED,
            Self::AudioNodeCreated(_) => AUDIO_NODE_CREATED,
            Self::AudioNodeWillBeDestroyed(_) => AUDIO_NODE_WILL_BE_DESTROYED,
            Self::AudioParamCreated(_) => AUDIO_PARAM_CREATED,
            Self::AudioParamWillBeDestroyed(_) => AUDIO_PARAM_WILL_BE_DESTROYED,
            Self::NodesConnected(_) => NODES_CONNECTED,
            Self::NodesDisconnected(_) => NODES_DISCONNECTED,
            Self::NodeParamConnected(_) => NODE_PARAM_CONNECTED,
            Self::NodeParamDisconnected(_) => NODE_PARAM_DISCONNECTED,
        }
    }

    /// Context the event belongs to.
    pub fn context_id(&self) -> &GraphObjectId {
        match self {
            Self::ContextCreated(p) | Self::ContextChanged(p) => &p.context.context_id,
            Self::ContextWillBeDestroyed(p) => &p.context_id,
            Self::AudioNodeCreated(p) => &p.node.context_id,
            Self::AudioNodeWillBeDestroyed(p) => &p.context_id,
            Self::AudioParamCreated(p) => &p.param.context_id,
            Self::AudioParamWillBeDestroyed(p) => &p.context_id,
            Self::NodesConnected(p) | Self::NodesDisconnected(p) => &p.context_id,
            Self::NodeParamConnected(p) | Self::NodeParamDisconnected(p) => &p.context_id,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(method: &str, params: &Value) -> Result<T, AdapterError> {
    T::deserialize(params).map_err(|err| {
        AdapterError::new(AdapterErrorKind::Protocol).with_hint(format!("{method}: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_node_creation() {
        let event = WebAudioEvent::parse(
            AUDIO_NODE_CREATED,
            &json!({
                "node": {
                    "nodeId": "n1",
                    "contextId": "ctx1",
                    "nodeType": "OscillatorNode",
                    "numberOfInputs": 0,
                    "numberOfOutputs": 1,
                    "channelCount": 2,
                    "channelCountMode": "max",
                    "channelInterpretation": "speakers"
                }
            }),
        )
        .expect("valid params")
        .expect("handled method");

        match &event {
            WebAudioEvent::AudioNodeCreated(params) => {
                assert_eq!(params.node.node_id.as_str(), "n1");
                assert_eq!(params.node.node_type, "OscillatorNode");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(event.context_id().as_str(), "ctx1");
        assert_eq!(event.method(), AUDIO_NODE_CREATED);
    }

    #[test]
    fn connection_indices_default_to_zero() {
        let event = WebAudioEvent::parse(
            NODES_CONNECTED,
            &json!({"contextId": "ctx1", "sourceId": "n1", "destinationId": "n2"}),
        )
        .unwrap()
        .unwrap();
        let WebAudioEvent::NodesConnected(params) = event else {
            panic!("expected nodesConnected");
        };
        assert_eq!(params.source_output_index, 0);
        assert_eq!(params.destination_input_index, 0);
    }

    #[test]
    fn unmodelled_methods_are_not_errors() {
        let parsed = WebAudioEvent::parse("Page.frameNavigated", &json!({"frame": {}})).unwrap();
        assert!(parsed.is_none());
        let parsed =
            WebAudioEvent::parse("WebAudio.audioListenerCreated", &json!({"listener": {}}))
                .unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn malformed_params_surface_protocol_error() {
        let err = WebAudioEvent::parse(CONTEXT_WILL_BE_DESTROYED, &json!({"id": 3})).unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Protocol);
        assert!(err.hint.unwrap().starts_with(CONTEXT_WILL_BE_DESTROYED));
    }

    #[test]
    fn context_descriptor_round_trips_camel_case() {
        let value = json!({
            "contextId": "ctx1",
            "contextType": "realtime",
            "contextState": "running",
            "callbackBufferSize": 128,
            "maxOutputChannelCount": 2,
            "sampleRate": 48000
        });
        let context: BaseAudioContext = serde_json::from_value(value).unwrap();
        assert_eq!(context.context_type, ContextType::Realtime);
        assert_eq!(context.context_state, ContextState::Running);
        let back = serde_json::to_value(&context).unwrap();
        assert_eq!(back["sampleRate"], json!(48000.0));
        assert!(back.get("realtimeData").is_none());
    }
}
