//! Chromium DevTools Protocol boundary for the Audion inspector.
//!
//! This crate owns everything that touches the wire: the transport trait the debugging session
//! is reached through, the typed subset of the `WebAudio` domain the graph integrator consumes,
//! and the frame/session routing tables maintained while nested frames attach and detach.

pub mod ids {
    use serde::{Deserialize, Serialize};
    use std::fmt;

    /// Identifier the `WebAudio` domain uses for contexts, nodes and params alike.
    #[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct GraphObjectId(pub String);

    impl GraphObjectId {
        pub fn new(id: impl Into<String>) -> Self {
            Self(id.into())
        }

        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl fmt::Display for GraphObjectId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl From<&str> for GraphObjectId {
        fn from(value: &str) -> Self {
            Self(value.to_string())
        }
    }

    impl From<String> for GraphObjectId {
        fn from(value: String) -> Self {
            Self(value)
        }
    }
}

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
    pub enum AdapterErrorKind {
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("cdp command timed out")]
        Timeout,
        #[error("transport unavailable")]
        Unavailable,
        #[error("protocol error")]
        Protocol,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
                data: None,
            }
        }

        /// Error reported by the remote end for a command, carrying its `{code, message}` object.
        pub fn protocol(error: serde_json::Value) -> Self {
            let hint = error
                .get("message")
                .and_then(|value| value.as_str())
                .map(str::to_string);
            Self {
                kind: AdapterErrorKind::Protocol,
                hint,
                retriable: false,
                data: Some(error),
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }

        /// Message the remote end attached to this error, if any.
        pub fn remote_message(&self) -> Option<&str> {
            self.data
                .as_ref()
                .and_then(|data| data.get("message"))
                .and_then(|value| value.as_str())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[test]
        fn protocol_errors_keep_remote_message() {
            let err = AdapterError::protocol(json!({
                "code": -32000,
                "message": "Cannot find BaseAudioContext with such id."
            }));
            assert_eq!(err.kind, AdapterErrorKind::Protocol);
            assert_eq!(
                err.remote_message(),
                Some("Cannot find BaseAudioContext with such id.")
            );
            assert_eq!(
                err.to_string(),
                "protocol error: Cannot find BaseAudioContext with such id."
            );
        }

        #[test]
        fn display_without_hint_is_kind_only() {
            let err = AdapterError::new(AdapterErrorKind::Unavailable).retriable(true);
            assert!(err.retriable);
            assert_eq!(err.to_string(), "transport unavailable");
            assert!(err.remote_message().is_none());
        }
    }
}

pub mod events;
pub mod registry;
pub mod transport;

pub use error::{AdapterError, AdapterErrorKind};
pub use events::WebAudioEvent;
pub use ids::GraphObjectId;
pub use registry::{FrameRoutes, RouteLookup};
pub use transport::{CdpTransport, ChannelTransport, CommandTarget, NoopTransport, TransportEvent};
