//! Audion session layer.
//!
//! Runs a debugging transport through the WebAudio graph pipeline and keeps the standing map of
//! contexts the panel renders.

pub mod aggregator;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod panel;
pub mod replay;
pub mod session;

pub use aggregator::{PanelConnection, SessionAggregator};
pub use config::AppConfig;
pub use errors::{ConfigError, ReplayError, SessionError};
pub use panel::{DevtoolsMessage, DevtoolsRequest};
pub use session::DevtoolSession;
