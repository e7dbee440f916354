//! JSON-lines recordings of protocol events.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use cdp_adapter::TransportEvent;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::ReplayError;

/// Parse one `{method, params, sessionId?}` object per line. Blank lines are skipped.
pub fn parse_recording(reader: impl BufRead) -> Result<Vec<TransportEvent>, ReplayError> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line).map_err(|source| ReplayError::Line {
            line: index + 1,
            source,
        })?;
        events.push(event);
    }
    Ok(events)
}

pub fn read_recording(path: &Path) -> Result<Vec<TransportEvent>, ReplayError> {
    let file = File::open(path)?;
    parse_recording(BufReader::new(file))
}

/// Feed recorded events into a transport channel; stops early if the receiver is gone.
pub async fn feed(events: Vec<TransportEvent>, tx: mpsc::Sender<TransportEvent>) -> usize {
    let mut sent = 0;
    for event in events {
        if tx.send(event).await.is_err() {
            debug!(target: "audion-session", sent, "replay receiver closed early");
            break;
        }
        sent += 1;
    }
    sent
}
