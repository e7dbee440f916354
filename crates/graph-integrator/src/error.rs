use std::fmt;
use std::time::Duration;

use cdp_adapter::AdapterError;
use thiserror::Error;

/// Remote message for a context id the browser does not know.
pub const CONTEXT_NOT_FOUND_MESSAGE: &str = "Cannot find BaseAudioContext with such id.";
/// Remote message for realtime data requested from an offline context. The spelling is the
/// browser's.
pub const REALTIME_ONLY_MESSAGE: &str = "ContextRealtimeData is only avaliable for an AudioContext.";

/// A falsifiable assumption shown to be false.
///
/// The message template substitutes `%N` with the N-th argument and `%%` with a literal `%`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantError {
    template: String,
    args: Vec<String>,
}

impl InvariantError {
    pub fn new<I, A>(template: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: ToString,
    {
        Self {
            template: template.into(),
            args: args.into_iter().map(|arg| arg.to_string()).collect(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn message(&self) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut chars = self.template.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch != '%' {
                out.push(ch);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                out.push('%');
                continue;
            }
            let mut digits = String::new();
            while let Some(digit) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(digit);
                chars.next();
            }
            let arg = digits
                .parse::<usize>()
                .ok()
                .and_then(|index| self.args.get(index));
            match arg {
                Some(arg) => out.push_str(arg),
                None => {
                    out.push('%');
                    out.push_str(&digits);
                }
            }
        }
        out
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for InvariantError {}

/// Fail with an [`InvariantError`] when `test` does not hold.
pub fn invariant<I, A>(test: bool, template: &str, args: I) -> Result<(), InvariantError>
where
    I: IntoIterator<Item = A>,
    A: ToString,
{
    if test {
        Ok(())
    } else {
        Err(InvariantError::new(template, args))
    }
}

#[derive(Debug, Error)]
pub enum RealtimeDataError {
    #[error("audio context no longer exists")]
    ContextNotFound,
    #[error("realtime data is only available for an AudioContext")]
    RealtimeOnly,
    #[error("realtime data request timed out after {0:?}")]
    Timeout(Duration),
    #[error("realtime data request failed: {0}")]
    Transport(AdapterError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}

impl RealtimeDataError {
    /// Classify a failed `getRealtimeData` command by the reason the remote end gave.
    pub fn from_transport(err: AdapterError) -> Self {
        match remote_reason(&err).as_deref() {
            Some(CONTEXT_NOT_FOUND_MESSAGE) => Self::ContextNotFound,
            Some(REALTIME_ONLY_MESSAGE) => Self::RealtimeOnly,
            _ => Self::Transport(err),
        }
    }

    /// Whether a polling lane stops after this failure.
    pub fn terminates_lane(&self) -> bool {
        !matches!(self, Self::Timeout(_))
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ContextNotFound => "context_not_found",
            Self::RealtimeOnly => "realtime_only",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Invariant(_) => "invariant",
        }
    }
}

// The reason may arrive as the error object's message or as a JSON-encoded hint.
fn remote_reason(err: &AdapterError) -> Option<String> {
    if let Some(message) = err.remote_message() {
        return Some(message.to_string());
    }
    let hint = err.hint.as_deref()?;
    let parsed = serde_json::from_str::<serde_json::Value>(hint).ok();
    let message = parsed
        .as_ref()
        .and_then(|value| value.get("message"))
        .and_then(|value| value.as_str())
        .unwrap_or(hint);
    Some(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::AdapterErrorKind;
    use serde_json::json;

    #[test]
    fn invariant_message_substitutes_arguments() {
        let err = InvariantError::new("context %0 lost node %1 at 100%%", ["ctx1", "n2"]);
        assert_eq!(err.message(), "context ctx1 lost node n2 at 100%");
        assert_eq!(err.to_string(), err.message());
    }

    #[test]
    fn invariant_keeps_unknown_placeholders() {
        let err = InvariantError::new("missing %3 and %x", Vec::<String>::new());
        assert_eq!(err.message(), "missing %3 and %x");
    }

    #[test]
    fn invariant_passes_when_test_holds() {
        assert!(invariant(true, "never %0", ["shown"]).is_ok());
        let err = invariant(false, "value was %0", [42]).unwrap_err();
        assert_eq!(err.message(), "value was 42");
    }

    #[test]
    fn classifies_remote_messages() {
        let missing = AdapterError::protocol(json!({"code": -32000, "message": CONTEXT_NOT_FOUND_MESSAGE}));
        assert!(matches!(
            RealtimeDataError::from_transport(missing),
            RealtimeDataError::ContextNotFound
        ));

        let offline = AdapterError::new(AdapterErrorKind::Protocol)
            .with_hint(json!({"code": -32000, "message": REALTIME_ONLY_MESSAGE}).to_string());
        assert!(matches!(
            RealtimeDataError::from_transport(offline),
            RealtimeDataError::RealtimeOnly
        ));

        let other = AdapterError::new(AdapterErrorKind::CdpIo).with_hint("socket closed");
        let err = RealtimeDataError::from_transport(other);
        assert!(matches!(err, RealtimeDataError::Transport(_)));
        assert!(err.terminates_lane());
    }

    #[test]
    fn only_timeouts_keep_lane_alive() {
        assert!(!RealtimeDataError::Timeout(Duration::from_millis(500)).terminates_lane());
        let retriable = AdapterError::new(AdapterErrorKind::CdpIo).retriable(true);
        assert!(RealtimeDataError::Transport(retriable).terminates_lane());
        assert!(RealtimeDataError::ContextNotFound.terminates_lane());
        assert!(RealtimeDataError::RealtimeOnly.terminates_lane());
        assert!(RealtimeDataError::from(InvariantError::new("x", ["y"])).terminates_lane());
    }
}
