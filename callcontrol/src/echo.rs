//! Dial echo: correlate an asynchronous origination result back to the
//! request that triggered it.
//!
//! The engine doesn't return the eventual channel id synchronously when
//! we originate speculatively. The caller registers a request id here,
//! hands it to whatever will learn the outcome (an event handler), and
//! blocks on [`DialEcho::wait`] with a timeout. The handler calls
//! [`DialEcho::resolve`] whenever the result shows up, in either order
//! relative to the wait.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

/// What came out of a correlation wait. Callers have to handle each
/// case; none of these is an error of the correlator itself.
#[derive(Debug)]
pub enum EchoOutcome {
    /// The result arrived in time and carried a channel id.
    Answered(String),
    /// The result arrived in time but the operation failed; the raw
    /// payload is kept for diagnostics.
    Failed(Value),
    /// Nothing arrived before the deadline.
    Timeout,
    /// The request id was never registered or is already consumed.
    Unknown,
}

struct EchoEntry {
    tx: Option<oneshot::Sender<Value>>,
    rx: Option<oneshot::Receiver<Value>>,
}

/// Registry of pending correlations. One entry per request id, removed
/// by the first wait whatever the outcome.
pub struct DialEcho {
    entries: Mutex<HashMap<String, EchoEntry>>,
}

impl Default for DialEcho {
    fn default() -> Self {
        Self::new()
    }
}

impl DialEcho {
    pub fn new() -> DialEcho {
        DialEcho {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a fresh request id with an empty result slot.
    pub fn register(&self) -> String {
        let request_id = lark_utils::uuid();
        let (tx, rx) = oneshot::channel();
        self.entries.lock().unwrap().insert(
            request_id.clone(),
            EchoEntry {
                tx: Some(tx),
                rx: Some(rx),
            },
        );
        request_id
    }

    /// Deliver the result for a request. Unknown or already resolved
    /// ids are ignored, the requester has already given up.
    pub fn resolve(&self, request_id: &str, result: Value) {
        let tx = {
            let mut entries = self.entries.lock().unwrap();
            entries.get_mut(request_id).and_then(|entry| entry.tx.take())
        };
        match tx {
            // the sender buffers the value even if nobody waits yet
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => {
                debug!(request = request_id, "dial echo resolve without entry");
            }
        }
    }

    /// Block until the request resolves or `timeout` elapses. The entry
    /// is gone afterwards on every path.
    pub async fn wait(&self, request_id: &str, timeout: Duration) -> EchoOutcome {
        let rx = {
            let mut entries = self.entries.lock().unwrap();
            entries.get_mut(request_id).and_then(|entry| entry.rx.take())
        };
        let Some(rx) = rx else {
            return EchoOutcome::Unknown;
        };
        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => {
                match value.get("channel_id").and_then(|v| v.as_str()) {
                    Some(channel_id) => EchoOutcome::Answered(channel_id.to_string()),
                    None => EchoOutcome::Failed(value),
                }
            }
            Ok(Err(_)) => EchoOutcome::Unknown,
            Err(_) => EchoOutcome::Timeout,
        };
        self.entries.lock().unwrap().remove(request_id);
        outcome
    }
}
