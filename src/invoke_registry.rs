//! Tracks pending invocations on the *initiating* side: each call to
//! `HubClient::invoke`/`pull_stream` registers one entry here and blocks on
//! the returned receiver until exactly one terminal event (Invariant 1)
//! arrives -- a Completion, or connection teardown aborting everything still
//! outstanding.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::value::RawValue;
use tokio::sync::oneshot;

/// The single terminal event an invocation ever receives.
#[derive(Debug)]
pub enum InvokeOutcome {
    Result(Box<RawValue>),
    Error(String),
    Aborted(String),
}

pub struct InvokeRegistry {
    pending: Mutex<HashMap<String, oneshot::Sender<InvokeOutcome>>>,
}

impl InvokeRegistry {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn new_invocation(&self, id: String) -> oneshot::Receiver<InvokeOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);
        rx
    }

    pub fn handles_id(&self, id: &str) -> bool {
        self.pending.lock().unwrap().contains_key(id)
    }

    /// Delivers a Completion. A miss is not an error here: it's routine on
    /// the dispatch side, where a Completion can close out a client-stream
    /// upload that was never registered in this map at all (see
    /// `StreamClient::receive_completion`).
    pub fn receive_completion(&self, invocation_id: &str, result: Option<Box<RawValue>>, error: Option<String>) {
        let Some(tx) = self.pending.lock().unwrap().remove(invocation_id) else {
            return;
        };
        let outcome = match error {
            Some(message) => InvokeOutcome::Error(message),
            None => InvokeOutcome::Result(result.unwrap_or_else(null_raw_value)),
        };
        let _ = tx.send(outcome);
    }

    pub fn delete_invocation(&self, id: &str) {
        self.pending.lock().unwrap().remove(id);
    }

    /// Fires when the loop ends: every invocation still outstanding is
    /// aborted rather than left to hang forever on a channel nothing will
    /// ever fill.
    pub fn abort_all(&self, reason: &str) {
        let mut pending = self.pending.lock().unwrap();
        for (_, tx) in pending.drain() {
            let _ = tx.send(InvokeOutcome::Aborted(reason.to_owned()));
        }
    }
}

impl Default for InvokeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn null_raw_value() -> Box<RawValue> {
    RawValue::from_string("null".to_owned()).expect("\"null\" is valid JSON")
}
