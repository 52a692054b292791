//! The registration table and argument-building rules standing in for the
//! reflection a dynamically typed hub implementation would use (spec §4.7,
//! §9 "Stream typing"). A handler is registered once, at startup, as one of
//! three shapes; dispatch resolves `target` case-insensitively and checks
//! arity before ever touching the handler's argument types.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;
use tokio::task::JoinError;

use crate::error::DispatchError;
use crate::stream_client::{StreamClient, StreamSource};
use crate::streamer::BoxedItemStream;

/// Bundles a plain-argument tuple's arity and decode rule. Implemented for
/// `()`, `(A,)`, `(A, B)`, `(A, B, C)` -- hub handlers in practice take a
/// small, fixed number of JSON-serializable arguments, not an arbitrary
/// arity.
pub trait FromArgs: Sized + Send {
    const ARITY: usize;
    fn from_args(args: &[Box<RawValue>]) -> Result<Self, serde_json::Error>;
}

impl FromArgs for () {
    const ARITY: usize = 0;
    fn from_args(_args: &[Box<RawValue>]) -> Result<Self, serde_json::Error> {
        Ok(())
    }
}

impl<A: DeserializeOwned + Send> FromArgs for (A,) {
    const ARITY: usize = 1;
    fn from_args(args: &[Box<RawValue>]) -> Result<Self, serde_json::Error> {
        Ok((serde_json::from_str(args[0].get())?,))
    }
}

impl<A: DeserializeOwned + Send, B: DeserializeOwned + Send> FromArgs for (A, B) {
    const ARITY: usize = 2;
    fn from_args(args: &[Box<RawValue>]) -> Result<Self, serde_json::Error> {
        Ok((
            serde_json::from_str(args[0].get())?,
            serde_json::from_str(args[1].get())?,
        ))
    }
}

impl<A: DeserializeOwned + Send, B: DeserializeOwned + Send, C: DeserializeOwned + Send> FromArgs for (A, B, C) {
    const ARITY: usize = 3;
    fn from_args(args: &[Box<RawValue>]) -> Result<Self, serde_json::Error> {
        Ok((
            serde_json::from_str(args[0].get())?,
            serde_json::from_str(args[1].get())?,
            serde_json::from_str(args[2].get())?,
        ))
    }
}

type UnaryHandler = Arc<dyn Fn(Vec<Box<RawValue>>) -> BoxFuture<'static, Result<Box<RawValue>, String>> + Send + Sync>;
type ServerStreamHandler =
    Arc<dyn Fn(Vec<Box<RawValue>>) -> BoxFuture<'static, Result<BoxedItemStream, String>> + Send + Sync>;
type ClientStreamHandler =
    Arc<dyn Fn(Vec<Box<RawValue>>, Arc<StreamClient>, String) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

enum HandlerKind {
    Unary(UnaryHandler),
    ServerStream(ServerStreamHandler),
    ClientStream(ClientStreamHandler),
}

pub struct HandlerEntry {
    arity: usize,
    stream_arity: usize,
    kind: HandlerKind,
}

/// Runs a handler future inside its own task so a panic surfaces as a
/// `JoinError` instead of taking the loop task down with it -- the Rust
/// analogue of `loop.go`'s `recover()` around each dispatched call.
async fn run_guarded<Fut>(fut: Fut, enable_detailed_errors: bool) -> Result<Fut::Output, String>
where
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(value) => Ok(value),
        Err(join_err) => Err(fault_message(join_err, enable_detailed_errors)),
    }
}

fn fault_message(join_err: JoinError, detailed: bool) -> String {
    if join_err.is_panic() {
        let payload = join_err.into_panic();
        let message = panic_payload_to_string(&payload);
        if detailed {
            format!("handler panicked: {message}")
        } else {
            "handler panicked".to_owned()
        }
    } else {
        "invocation canceled".to_owned()
    }
}

fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, HandlerEntry>,
    enable_detailed_errors: bool,
}

impl Dispatcher {
    pub fn new(enable_detailed_errors: bool) -> Self {
        Self {
            handlers: HashMap::new(),
            enable_detailed_errors,
        }
    }

    pub fn register_unary<A, R, F, Fut>(&mut self, name: &str, handler: F)
    where
        A: FromArgs + 'static,
        R: Serialize + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, String>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let detailed = self.enable_detailed_errors;
        let entry: UnaryHandler = Arc::new(move |raw_args| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let args = A::from_args(&raw_args).map_err(|e| e.to_string())?;
                let outcome = run_guarded(handler(args), detailed).await?;
                let value = outcome?;
                serde_json::value::to_raw_value(&value).map_err(|e| e.to_string())
            })
        });
        self.handlers.insert(
            name.to_lowercase(),
            HandlerEntry {
                arity: A::ARITY,
                stream_arity: 0,
                kind: HandlerKind::Unary(entry),
            },
        );
    }

    pub fn register_server_stream<A, T, F, Fut, S>(&mut self, name: &str, handler: F)
    where
        A: FromArgs + 'static,
        T: Serialize + 'static,
        S: Stream<Item = T> + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, String>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let detailed = self.enable_detailed_errors;
        let entry: ServerStreamHandler = Arc::new(move |raw_args| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let args = A::from_args(&raw_args).map_err(|e| e.to_string())?;
                let outcome = run_guarded(handler(args), detailed).await?;
                let stream = outcome?;
                let boxed: BoxedItemStream = Box::pin(stream.map(|item| {
                    serde_json::value::to_raw_value(&item)
                        .unwrap_or_else(|_| RawValue::from_string("null".to_owned()).expect("\"null\" is valid JSON"))
                }));
                Ok(boxed)
            })
        });
        self.handlers.insert(
            name.to_lowercase(),
            HandlerEntry {
                arity: A::ARITY,
                stream_arity: 0,
                kind: HandlerKind::ServerStream(entry),
            },
        );
    }

    /// Registers a handler that consumes exactly one client-streamed
    /// parameter. A wider fan-in (multiple stream-typed parameters) isn't
    /// implemented; every concrete scenario this crate targets uses a
    /// single upload stream per call.
    pub fn register_client_stream<A, T, F, Fut>(&mut self, name: &str, handler: F)
    where
        A: FromArgs + 'static,
        T: DeserializeOwned + Send + Sync + 'static,
        F: Fn(A, StreamSource<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let detailed = self.enable_detailed_errors;
        let entry: ClientStreamHandler = Arc::new(move |raw_args, stream_client, stream_id| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let args = A::from_args(&raw_args).map_err(|e| e.to_string())?;
                let rx = stream_client.new_upstream::<T>(stream_id);
                let source = StreamSource::new(rx);
                run_guarded(handler(args, source), detailed).await
            })
        });
        self.handlers.insert(
            name.to_lowercase(),
            HandlerEntry {
                arity: A::ARITY,
                stream_arity: 1,
                kind: HandlerKind::ClientStream(entry),
            },
        );
    }

    fn resolve(&self, target: &str) -> Option<&HandlerEntry> {
        self.handlers.get(&target.to_lowercase())
    }
}

pub(crate) struct ResolvedCall<'a> {
    pub entry: &'a HandlerEntry,
}

impl Dispatcher {
    /// Looks up `target` and checks arity, returning the specific
    /// [`DispatchError`] to report back as a Completion on any mismatch.
    pub(crate) fn resolve_call(&self, target: &str, argc: usize, stream_idc: usize) -> Result<ResolvedCall<'_>, DispatchError> {
        let entry = self
            .resolve(target)
            .ok_or_else(|| DispatchError::UnknownMethod(target.to_owned()))?;
        if stream_idc != entry.stream_arity {
            return Err(DispatchError::StreamIdMismatch(target.to_owned()));
        }
        if argc != entry.arity {
            return Err(DispatchError::ParameterMismatch(target.to_owned()));
        }
        Ok(ResolvedCall { entry })
    }
}

/// What to do with a dispatched call's outcome, decided by which message
/// kind invoked it and which handler kind it resolved to (§4.7's table of
/// Invocation/StreamInvocation x Unary/ServerStream/ClientStream).
pub enum DispatchOutcome {
    /// Run the unary handler, send one Completion with its result.
    Unary(UnaryHandler),
    /// Run the unary handler, but report its single value as a StreamItem
    /// followed by an empty Completion (a StreamInvocation against a plain
    /// method).
    UnaryAsStream(UnaryHandler),
    /// Run the server-stream handler, report only its first element as the
    /// Completion's result (a plain Invocation against a streaming method).
    ServerStreamFirstOnly(ServerStreamHandler),
    /// Run the server-stream handler and hand its output to the `Streamer`.
    ServerStream(ServerStreamHandler),
    /// Run the client-stream handler against the given stream id; no
    /// Completion is ever sent for this call.
    ClientStream(ClientStreamHandler, String),
}

impl<'a> ResolvedCall<'a> {
    pub(crate) fn outcome(&self, is_stream_invocation: bool, stream_ids: &[String]) -> DispatchOutcome {
        match (&self.entry.kind, is_stream_invocation) {
            (HandlerKind::Unary(f), false) => DispatchOutcome::Unary(Arc::clone(f)),
            (HandlerKind::Unary(f), true) => DispatchOutcome::UnaryAsStream(Arc::clone(f)),
            (HandlerKind::ServerStream(f), false) => DispatchOutcome::ServerStreamFirstOnly(Arc::clone(f)),
            (HandlerKind::ServerStream(f), true) => DispatchOutcome::ServerStream(Arc::clone(f)),
            (HandlerKind::ClientStream(f), _) => {
                DispatchOutcome::ClientStream(Arc::clone(f), stream_ids[0].clone())
            }
        }
    }
}
