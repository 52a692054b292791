//! The per-connection message loop: one task racing {inbound frame,
//! keep-alive/timeout tick, local cancellation} via `tokio::select!`,
//! dispatching onto the registry and tearing every other component down
//! together the moment it exits (§5, §9 "client and server share one loop").

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use hub_protocol::HubMessage;
use serde_json::value::RawValue;
use tokio::time::MissedTickBehavior;

use crate::config::HubOptions;
use crate::connection::HubConnection;
use crate::dispatcher::{Dispatcher, DispatchOutcome};
use crate::error::{LoopError, StreamItemFault};
use crate::invoke_registry::InvokeRegistry;
use crate::stream_client::StreamClient;
use crate::streamer::Streamer;

pub struct HubLoop {
    connection: Arc<HubConnection>,
    invoke_registry: Arc<InvokeRegistry>,
    stream_client: Arc<StreamClient>,
    streamer: Arc<Streamer>,
    dispatcher: Arc<Dispatcher>,
    options: HubOptions,
}

impl HubLoop {
    pub fn new(
        connection: Arc<HubConnection>,
        invoke_registry: Arc<InvokeRegistry>,
        stream_client: Arc<StreamClient>,
        streamer: Arc<Streamer>,
        dispatcher: Arc<Dispatcher>,
        options: HubOptions,
    ) -> Self {
        Self {
            connection,
            invoke_registry,
            stream_client,
            streamer,
            dispatcher,
            options,
        }
    }

    /// Runs until the connection ends, one way or another, then tears down
    /// every registry so nothing still waiting hangs forever. Never returns
    /// `Ok` -- there is no graceful "finished" state for a duplex hub
    /// connection, only ways it stops.
    pub async fn run(self) -> LoopError {
        let err = self.run_inner().await.unwrap_err();
        tracing::warn!(connection_id = %self.connection.connection_id(), error = %err, "message loop ending");
        self.invoke_registry.abort_all(&err.to_string());
        self.stream_client.abort_all();
        self.streamer.stop_all();
        self.connection.close(Some(err.to_string()), false).await;
        err
    }

    async fn run_inner(&self) -> Result<Infallible, LoopError> {
        let mut last_received = Instant::now();
        let mut ticker = tokio::time::interval(self.options.keep_alive_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel = self.connection.cancellation_token();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(LoopError::Canceled);
                }
                _ = ticker.tick() => {
                    if last_received.elapsed() >= self.options.timeout_interval {
                        return Err(LoopError::PeerTimeout(self.options.timeout_interval));
                    }
                    if self.connection.last_write_stamp().elapsed() >= self.options.keep_alive_interval {
                        self.connection.ping().await.map_err(LoopError::Transport)?;
                    }
                }
                received = self.connection.receive() => {
                    let message = received.map_err(LoopError::Transport)?;
                    last_received = Instant::now();
                    self.handle_message(message).await?;
                }
            }
        }
    }

    async fn handle_message(&self, message: HubMessage) -> Result<(), LoopError> {
        tracing::debug!(connection_id = %self.connection.connection_id(), %message, "received");
        match message {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
                stream_ids,
            } => {
                self.dispatch(false, invocation_id, target, arguments, stream_ids).await;
                Ok(())
            }
            HubMessage::StreamInvocation {
                invocation_id,
                target,
                arguments,
                stream_ids,
            } => {
                self.dispatch(true, invocation_id, target, arguments, stream_ids).await;
                Ok(())
            }
            HubMessage::StreamItem { invocation_id, item } => self.handle_stream_item(invocation_id, item).await,
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => {
                self.handle_completion(invocation_id, result, error);
                Ok(())
            }
            HubMessage::CancelInvocation { invocation_id } => {
                self.streamer.stop(&invocation_id);
                Ok(())
            }
            HubMessage::Ping => Ok(()),
            HubMessage::Close { error, .. } => Err(LoopError::PeerClosed(error)),
        }
    }

    async fn dispatch(
        &self,
        is_stream_invocation: bool,
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Box<RawValue>>,
        stream_ids: Vec<String>,
    ) {
        let resolved = match self.dispatcher.resolve_call(&target, arguments.len(), stream_ids.len()) {
            Ok(resolved) => resolved,
            Err(err) => {
                if let Some(id) = invocation_id {
                    let _ = self
                        .connection
                        .send(HubMessage::Completion {
                            invocation_id: id,
                            result: None,
                            error: Some(err.to_string()),
                        })
                        .await;
                }
                return;
            }
        };

        match resolved.outcome(is_stream_invocation, &stream_ids) {
            DispatchOutcome::Unary(f) => {
                let connection = Arc::clone(&self.connection);
                tokio::spawn(async move {
                    let outcome = f(arguments).await;
                    let Some(id) = invocation_id else { return };
                    let (result, error) = match outcome {
                        Ok(value) => (Some(value), None),
                        Err(message) => (None, Some(message)),
                    };
                    let _ = connection
                        .send(HubMessage::Completion {
                            invocation_id: id,
                            result,
                            error,
                        })
                        .await;
                });
            }
            DispatchOutcome::UnaryAsStream(f) => {
                let connection = Arc::clone(&self.connection);
                tokio::spawn(async move {
                    let outcome = f(arguments).await;
                    let Some(id) = invocation_id else { return };
                    match outcome {
                        Ok(value) => {
                            let _ = connection
                                .send(HubMessage::StreamItem {
                                    invocation_id: id.clone(),
                                    item: value,
                                })
                                .await;
                            let _ = connection
                                .send(HubMessage::Completion {
                                    invocation_id: id,
                                    result: None,
                                    error: None,
                                })
                                .await;
                        }
                        Err(message) => {
                            let _ = connection
                                .send(HubMessage::Completion {
                                    invocation_id: id,
                                    result: None,
                                    error: Some(message),
                                })
                                .await;
                        }
                    }
                });
            }
            DispatchOutcome::ServerStreamFirstOnly(f) => {
                let connection = Arc::clone(&self.connection);
                tokio::spawn(async move {
                    let outcome = f(arguments).await;
                    let Some(id) = invocation_id else { return };
                    match outcome {
                        Ok(mut stream) => match stream.next().await {
                            Some(item) => {
                                let _ = connection
                                    .send(HubMessage::Completion {
                                        invocation_id: id,
                                        result: Some(item),
                                        error: None,
                                    })
                                    .await;
                            }
                            None => {
                                let _ = connection
                                    .send(HubMessage::Completion {
                                        invocation_id: id,
                                        result: None,
                                        error: Some("hub func returned closed chan".to_owned()),
                                    })
                                    .await;
                            }
                        },
                        Err(message) => {
                            let _ = connection
                                .send(HubMessage::Completion {
                                    invocation_id: id,
                                    result: None,
                                    error: Some(message),
                                })
                                .await;
                        }
                    }
                });
            }
            DispatchOutcome::ServerStream(f) => {
                let streamer = Arc::clone(&self.streamer);
                let connection = Arc::clone(&self.connection);
                tokio::spawn(async move {
                    let outcome = f(arguments).await;
                    match (invocation_id, outcome) {
                        (Some(id), Ok(stream)) => streamer.start(id, stream),
                        (Some(id), Err(message)) => {
                            let _ = connection
                                .send(HubMessage::Completion {
                                    invocation_id: id,
                                    result: None,
                                    error: Some(message),
                                })
                                .await;
                        }
                        (None, _) => {}
                    }
                });
            }
            DispatchOutcome::ClientStream(f, stream_id) => {
                let stream_client = Arc::clone(&self.stream_client);
                let connection = Arc::clone(&self.connection);
                tokio::spawn(async move {
                    let outcome = f(arguments, stream_client, stream_id).await;
                    let Some(id) = invocation_id else { return };
                    if let Err(message) = outcome {
                        let _ = connection
                            .send(HubMessage::Completion {
                                invocation_id: id,
                                result: None,
                                error: Some(message),
                            })
                            .await;
                    }
                });
            }
        }
    }

    async fn handle_stream_item(&self, invocation_id: String, item: Box<RawValue>) -> Result<(), LoopError> {
        if !self.stream_client.handles_id(&invocation_id) {
            return Ok(());
        }
        match self.stream_client.receive_stream_item(&invocation_id, item).await {
            Ok(()) => Ok(()),
            Err(StreamItemFault::TimedOut) => {
                let message = "chanReceiveTimeout elapsed waiting for the consumer".to_owned();
                self.invoke_registry
                    .receive_completion(&invocation_id, None, Some(message.clone()));
                let _ = self
                    .connection
                    .send(HubMessage::Completion {
                        invocation_id,
                        result: None,
                        error: Some(message),
                    })
                    .await;
                Ok(())
            }
            Err(StreamItemFault::Fatal(message)) => Err(LoopError::Protocol(message)),
        }
    }

    fn handle_completion(&self, invocation_id: String, result: Option<Box<RawValue>>, error: Option<String>) {
        if self.stream_client.handles_id(&invocation_id) {
            self.stream_client
                .receive_completion(&invocation_id, error, &self.invoke_registry);
        } else {
            self.invoke_registry.receive_completion(&invocation_id, result, error);
        }
    }
}
