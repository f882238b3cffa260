//! Realtime Bridge
//!
//! Provider-neutral duplex channel to an external speech-to-speech model.
//! A provider opens the upstream connection, then runs a driver task that
//! translates between the wire protocol and the generic [`BridgeCommand`] /
//! [`BridgeEvent`] types below. The session only ever sees those types.

use crate::{
    error::{BridgeErrorKind, SessionError},
    tools::ToolSpec,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// How long `close` waits for a driver to shut the upstream connection down.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Generic configuration for initializing a realtime session with any provider.
#[derive(Debug, Clone, Default)]
pub struct SessionSetup {
    /// System instructions, including the recipe the model is guiding through.
    pub instructions: String,
    /// Functions the model may call.
    pub tools: Vec<ToolSpec>,
}

/// Work for the driver task, in the order the session issued it.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeCommand {
    /// A chunk of raw PCM16 audio from the cook.
    Audio(Bytes),
    /// Context the model should act on in its next response.
    Instruction(String),
    /// The session's answer to a function-call request.
    FunctionResult {
        call_id: String,
        name: String,
        output: String,
    },
    /// Release the upstream connection.
    Close,
}

/// Generic events that any realtime provider can emit back to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Synthesized speech (raw PCM16).
    AudioChunk(Bytes),
    /// A transcription of the cook's speech.
    Transcript { text: String, is_final: bool },
    FunctionCallRequest {
        call_id: String,
        name: String,
        /// JSON-encoded argument object.
        arguments: String,
    },
    Error {
        kind: BridgeErrorKind,
        message: String,
    },
    /// The upstream connection is gone. Always the last event.
    Closed,
}

/// Opens realtime bridges. One implementation per upstream vendor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RealtimeProvider: Send + Sync {
    /// Connects upstream and completes the provider handshake.
    async fn connect(&self, setup: SessionSetup) -> Result<RealtimeBridge, SessionError>;
}

/// Cloneable, non-blocking handle for pushing commands into a bridge.
#[derive(Debug, Clone)]
pub struct BridgeSender {
    commands: mpsc::UnboundedSender<BridgeCommand>,
}

impl BridgeSender {
    /// Queues a chunk of inbound audio. Never waits.
    pub fn send_audio(&self, audio: Bytes) -> Result<(), SessionError> {
        self.send(BridgeCommand::Audio(audio))
    }

    pub fn send_instruction(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(BridgeCommand::Instruction(text.into()))
    }

    pub fn send_function_result(
        &self,
        call_id: impl Into<String>,
        name: impl Into<String>,
        output: String,
    ) -> Result<(), SessionError> {
        self.send(BridgeCommand::FunctionResult {
            call_id: call_id.into(),
            name: name.into(),
            output,
        })
    }

    fn send(&self, command: BridgeCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::SessionClosed)
    }
}

/// The driver-side end of a bridge: receives commands, emits events.
pub struct BridgePeer {
    commands: mpsc::UnboundedReceiver<BridgeCommand>,
    events: mpsc::Sender<BridgeEvent>,
}

impl BridgePeer {
    /// Next command from the session, or `None` once every sender is gone.
    pub async fn recv_command(&mut self) -> Option<BridgeCommand> {
        self.commands.recv().await
    }

    /// Delivers an event to the session. Returns `false` once the session stopped listening.
    pub async fn emit(&self, event: BridgeEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

/// The session-side end of a bridge.
pub struct RealtimeBridge {
    sender: BridgeSender,
    events: Option<mpsc::Receiver<BridgeEvent>>,
    driver: Option<JoinHandle<()>>,
}

impl RealtimeBridge {
    /// Creates a connected bridge/peer pair. `buffer` bounds the event queue.
    pub fn channel(buffer: usize) -> (Self, BridgePeer) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(buffer);
        (
            Self {
                sender: BridgeSender {
                    commands: command_tx,
                },
                events: Some(event_rx),
                driver: None,
            },
            BridgePeer {
                commands: command_rx,
                events: event_tx,
            },
        )
    }

    /// Ties the lifetime of a driver task to this bridge.
    pub fn with_driver(mut self, driver: JoinHandle<()>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn sender(&self) -> BridgeSender {
        self.sender.clone()
    }

    pub fn send_audio(&self, audio: Bytes) -> Result<(), SessionError> {
        self.sender.send_audio(audio)
    }

    pub fn send_instruction(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.sender.send_instruction(text)
    }

    /// Takes the event sequence. It can be taken once; later calls return `None`.
    pub fn receive(&mut self) -> Option<BridgeEvents> {
        self.events.take().map(|rx| BridgeEvents {
            inner: ReceiverStream::new(rx),
            finished: false,
        })
    }

    /// Asks the driver to release the upstream connection and waits for it,
    /// aborting the driver if it does not finish in time.
    pub async fn close(mut self) {
        let _ = self.sender.send(BridgeCommand::Close);
        if let Some(mut driver) = self.driver.take() {
            match tokio::time::timeout(CLOSE_GRACE, &mut driver).await {
                Ok(_) => debug!("Bridge driver finished."),
                Err(_) => {
                    warn!("Bridge driver did not stop in time; aborting it.");
                    driver.abort();
                }
            }
        }
    }
}

impl Drop for RealtimeBridge {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// Lazy, non-restartable sequence of bridge events.
///
/// Ends with exactly one [`BridgeEvent::Closed`], whether the driver sent it
/// or simply went away.
pub struct BridgeEvents {
    inner: ReceiverStream<BridgeEvent>,
    finished: bool,
}

impl Stream for BridgeEvents {
    type Item = BridgeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(BridgeEvent::Closed)) | Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(Some(BridgeEvent::Closed))
            }
            Poll::Ready(Some(event)) => Poll::Ready(Some(event)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_commands_reach_the_peer_in_order() {
        let (bridge, mut peer) = RealtimeBridge::channel(8);
        let sender = bridge.sender();
        sender.send_audio(Bytes::from_static(&[1, 2])).unwrap();
        sender.send_instruction("narrate step 0").unwrap();
        sender
            .send_function_result("call-1", "get_progress", "{}".into())
            .unwrap();

        assert_eq!(
            peer.recv_command().await,
            Some(BridgeCommand::Audio(Bytes::from_static(&[1, 2])))
        );
        assert_eq!(
            peer.recv_command().await,
            Some(BridgeCommand::Instruction("narrate step 0".into()))
        );
        assert!(matches!(
            peer.recv_command().await,
            Some(BridgeCommand::FunctionResult { call_id, .. }) if call_id == "call-1"
        ));
    }

    #[tokio::test]
    async fn test_events_are_taken_once_and_end_with_closed() {
        let (mut bridge, peer) = RealtimeBridge::channel(8);
        let mut events = bridge.receive().unwrap();
        assert!(bridge.receive().is_none());

        assert!(peer.emit(BridgeEvent::AudioChunk(Bytes::from_static(&[9]))).await);
        drop(peer);

        assert_eq!(
            events.next().await,
            Some(BridgeEvent::AudioChunk(Bytes::from_static(&[9])))
        );
        assert_eq!(events.next().await, Some(BridgeEvent::Closed));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_explicit_closed_is_not_duplicated() {
        let (mut bridge, peer) = RealtimeBridge::channel(8);
        let mut events = bridge.receive().unwrap();
        peer.emit(BridgeEvent::Closed).await;
        assert_eq!(events.next().await, Some(BridgeEvent::Closed));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_close_signals_the_driver() {
        let (bridge, mut peer) = RealtimeBridge::channel(8);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let driver = tokio::spawn(async move {
            while let Some(command) = peer.recv_command().await {
                if command == BridgeCommand::Close {
                    break;
                }
            }
            let _ = done_tx.send(());
        });
        bridge.with_driver(driver).close().await;
        assert!(done_rx.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_aborts_a_stuck_driver() {
        let (bridge, _peer) = RealtimeBridge::channel(8);
        let driver = tokio::spawn(std::future::pending::<()>());
        let bridge = bridge.with_driver(driver);
        bridge.close().await;
    }

    #[tokio::test]
    async fn test_sending_after_peer_is_gone_fails() {
        let (bridge, peer) = RealtimeBridge::channel(8);
        drop(peer);
        assert_eq!(
            bridge.send_instruction("hello"),
            Err(SessionError::SessionClosed)
        );
    }
}
