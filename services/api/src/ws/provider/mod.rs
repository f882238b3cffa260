//! Concrete realtime bridges to third-party speech-to-speech APIs.
//!
//! Each provider opens a WebSocket upstream, then spawns a driver task that
//! translates between the vendor protocol and the generic bridge types.

pub mod gemini;
pub mod openai;

use crate::config::{Config, Provider};
use anyhow::{Context, Result};
use futures_util::{SinkExt, stream::SplitSink};
use recipe_road_core::{BridgeErrorKind, BridgeEvent, BridgePeer, RealtimeProvider};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::protocol::Message as WsMessage};
use tracing::error;

/// Capacity of the event queue between a driver and its session.
const BRIDGE_BUFFER: usize = 128;
/// How long opening an upstream session may take before connecting fails.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type Upstream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type UpstreamSink = SplitSink<Upstream, WsMessage>;

/// Builds the provider selected by `REALTIME_PROVIDER`.
pub fn build_provider(config: &Config) -> Result<Arc<dyn RealtimeProvider>> {
    let provider: Arc<dyn RealtimeProvider> = match config.provider {
        Provider::OpenAI => Arc::new(openai::OpenAIRealtimeProvider::new(
            config
                .openai_api_key
                .clone()
                .context("OPENAI_API_KEY is required for the OpenAI realtime provider")?,
            config.realtime_model.clone(),
            config.realtime_voice.clone(),
        )),
        Provider::Gemini => Arc::new(gemini::GeminiLiveProvider::new(
            config
                .gemini_api_key
                .clone()
                .context("GEMINI_API_KEY is required for the Gemini realtime provider")?,
            config.realtime_model.clone(),
            config.realtime_voice.clone(),
        )),
    };
    Ok(provider)
}

/// Serializes `value` and sends it upstream as a text frame.
async fn send_json<T: Serialize>(sink: &mut UpstreamSink, value: &T) -> Result<()> {
    let text = serde_json::to_string(value)?;
    sink.send(WsMessage::Text(text.into()))
        .await
        .context("Failed to write to the realtime upstream")?;
    Ok(())
}

/// Reports a lost upstream to the session.
async fn report_fatal(peer: &BridgePeer, message: impl Into<String>) {
    let message = message.into();
    error!(%message, "Realtime upstream failed");
    peer.emit(BridgeEvent::Error {
        kind: BridgeErrorKind::Fatal,
        message,
    })
    .await;
}
