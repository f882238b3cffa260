//! Bridge to the OpenAI Realtime API.
//!
//! Audio is PCM16 at 24 kHz on both sides, so it is passed through untouched.

use super::{BRIDGE_BUFFER, HANDSHAKE_TIMEOUT, Upstream, UpstreamSink, report_fatal, send_json};
use crate::audio_utils;
use anyhow::{Context, Result};
use async_openai::types::realtime::{
    self as oai_realtime, ClientEvent as OAIClientEvent, ServerEvent as OAIServerEvent,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use recipe_road_core::{
    BridgeCommand, BridgeErrorKind, BridgeEvent, BridgePeer, RealtimeBridge, RealtimeProvider,
    SessionError, SessionSetup, tools::ToolSpec,
};
use std::time::Duration;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{Instrument, debug, info, info_span, warn};

const REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

pub struct OpenAIRealtimeProvider {
    api_key: String,
    model: String,
    voice: String,
    url: String,
    handshake_timeout: Duration,
}

impl OpenAIRealtimeProvider {
    pub fn new(api_key: String, model: String, voice: String) -> Self {
        Self {
            api_key,
            model,
            voice,
            url: REALTIME_URL.to_string(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }

    async fn open(&self, setup: SessionSetup) -> Result<Upstream> {
        let url = format!("{}?model={}", self.url, self.model);
        let mut request = url.into_client_request()?;
        request
            .headers_mut()
            .insert("Authorization", format!("Bearer {}", self.api_key).parse()?);
        request
            .headers_mut()
            .insert("OpenAI-Beta", "realtime=v1".parse()?);

        let (mut ws_stream, _) = connect_async(request)
            .await
            .context("Failed to connect to OpenAI Realtime WebSocket")?;
        info!(model = %self.model, "Connected to OpenAI Realtime API.");

        let event = OAIClientEvent::SessionUpdate(oai_realtime::SessionUpdateEvent {
            session: session_resource(setup, &self.voice),
            event_id: None,
        });
        ws_stream
            .send(WsMessage::Text(serde_json::to_string(&event)?.into()))
            .await?;
        Ok(ws_stream)
    }
}

#[async_trait]
impl RealtimeProvider for OpenAIRealtimeProvider {
    async fn connect(&self, setup: SessionSetup) -> Result<RealtimeBridge, SessionError> {
        let upstream = tokio::time::timeout(self.handshake_timeout, self.open(setup))
            .await
            .map_err(|_| SessionError::fatal("Timed out connecting to OpenAI Realtime"))?
            .map_err(|e| SessionError::fatal(format!("{e:#}")))?;
        let (bridge, peer) = RealtimeBridge::channel(BRIDGE_BUFFER);
        let driver = tokio::spawn(drive(upstream, peer).instrument(info_span!("openai_realtime")));
        Ok(bridge.with_driver(driver))
    }
}

fn session_resource(setup: SessionSetup, voice: &str) -> oai_realtime::SessionResource {
    let voice = serde_json::from_value(serde_json::Value::String(voice.to_lowercase()))
        .unwrap_or_else(|_| {
            warn!(%voice, "Unknown OpenAI voice, falling back to alloy");
            oai_realtime::RealtimeVoice::Alloy
        });
    oai_realtime::SessionResource {
        modalities: Some(vec!["text".to_string(), "audio".to_string()]),
        instructions: Some(setup.instructions),
        voice: Some(voice),
        input_audio_format: Some(oai_realtime::AudioFormat::PCM16),
        output_audio_format: Some(oai_realtime::AudioFormat::PCM16),
        input_audio_transcription: Some(oai_realtime::AudioTranscription {
            model: Some("whisper-1".to_string()),
            ..Default::default()
        }),
        turn_detection: Some(oai_realtime::TurnDetection::ServerVAD {
            threshold: 0.5,
            prefix_padding_ms: 200,
            silence_duration_ms: 700,
            interrupt_response: Some(true),
            create_response: Some(true),
        }),
        tools: Some(setup.tools.into_iter().map(tool_definition).collect()),
        ..Default::default()
    }
}

fn tool_definition(spec: ToolSpec) -> oai_realtime::ToolDefinition {
    oai_realtime::ToolDefinition::Function {
        name: spec.name,
        description: spec.description,
        parameters: spec.parameters,
    }
}

fn empty_item(item_type: oai_realtime::ItemType) -> oai_realtime::Item {
    oai_realtime::Item {
        r#type: Some(item_type),
        id: None,
        status: None,
        role: None,
        content: None,
        call_id: None,
        name: None,
        arguments: None,
        output: None,
    }
}

fn response_create() -> OAIClientEvent {
    OAIClientEvent::ResponseCreate(oai_realtime::ResponseCreateEvent {
        response: None,
        event_id: None,
    })
}

/// Wire events for one bridge command. `Close` has none.
fn client_events(command: BridgeCommand) -> Vec<OAIClientEvent> {
    match command {
        BridgeCommand::Audio(data) => vec![OAIClientEvent::InputAudioBufferAppend(
            oai_realtime::InputAudioBufferAppendEvent {
                audio: audio_utils::encode_pcm16(&data),
                event_id: None,
            },
        )],
        BridgeCommand::Instruction(text) => {
            let item = oai_realtime::Item {
                role: Some(oai_realtime::ItemRole::System),
                content: Some(vec![oai_realtime::ItemContent {
                    r#type: oai_realtime::ItemContentType::InputText,
                    text: Some(text),
                    audio: None,
                    transcript: None,
                }]),
                ..empty_item(oai_realtime::ItemType::Message)
            };
            vec![
                OAIClientEvent::ConversationItemCreate(oai_realtime::ConversationItemCreateEvent {
                    item,
                    event_id: None,
                    previous_item_id: None,
                }),
                response_create(),
            ]
        }
        BridgeCommand::FunctionResult {
            call_id, output, ..
        } => {
            let item = oai_realtime::Item {
                call_id: Some(call_id),
                output: Some(output),
                ..empty_item(oai_realtime::ItemType::FunctionCallOutput)
            };
            vec![
                OAIClientEvent::ConversationItemCreate(oai_realtime::ConversationItemCreateEvent {
                    item,
                    event_id: None,
                    previous_item_id: None,
                }),
                response_create(),
            ]
        }
        BridgeCommand::Close => Vec::new(),
    }
}

/// Maps an upstream event to a bridge event. Most events are bookkeeping and map to nothing.
fn translate(event: OAIServerEvent) -> Option<BridgeEvent> {
    match event {
        OAIServerEvent::ResponseAudioDelta(e) => match audio_utils::decode_pcm16(&e.delta) {
            Some(pcm) => Some(BridgeEvent::AudioChunk(Bytes::from(pcm))),
            None => {
                warn!("Dropping audio delta that is not valid base64");
                None
            }
        },
        OAIServerEvent::ConversationItemInputAudioTranscriptionDelta(e) => {
            Some(BridgeEvent::Transcript {
                text: e.delta,
                is_final: false,
            })
        }
        OAIServerEvent::ConversationItemInputAudioTranscriptionCompleted(e) => {
            Some(BridgeEvent::Transcript {
                text: e.transcript,
                is_final: true,
            })
        }
        OAIServerEvent::ResponseOutputItemDone(e) => {
            let item = e.item;
            if !matches!(item.r#type, Some(oai_realtime::ItemType::FunctionCall)) {
                return None;
            }
            match (item.call_id, item.name) {
                (Some(call_id), Some(name)) => Some(BridgeEvent::FunctionCallRequest {
                    call_id,
                    name,
                    arguments: item.arguments.unwrap_or_else(|| "{}".to_string()),
                }),
                _ => {
                    warn!("Function call item without call_id or name");
                    None
                }
            }
        }
        OAIServerEvent::Error(e) => {
            if e.error.r#type == "server_error" {
                return Some(BridgeEvent::Error {
                    kind: BridgeErrorKind::Recoverable,
                    message: e.error.message,
                });
            }
            // Rejected client events (e.g. a response.create while a response
            // is in flight) are not worth retrying.
            warn!(
                error_type = %e.error.r#type,
                code = ?e.error.code,
                message = %e.error.message,
                "OpenAI rejected a client event"
            );
            None
        }
        _ => None,
    }
}

async fn drive(upstream: Upstream, mut peer: BridgePeer) {
    let (mut upstream_tx, mut upstream_rx) = upstream.split();
    loop {
        tokio::select! {
            command = peer.recv_command() => match command {
                Some(BridgeCommand::Close) | None => {
                    debug!("Closing OpenAI Realtime connection.");
                    let _ = upstream_tx.close().await;
                    break;
                }
                Some(command) => {
                    if let Err(e) = forward(&mut upstream_tx, command).await {
                        report_fatal(&peer, format!("{e:#}")).await;
                        break;
                    }
                }
            },
            frame = upstream_rx.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<OAIServerEvent>(text.as_str()) {
                        Ok(event) => {
                            if let Some(event) = translate(event) {
                                if !peer.emit(event).await {
                                    break;
                                }
                            }
                        }
                        Err(e) => debug!(error = %e, "Skipping unrecognized OpenAI event"),
                    }
                }
                Some(Ok(WsMessage::Close(close_frame))) => {
                    report_fatal(&peer, format!("OpenAI closed the connection: {close_frame:?}")).await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    report_fatal(&peer, format!("Error reading from OpenAI: {e}")).await;
                    break;
                }
                None => {
                    report_fatal(&peer, "OpenAI connection ended").await;
                    break;
                }
            },
        }
    }
}

async fn forward(sink: &mut UpstreamSink, command: BridgeCommand) -> Result<()> {
    for event in client_events(command) {
        send_json(sink, &event).await?;
    }
    Ok(())
}
