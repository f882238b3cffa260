//! Bridge to the Gemini Live API.
//!
//! Gemini takes 16 kHz input and produces 24 kHz output, so client audio is
//! resampled on the way in and model audio is passed through on the way out.

use super::{BRIDGE_BUFFER, HANDSHAKE_TIMEOUT, Upstream, UpstreamSink, report_fatal, send_json};
use crate::audio_utils::{self, StreamResampler};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use recipe_road_core::{
    BridgeCommand, BridgeEvent, BridgePeer, RealtimeBridge, RealtimeProvider, SessionError,
    SessionSetup,
};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{Instrument, debug, info, info_span, warn};

const LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
const RESAMPLER_CHUNK: usize = 512;

// --- Local Gemini Live wire types ---
mod gemini_live_types {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) enum ClientMessage {
        Setup(BidiGenerateContentSetup),
        RealtimeInput(BidiGenerateContentRealtimeInput),
        ClientContent(BidiGenerateContentClientContent),
        ToolResponse(BidiGenerateContentToolResponse),
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct BidiGenerateContentSetup {
        pub model: String,
        pub generation_config: GenerationConfig,
        pub system_instruction: Content,
        pub tools: Vec<Tool>,
        pub input_audio_transcription: serde_json::Value,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerationConfig {
        pub response_modalities: Vec<ResponseModality>,
        pub speech_config: SpeechConfig,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "UPPERCASE")]
    pub(super) enum ResponseModality {
        Audio,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct SpeechConfig {
        pub voice_config: VoiceConfig,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct VoiceConfig {
        pub prebuilt_voice_config: PrebuiltVoiceConfig,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct PrebuiltVoiceConfig {
        pub voice_name: String,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Tool {
        pub function_declarations: Vec<FunctionDeclaration>,
    }

    #[derive(Serialize)]
    pub(super) struct FunctionDeclaration {
        pub name: String,
        pub description: String,
        pub parameters: serde_json::Value,
    }

    #[derive(Serialize)]
    pub(super) struct Content {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub role: Option<String>,
        pub parts: Vec<Part>,
    }

    #[derive(Serialize)]
    pub(super) struct Part {
        pub text: String,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct BidiGenerateContentClientContent {
        pub turns: Vec<Content>,
        pub turn_complete: bool,
    }

    #[derive(Serialize)]
    pub(super) struct BidiGenerateContentRealtimeInput {
        pub audio: Blob,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Blob {
        pub mime_type: String,
        pub data: String,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct BidiGenerateContentToolResponse {
        pub function_responses: Vec<FunctionResponse>,
    }

    #[derive(Serialize)]
    pub(super) struct FunctionResponse {
        pub id: String,
        pub name: String,
        pub response: serde_json::Value,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerMessage {
        pub setup_complete: Option<serde_json::Value>,
        pub server_content: Option<LiveServerContent>,
        pub tool_call: Option<LiveServerToolCall>,
        pub go_away: Option<serde_json::Value>,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct LiveServerContent {
        pub model_turn: Option<ServerContentTurn>,
        pub input_transcription: Option<ServerTranscription>,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct ServerContentTurn {
        #[serde(default)]
        pub parts: Vec<ServerPart>,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerPart {
        pub inline_data: Option<ServerBlob>,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct ServerBlob {
        pub data: String,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct ServerTranscription {
        pub text: String,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct LiveServerToolCall {
        #[serde(default)]
        pub function_calls: Vec<FunctionCall>,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct FunctionCall {
        pub id: String,
        pub name: String,
        #[serde(default)]
        pub args: serde_json::Value,
    }
}

use gemini_live_types as live;

pub struct GeminiLiveProvider {
    api_key: String,
    model: String,
    voice: String,
}

impl GeminiLiveProvider {
    pub fn new(api_key: String, model: String, voice: String) -> Self {
        Self {
            api_key,
            model,
            voice,
        }
    }

    /// Connects, sends the setup message and waits for `setupComplete`.
    async fn open(&self, setup: SessionSetup) -> Result<Upstream> {
        let url = format!("{LIVE_URL}?key={}", self.api_key);
        let (mut ws_stream, _) = connect_async(url)
            .await
            .context("Failed to connect to Gemini Live WebSocket")?;
        info!(model = %self.model, "Connected to Gemini Live API.");

        let setup_msg = setup_message(setup, &self.model, &self.voice);
        ws_stream
            .send(WsMessage::Text(serde_json::to_string(&setup_msg)?.into()))
            .await?;

        wait_for_setup(&mut ws_stream).await?;
        info!("Gemini session setup is complete.");
        Ok(ws_stream)
    }
}

async fn wait_for_setup(ws_stream: &mut Upstream) -> Result<()> {
    while let Some(frame) = ws_stream.next().await {
        // Gemini sends JSON as binary frames as well as text frames.
        let text = match frame? {
            WsMessage::Text(text) => text.as_str().to_owned(),
            WsMessage::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
            WsMessage::Close(close_frame) => {
                return Err(anyhow!("Gemini closed the connection during setup: {close_frame:?}"));
            }
            _ => continue,
        };
        match serde_json::from_str::<live::ServerMessage>(&text) {
            Ok(msg) if msg.setup_complete.is_some() => return Ok(()),
            Ok(msg) => warn!(?msg, "Unexpected Gemini message during setup"),
            Err(e) => warn!(error = %e, "Failed to parse Gemini message during setup"),
        }
    }
    Err(anyhow!("Gemini connection ended during setup"))
}

#[async_trait]
impl RealtimeProvider for GeminiLiveProvider {
    async fn connect(&self, setup: SessionSetup) -> Result<RealtimeBridge, SessionError> {
        let upstream = tokio::time::timeout(HANDSHAKE_TIMEOUT, self.open(setup))
            .await
            .map_err(|_| SessionError::fatal("Timed out connecting to Gemini Live"))?
            .map_err(|e| SessionError::fatal(format!("{e:#}")))?;
        let resampler = StreamResampler::new(
            audio_utils::CLIENT_PCM16_SAMPLE_RATE,
            audio_utils::GEMINI_LIVE_API_PCM16_SAMPLE_RATE,
            RESAMPLER_CHUNK,
        )
        .map_err(|e| SessionError::fatal(format!("{e:#}")))?;
        let (bridge, peer) = RealtimeBridge::channel(BRIDGE_BUFFER);
        let driver =
            tokio::spawn(drive(upstream, peer, resampler).instrument(info_span!("gemini_live")));
        Ok(bridge.with_driver(driver))
    }
}

fn setup_message(setup: SessionSetup, model: &str, voice: &str) -> live::ClientMessage {
    live::ClientMessage::Setup(live::BidiGenerateContentSetup {
        model: model.to_string(),
        generation_config: live::GenerationConfig {
            response_modalities: vec![live::ResponseModality::Audio],
            speech_config: live::SpeechConfig {
                voice_config: live::VoiceConfig {
                    prebuilt_voice_config: live::PrebuiltVoiceConfig {
                        voice_name: voice.to_string(),
                    },
                },
            },
        },
        system_instruction: live::Content {
            role: None,
            parts: vec![live::Part {
                text: setup.instructions,
            }],
        },
        tools: vec![live::Tool {
            function_declarations: setup
                .tools
                .into_iter()
                .map(|tool| live::FunctionDeclaration {
                    name: tool.name,
                    description: tool.description,
                    parameters: tool.parameters,
                })
                .collect(),
        }],
        input_audio_transcription: serde_json::json!({}),
    })
}

fn audio_message(samples: &[f32]) -> live::ClientMessage {
    live::ClientMessage::RealtimeInput(live::BidiGenerateContentRealtimeInput {
        audio: live::Blob {
            mime_type: "audio/pcm;rate=16000".to_string(),
            data: audio_utils::encode_f32_to_base64_i16(samples),
        },
    })
}

/// Wire message for one bridge command. `Close` has none, and neither has
/// audio that did not yet fill a resampler block.
fn client_message(
    command: BridgeCommand,
    resampler: &mut StreamResampler,
) -> Option<live::ClientMessage> {
    match command {
        BridgeCommand::Audio(data) => {
            let samples = audio_utils::pcm16_bytes_to_f32(&data);
            let resampled = resampler.push(&samples);
            (!resampled.is_empty()).then(|| audio_message(&resampled))
        }
        BridgeCommand::Instruction(text) => Some(live::ClientMessage::ClientContent(
            live::BidiGenerateContentClientContent {
                turns: vec![live::Content {
                    role: Some("user".to_string()),
                    parts: vec![live::Part { text }],
                }],
                turn_complete: true,
            },
        )),
        BridgeCommand::FunctionResult {
            call_id,
            name,
            output,
        } => {
            // Gemini requires the response to be an object.
            let response = match serde_json::from_str::<serde_json::Value>(&output) {
                Ok(value @ serde_json::Value::Object(_)) => value,
                _ => serde_json::json!({ "output": output }),
            };
            Some(live::ClientMessage::ToolResponse(
                live::BidiGenerateContentToolResponse {
                    function_responses: vec![live::FunctionResponse {
                        id: call_id,
                        name,
                        response,
                    }],
                },
            ))
        }
        BridgeCommand::Close => None,
    }
}

/// Maps one server message to bridge events, in wire order.
fn translate(msg: live::ServerMessage) -> Vec<BridgeEvent> {
    let mut events = Vec::new();
    if let Some(content) = msg.server_content {
        if let Some(transcription) = content.input_transcription {
            events.push(BridgeEvent::Transcript {
                text: transcription.text,
                is_final: true,
            });
        }
        if let Some(turn) = content.model_turn {
            for blob in turn.parts.into_iter().filter_map(|part| part.inline_data) {
                match audio_utils::decode_pcm16(&blob.data) {
                    Some(pcm) => events.push(BridgeEvent::AudioChunk(Bytes::from(pcm))),
                    None => warn!("Dropping Gemini audio that is not valid base64"),
                }
            }
        }
    }
    if let Some(tool_call) = msg.tool_call {
        for call in tool_call.function_calls {
            let arguments = if call.args.is_null() {
                "{}".to_string()
            } else {
                call.args.to_string()
            };
            events.push(BridgeEvent::FunctionCallRequest {
                call_id: call.id,
                name: call.name,
                arguments,
            });
        }
    }
    if msg.go_away.is_some() {
        warn!("Gemini announced it will close the connection soon");
    }
    events
}

async fn drive(upstream: Upstream, mut peer: BridgePeer, mut resampler: StreamResampler) {
    let (mut upstream_tx, mut upstream_rx) = upstream.split();
    'session: loop {
        tokio::select! {
            command = peer.recv_command() => match command {
                Some(BridgeCommand::Close) | None => {
                    debug!("Closing Gemini Live connection.");
                    let tail = resampler.flush();
                    if !tail.is_empty() {
                        let _ = send_json(&mut upstream_tx, &audio_message(&tail)).await;
                    }
                    let _ = upstream_tx.close().await;
                    break;
                }
                Some(command) => {
                    if let Err(e) = forward(&mut upstream_tx, command, &mut resampler).await {
                        report_fatal(&peer, format!("{e:#}")).await;
                        break;
                    }
                }
            },
            frame = upstream_rx.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(WsMessage::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
                    Some(Ok(WsMessage::Close(close_frame))) => {
                        report_fatal(&peer, format!("Gemini closed the connection: {close_frame:?}")).await;
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        report_fatal(&peer, format!("Error reading from Gemini: {e}")).await;
                        break;
                    }
                    None => {
                        report_fatal(&peer, "Gemini connection ended").await;
                        break;
                    }
                };
                match serde_json::from_str::<live::ServerMessage>(&text) {
                    Ok(msg) => {
                        for event in translate(msg) {
                            if !peer.emit(event).await {
                                break 'session;
                            }
                        }
                    }
                    Err(e) => debug!(error = %e, "Skipping unrecognized Gemini message"),
                }
            }
        }
    }
}

async fn forward(
    sink: &mut UpstreamSink,
    command: BridgeCommand,
    resampler: &mut StreamResampler,
) -> Result<()> {
    if let Some(msg) = client_message(command, resampler) {
        send_json(sink, &msg).await?;
    }
    Ok(())
}
