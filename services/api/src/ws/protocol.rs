//! Defines the WebSocket message protocol between the client and a voice session.
//!
//! Binary frames carry raw PCM16 audio in both directions. Text frames carry
//! JSON: control events from the server, control messages from the client.

use axum::extract::ws::Message;
use recipe_road_core::{ClientInput, SessionOutput};
use serde::Deserialize;
use tracing::warn;

/// JSON messages sent from the client to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ends the session as if the client had disconnected, but cleanly.
    EndSession,
}

/// What a client frame means for the session.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    Input(ClientInput),
    /// The client closed the socket.
    Disconnect,
    Ignore,
}

/// Interprets one WebSocket frame from the client.
pub fn decode_client_frame(msg: Message) -> Inbound {
    match msg {
        Message::Binary(data) => Inbound::Input(ClientInput::Audio(data)),
        Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(ClientMessage::EndSession) => Inbound::Input(ClientInput::End),
            Err(e) => {
                warn!(error = %e, "Ignoring unrecognized client message");
                Inbound::Ignore
            }
        },
        Message::Close(_) => Inbound::Disconnect,
        Message::Ping(_) | Message::Pong(_) => Inbound::Ignore,
    }
}

/// Encodes one session output as a WebSocket frame.
pub fn encode_output(output: SessionOutput) -> Result<Message, serde_json::Error> {
    match output {
        SessionOutput::Audio(chunk) => Ok(Message::Binary(chunk)),
        SessionOutput::Control(event) => {
            let text = serde_json::to_string(&event)?;
            Ok(Message::Text(text.into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use recipe_road_core::ControlEvent;
    use serde_json::{Value, json};

    #[test]
    fn test_binary_frames_are_audio() {
        let frame = Message::Binary(Bytes::from_static(&[1, 2, 3, 4]));
        assert_eq!(
            decode_client_frame(frame),
            Inbound::Input(ClientInput::Audio(Bytes::from_static(&[1, 2, 3, 4])))
        );
    }

    #[test]
    fn test_end_session_message() {
        let frame = Message::Text(r#"{"type":"end_session"}"#.into());
        assert_eq!(decode_client_frame(frame), Inbound::Input(ClientInput::End));
    }

    #[test]
    fn test_unknown_text_is_ignored() {
        assert_eq!(
            decode_client_frame(Message::Text(r#"{"type":"dance"}"#.into())),
            Inbound::Ignore
        );
        assert_eq!(
            decode_client_frame(Message::Text("not json".into())),
            Inbound::Ignore
        );
        assert_eq!(decode_client_frame(Message::Close(None)), Inbound::Disconnect);
    }

    #[test]
    fn test_encode_output() {
        let audio = encode_output(SessionOutput::Audio(Bytes::from_static(&[9, 9]))).unwrap();
        assert!(matches!(audio, Message::Binary(ref data) if data.as_ref() == [9, 9]));

        let control = encode_output(SessionOutput::Control(ControlEvent::TimerCancelled {
            timer_id: "timer-1".into(),
        }))
        .unwrap();
        let Message::Text(text) = control else {
            panic!("control events must be text frames");
        };
        let value: Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value, json!({"type": "timer_cancelled", "timer_id": "timer-1"}));
    }
}
