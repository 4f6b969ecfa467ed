//! Viewer wire format.
//!
//! Begin and End travel as JSON text frames tagged with `"type"`. Data travels
//! as a binary frame: the 16 raw bytes of the capture ID followed by the
//! chunk exactly as received. Viewers send `join`/`leave` commands as JSON.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::capture::event::{BeginEvent, CaptureEvent, CaptureId, EndEvent};

/// Length of the capture ID prefix on binary data frames.
pub const DATA_ID_LEN: usize = 16;

/// Command sent by a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerCommand {
    Join { namespace: String },
    Leave { namespace: String },
}

/// Text frame sent to a viewer.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerFrame<'a> {
    Begin(&'a BeginEvent),
    End(&'a EndEvent),
    Joined { namespace: String },
    Left { namespace: String },
    Error { message: String },
}

impl ViewerFrame<'_> {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        Ok(Message::Text(self.to_json()?.into()))
    }
}

/// Encode a capture event as a WebSocket message.
pub fn encode_event(event: &CaptureEvent) -> Result<Message, serde_json::Error> {
    match event {
        CaptureEvent::Begin(begin) => ViewerFrame::Begin(begin).to_message(),
        CaptureEvent::End(end) => ViewerFrame::End(end).to_message(),
        CaptureEvent::Data { capture_id, bytes } => {
            Ok(Message::Binary(data_frame(*capture_id, bytes).into()))
        }
    }
}

/// Build the payload of a binary data frame.
pub fn data_frame(capture_id: CaptureId, chunk: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(DATA_ID_LEN + chunk.len());
    frame.extend_from_slice(capture_id.as_bytes());
    frame.extend_from_slice(chunk);
    frame
}

/// Split a binary data frame into its capture ID and chunk.
pub fn split_data_frame(frame: &[u8]) -> Option<(CaptureId, &[u8])> {
    if frame.len() < DATA_ID_LEN {
        return None;
    }
    let (id, chunk) = frame.split_at(DATA_ID_LEN);
    let id: [u8; DATA_ID_LEN] = id.try_into().ok()?;
    Some((CaptureId::from_bytes(id), chunk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use std::collections::BTreeMap;

    #[test]
    fn commands_parse_from_json() {
        let join: ViewerCommand = serde_json::from_str(r#"{"type":"join","namespace":"abc"}"#).unwrap();
        assert_eq!(join, ViewerCommand::Join { namespace: "abc".into() });
        let leave: ViewerCommand = serde_json::from_str(r#"{"type":"leave","namespace":"abc"}"#).unwrap();
        assert_eq!(leave, ViewerCommand::Leave { namespace: "abc".into() });
        assert!(serde_json::from_str::<ViewerCommand>(r#"{"type":"subscribe"}"#).is_err());
    }

    #[test]
    fn end_frame_is_tagged() {
        let id = CaptureId::new();
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "t".to_string());
        let end = EndEvent {
            capture_id: id,
            headers,
            http_version: "1.1".into(),
            method: "POST".into(),
            path: "/s/abc123".into(),
            scheme: "http".into(),
        };

        let json: serde_json::Value =
            serde_json::from_str(&ViewerFrame::End(&end).to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "end");
        assert_eq!(json["captureId"], id.to_string());
        assert_eq!(json["httpVersion"], "1.1");
        assert_eq!(json["headers"]["host"], "t");
    }

    #[test]
    fn data_event_becomes_binary_frame() {
        let id = CaptureId::new();
        let event = CaptureEvent::Data {
            capture_id: id,
            bytes: Bytes::from_static(b"hello"),
        };
        match encode_event(&event).unwrap() {
            Message::Binary(payload) => {
                let (decoded, chunk) = split_data_frame(&payload).unwrap();
                assert_eq!(decoded, id);
                assert_eq!(chunk, b"hello");
            }
            other => panic!("expected binary frame, got {other:?}"),
        }
    }

    #[test]
    fn short_frames_are_rejected() {
        assert!(split_data_frame(&[0u8; 15]).is_none());
        let (_, chunk) = split_data_frame(&[0u8; 16]).unwrap();
        assert!(chunk.is_empty());
    }
}
