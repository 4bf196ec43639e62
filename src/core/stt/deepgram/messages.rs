//! Wire types for the Deepgram live transcription socket.
//!
//! Server messages are tagged by their `type` field. Only the fields the
//! gateway acts on are modelled; everything else is ignored by serde.

use serde::{Deserialize, Serialize};

use crate::core::stt::base::{RecognitionEvent, STTError};

// =============================================================================
// Server -> Client
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum DeepgramMessage {
    Results(ResultsMessage),
    Metadata(MetadataMessage),
    SpeechStarted(SpeechStartedMessage),
    UtteranceEnd(UtteranceEndMessage),
    Error(ErrorMessage),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultsMessage {
    pub channel: ResultsChannel,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub speech_final: bool,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultsChannel {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataMessage {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechStartedMessage {
    #[serde(default)]
    pub timestamp: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UtteranceEndMessage {
    #[serde(default)]
    pub last_word_end: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMessage {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub variant: Option<String>,
}

impl DeepgramMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Map a server message onto the gateway's recognition events.
    ///
    /// Returns `None` for messages with nothing to report (metadata, empty
    /// transcripts, unknown types).
    pub fn into_event(self) -> Option<RecognitionEvent> {
        match self {
            DeepgramMessage::Results(results) => {
                let transcript = results
                    .channel
                    .alternatives
                    .into_iter()
                    .next()
                    .map(|alt| alt.transcript)
                    .unwrap_or_default();

                if transcript.trim().is_empty() {
                    return None;
                }

                if results.is_final {
                    Some(RecognitionEvent::Final(transcript))
                } else {
                    Some(RecognitionEvent::Interim(transcript))
                }
            }
            DeepgramMessage::SpeechStarted(_) => Some(RecognitionEvent::SpeechStarted),
            DeepgramMessage::UtteranceEnd(_) => Some(RecognitionEvent::SpeechEnded),
            DeepgramMessage::Error(err) => {
                let detail = if err.description.is_empty() {
                    err.message
                } else {
                    err.description
                };
                Some(RecognitionEvent::Error(STTError::ProviderError(detail)))
            }
            DeepgramMessage::Metadata(_) | DeepgramMessage::Unknown => None,
        }
    }
}

// =============================================================================
// Client -> Server
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Flush pending audio and close the stream
    CloseStream,
    /// Keep the socket open while no audio is sent
    KeepAlive,
}

impl ControlMessage {
    pub fn as_json(&self) -> &'static str {
        match self {
            ControlMessage::CloseStream => r#"{"type":"CloseStream"}"#,
            ControlMessage::KeepAlive => r#"{"type":"KeepAlive"}"#,
        }
    }
}
