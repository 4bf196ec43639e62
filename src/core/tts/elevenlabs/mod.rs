//! ElevenLabs text-to-speech integration.
//!
//! Uses the HTTP streaming endpoint
//! `POST /v1/text-to-speech/{voice_id}/stream`, which returns audio in the
//! requested `output_format` as a chunked body. For telephony the gateway asks
//! for `ulaw_8000`, so the bytes go to Twilio without transcoding.

mod config;
mod provider;


pub use config::{
    ELEVENLABS_API_URL, ElevenLabsTTSConfig, StreamRequestBody, VoiceSettings, accept_header,
    output_format,
};
pub use provider::ElevenLabsTTS;
