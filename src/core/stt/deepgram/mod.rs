//! Deepgram streaming Speech-to-Text integration.
//!
//! This module provides a WebSocket client for Deepgram's live transcription
//! endpoint, tuned for telephony audio (8 kHz mu-law, mono):
//!
//! - Interim and final transcripts
//! - Voice activity events (`SpeechStarted`, `UtteranceEnd`)
//! - Graceful `CloseStream` on disconnect
//! - Keep-alive frames while the caller is silent
//!
//! The module is organized into focused submodules:
//!
//! - [`config`]: `DeepgramSTTConfig` and URL construction
//! - [`messages`]: Wire types for the listen socket
//! - [`client`]: The `DeepgramSTT` client implementing `BaseSTT`
//!
//! # Example
//!
//! ```rust,no_run
//! use teleagent_gateway::core::stt::{BaseSTT, DeepgramSTT, STTConfig};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = STTConfig {
//!         api_key: "your-deepgram-api-key".to_string(),
//!         ..Default::default()
//!     };
//!
//!     let (events_tx, mut events_rx) = mpsc::unbounded_channel();
//!     let mut stt = DeepgramSTT::new(config)?;
//!     stt.connect(events_tx).await?;
//!
//!     stt.send_audio(vec![0xFFu8; 160].into()).await?;
//!     if let Some(event) = events_rx.recv().await {
//!         println!("{event:?}");
//!     }
//!
//!     stt.disconnect().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod messages;


pub use client::DeepgramSTT;
pub use config::{DEEPGRAM_STT_URL, DeepgramSTTConfig};
pub use messages::{ControlMessage, DeepgramMessage};
