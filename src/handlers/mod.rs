//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `voice` - Twilio voice webhook returning TwiML
//! - `media_stream` - Twilio Media Streams WebSocket

pub mod api;
pub mod media_stream;
pub mod voice;

pub use media_stream::media_stream_handler;
pub use voice::inbound_call_handler;
