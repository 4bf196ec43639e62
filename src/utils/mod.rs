pub mod twiml;
pub use twiml::{voice_response, xml_escape};
