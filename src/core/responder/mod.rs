//! Response generation.
//!
//! A [`ResponseGenerator`] turns one finished caller utterance into the text
//! the agent should speak. Generators are synchronous; the session runs them
//! on the blocking pool so a slow generator never stalls the event loop.

mod echo;

use std::sync::Arc;

pub use echo::{EchoResponder, format_clock};

/// Error types for response generation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResponderError {
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
    #[error("Generator unavailable: {0}")]
    Unavailable(String),
}

/// Produces the agent's reply to a caller utterance.
///
/// An empty reply means "stay silent".
pub trait ResponseGenerator: Send + Sync {
    fn respond(&self, utterance: &str) -> Result<String, ResponderError>;
}

/// Shared handle to a response generator
pub type SharedResponder = Arc<dyn ResponseGenerator>;

impl<F> ResponseGenerator for F
where
    F: Fn(&str) -> Result<String, ResponderError> + Send + Sync,
{
    fn respond(&self, utterance: &str) -> Result<String, ResponderError> {
        self(utterance)
    }
}
