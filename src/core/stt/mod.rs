mod base;
pub mod deepgram;

// Re-export public types and traits
pub use base::{
    BaseSTT, RecognitionEvent, RecognitionReceiver, RecognitionSender, STTConfig, STTError,
};

// Re-export Deepgram implementation
pub use deepgram::{DeepgramSTT, DeepgramSTTConfig};

/// Supported STT providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum STTProvider {
    /// Deepgram live transcription WebSocket API
    Deepgram,
}

impl std::fmt::Display for STTProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            STTProvider::Deepgram => write!(f, "deepgram"),
        }
    }
}

impl std::str::FromStr for STTProvider {
    type Err = STTError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deepgram" => Ok(STTProvider::Deepgram),
            _ => Err(STTError::ConfigurationError(format!(
                "Unsupported STT provider: {s}. Supported providers: {}",
                get_supported_stt_providers().join(", ")
            ))),
        }
    }
}

/// Factory function to create STT providers by name
///
/// # Examples
/// ```rust,no_run
/// use teleagent_gateway::core::stt::{create_stt_provider, STTConfig};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = STTConfig {
///         api_key: "your-deepgram-api-key".to_string(),
///         ..Default::default()
///     };
///     let stt = create_stt_provider("deepgram", config)?;
///     assert_eq!(stt.get_provider_info(), "deepgram");
///     Ok(())
/// }
/// ```
pub fn create_stt_provider(
    provider: &str,
    config: STTConfig,
) -> Result<Box<dyn BaseSTT>, STTError> {
    create_stt_provider_from_enum(provider.parse()?, config)
}

/// Factory function to create STT providers using the enum directly
pub fn create_stt_provider_from_enum(
    provider: STTProvider,
    config: STTConfig,
) -> Result<Box<dyn BaseSTT>, STTError> {
    match provider {
        STTProvider::Deepgram => Ok(Box::new(DeepgramSTT::new(config)?)),
    }
}

/// Get a list of all supported STT providers
pub fn get_supported_stt_providers() -> Vec<&'static str> {
    vec!["deepgram"]
}
