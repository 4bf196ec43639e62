use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::core::responder::EchoResponder;
use crate::core::session::{SessionDeps, SttFactory};
use crate::core::stt::create_stt_provider;
use crate::core::transport::TwilioTransport;
use crate::core::tts::create_tts_provider;
use crate::core::SessionRegistry;

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    /// Live call sessions
    pub registry: Arc<SessionRegistry>,
    /// Acceptor the media stream handler hands new calls to
    pub transport: TwilioTransport,
    /// Process-wide shutdown token
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build providers from `config` and start dispatching calls.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new(
        config: ServerConfig,
        shutdown: CancellationToken,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let stt_config = config.stt_config()?;
        let stt_factory: SttFactory =
            Arc::new(move || create_stt_provider("deepgram", stt_config.clone()));
        let tts = create_tts_provider("elevenlabs", config.tts_config()?)?;

        let deps = SessionDeps {
            stt_factory,
            tts,
            responder: Arc::new(EchoResponder::new()),
            config: config.session_config()?,
        };

        Ok(Self::with_deps(config, deps, shutdown))
    }

    /// Start dispatching calls with explicit session dependencies
    pub fn with_deps(config: ServerConfig, deps: SessionDeps, shutdown: CancellationToken) -> Arc<Self> {
        let (transport, connections) = TwilioTransport::listen(config.media_stream_path.clone());
        let registry = SessionRegistry::new(deps, config.max_concurrent_calls, &shutdown);

        tokio::spawn(registry.clone().serve(connections, shutdown.clone()));

        tracing::info!(
            media_stream_path = %transport.path(),
            max_concurrent_calls = ?config.max_concurrent_calls,
            "Call dispatcher ready"
        );

        Arc::new(Self {
            config,
            registry,
            transport,
            shutdown,
        })
    }

    pub fn active_calls(&self) -> usize {
        self.registry.active_sessions()
    }

    pub fn is_at_capacity(&self) -> bool {
        self.registry.is_at_capacity()
    }
}
