use std::sync::Arc;
use imgbatch_core::{Config, ConversionSession, SanitizedConfig};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    session: Arc<ConversionSession>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(
        config: Config,
        session: Arc<ConversionSession>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        Self {
            config,
            session,
            ws_broadcaster,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &ConversionSession {
        self.session.as_ref()
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
