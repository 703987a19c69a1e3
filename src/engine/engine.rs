use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use serde::Serialize;
use tracing::debug;

use crate::{
    config::{ChatConfig, ComputeDevice},
    events::EventLog,
    model::DialogueModel,
    session::ChatSession,
};

use super::builder::EngineBuilder;

/// Main entry point for the chat engine library.
///
/// Owns one loaded model and hands out independent sessions over it.
pub struct ChatEngine {
    config: Arc<ChatConfig>,
    model: Arc<dyn DialogueModel>,
    events: Arc<EventLog>,
    next_session_id: AtomicU64,
}

impl ChatEngine {
    pub(crate) fn new(
        config: Arc<ChatConfig>,
        model: Arc<dyn DialogueModel>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            config,
            model,
            events,
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Create a new engine builder
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Start a new conversation with an empty history
    pub fn session(&self) -> ChatSession {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        debug!(session = id, "Session created");
        ChatSession::new(id, self.model.clone(), self.config.clone(), self.events.clone())
    }

    /// Get information about the engine's model and limits
    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            model_id: self.model.model_id().to_string(),
            device: self.model.device(),
            max_total_tokens: self.config.max_total_tokens(),
            max_turns: self.config.max_turns(),
            max_input_chars: self.config.max_input_chars(),
        }
    }

    /// The validated configuration
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// The shared model
    pub fn model(&self) -> &Arc<dyn DialogueModel> {
        &self.model
    }

    /// The shared event log
    pub fn events(&self) -> &EventLog {
        &self.events
    }
}

/// Information about the engine's model and limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineInfo {
    /// Identifier of the model that actually loaded
    pub model_id: String,
    /// Device the weights live on
    pub device: ComputeDevice,
    /// Hard cap on retained history tokens
    pub max_total_tokens: usize,
    /// Cap on retained turns
    pub max_turns: usize,
    /// Longest accepted input, in characters
    pub max_input_chars: usize,
}
