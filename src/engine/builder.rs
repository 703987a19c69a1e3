use std::sync::Arc;
use tracing::info;

use crate::{
    config::{ChatConfig, ChatSettings},
    error::{ChatError, Result},
    events::{EventLog, SessionEvent},
    fallback::FallbackPolicy,
    model::{DialogueModel, ModelLoader},
};

use super::engine::ChatEngine;

/// Builder for constructing a ChatEngine instance
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<ChatConfig>,
    model: Option<Arc<dyn DialogueModel>>,
    alternate_models: Vec<String>,
    events: Option<EventLog>,
}

impl EngineBuilder {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the validated configuration
    pub fn with_config(mut self, config: ChatConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Validate raw settings and use them as the configuration
    pub fn with_settings(self, settings: ChatSettings) -> Result<Self> {
        Ok(self.with_config(settings.build()?))
    }

    /// Use an already constructed model instead of loading one
    pub fn with_model(mut self, model: Arc<dyn DialogueModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Model identifier to try when every earlier one failed to load
    pub fn with_alternate_model(mut self, model_id: impl Into<String>) -> Self {
        self.alternate_models.push(model_id.into());
        self
    }

    /// Use this event log instead of the one named in the configuration
    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the engine instance.
    ///
    /// Blocks while weights are fetched and mapped; async callers should run
    /// this on a blocking thread.
    pub fn build(self) -> Result<ChatEngine> {
        let config = match self.config {
            Some(config) => config,
            None => ChatSettings::default().build()?,
        };

        let events = match self.events {
            Some(events) => events,
            None => open_event_log(&config)?,
        };
        events.record(SessionEvent::DeviceResolved {
            requested: config.requested_device(),
            resolved: config.device(),
        });

        let config = Arc::new(config);
        let events = Arc::new(events);
        let model = match self.model {
            Some(model) => model,
            None => {
                let fallback = FallbackPolicy::new(events.clone());
                load_first_available(&config, &self.alternate_models, &fallback)?
            }
        };
        events.record(SessionEvent::ModelLoaded {
            model_id: model.model_id(),
            device: model.device(),
        });

        Ok(ChatEngine::new(config, model, events))
    }
}

fn open_event_log(config: &ChatConfig) -> Result<EventLog> {
    match config.event_log_path() {
        Some(path) => EventLog::open(path).map_err(|e| {
            ChatError::config(
                "event_log_path",
                format!("Cannot open event log {}: {}", path.display(), e),
            )
        }),
        None => Ok(EventLog::disabled()),
    }
}

/// Try the configured model, then each alternate in order
fn load_first_available(
    config: &Arc<ChatConfig>,
    alternates: &[String],
    fallback: &FallbackPolicy,
) -> Result<Arc<dyn DialogueModel>> {
    let mut last_error = None;

    let candidates = std::iter::once(config.clone())
        .chain(alternates.iter().map(|id| Arc::new(config.with_model_id(id))));

    for candidate in candidates {
        match ModelLoader::new(candidate.clone()).load() {
            Ok(model) => {
                info!(model = candidate.model_id(), "Using model");
                let model: Arc<dyn DialogueModel> = Arc::new(model);
                return Ok(model);
            }
            Err(e) => {
                fallback.handle_load_failure(candidate.model_id(), &e.to_string());
                last_error = Some(e);
            }
        }
    }

    // The primary is always attempted, so an error was recorded
    Err(last_error.unwrap_or_else(|| ChatError::config("model_id", "No model to load")))
}
