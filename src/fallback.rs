//! Maps failures to substitute replies and records them.

use std::sync::Arc;
use tracing::error;

use crate::config::ComputeDevice;
use crate::error::FailureKind;
use crate::events::{EventLog, SessionEvent};
use crate::types::ChatReply;

/// Reply when sampling or decoding fails
pub const GENERATION_FALLBACK: &str = "Sorry, I encountered an error. Please try again.";
/// Reply when the compute device faults mid-generation
pub const DEVICE_FALLBACK: &str =
    "Sorry, my compute device ran into trouble while thinking. Please try again in a moment.";
/// Shown instead of a chat when no model could be loaded
pub const MODEL_LOAD_FALLBACK: &str =
    "Sorry, the chat model is not available right now. Please check the logs.";

/// What the policy needs to know about the session that failed
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    /// Session the failure happened in
    pub session_id: u64,
    /// Turns retained when the failure happened
    pub turn_count: usize,
    /// Device the model runs on
    pub device: ComputeDevice,
    /// Error text for the log, never shown to the user
    pub detail: &'a str,
}

/// Decides what the user sees when the model cannot answer
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    events: Arc<EventLog>,
}

impl FallbackPolicy {
    /// Policy recording into `events`
    pub fn new(events: Arc<EventLog>) -> Self {
        Self { events }
    }

    /// Fixed user-facing text for a failure kind
    pub fn message_for(&self, kind: FailureKind) -> &'static str {
        match kind {
            FailureKind::Generation => GENERATION_FALLBACK,
            FailureKind::Device => DEVICE_FALLBACK,
            FailureKind::ModelLoad => MODEL_LOAD_FALLBACK,
        }
    }

    /// Log the failure and produce the substitute reply. The reply is tagged as
    /// a fallback so callers never mistake it for model output.
    pub fn handle(&self, kind: FailureKind, context: FailureContext<'_>) -> ChatReply {
        error!(
            kind = %kind,
            session = context.session_id,
            turn_count = context.turn_count,
            device = %context.device,
            detail = context.detail,
            "Replying with fallback"
        );

        self.events.record(SessionEvent::Failure {
            kind,
            session_id: context.session_id,
            turn_count: context.turn_count,
            device: context.device,
            detail: context.detail,
        });

        ChatReply::fallback(kind, self.message_for(kind))
    }

    /// Log a model that failed to load and return the text to show in place
    /// of a chat
    pub fn handle_load_failure(&self, model_id: &str, detail: &str) -> &'static str {
        error!(model = model_id, detail, "Model failed to load");
        self.events.record(SessionEvent::ModelLoadFailed {
            model_id,
            error: detail,
        });
        self.message_for(FailureKind::ModelLoad)
    }
}
