use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tracing::{debug, info, info_span, warn};

use crate::config::ChatConfig;
use crate::error::{ChatError, ErrorExt, FailureKind, Result};
use crate::events::{EventLog, SessionEvent};
use crate::fallback::{FailureContext, FallbackPolicy};
use crate::model::DialogueModel;
use crate::types::{ChatReply, SessionPhase, SessionStatus};
use crate::validation::InputValidator;

use super::history::{ConversationHistory, HistoryLimits, Turn};

/// A single conversation over a shared model.
///
/// States are `Idle` and `Generating`. Only one request may be in flight: a
/// `submit` or `clear` that arrives mid-generation gets [`ChatError::Busy`].
/// The history lock is never held while the model generates, so sessions
/// sharing one model only contend on the model's own generation lock.
pub struct ChatSession {
    id: u64,
    model: Arc<dyn DialogueModel>,
    config: Arc<ChatConfig>,
    events: Arc<EventLog>,
    validator: InputValidator,
    fallback: FallbackPolicy,
    history: Mutex<ConversationHistory>,
    busy: AtomicBool,
    fallback_replies: AtomicUsize,
}

/// Holds the session in `Generating` until dropped
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl ChatSession {
    /// Fresh, empty session. Usually obtained from [`crate::ChatEngine::session`].
    pub fn new(
        id: u64,
        model: Arc<dyn DialogueModel>,
        config: Arc<ChatConfig>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            id,
            validator: InputValidator::new(config.max_input_chars()),
            fallback: FallbackPolicy::new(events.clone()),
            history: Mutex::new(ConversationHistory::new(HistoryLimits::from_config(&config))),
            busy: AtomicBool::new(false),
            fallback_replies: AtomicUsize::new(0),
            model,
            config,
            events,
        }
    }

    /// Identifier used in event log lines
    pub fn id(&self) -> u64 {
        self.id
    }

    fn enter(&self) -> Result<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ChatError::Busy)?;
        Ok(BusyGuard { flag: &self.busy })
    }

    /// Run one conversational turn.
    ///
    /// Invalid input and `Busy` come back as errors with history untouched.
    /// Generation failures never do: the user turn stays recorded, no model
    /// turn is stored, and the reply is the fallback policy's text.
    pub fn submit(&self, user_text: &str) -> Result<ChatReply> {
        let text = self.validator.sanitize(user_text)?;
        let _guard = self.enter()?;

        let span = info_span!("submit", session = self.id);
        let _enter = span.enter();

        let tokens = match self.model.encode(&text) {
            Ok(tokens) => tokens,
            Err(e) => return Ok(self.fall_back(&e)),
        };

        let (context, admission) = {
            let mut history = self.history.lock();
            let admission = history.push_user(text, tokens);
            (history.context(), admission)
        };
        if admission.truncated {
            warn!(
                context_budget = self.config.context_budget(),
                "Input alone exceeds the context budget, keeping its most recent tokens"
            );
        }
        if admission.evicted > 0 {
            debug!(evicted = admission.evicted, "Evicted oldest turns");
        }

        let budget = self.config.max_total_tokens().saturating_sub(context.len());
        let mut generated = match self.model.generate(&context, budget) {
            Ok(generated) => generated,
            Err(e) => return Ok(self.fall_back(&e)),
        };
        generated.truncate(budget);

        let reply_text = match self.model.decode(&generated) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                let err = ChatError::generation(FailureKind::Generation, "Model produced an empty reply");
                return Ok(self.fall_back(&err));
            }
            Err(e) => return Ok(self.fall_back(&e)),
        };

        self.history.lock().attach_reply(reply_text.clone(), generated);
        debug!(context_tokens = context.len(), "Reply generated");

        Ok(ChatReply::model(reply_text))
    }

    /// [`ChatSession::submit`] on tokio's blocking pool, for callers that must
    /// keep an interactive thread responsive.
    pub async fn submit_async(self: &Arc<Self>, user_text: impl Into<String>) -> Result<ChatReply> {
        let session = Arc::clone(self);
        let user_text = user_text.into();
        tokio::task::spawn_blocking(move || session.submit(&user_text))
            .await
            .map_err(|e| {
                ChatError::generation(FailureKind::Generation, format!("Generation task failed: {}", e))
            })?
    }

    fn fall_back(&self, err: &ChatError) -> ChatReply {
        let kind = err.failure_kind().unwrap_or(FailureKind::Generation);
        let turn_count = self.history.lock().len();
        self.fallback_replies.fetch_add(1, Ordering::Relaxed);

        self.fallback.handle(
            kind,
            FailureContext {
                session_id: self.id,
                turn_count,
                device: self.model.device(),
                detail: &err.to_string(),
            },
        )
    }

    /// Forget the whole conversation. Rejected with `Busy` mid-generation.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.enter()?;

        let turns_discarded = self.history.lock().clear();
        self.fallback_replies.store(0, Ordering::Relaxed);

        info!(session = self.id, turns_discarded, "Conversation history reset");
        self.events.record(SessionEvent::SessionReset {
            session_id: self.id,
            turns_discarded,
        });
        Ok(())
    }

    /// Read-only summary for a `/status` style display
    pub fn status(&self) -> SessionStatus {
        let phase = if self.busy.load(Ordering::Acquire) {
            SessionPhase::Generating
        } else {
            SessionPhase::Idle
        };

        let history = self.history.lock();
        SessionStatus {
            session_id: self.id,
            turn_count: history.len(),
            approx_tokens: history.token_len(),
            device: self.model.device().to_string(),
            phase,
            evicted_turns: history.evicted_total(),
            fallback_replies: self.fallback_replies.load(Ordering::Relaxed),
        }
    }

    /// Snapshot of the retained turns, oldest first
    pub fn history(&self) -> Vec<Turn> {
        self.history.lock().turns().cloned().collect()
    }
}
