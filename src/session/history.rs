//! Bounded queue of turns with a single eviction policy: whole turns, oldest
//! first.

use std::collections::VecDeque;

use crate::config::ChatConfig;

/// Raw text plus its encoded form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Sanitized text as shown to the user
    pub text: String,
    /// Encoded form, end-of-turn marker included
    pub tokens: Vec<u32>,
}

/// One user utterance and, when generation succeeded, the model's reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    user: Utterance,
    reply: Option<Utterance>,
    truncated: bool,
}

impl Turn {
    /// What the user said
    pub fn user(&self) -> &Utterance {
        &self.user
    }

    /// `None` when the turn was answered by a fallback
    pub fn reply(&self) -> Option<&Utterance> {
        self.reply.as_ref()
    }

    /// Whether the model replied
    pub fn is_answered(&self) -> bool {
        self.reply.is_some()
    }

    /// The user tokens were cut to fit the context budget
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Tokens this turn contributes to the context
    pub fn token_len(&self) -> usize {
        self.user.tokens.len() + self.reply.as_ref().map_or(0, |r| r.tokens.len())
    }
}

/// Bounds a history enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    /// Hard cap on retained tokens, replies included
    pub max_total_tokens: usize,
    /// Cap applied when a new user turn is admitted
    pub context_budget: usize,
    /// Cap on retained turns, the newest included
    pub max_turns: usize,
}

impl HistoryLimits {
    /// Limits taken from a validated configuration
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            max_total_tokens: config.max_total_tokens(),
            context_budget: config.context_budget(),
            max_turns: config.max_turns(),
        }
    }
}

/// What admitting a user turn cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Admission {
    /// Whole turns dropped from the front
    pub evicted: usize,
    /// The new turn itself had to be cut
    pub truncated: bool,
}

/// Rolling history of one conversation
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    limits: HistoryLimits,
    token_len: usize,
    evicted_total: usize,
}

impl ConversationHistory {
    /// Empty history bounded by `limits`
    pub fn new(limits: HistoryLimits) -> Self {
        Self {
            turns: VecDeque::new(),
            limits,
            token_len: 0,
            evicted_total: 0,
        }
    }

    /// Append a user turn, then evict whole turns from the front until both the
    /// turn cap and the context budget hold, or only this turn is left. A lone
    /// turn still over budget keeps its most recent tokens.
    pub fn push_user(&mut self, text: String, tokens: Vec<u32>) -> Admission {
        self.token_len += tokens.len();
        self.turns.push_back(Turn {
            user: Utterance { text, tokens },
            reply: None,
            truncated: false,
        });

        let mut admission = Admission::default();
        while self.turns.len() > 1
            && (self.turns.len() > self.limits.max_turns || self.token_len > self.limits.context_budget)
        {
            if let Some(oldest) = self.turns.pop_front() {
                self.token_len -= oldest.token_len();
                admission.evicted += 1;
            }
        }

        if self.token_len > self.limits.context_budget {
            if let Some(current) = self.turns.back_mut() {
                let excess = self.token_len - self.limits.context_budget;
                current.user.tokens.drain(..excess);
                current.truncated = true;
                self.token_len -= excess;
                admission.truncated = true;
            }
        }

        self.evicted_total += admission.evicted;
        admission
    }

    /// Record the model's reply on the newest turn. Tokens beyond the hard cap
    /// are dropped. Returns false when there is no unanswered turn to attach to.
    pub fn attach_reply(&mut self, text: String, mut tokens: Vec<u32>) -> bool {
        let room = self.limits.max_total_tokens.saturating_sub(self.token_len);
        match self.turns.back_mut() {
            Some(turn) if turn.reply.is_none() => {
                tokens.truncate(room);
                self.token_len += tokens.len();
                turn.reply = Some(Utterance { text, tokens });
                true
            }
            _ => false,
        }
    }

    /// All retained tokens in conversation order
    pub fn context(&self) -> Vec<u32> {
        let mut context = Vec::with_capacity(self.token_len);
        for turn in &self.turns {
            context.extend_from_slice(&turn.user.tokens);
            if let Some(reply) = &turn.reply {
                context.extend_from_slice(&reply.tokens);
            }
        }
        context
    }

    /// Drop everything; returns how many turns were discarded
    pub fn clear(&mut self) -> usize {
        let discarded = self.turns.len();
        self.turns.clear();
        self.token_len = 0;
        self.evicted_total = 0;
        discarded
    }

    /// Retained turns, oldest first
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Newest turn
    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }

    /// Number of retained turns
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turns are retained
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Tokens currently retained
    pub fn token_len(&self) -> usize {
        self.token_len
    }

    /// Turns evicted since creation or the last clear
    pub fn evicted_total(&self) -> usize {
        self.evicted_total
    }

    /// Bounds in force
    pub fn limits(&self) -> HistoryLimits {
        self.limits
    }
}
