//! Common type definitions shared by sessions and presentation layers

use std::fmt;
use serde::Serialize;

use crate::error::FailureKind;

/// Where a reply came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "kind")]
pub enum ReplyOrigin {
    /// Genuine model output, recorded in history
    Model,
    /// Substitute text produced by the fallback policy, never recorded
    Fallback(FailureKind),
}

/// Reply returned by [`crate::ChatSession::submit`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    /// Text to show the user
    pub text: String,
    /// Model output or fallback
    pub origin: ReplyOrigin,
}

impl ChatReply {
    pub(crate) fn model(text: String) -> Self {
        Self {
            text,
            origin: ReplyOrigin::Model,
        }
    }

    pub(crate) fn fallback(kind: FailureKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: ReplyOrigin::Fallback(kind),
        }
    }

    /// Whether this reply stands in for a failed generation
    pub fn is_fallback(&self) -> bool {
        matches!(self.origin, ReplyOrigin::Fallback(_))
    }
}

impl fmt::Display for ChatReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Session state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No request in flight
    Idle,
    /// One request in flight
    Generating,
}

/// Read-only diagnostics for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Session identifier within this process
    pub session_id: u64,
    /// Retained turns, answered or not
    pub turn_count: usize,
    /// Tokens currently held in history
    pub approx_tokens: usize,
    /// Device the shared model runs on
    pub device: String,
    /// Current phase
    pub phase: SessionPhase,
    /// Turns dropped by truncation since the last reset
    pub evicted_turns: usize,
    /// Replies produced by the fallback policy since the last reset
    pub fallback_replies: usize,
}
