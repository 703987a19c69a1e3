//! In-process stand-in for a real model, used by unit tests.
//!
//! Every char is one token (code point + 1); token 0 is the end-of-turn marker.

use std::collections::VecDeque;
use parking_lot::Mutex;

use crate::config::ComputeDevice;
use crate::error::{ChatError, FailureKind, Result};
use super::DialogueModel;

pub(crate) const END_OF_TURN: u32 = 0;

pub(crate) enum Script {
    Reply(String),
    Fail(FailureKind),
}

pub(crate) struct ScriptedModel {
    script: Mutex<VecDeque<Script>>,
    contexts: Mutex<Vec<Vec<u32>>>,
    budgets: Mutex<Vec<usize>>,
}

impl ScriptedModel {
    pub(crate) fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            contexts: Mutex::new(Vec::new()),
            budgets: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn reply(self, text: &str) -> Self {
        self.script.lock().push_back(Script::Reply(text.to_string()));
        self
    }

    pub(crate) fn fail(self, kind: FailureKind) -> Self {
        self.script.lock().push_back(Script::Fail(kind));
        self
    }

    pub(crate) fn push_reply(&self, text: &str) {
        self.script.lock().push_back(Script::Reply(text.to_string()));
    }

    pub(crate) fn push_failure(&self, kind: FailureKind) {
        self.script.lock().push_back(Script::Fail(kind));
    }

    /// Every context passed to `generate`, oldest first
    pub(crate) fn contexts(&self) -> Vec<Vec<u32>> {
        self.contexts.lock().clone()
    }

    pub(crate) fn budgets(&self) -> Vec<usize> {
        self.budgets.lock().clone()
    }

    pub(crate) fn tokens(text: &str) -> Vec<u32> {
        text.chars().map(|c| c as u32 + 1).chain(Some(END_OF_TURN)).collect()
    }
}

impl DialogueModel for ScriptedModel {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(Self::tokens(text))
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        tokens
            .iter()
            .filter(|&&t| t != END_OF_TURN)
            .map(|&t| {
                char::from_u32(t - 1).ok_or_else(|| {
                    ChatError::generation(FailureKind::Generation, format!("bad token {}", t))
                })
            })
            .collect()
    }

    fn generate(&self, context: &[u32], max_new_tokens: usize) -> Result<Vec<u32>> {
        self.contexts.lock().push(context.to_vec());
        self.budgets.lock().push(max_new_tokens);

        let next = self.script.lock().pop_front();
        match next {
            Some(Script::Fail(kind)) => Err(ChatError::generation(kind, "scripted failure")),
            Some(Script::Reply(text)) => {
                let mut tokens = Self::tokens(&text);
                tokens.truncate(max_new_tokens);
                Ok(tokens)
            }
            None => {
                let mut tokens = Self::tokens("ok");
                tokens.truncate(max_new_tokens);
                Ok(tokens)
            }
        }
    }

    fn end_of_turn(&self) -> u32 {
        END_OF_TURN
    }

    fn device(&self) -> ComputeDevice {
        ComputeDevice::Cpu
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}
