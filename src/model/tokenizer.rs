// Location: src/model/tokenizer.rs

use std::path::Path;
use anyhow::anyhow;
use tokenizers::Tokenizer as HfTokenizer;

use crate::error::{ChatError, FailureKind, Result};
use super::END_OF_TURN_CANDIDATES;

/// HuggingFace tokenizer plus the end-of-turn marker the model was trained on
pub struct DialogueTokenizer {
    tokenizer: HfTokenizer,
    end_of_turn: u32,
    vocab_size: usize,
}

impl DialogueTokenizer {
    /// Load `tokenizer.json`. `eos_hint` comes from the model config and wins
    /// over the token-name lookup.
    pub fn from_file(path: impl AsRef<Path>, eos_hint: Option<u32>) -> anyhow::Result<Self> {
        let tokenizer = HfTokenizer::from_file(path.as_ref())
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        Self::new(tokenizer, eos_hint)
    }

    /// Wrap an already parsed tokenizer, resolving its end-of-turn marker
    pub fn new(tokenizer: HfTokenizer, eos_hint: Option<u32>) -> anyhow::Result<Self> {
        let end_of_turn = eos_hint
            .or_else(|| {
                END_OF_TURN_CANDIDATES
                    .iter()
                    .find_map(|token| tokenizer.token_to_id(token))
            })
            .ok_or_else(|| anyhow!("Tokenizer has no recognizable end-of-turn token"))?;

        Ok(Self {
            vocab_size: tokenizer.get_vocab_size(true),
            tokenizer,
            end_of_turn,
        })
    }

    /// Encode text and terminate it with the end-of-turn marker
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self.tokenizer.encode(text, false).map_err(|e| {
            ChatError::generation(FailureKind::Generation, format!("Tokenization failed: {}", e))
        })?;

        let mut tokens = encoding.get_ids().to_vec();
        tokens.push(self.end_of_turn);
        Ok(tokens)
    }

    /// Decode token IDs back to text, skipping special tokens
    pub fn decode(&self, tokens: &[u32]) -> Result<String> {
        let text = self.tokenizer.decode(tokens, true).map_err(|e| {
            ChatError::generation(FailureKind::Generation, format!("Decoding failed: {}", e))
        })?;
        Ok(text.trim().to_string())
    }

    /// Id appended by `encode` and treated as a stop token
    pub fn end_of_turn(&self) -> u32 {
        self.end_of_turn
    }

    /// Get token ID for a string
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    /// Get the vocabulary size, added tokens included
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}
