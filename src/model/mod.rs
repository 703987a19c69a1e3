//! Model adapter: loads a pretrained causal dialogue model once per process
//! and exposes encode/decode/generate to sessions.

mod loader;
mod runtime;
mod tokenizer;

#[cfg(test)]
pub(crate) mod fixtures;
#[cfg(test)]
pub(crate) mod scripted;

pub use loader::{ModelArtifacts, ModelLoader};
pub use runtime::LlamaDialogueModel;
pub use tokenizer::DialogueTokenizer;

use crate::config::ComputeDevice;
use crate::error::Result;

/// Tokens the runtime will accept as an end-of-turn marker, in lookup order
pub(crate) const END_OF_TURN_CANDIDATES: &[&str] =
    &["<|endoftext|>", "</s>", "<|eot_id|>", "<|im_end|>", "<|end|>"];

/// The narrow surface sessions use to talk to a loaded model.
///
/// Implementations hold no per-conversation state and are shared across
/// sessions behind an `Arc`.
pub trait DialogueModel: Send + Sync {
    /// Encode one utterance, appending the end-of-turn marker
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode tokens, dropping special and control tokens
    fn decode(&self, tokens: &[u32]) -> Result<String>;

    /// Sample at most `max_new_tokens` tokens continuing `context`. The
    /// end-of-turn marker is included when generation stops on it.
    fn generate(&self, context: &[u32], max_new_tokens: usize) -> Result<Vec<u32>>;

    /// Id of the end-of-turn marker
    fn end_of_turn(&self) -> u32;

    /// Device the weights live on
    fn device(&self) -> ComputeDevice;

    /// Identifier the model was loaded from
    fn model_id(&self) -> &str;
}
