// Location: src/model/runtime.rs

use std::sync::Arc;
use std::time::Instant;
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaEosToks};
use parking_lot::Mutex;
use tracing::debug;

use crate::config::{ChatConfig, ComputeDevice};
use crate::error::{ChatError, FailureKind, Result};
use super::tokenizer::DialogueTokenizer;
use super::DialogueModel;

/// Llama-architecture decoder running on candle
pub struct LlamaDialogueModel {
    model: Llama,
    config: Config,
    tokenizer: DialogueTokenizer,
    device: Device,
    app_config: Arc<ChatConfig>,
    /// Serializes generation across sessions; holds the sampling state
    state: Mutex<RuntimeState>,
}

struct RuntimeState {
    /// Bumped per request so identical prompts don't sample identically
    requests: u64,
    total_tokens_generated: usize,
}

impl LlamaDialogueModel {
    pub(crate) fn new(
        model: Llama,
        config: Config,
        tokenizer: DialogueTokenizer,
        device: Device,
        app_config: Arc<ChatConfig>,
    ) -> Self {
        Self {
            model,
            config,
            tokenizer,
            device,
            app_config,
            state: Mutex::new(RuntimeState {
                requests: 0,
                total_tokens_generated: 0,
            }),
        }
    }

    fn is_end_of_turn(&self, token: u32) -> bool {
        if token == self.tokenizer.end_of_turn() {
            return true;
        }
        match &self.config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => *id == token,
            Some(LlamaEosToks::Multiple(ids)) => ids.contains(&token),
            None => false,
        }
    }

    fn sample(&self, context: &[u32], max_new_tokens: usize, seed: u64) -> candle_core::Result<Vec<u32>> {
        // History changes between requests, so each one starts a fresh KV cache
        let mut cache = Cache::new(true, self.model_dtype(), &self.config, &self.device)?;
        let mut logits_processor = LogitsProcessor::new(
            seed,
            Some(self.app_config.temperature()),
            Some(self.app_config.top_p()),
        );

        let mut tokens = context.to_vec();
        let mut generated = Vec::new();
        let mut index_pos = 0;

        for index in 0..max_new_tokens {
            let context_size = if index > 0 { 1 } else { tokens.len() };
            let window = &tokens[tokens.len() - context_size..];
            let input = Tensor::new(window, &self.device)?.unsqueeze(0)?;

            let logits = self.model.forward(&input, index_pos, &mut cache)?;
            let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
            index_pos += window.len();

            let next_token = logits_processor.sample(&logits)?;
            tokens.push(next_token);
            generated.push(next_token);

            if self.is_end_of_turn(next_token) {
                break;
            }
        }

        Ok(generated)
    }

    fn model_dtype(&self) -> DType {
        if self.device.is_cuda() {
            DType::F16
        } else {
            DType::F32
        }
    }

    /// Total tokens produced since load
    pub fn total_tokens_generated(&self) -> usize {
        self.state.lock().total_tokens_generated
    }
}

impl DialogueModel for LlamaDialogueModel {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        self.tokenizer.encode(text)
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.tokenizer.decode(tokens)
    }

    fn generate(&self, context: &[u32], max_new_tokens: usize) -> Result<Vec<u32>> {
        if context.is_empty() {
            return Err(ChatError::generation(FailureKind::Generation, "Empty context"));
        }
        // Rotary tables stop at the model's trained context length
        let max_new_tokens = max_new_tokens
            .min(self.config.max_position_embeddings.saturating_sub(context.len()));
        if max_new_tokens == 0 {
            return Ok(Vec::new());
        }

        let mut state = self.state.lock();
        state.requests += 1;
        let seed = self.app_config.seed().wrapping_add(state.requests);

        let start_time = Instant::now();
        let generated = self
            .sample(context, max_new_tokens, seed)
            .map_err(|e| classify(&e))?;

        state.total_tokens_generated += generated.len();
        debug!(
            context_tokens = context.len(),
            new_tokens = generated.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Generation complete"
        );

        Ok(generated)
    }

    fn end_of_turn(&self) -> u32 {
        self.tokenizer.end_of_turn()
    }

    fn device(&self) -> ComputeDevice {
        self.app_config.device()
    }

    fn model_id(&self) -> &str {
        self.app_config.model_id()
    }
}

/// Device faults (allocation, driver) get their own fallback message
fn classify(err: &candle_core::Error) -> ChatError {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    let kind = if lowered.contains("out of memory") || lowered.contains("cuda") || lowered.contains("device") {
        FailureKind::Device
    } else {
        FailureKind::Generation
    };
    ChatError::generation(kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChatSettings, DeviceRequest};
    use crate::model::fixtures::{tiny_model, END_OF_TEXT, HELLO, MAX_POSITIONS};

    fn app_config() -> Arc<ChatConfig> {
        Arc::new(
            ChatSettings::default()
                .with_device(DeviceRequest::Cpu)
                .with_event_log_path(None)
                .with_max_total_tokens(MAX_POSITIONS)
                .with_reply_token_reserve(4)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_generation_stops_on_end_of_turn() {
        let model = tiny_model(END_OF_TEXT, app_config());
        let context = model.encode("hello there").unwrap();

        let generated = model.generate(&context, 8).unwrap();
        assert_eq!(generated, vec![END_OF_TEXT]);
        assert_eq!(model.decode(&generated).unwrap(), "");
    }

    #[test]
    fn test_generation_respects_token_bound() {
        let model = tiny_model(HELLO, app_config());
        let context = model.encode("how are you").unwrap();

        let generated = model.generate(&context, 5).unwrap();
        assert_eq!(generated, vec![HELLO; 5]);
        assert_eq!(model.decode(&generated).unwrap(), "hello hello hello hello hello");

        // Capped by the positions left in the model's window
        let long_context = vec![HELLO; MAX_POSITIONS - 2];
        let generated = model.generate(&long_context, 10).unwrap();
        assert_eq!(generated.len(), 2);

        assert!(model.generate(&[HELLO; MAX_POSITIONS], 4).unwrap().is_empty());
        assert_eq!(model.total_tokens_generated(), 7);
    }

    #[test]
    fn test_empty_context_is_generation_error() {
        let model = tiny_model(HELLO, app_config());
        assert!(matches!(
            model.generate(&[], 4),
            Err(ChatError::Generation { kind: FailureKind::Generation, .. })
        ));
    }

    #[test]
    fn test_failure_classification() {
        let oom = candle_core::Error::Msg("CUDA_ERROR_OUT_OF_MEMORY: out of memory".to_string());
        assert!(matches!(
            classify(&oom),
            ChatError::Generation { kind: FailureKind::Device, .. }
        ));

        let shape = candle_core::Error::Msg("shape mismatch in matmul".to_string());
        assert!(matches!(
            classify(&shape),
            ChatError::Generation { kind: FailureKind::Generation, .. }
        ));
    }
}
