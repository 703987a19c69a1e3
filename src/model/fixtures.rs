//! A tiny real Llama for tests: one layer, vocabulary of seven words.
//!
//! Attention and MLP weights are zero, so every position carries its
//! all-ones embedding straight to the head. The head has a single non-zero
//! row, which makes sampling pick that token every time.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Llama, LlamaConfig};
use tokenizers::Tokenizer as HfTokenizer;

use crate::config::ChatConfig;
use super::runtime::LlamaDialogueModel;
use super::tokenizer::DialogueTokenizer;

pub(crate) const WORD_TOKENIZER: &str = r#"{
    "version": "1.0",
    "truncation": null,
    "padding": null,
    "added_tokens": [
        { "id": 6, "content": "<|endoftext|>", "single_word": false, "lstrip": false,
          "rstrip": false, "normalized": false, "special": true }
    ],
    "normalizer": null,
    "pre_tokenizer": { "type": "WhitespaceSplit" },
    "post_processor": null,
    "decoder": null,
    "model": {
        "type": "WordLevel",
        "vocab": { "[UNK]": 0, "hello": 1, "there": 2, "how": 3, "are": 4, "you": 5, "<|endoftext|>": 6 },
        "unk_token": "[UNK]"
    }
}"#;

pub(crate) const HELLO: u32 = 1;
pub(crate) const END_OF_TEXT: u32 = 6;
pub(crate) const MAX_POSITIONS: usize = 16;

pub(crate) fn tiny_config_json() -> String {
    format!(
        r#"{{
            "hidden_size": 8,
            "intermediate_size": 16,
            "vocab_size": 7,
            "num_hidden_layers": 1,
            "num_attention_heads": 2,
            "num_key_value_heads": 2,
            "rms_norm_eps": 1e-5,
            "eos_token_id": {},
            "max_position_embeddings": {}
        }}"#,
        END_OF_TEXT, MAX_POSITIONS
    )
}

/// Weights whose head always favors `favored`
pub(crate) fn tiny_weights(favored: u32) -> HashMap<String, Tensor> {
    let config: LlamaConfig = serde_json::from_str(&tiny_config_json()).unwrap();
    let (hidden, inter, vocab) = (config.hidden_size, config.intermediate_size, config.vocab_size);
    let dev = Device::Cpu;
    let zeros = |shape: (usize, usize)| Tensor::zeros(shape, DType::F32, &dev).unwrap();
    let ones = |len: usize| Tensor::ones(len, DType::F32, &dev).unwrap();

    let mut head = vec![0f32; vocab * hidden];
    let row = favored as usize * hidden;
    head[row..row + hidden].fill(4.0);

    let mut weights = HashMap::new();
    weights.insert(
        "model.embed_tokens.weight".to_string(),
        Tensor::ones((vocab, hidden), DType::F32, &dev).unwrap(),
    );
    weights.insert("model.norm.weight".to_string(), ones(hidden));
    weights.insert(
        "lm_head.weight".to_string(),
        Tensor::from_vec(head, (vocab, hidden), &dev).unwrap(),
    );

    let layer = "model.layers.0";
    for proj in ["q_proj", "k_proj", "v_proj", "o_proj"] {
        weights.insert(format!("{}.self_attn.{}.weight", layer, proj), zeros((hidden, hidden)));
    }
    weights.insert(format!("{}.mlp.gate_proj.weight", layer), zeros((inter, hidden)));
    weights.insert(format!("{}.mlp.up_proj.weight", layer), zeros((inter, hidden)));
    weights.insert(format!("{}.mlp.down_proj.weight", layer), zeros((hidden, inter)));
    weights.insert(format!("{}.input_layernorm.weight", layer), ones(hidden));
    weights.insert(format!("{}.post_attention_layernorm.weight", layer), ones(hidden));
    weights
}

pub(crate) fn word_tokenizer() -> HfTokenizer {
    HfTokenizer::from_str(WORD_TOKENIZER).unwrap()
}

/// Build the model in memory, bypassing the loader
pub(crate) fn tiny_model(favored: u32, app_config: Arc<ChatConfig>) -> LlamaDialogueModel {
    let config: LlamaConfig = serde_json::from_str(&tiny_config_json()).unwrap();
    let config = config.into_config(false);
    let vb = VarBuilder::from_tensors(tiny_weights(favored), DType::F32, &Device::Cpu);
    let model = Llama::load(vb, &config).unwrap();
    let tokenizer = DialogueTokenizer::new(word_tokenizer(), Some(END_OF_TEXT)).unwrap();
    LlamaDialogueModel::new(model, config, tokenizer, Device::Cpu, app_config)
}

/// Lay the model out on disk the way a downloaded repo looks
pub(crate) fn write_model_dir(dir: &Path, favored: u32) {
    std::fs::write(dir.join("config.json"), tiny_config_json()).unwrap();
    std::fs::write(dir.join("tokenizer.json"), WORD_TOKENIZER).unwrap();
    candle_core::safetensors::save(&tiny_weights(favored), dir.join("model.safetensors")).unwrap();
}
