use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{anyhow, bail, Context};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Llama, LlamaConfig, LlamaEosToks};
use hf_hub::{api::sync::ApiBuilder, Repo, RepoType};
use tracing::{info, warn};

use crate::config::{ChatConfig, ComputeDevice};
use crate::error::{ChatError, Result};
use super::runtime::LlamaDialogueModel;
use super::tokenizer::DialogueTokenizer;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const SINGLE_WEIGHTS_FILE: &str = "model.safetensors";
const WEIGHTS_INDEX_FILE: &str = "model.safetensors.index.json";

/// Files needed to build a model, already on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifacts {
    /// Llama-architecture `config.json`
    pub config_file: PathBuf,
    /// HuggingFace `tokenizer.json`
    pub tokenizer_file: PathBuf,
    /// One safetensors file, or every shard named by the index
    pub weight_files: Vec<PathBuf>,
}

/// Turns a configured model identifier into a ready [`LlamaDialogueModel`]
pub struct ModelLoader {
    config: Arc<ChatConfig>,
}

impl ModelLoader {
    /// Loader for the model named by `config`
    pub fn new(config: Arc<ChatConfig>) -> Self {
        Self { config }
    }

    /// Fetch artifacts, place weights on the configured device and build the
    /// model. Any failure is a `ModelLoad` error.
    pub fn load(&self) -> Result<LlamaDialogueModel> {
        let model_id = self.config.model_id();
        info!(model = model_id, device = %self.config.device(), "Loading model");

        self.load_inner()
            .map_err(|e| ChatError::model_load(model_id, e))
    }

    fn load_inner(&self) -> anyhow::Result<LlamaDialogueModel> {
        let artifacts = self.resolve_artifacts()?;
        let device = create_device(self.config.device())?;

        let raw = std::fs::read(&artifacts.config_file)
            .with_context(|| format!("reading {}", artifacts.config_file.display()))?;
        let llama_config: LlamaConfig = serde_json::from_slice(&raw)
            .context("config.json is not a Llama-architecture config")?;
        let llama_config = llama_config.into_config(false);
        check_context_window(self.config.max_total_tokens(), llama_config.max_position_embeddings)?;

        let eos_hint = match &llama_config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => Some(*id),
            Some(LlamaEosToks::Multiple(ids)) => ids.first().copied(),
            None => None,
        };
        let tokenizer = DialogueTokenizer::from_file(&artifacts.tokenizer_file, eos_hint)?;

        // Half precision only pays off on the GPU
        let dtype = if device.is_cuda() { DType::F16 } else { DType::F32 };
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&artifacts.weight_files, dtype, &device)
                .context("mapping safetensors weights")?
        };
        let model = Llama::load(vb, &llama_config).context("building model from weights")?;

        info!(
            model = self.config.model_id(),
            vocab_size = tokenizer.vocab_size(),
            layers = llama_config.num_hidden_layers,
            "Model loaded successfully"
        );

        Ok(LlamaDialogueModel::new(
            model,
            llama_config,
            tokenizer,
            device,
            self.config.clone(),
        ))
    }

    /// Local directory when the identifier names one, otherwise the HF hub
    pub fn resolve_artifacts(&self) -> anyhow::Result<ModelArtifacts> {
        let local = Path::new(self.config.model_id());
        if local.is_dir() {
            return local_artifacts(local);
        }
        self.download_artifacts()
    }

    fn download_artifacts(&self) -> anyhow::Result<ModelArtifacts> {
        let api = ApiBuilder::new()
            .with_progress(true)
            .build()
            .context("unable to create huggingface api")?;
        let repo = api.repo(Repo::with_revision(
            self.config.model_id().to_string(),
            RepoType::Model,
            self.config.revision().to_string(),
        ));

        let config_file = repo.get(CONFIG_FILE).context("downloading config.json")?;
        let tokenizer_file = repo.get(TOKENIZER_FILE).context("downloading tokenizer.json")?;

        let weight_files = match repo.get(SINGLE_WEIGHTS_FILE) {
            Ok(path) => vec![path],
            Err(single_err) => {
                let index = repo.get(WEIGHTS_INDEX_FILE).map_err(|_| {
                    anyhow!("no {} or {} in repo: {}", SINGLE_WEIGHTS_FILE, WEIGHTS_INDEX_FILE, single_err)
                })?;
                shard_names(&index)?
                    .iter()
                    .map(|name| repo.get(name).with_context(|| format!("downloading {}", name)))
                    .collect::<anyhow::Result<Vec<_>>>()?
            }
        };

        Ok(ModelArtifacts {
            config_file,
            tokenizer_file,
            weight_files,
        })
    }
}

fn local_artifacts(dir: &Path) -> anyhow::Result<ModelArtifacts> {
    let config_file = dir.join(CONFIG_FILE);
    let tokenizer_file = dir.join(TOKENIZER_FILE);
    for file in [&config_file, &tokenizer_file] {
        if !file.is_file() {
            bail!("missing {}", file.display());
        }
    }

    let single = dir.join(SINGLE_WEIGHTS_FILE);
    let index = dir.join(WEIGHTS_INDEX_FILE);
    let weight_files = if single.is_file() {
        vec![single]
    } else if index.is_file() {
        shard_names(&index)?.into_iter().map(|name| dir.join(name)).collect()
    } else {
        bail!("no safetensors weights in {}", dir.display());
    };

    Ok(ModelArtifacts {
        config_file,
        tokenizer_file,
        weight_files,
    })
}

/// Unique shard file names listed in a safetensors index, in sorted order
fn shard_names(index_file: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read(index_file)
        .with_context(|| format!("reading {}", index_file.display()))?;
    let index: serde_json::Value = serde_json::from_slice(&raw)?;
    let weight_map = index
        .get("weight_map")
        .and_then(|m| m.as_object())
        .ok_or_else(|| anyhow!("{} has no weight_map", index_file.display()))?;

    let names: BTreeSet<String> = weight_map
        .values()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    if names.is_empty() {
        bail!("{} lists no shards", index_file.display());
    }
    Ok(names.into_iter().collect())
}

/// History is bounded by `max_total_tokens`; the model must be able to
/// attend over all of it
fn check_context_window(max_total_tokens: usize, max_position_embeddings: usize) -> anyhow::Result<()> {
    if max_total_tokens > max_position_embeddings {
        bail!(
            "max_total_tokens {} exceeds the model's max_position_embeddings {}",
            max_total_tokens,
            max_position_embeddings
        );
    }
    Ok(())
}

fn create_device(device: ComputeDevice) -> anyhow::Result<Device> {
    match device {
        ComputeDevice::Cpu => Ok(Device::Cpu),
        ComputeDevice::Cuda { ordinal } => Device::new_cuda(ordinal).map_err(|e| {
            warn!(ordinal, error = %e, "CUDA device placement failed");
            anyhow!("cannot place model on cuda:{}: {}", ordinal, e)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChatSettings, DeviceRequest};
    use crate::events::EventLog;
    use crate::model::fixtures::{write_model_dir, END_OF_TEXT, HELLO, MAX_POSITIONS};
    use crate::model::DialogueModel;
    use crate::session::ChatSession;
    use std::fs;

    fn config_for(model_id: &str) -> Arc<ChatConfig> {
        config_with_window(model_id, 1000, 128)
    }

    fn config_with_window(model_id: &str, max_total_tokens: usize, reserve: usize) -> Arc<ChatConfig> {
        Arc::new(
            ChatSettings::default()
                .with_model_id(model_id)
                .with_device(DeviceRequest::Cpu)
                .with_event_log_path(None)
                .with_max_total_tokens(max_total_tokens)
                .with_reply_token_reserve(reserve)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_local_single_file_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        for name in [CONFIG_FILE, TOKENIZER_FILE, SINGLE_WEIGHTS_FILE] {
            fs::write(dir.path().join(name), b"{}").unwrap();
        }

        let loader = ModelLoader::new(config_for(dir.path().to_str().unwrap()));
        let artifacts = loader.resolve_artifacts().unwrap();
        assert_eq!(artifacts.weight_files, vec![dir.path().join(SINGLE_WEIGHTS_FILE)]);
    }

    #[test]
    fn test_local_sharded_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), b"{}").unwrap();
        fs::write(dir.path().join(TOKENIZER_FILE), b"{}").unwrap();
        fs::write(
            dir.path().join(WEIGHTS_INDEX_FILE),
            r#"{ "weight_map": {
                "a.weight": "model-00002-of-00002.safetensors",
                "b.weight": "model-00001-of-00002.safetensors",
                "c.weight": "model-00001-of-00002.safetensors"
            } }"#,
        )
        .unwrap();

        let loader = ModelLoader::new(config_for(dir.path().to_str().unwrap()));
        let artifacts = loader.resolve_artifacts().unwrap();
        assert_eq!(
            artifacts.weight_files,
            vec![
                dir.path().join("model-00001-of-00002.safetensors"),
                dir.path().join("model-00002-of-00002.safetensors"),
            ]
        );
    }

    #[test]
    fn test_incomplete_local_dir_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), b"{}").unwrap();

        let loader = ModelLoader::new(config_for(dir.path().to_str().unwrap()));
        match loader.load() {
            Err(ChatError::ModelLoad { message, .. }) => assert!(message.contains("tokenizer.json")),
            Err(other) => panic!("expected ModelLoad, got {:?}", other),
            Ok(_) => panic!("load should fail"),
        }
    }

    #[test]
    fn test_token_cap_beyond_model_window_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_model_dir(dir.path(), HELLO);

        let loader = ModelLoader::new(config_with_window(dir.path().to_str().unwrap(), 64, 8));
        match loader.load() {
            Err(ChatError::ModelLoad { message, .. }) => {
                assert!(message.contains("max_position_embeddings"), "{}", message)
            }
            Err(other) => panic!("expected ModelLoad, got {:?}", other),
            Ok(_) => panic!("a 64 token cap cannot fit a 16 position model"),
        }
        assert!(check_context_window(MAX_POSITIONS, MAX_POSITIONS).is_ok());
    }

    #[test]
    fn test_loaded_model_keeps_replying_at_full_window() {
        let dir = tempfile::tempdir().unwrap();
        write_model_dir(dir.path(), HELLO);

        let config = config_with_window(dir.path().to_str().unwrap(), MAX_POSITIONS, 8);
        let model = ModelLoader::new(config.clone()).load().unwrap();
        assert_eq!(model.end_of_turn(), END_OF_TEXT);

        let session = ChatSession::new(1, Arc::new(model), config, Arc::new(EventLog::disabled()));
        for _ in 0..6 {
            let reply = session.submit("hello there how are you").unwrap();
            assert!(!reply.is_fallback());
            assert!(reply.text.starts_with("hello"));
            assert!(session.status().approx_tokens <= MAX_POSITIONS);
        }

        let status = session.status();
        assert_eq!(status.fallback_replies, 0);
        assert_eq!(status.evicted_turns, 5);
    }
}
