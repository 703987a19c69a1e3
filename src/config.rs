// Location: src/config.rs

//! Chat settings, their validation and device resolution

use std::fmt;
use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use tracing::{info, warn};

use crate::error::{ChatError, Result};
use crate::Features;

/// HuggingFace repo loaded when none is configured
pub const DEFAULT_MODEL_ID: &str = "TinyLlama/TinyLlama-1.1B-Chat-v1.0";
/// Hard cap on tokens retained in a conversation
pub const DEFAULT_MAX_TOTAL_TOKENS: usize = 1000;
/// Tokens kept free for the model's reply
pub const DEFAULT_REPLY_TOKEN_RESERVE: usize = 128;
/// Sampling temperature
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// Nucleus sampling threshold
pub const DEFAULT_TOP_P: f64 = 0.9;
/// Turns retained, the current one included
pub const DEFAULT_MAX_TURNS: usize = 10;
/// Longest accepted user message, in characters
pub const DEFAULT_MAX_INPUT_CHARS: usize = 2000;
/// Base sampling seed
pub const DEFAULT_SEED: u64 = 299792458;

/// Device the caller asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRequest {
    /// Always run on the CPU
    Cpu,
    /// GPU-accelerated when available, otherwise CPU
    #[default]
    Gpu,
}

/// Device the model actually runs on after resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    /// Host CPU
    Cpu,
    /// A CUDA device
    Cuda {
        /// Device index
        ordinal: usize,
    },
}

impl ComputeDevice {
    /// Resolve a request against the hardware candle can see
    pub fn resolve(request: DeviceRequest, features: &Features) -> Self {
        match request {
            DeviceRequest::Cpu => ComputeDevice::Cpu,
            DeviceRequest::Gpu if features.cuda => ComputeDevice::Cuda { ordinal: 0 },
            DeviceRequest::Gpu => ComputeDevice::Cpu,
        }
    }

    /// Whether this is a CUDA device
    pub fn is_gpu(&self) -> bool {
        matches!(self, ComputeDevice::Cuda { .. })
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Cpu => write!(f, "cpu"),
            ComputeDevice::Cuda { ordinal } => write!(f, "cuda:{}", ordinal),
        }
    }
}

/// Unvalidated, serde-friendly settings. Every field has a default and can be
/// overridden one at a time before calling [`ChatSettings::build`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// HuggingFace repo id or local directory with model artifacts
    pub model_id: String,

    /// Repo revision used when downloading
    pub revision: String,

    /// Bound on retained history and on context plus generated tokens
    pub max_total_tokens: usize,

    /// Tokens kept free for the reply when truncating context
    pub reply_token_reserve: usize,

    /// Sampling temperature, in (0, 1]
    pub temperature: f64,

    /// Nucleus sampling threshold, in (0, 1]
    pub top_p: f64,

    /// Maximum number of retained turns, current one included
    pub max_turns: usize,

    /// Requested compute device
    pub device: DeviceRequest,

    /// Maximum raw input length in characters
    pub max_input_chars: usize,

    /// Sampling seed
    pub seed: u64,

    /// Plain-text event log; `None` disables it
    pub event_log_path: Option<PathBuf>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            max_total_tokens: DEFAULT_MAX_TOTAL_TOKENS,
            reply_token_reserve: DEFAULT_REPLY_TOKEN_RESERVE,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_turns: DEFAULT_MAX_TURNS,
            device: DeviceRequest::default(),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            seed: DEFAULT_SEED,
            event_log_path: Some(PathBuf::from("chatbot.log")),
        }
    }
}

impl ChatSettings {
    /// Read settings from a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ChatError::config("config_file", format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ChatError::config("config_file", format!("invalid JSON in {}: {}", path.display(), e))
        })
    }

    /// HuggingFace repo id or local model directory
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Hard cap on retained history tokens
    pub fn with_max_total_tokens(mut self, max_total_tokens: usize) -> Self {
        self.max_total_tokens = max_total_tokens;
        self
    }

    /// Tokens kept free for the reply when admitting a user turn
    pub fn with_reply_token_reserve(mut self, reserve: usize) -> Self {
        self.reply_token_reserve = reserve;
        self
    }

    /// Sampling temperature, in (0, 1]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Nucleus threshold, in (0, 1]
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    /// Turns retained, the current one included
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Requested compute device
    pub fn with_device(mut self, device: DeviceRequest) -> Self {
        self.device = device;
        self
    }

    /// Longest accepted user message, in characters
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    /// Base sampling seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Event log file, or `None` to disable it
    pub fn with_event_log_path(mut self, path: Option<PathBuf>) -> Self {
        self.event_log_path = path;
        self
    }

    /// Validate and freeze into a [`ChatConfig`], resolving the device
    pub fn build(self) -> Result<ChatConfig> {
        ChatConfig::from_settings(self)
    }
}

/// Validated configuration. Read-only once built.
#[derive(Debug, Clone, Serialize)]
pub struct ChatConfig {
    model_id: String,
    revision: String,
    max_total_tokens: usize,
    reply_token_reserve: usize,
    temperature: f64,
    top_p: f64,
    max_turns: usize,
    requested_device: DeviceRequest,
    device: ComputeDevice,
    max_input_chars: usize,
    seed: u64,
    event_log_path: Option<PathBuf>,
}

impl ChatConfig {
    /// Validate settings and resolve the device against detected hardware
    pub fn from_settings(settings: ChatSettings) -> Result<Self> {
        Self::from_settings_with(settings, &Features::detect())
    }

    pub(crate) fn from_settings_with(settings: ChatSettings, features: &Features) -> Result<Self> {
        validate(&settings)?;

        let device = ComputeDevice::resolve(settings.device, features);
        if settings.device == DeviceRequest::Gpu && !device.is_gpu() {
            warn!("GPU requested but no CUDA device is available, falling back to CPU");
        }
        info!(requested = ?settings.device, resolved = %device, "Compute device resolved");

        Ok(Self {
            model_id: settings.model_id,
            revision: settings.revision,
            max_total_tokens: settings.max_total_tokens,
            reply_token_reserve: settings.reply_token_reserve,
            temperature: settings.temperature,
            top_p: settings.top_p,
            max_turns: settings.max_turns,
            requested_device: settings.device,
            device,
            max_input_chars: settings.max_input_chars,
            seed: settings.seed,
            event_log_path: settings.event_log_path,
        })
    }

    /// Model identifier to load
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Hub revision (branch, tag or commit)
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Hard cap on retained history tokens
    pub fn max_total_tokens(&self) -> usize {
        self.max_total_tokens
    }

    /// Tokens kept free for the reply
    pub fn reply_token_reserve(&self) -> usize {
        self.reply_token_reserve
    }

    /// Context budget left once the reply reserve is set aside
    pub fn context_budget(&self) -> usize {
        self.max_total_tokens - self.reply_token_reserve
    }

    /// Sampling temperature
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Nucleus threshold
    pub fn top_p(&self) -> f64 {
        self.top_p
    }

    /// Turns retained
    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Device asked for in the settings
    pub fn requested_device(&self) -> DeviceRequest {
        self.requested_device
    }

    /// Device actually used
    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    /// Longest accepted user message
    pub fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    /// Base sampling seed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Event log file, if enabled
    pub fn event_log_path(&self) -> Option<&Path> {
        self.event_log_path.as_deref()
    }

    /// Same configuration pointed at another model
    pub(crate) fn with_model_id(&self, model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            ..self.clone()
        }
    }
}

fn validate(settings: &ChatSettings) -> Result<()> {
    if settings.model_id.trim().is_empty() {
        return Err(ChatError::config("model_id", "Model identifier cannot be empty"));
    }

    if settings.max_total_tokens == 0 {
        return Err(ChatError::config("max_total_tokens", "Must be a positive integer"));
    }

    if settings.reply_token_reserve == 0 || settings.reply_token_reserve >= settings.max_total_tokens {
        return Err(ChatError::config(
            "reply_token_reserve",
            format!("Must be between 1 and {}", settings.max_total_tokens - 1),
        ));
    }

    if !(settings.temperature > 0.0 && settings.temperature <= 1.0) {
        return Err(ChatError::config("temperature", "Temperature must be in (0, 1]"));
    }

    if !(settings.top_p > 0.0 && settings.top_p <= 1.0) {
        return Err(ChatError::config("top_p", "Nucleus threshold must be in (0, 1]"));
    }

    if settings.max_turns == 0 {
        return Err(ChatError::config("max_turns", "Must be a positive integer"));
    }

    if settings.max_input_chars == 0 {
        return Err(ChatError::config("max_input_chars", "Must be a positive integer"));
    }

    Ok(())
}
