//! Chat Engine - local multi-turn chatbot core
//!
//! This crate turns a pretrained causal dialogue model into a usable
//! conversational agent: bounded rolling history, input validation,
//! explicit device selection and fallback replies when generation fails.

#![warn(missing_docs)]

use std::fmt;
use std::sync::OnceLock;

// Public modules
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fallback;
pub mod model;
pub mod session;
pub mod types;
pub mod utils;
pub mod validation;

// Version information
/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-exports for public API
pub use config::{ChatConfig, ChatSettings, ComputeDevice, DeviceRequest};
pub use engine::{ChatEngine, EngineBuilder, EngineInfo};
pub use error::{ChatError, ErrorExt, FailureKind, InputRejection, Result};
pub use events::{EventLog, SessionEvent};
pub use fallback::FallbackPolicy;
pub use model::DialogueModel;
pub use session::{ChatSession, ConversationHistory, Turn};
pub use types::{ChatReply, ReplyOrigin, SessionPhase, SessionStatus};
pub use validation::InputValidator;

static DETECTED: OnceLock<Features> = OnceLock::new();

/// Feature detection for supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    /// Whether CUDA support is available
    pub cuda: bool,
    /// Number of detected CUDA devices
    pub cuda_devices: usize,
}

impl Features {
    /// Detect available features at runtime. Devices are probed once per
    /// process; later calls return the cached result.
    pub fn detect() -> Self {
        *DETECTED.get_or_init(Self::probe)
    }

    fn probe() -> Self {
        if !candle_core::utils::cuda_is_available() {
            return Self { cuda: false, cuda_devices: 0 };
        }

        let cuda_devices = (0..8)
            .take_while(|&i| candle_core::Device::new_cuda(i).is_ok())
            .count();

        Self {
            cuda: cuda_devices > 0,
            cuda_devices,
        }
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CUDA support: {}", if self.cuda { "yes" } else { "no" })?;
        if self.cuda {
            writeln!(f, "CUDA devices: {}", self.cuda_devices)?;
        }
        Ok(())
    }
}
