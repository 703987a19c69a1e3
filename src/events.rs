//! Plain-text operational event log.
//!
//! One line per event, appended to a single file and never read back:
//!
//! ```text
//! 2026-10-17 09:14:02.381 INFO MODEL_LOADED model=TinyLlama/TinyLlama-1.1B-Chat-v1.0 device=cpu
//! 2026-10-17 09:15:40.007 ERROR GENERATION_ERROR session=1 turn_count=3 device=cpu detail="CUDA out of memory"
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use parking_lot::Mutex;
use tracing::warn;

use crate::config::{ComputeDevice, DeviceRequest};
use crate::error::FailureKind;

/// Something worth a line in the event log
#[derive(Debug, Clone)]
pub enum SessionEvent<'a> {
    /// Requested vs. actual compute device
    DeviceResolved {
        /// What the settings asked for
        requested: DeviceRequest,
        /// What the engine uses
        resolved: ComputeDevice,
    },
    /// A model is ready to serve
    ModelLoaded {
        /// Identifier it was loaded from
        model_id: &'a str,
        /// Device holding the weights
        device: ComputeDevice,
    },
    /// One load attempt failed
    ModelLoadFailed {
        /// Identifier that was attempted
        model_id: &'a str,
        /// Cause chain
        error: &'a str,
    },
    /// A session answered with a fallback
    Failure {
        /// Failure category, also the event name
        kind: FailureKind,
        /// Session that failed
        session_id: u64,
        /// Turns retained at the time
        turn_count: usize,
        /// Device the model runs on
        device: ComputeDevice,
        /// Runtime error text
        detail: &'a str,
    },
    /// A session's history was cleared
    SessionReset {
        /// Session that was reset
        session_id: u64,
        /// Turns dropped
        turns_discarded: usize,
    },
}

impl SessionEvent<'_> {
    fn level(&self) -> &'static str {
        match self {
            SessionEvent::ModelLoadFailed { .. } | SessionEvent::Failure { .. } => "ERROR",
            _ => "INFO",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SessionEvent::DeviceResolved { .. } => "DEVICE_RESOLVED",
            SessionEvent::ModelLoaded { .. } => "MODEL_LOADED",
            SessionEvent::ModelLoadFailed { .. } => "MODEL_LOAD_ERROR",
            SessionEvent::Failure { kind, .. } => kind.event_name(),
            SessionEvent::SessionReset { .. } => "SESSION_RESET",
        }
    }

    fn fields(&self) -> String {
        match self {
            SessionEvent::DeviceResolved { requested, resolved } => {
                format!("requested={:?} resolved={}", requested, resolved)
            }
            SessionEvent::ModelLoaded { model_id, device } => {
                format!("model={} device={}", model_id, device)
            }
            SessionEvent::ModelLoadFailed { model_id, error } => {
                format!("model={} error={:?}", model_id, error)
            }
            SessionEvent::Failure { session_id, turn_count, device, detail, .. } => format!(
                "session={} turn_count={} device={} detail={:?}",
                session_id, turn_count, device, detail
            ),
            SessionEvent::SessionReset { session_id, turns_discarded } => {
                format!("session={} turns_discarded={}", session_id, turns_discarded)
            }
        }
    }

    /// Render without the timestamp prefix
    pub fn render(&self) -> String {
        format!("{} {} {}", self.level(), self.name(), self.fields())
    }
}

/// Append-only event log shared by the engine and all its sessions
#[derive(Debug)]
pub struct EventLog {
    path: Option<PathBuf>,
    sink: Option<Mutex<LineWriter<File>>>,
}

impl EventLog {
    /// Open (or create) the log file in append mode
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            sink: Some(Mutex::new(LineWriter::new(file))),
        })
    }

    /// A log that drops every event
    pub fn disabled() -> Self {
        Self { path: None, sink: None }
    }

    /// File the log appends to, `None` when disabled
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one event. Write failures are reported through tracing only.
    pub fn record(&self, event: SessionEvent<'_>) {
        let Some(sink) = &self.sink else {
            return;
        };

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("{} {}\n", timestamp, event.render());

        let mut writer = sink.lock();
        if let Err(e) = writer.write_all(line.as_bytes()) {
            warn!(error = %e, event = event.name(), "Failed to write event log");
        }
    }
}
