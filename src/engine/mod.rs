//! Engine module: the process-wide owner of the loaded model, the validated
//! configuration and the event log. Sessions are handed out from here.

mod builder;
mod engine;

pub use builder::EngineBuilder;
pub use engine::{ChatEngine, EngineInfo};
