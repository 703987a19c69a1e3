//! Utility functions for diagnostic logging

mod logging;

pub use logging::{setup_logging, LogConfig};
