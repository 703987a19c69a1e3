//! Conversation sessions: one bounded history per chat window over a shared
//! model.

mod history;
mod session;

pub use history::{Admission, ConversationHistory, HistoryLimits, Turn, Utterance};
pub use session::ChatSession;
