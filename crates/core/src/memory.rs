//! Conversation history trait: the per-user rolling message log.
//!
//! Implementations: the time-windowed in-process store in `chatbridge-memory`.

use crate::message::{HistoryMessage, Role};

/// Per-user, ordered conversation history.
///
/// Neither operation can fail: reads of an unknown user return an empty
/// history, and content is stored verbatim.
pub trait ConversationHistory: Send + Sync {
    /// The backend name (e.g., "windowed").
    fn name(&self) -> &str;

    /// Unexpired turns for `user_id`, oldest first, timestamps stripped.
    fn history(&self, user_id: &str) -> Vec<HistoryMessage>;

    /// Record a new turn for `user_id` at the current time.
    fn append(&self, user_id: &str, role: Role, content: &str);
}
