//! Context assembly: the exact message sequence sent to the completion gateway.
//!
//! ```text
//! [system prompt, ...history (oldest first), new user message]
//! ```
//!
//! The new user message is never read back from the history store: it is
//! appended there only after the gateway answers, so it appears exactly once.

use chatbridge_core::message::HistoryMessage;
use chatbridge_core::persona::Persona;

/// The context assembler. Holds the system prompt built once at startup.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    system_prompt: String,
}

impl ContextAssembler {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    pub fn from_persona(persona: &Persona) -> Self {
        Self::new(persona.system_prompt.clone())
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Build the context for one exchange.
    pub fn assemble(&self, history: Vec<HistoryMessage>, user_message: &str) -> Vec<HistoryMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(HistoryMessage::system(self.system_prompt.as_str()));
        messages.extend(history);
        messages.push(HistoryMessage::user(user_message));
        messages
    }
}
