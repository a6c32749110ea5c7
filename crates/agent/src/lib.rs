//! The request/reply exchange at the heart of chatbridge.
//!
//! For every inbound text message the agent:
//!
//! 1. **Serializes** on the sender's user id (optional, on by default)
//! 2. **Builds context**: system prompt, unexpired history, the new message
//! 3. **Calls the provider** under a timeout
//! 4. **On success** records the user message and the reply, in that order
//! 5. **On failure** answers with the fixed fallback text and records nothing

pub mod context;
pub mod locks;
pub mod responder;

pub use context::ContextAssembler;
pub use locks::UserLocks;
pub use responder::{ChatAgent, Reply};
