//! Conversation history implementations for chatbridge.

pub mod windowed;

pub use windowed::{WindowedHistory, default_window};
