//! Completion gateway implementations for chatbridge.
//!
//! All providers implement the `chatbridge_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
