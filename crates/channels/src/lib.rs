//! Messaging platform adapters for chatbridge.
//!
//! Available channels:
//! - **LINE**: Messaging API webhook (signature check, event parsing) and reply endpoint

pub mod line;

pub use line::{LineChannel, LineChannelConfig, SIGNATURE_HEADER, sign};
