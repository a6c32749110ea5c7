//! # chatbridge Core
//!
//! Domain types, traits, and error definitions for the chatbridge runtime,
//! a bridge that answers LINE chat messages with a language model.
//! This crate has **zero framework dependencies** and defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator (completion API, messaging platform, history store,
//! clock) is a trait here. Implementations live in their respective crates,
//! so tests can swap in mocks and a fake clock.

pub mod channel;
pub mod clock;
pub mod error;
pub mod memory;
pub mod message;
pub mod persona;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use channel::{InboundEvent, ReplyChannel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use memory::ConversationHistory;
pub use message::{HistoryMessage, Message, Role};
pub use persona::{Persona, PersonaPaths};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
