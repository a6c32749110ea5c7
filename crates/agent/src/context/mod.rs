//! Context assembly for a single exchange.
//!
//! | Position | Source | Trim Strategy |
//! |----------|--------|---------------|
//! | 1. System | Persona + store info + menu | Never trimmed |
//! | 2. History | Per-user history store | Expired turns evicted by the store |
//! | 3. New message | Inbound event | Never trimmed |

pub mod assembler;

pub use assembler::ContextAssembler;
