//! LLM provider abstraction layer
//!
//! Used by the semantic classifier and the in-process generalist handler.

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;
