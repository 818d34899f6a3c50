//! Testing utilities and mock implementations
//!
//! Mocks for every port the router talks through, so routing can be tested
//! without handlers, an LLM provider or a database.

pub mod mocks;

pub use mocks::*;
