//! A2A task protocol: payload types, JSON-RPC envelope and validation
//!
//! Everything that crosses the wire between the router and its handlers is
//! defined here.

pub mod discovery;
pub mod envelope;
pub mod messages;
pub mod streaming;
pub mod validation;

pub use discovery::*;
pub use envelope::*;
pub use messages::*;
pub use streaming::*;
pub use validation::*;
