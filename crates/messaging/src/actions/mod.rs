//! Message actions module
//!
//! Provides high-level action handlers for user operations like marking
//! threads read, deleting and sending.

mod handler;

pub use handler::{ActionError, ActionHandler};
