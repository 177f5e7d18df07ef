//! Sessions: the durable record of one requirement's execution

mod store;
mod types;

pub use store::SessionStore;
pub use types::{
    ExecutionError, ExecutionStep, MessageRole, Session, SessionMessage, SessionStatus, State,
};
