//! Document-driver lifecycle events.
//!
//! The driver reports each command twice: a `Started` event and later,
//! on another callback, a `Succeeded` or `Failed` event carrying the same
//! request id. Pool events describe connection churn and are unrelated to
//! any single command.

use crate::correlation::RequestId;
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum CommandEvent {
    Started(CommandStarted),
    Succeeded(CommandSucceeded),
    Failed(CommandFailed),
    Pool(PoolEvent),
}

impl CommandEvent {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            CommandEvent::Started(e) => Some(e.request_id),
            CommandEvent::Succeeded(e) => Some(e.request_id),
            CommandEvent::Failed(e) => Some(e.request_id),
            CommandEvent::Pool(_) => None,
        }
    }

    pub fn command_name(&self) -> Option<&str> {
        match self {
            CommandEvent::Started(e) => Some(&e.command_name),
            CommandEvent::Succeeded(e) => Some(&e.command_name),
            CommandEvent::Failed(e) => Some(&e.command_name),
            CommandEvent::Pool(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandStarted {
    pub request_id: RequestId,
    pub command_name: String,
    pub database: String,
    pub command: Value,
}

#[derive(Debug, Clone)]
pub struct CommandSucceeded {
    pub request_id: RequestId,
    pub command_name: String,
    pub reply: Value,
}

#[derive(Debug, Clone)]
pub struct CommandFailed {
    pub request_id: RequestId,
    pub command_name: String,
    pub failure: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    ConnectionCreated,
    ConnectionClosed,
    ConnectionCheckedOut,
    ConnectionCheckedIn,
    PoolCleared,
}
