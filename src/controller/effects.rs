//! Remote calls issued by the session controller.
//!
//! The controller never performs I/O itself. Every operation that needs the
//! remote session service hands back a [`Request`]; whoever drives the
//! controller executes it and feeds the outcome back as a [`Completion`].

use std::fmt;

use crate::client::{ GeneratedReply, ServiceError, SessionService };
use crate::models::chat::{ GenerationConfig, Message };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    LoadHistory {
        session_id: String,
    },
    Generate {
        session_id: String,
        content: String,
        config: GenerationConfig,
        /// Replaces the latest reply instead of adding a new exchange.
        regenerate: bool,
    },
    Reset {
        session_id: String,
    },
}

impl RemoteCall {
    pub fn session_id(&self) -> &str {
        match self {
            RemoteCall::LoadHistory { session_id }
            | RemoteCall::Generate { session_id, .. }
            | RemoteCall::Reset { session_id } => session_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RemoteCall::LoadHistory { .. } => "load_history",
            RemoteCall::Generate { .. } => "generate",
            RemoteCall::Reset { .. } => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub call: RemoteCall,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    History(Result<Vec<Message>, ServiceError>),
    Reply(Result<GeneratedReply, ServiceError>),
    Reset(Result<(), ServiceError>),
}

impl Completion {
    /// Failed outcome of the kind `call` would have produced.
    pub fn failed(call: &RemoteCall, error: ServiceError) -> Self {
        match call {
            RemoteCall::LoadHistory { .. } => Completion::History(Err(error)),
            RemoteCall::Generate { .. } => Completion::Reply(Err(error)),
            RemoteCall::Reset { .. } => Completion::Reset(Err(error)),
        }
    }
}

/// Runs a remote call against the service and wraps the outcome.
pub async fn execute(service: &dyn SessionService, call: &RemoteCall) -> Completion {
    match call {
        RemoteCall::LoadHistory { session_id } => {
            Completion::History(service.load_history(session_id).await)
        }
        RemoteCall::Generate { session_id, content, config, regenerate: false } => {
            Completion::Reply(service.send_message(session_id, content, Some(config)).await)
        }
        RemoteCall::Generate { session_id, content, config, regenerate: true } => {
            Completion::Reply(service.regenerate_reply(session_id, content, Some(config)).await)
        }
        RemoteCall::Reset { session_id } => {
            Completion::Reset(service.reset_session(session_id).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_completion_matches_call_kind() {
        let err = ServiceError::Internal("task failed".to_string());
        let load = RemoteCall::LoadHistory { session_id: "s".to_string() };
        let reset = RemoteCall::Reset { session_id: "s".to_string() };
        let regen = RemoteCall::Generate {
            session_id: "s".to_string(),
            content: "q".to_string(),
            config: GenerationConfig::default(),
            regenerate: true,
        };
        assert!(matches!(Completion::failed(&load, err.clone()), Completion::History(Err(_))));
        assert!(matches!(Completion::failed(&reset, err.clone()), Completion::Reset(Err(_))));
        assert!(matches!(Completion::failed(&regen, err), Completion::Reply(Err(_))));
    }
}
