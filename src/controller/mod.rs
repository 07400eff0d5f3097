//! Conversation session controller.
//!
//! Owns the ordered message list of exactly one bound session together with
//! its status flags. Operations mutate local state synchronously and return
//! the remote call to perform; outcomes come back through
//! [`SessionController::complete`], which reconciles local state or rolls
//! back the optimistic change. Completions that belong to a session the
//! controller is no longer bound to are dropped.

pub mod effects;
pub mod patch;
pub mod runtime;

use log::{ debug, info, warn };
use std::collections::HashMap;
use tokio::sync::watch;

pub use effects::{ Completion, RemoteCall, Request, RequestId };
pub use patch::OptimisticAppend;
pub use runtime::SessionRuntime;

use crate::models::chat::{ Attachment, GenerationConfig, Message, Reaction, Role };

pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "The chat service is currently unavailable";

/// What `reset` does while another request is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// Issue the reset anyway and let it race the pending request.
    #[default]
    Allow,
    /// Treat the reset as a no-op.
    Block,
}

/// What a failed history load does to the local message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadFailurePolicy {
    #[default]
    Clear,
    Preserve,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerOptions {
    pub reset_policy: ResetPolicy,
    pub load_failure: LoadFailurePolicy,
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub is_typing: bool,
    pub error: Option<String>,
}

#[derive(Debug)]
enum Pending {
    Load,
    Send(OptimisticAppend),
    Regenerate {
        target_id: String,
    },
    Reset,
}

impl Pending {
    fn is_generation(&self) -> bool {
        matches!(self, Pending::Send(_) | Pending::Regenerate { .. })
    }
}

#[derive(Debug)]
struct PendingRequest {
    session_id: String,
    kind: Pending,
}

pub struct SessionController {
    session_id: String,
    messages: Vec<Message>,
    pending: HashMap<RequestId, PendingRequest>,
    next_request: u64,
    error: Option<String>,
    config: GenerationConfig,
    options: ControllerOptions,
    service_available: bool,
    observers: watch::Sender<Snapshot>,
}

impl SessionController {
    /// Creates a controller for `session_id` without loading anything yet;
    /// call [`bind`](Self::bind) to fetch the history.
    pub fn new(session_id: &str, config: GenerationConfig, options: ControllerOptions) -> Self {
        let (observers, _) = watch::channel(Snapshot {
            session_id: session_id.to_string(),
            ..Snapshot::default()
        });
        Self {
            session_id: session_id.to_string(),
            messages: Vec::new(),
            pending: HashMap::new(),
            next_request: 0,
            error: None,
            config,
            options,
            service_available: true,
            observers,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_typing(&self) -> bool {
        self.pending.values().any(|p| p.kind.is_generation())
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn options(&self) -> ControllerOptions {
        self.options
    }

    pub fn service_available(&self) -> bool {
        self.service_available
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            session_id: self.session_id.clone(),
            messages: self.messages.clone(),
            is_loading: self.is_loading(),
            is_typing: self.is_typing(),
            error: self.error.clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.observers.subscribe()
    }

    pub fn set_config(&mut self, config: GenerationConfig) {
        self.config = config;
    }

    pub fn set_service_available(&mut self, available: bool) {
        if self.service_available != available {
            info!("Chat service marked {}", if available { "available" } else { "unavailable" });
        }
        self.service_available = available;
    }

    pub fn clear_error(&mut self) {
        if self.error.take().is_some() {
            self.notify();
        }
    }

    /// Rebinds to `session_id`, discarding the local list and every request
    /// still pending for the previous binding.
    pub fn bind(&mut self, session_id: &str) -> Option<Request> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            warn!("Ignoring bind to an empty session id");
            return None;
        }
        if !self.pending.is_empty() {
            debug!(
                "Abandoning {} pending request(s) of session {}",
                self.pending.len(),
                self.session_id
            );
        }
        self.pending.clear();
        self.session_id = session_id.to_string();
        self.messages.clear();
        self.error = None;

        info!("Bound to session {}", self.session_id);
        let request = self.issue(Pending::Load, RemoteCall::LoadHistory {
            session_id: self.session_id.clone(),
        });
        self.notify();
        Some(request)
    }

    /// Re-fetches the history of the bound session.
    pub fn reload(&mut self) -> Option<Request> {
        if self.session_id.is_empty() {
            return None;
        }
        self.error = None;
        let request = self.issue(Pending::Load, RemoteCall::LoadHistory {
            session_id: self.session_id.clone(),
        });
        self.notify();
        Some(request)
    }

    pub fn send(&mut self, content: &str) -> Option<Request> {
        self.send_with_attachments(content, Vec::new())
    }

    /// Appends the user message right away and asks for a reply. Empty input
    /// or a request already in flight makes this a no-op.
    pub fn send_with_attachments(
        &mut self,
        content: &str,
        attachments: Vec<Attachment>
    ) -> Option<Request> {
        let content = content.trim();
        if content.is_empty() || self.is_loading() {
            return None;
        }
        if !self.ensure_available() {
            return None;
        }

        let patch = OptimisticAppend::new(Message::user(content).with_attachments(attachments));
        patch.apply(&mut self.messages);
        self.error = None;

        let request = self.issue(Pending::Send(patch), RemoteCall::Generate {
            session_id: self.session_id.clone(),
            content: content.to_string(),
            config: self.config.clone(),
            regenerate: false,
        });
        self.notify();
        Some(request)
    }

    /// Asks for a new reply to the user turn preceding `message_id`. The
    /// target must be an assistant message directly after a user message.
    pub fn regenerate(&mut self, message_id: &str) -> Option<Request> {
        if self.is_loading() {
            return None;
        }
        let idx = self.messages.iter().position(|m| m.id == message_id)?;
        if idx == 0 || self.messages[idx].role != Role::Assistant {
            return None;
        }
        let previous = &self.messages[idx - 1];
        if previous.role != Role::User {
            return None;
        }
        let content = previous.content.clone();
        if !self.ensure_available() {
            return None;
        }
        self.error = None;

        let request = self.issue(
            Pending::Regenerate { target_id: message_id.to_string() },
            RemoteCall::Generate {
                session_id: self.session_id.clone(),
                content,
                config: self.config.clone(),
                regenerate: true,
            }
        );
        self.notify();
        Some(request)
    }

    /// Clears the bound session remotely; the local list is emptied only once
    /// the service confirms.
    pub fn reset(&mut self) -> Option<Request> {
        if self.options.reset_policy == ResetPolicy::Block && self.is_loading() {
            debug!("Reset blocked while {} request(s) are in flight", self.pending.len());
            return None;
        }
        if !self.ensure_available() {
            return None;
        }
        self.error = None;

        let request = self.issue(Pending::Reset, RemoteCall::Reset {
            session_id: self.session_id.clone(),
        });
        self.notify();
        Some(request)
    }

    /// Local-only reaction update. Returns false when the message is unknown.
    pub fn set_reaction(&mut self, message_id: &str, reaction: Option<Reaction>) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };
        message.reaction = reaction;
        self.notify();
        true
    }

    /// Applies `requested`, or clears it when it is already set.
    pub fn toggle_reaction(&mut self, message_id: &str, requested: Reaction) -> bool {
        let current = match self.messages.iter().find(|m| m.id == message_id) {
            Some(m) => m.reaction,
            None => {
                return false;
            }
        };
        self.set_reaction(message_id, Reaction::toggle(current, requested))
    }

    /// Applies the outcome of a request. Returns false when the completion
    /// was discarded as stale.
    pub fn complete(&mut self, request_id: RequestId, completion: Completion) -> bool {
        let Some(pending) = self.pending.remove(&request_id) else {
            debug!("Discarding completion {} with no pending request", request_id);
            return false;
        };
        // bind clears pending, so this only fires if requests ever outlive a rebind.
        if pending.session_id != self.session_id {
            debug!(
                "Discarding completion {} for session {} (bound to {})",
                request_id,
                pending.session_id,
                self.session_id
            );
            self.notify();
            return false;
        }

        match (pending.kind, completion) {
            (Pending::Load, Completion::History(Ok(messages))) => {
                info!("Loaded {} message(s) for session {}", messages.len(), self.session_id);
                self.messages = messages;
            }
            (Pending::Load, Completion::History(Err(e))) => {
                warn!("History load for session {} failed: {}", self.session_id, e);
                if self.options.load_failure == LoadFailurePolicy::Clear {
                    self.messages.clear();
                }
                self.error = Some(e.describe());
            }
            (Pending::Send(_), Completion::Reply(Ok(reply))) => {
                self.messages.push(Message::assistant(reply.content, reply.metadata));
            }
            (Pending::Send(patch), Completion::Reply(Err(e))) => {
                warn!("Send in session {} failed: {}", self.session_id, e);
                if !patch.rollback(&mut self.messages) {
                    debug!("Optimistic message {} was already gone", patch.message_id());
                }
                self.error = Some(e.describe());
            }
            (Pending::Regenerate { target_id }, Completion::Reply(Ok(reply))) => {
                match self.messages.iter().position(|m| m.id == target_id) {
                    Some(idx) => {
                        self.messages[idx] = Message::assistant(reply.content, reply.metadata);
                    }
                    None => debug!("Regenerate target {} no longer present", target_id),
                }
            }
            (Pending::Regenerate { .. }, Completion::Reply(Err(e))) => {
                warn!("Regenerate in session {} failed: {}", self.session_id, e);
                self.error = Some(e.describe());
            }
            (Pending::Reset, Completion::Reset(Ok(()))) => {
                info!("Session {} reset", self.session_id);
                self.messages.clear();
            }
            (Pending::Reset, Completion::Reset(Err(e))) => {
                warn!("Reset of session {} failed: {}", self.session_id, e);
                self.error = Some(e.describe());
            }
            (kind, completion) => {
                warn!("Completion {:?} does not match pending {:?}; ignored", completion, kind);
            }
        }

        self.notify();
        true
    }

    fn ensure_available(&mut self) -> bool {
        if !self.service_available {
            self.error = Some(SERVICE_UNAVAILABLE_MESSAGE.to_string());
            self.notify();
        }
        self.service_available
    }

    fn issue(&mut self, kind: Pending, call: RemoteCall) -> Request {
        self.next_request += 1;
        let id = RequestId(self.next_request);
        debug!("Issuing {} {} for session {}", call.name(), id, call.session_id());
        self.pending.insert(id, PendingRequest { session_id: call.session_id().to_string(), kind });
        Request { id, call }
    }

    fn notify(&self) {
        self.observers.send_replace(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ GeneratedReply, ServiceError };
    use crate::models::chat::ResponseMetadata;
    use std::collections::HashSet;

    fn controller() -> SessionController {
        SessionController::new("s1", GenerationConfig::default(), ControllerOptions::default())
    }

    fn reply(text: &str) -> Completion {
        Completion::Reply(Ok(GeneratedReply { content: text.to_string(), metadata: None }))
    }

    fn transport_failure() -> ServiceError {
        ServiceError::Transport("connection refused".to_string())
    }

    /// Controller holding one completed user/assistant exchange.
    fn with_exchange() -> SessionController {
        let mut c = controller();
        let req = c.send("hello").unwrap();
        assert!(c.complete(req.id, reply("hi there")));
        c
    }

    #[test]
    fn send_appends_user_then_assistant() {
        let mut c = controller();
        let req = c.send("  hello  ").unwrap();

        assert_eq!(c.messages().len(), 1);
        assert_eq!(c.messages()[0].role, Role::User);
        assert_eq!(c.messages()[0].content, "hello");
        assert!(c.is_loading());
        assert!(c.is_typing());
        match &req.call {
            RemoteCall::Generate { session_id, content, regenerate, .. } => {
                assert_eq!(session_id, "s1");
                assert_eq!(content, "hello");
                assert!(!*regenerate);
            }
            other => panic!("unexpected call {:?}", other),
        }

        assert!(c.complete(req.id, reply("hi there")));
        assert_eq!(c.messages().len(), 2);
        assert_eq!(c.messages()[1].role, Role::Assistant);
        assert_eq!(c.messages()[1].content, "hi there");
        assert!(!c.is_loading());
        assert!(!c.is_typing());

        let ids: HashSet<_> = c.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn send_forwards_active_config() {
        let mut c = controller();
        c.set_config(GenerationConfig {
            temperature: Some(0.2),
            max_tokens: Some(256),
            model: Some("gemini-1.5-flash".to_string()),
            system_prompt: None,
        });
        let req = c.send("hello").unwrap();
        match req.call {
            RemoteCall::Generate { config, .. } => {
                assert_eq!(config.temperature, Some(0.2));
                assert_eq!(config.max_tokens, Some(256));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn blank_send_is_a_noop() {
        let mut c = controller();
        assert!(c.send("").is_none());
        assert!(c.send("   \n\t").is_none());
        assert!(c.messages().is_empty());
        assert!(!c.is_loading());
    }

    #[test]
    fn send_while_in_flight_is_dropped() {
        let mut c = controller();
        let first = c.send("one").unwrap();
        assert!(c.send("two").is_none());
        assert_eq!(c.messages().len(), 1);

        c.complete(first.id, reply("ok"));
        assert_eq!(c.messages().len(), 2);
    }

    #[test]
    fn failed_send_rolls_back_and_records_error() {
        let mut c = with_exchange();
        let before = c.messages().to_vec();

        let req = c.send("will fail").unwrap();
        assert_eq!(c.messages().len(), 3);
        c.complete(req.id, Completion::Reply(Err(transport_failure())));

        assert_eq!(c.messages(), before.as_slice());
        assert_eq!(c.error(), Some(crate::client::NETWORK_ERROR_MESSAGE));
        assert!(!c.is_loading());
        assert!(!c.is_typing());
    }

    #[test]
    fn rejected_send_keeps_server_message() {
        let mut c = controller();
        let req = c.send("hello").unwrap();
        c.complete(
            req.id,
            Completion::Reply(Err(ServiceError::Rejected("Chat processing failed".to_string())))
        );
        assert!(c.messages().is_empty());
        assert_eq!(c.error(), Some("Chat processing failed"));
    }

    #[test]
    fn new_send_clears_previous_error() {
        let mut c = controller();
        let req = c.send("hello").unwrap();
        c.complete(req.id, Completion::Reply(Err(transport_failure())));
        assert!(c.error().is_some());

        c.send("again").unwrap();
        assert!(c.error().is_none());
    }

    #[test]
    fn regenerate_first_message_is_noop() {
        let mut c = controller();
        let req = c.bind("s1").unwrap();
        let only = Message::assistant("welcome", None);
        let only_id = only.id.clone();
        c.complete(req.id, Completion::History(Ok(vec![only])));

        let before = c.snapshot();
        assert!(c.regenerate(&only_id).is_none());
        assert_eq!(c.snapshot(), before);
    }

    #[test]
    fn regenerate_unknown_or_user_target_is_noop() {
        let mut c = with_exchange();
        let user_id = c.messages()[0].id.clone();
        assert!(c.regenerate("missing").is_none());
        assert!(c.regenerate(&user_id).is_none());
        assert!(!c.is_loading());
    }

    #[test]
    fn regenerate_requires_preceding_user_turn() {
        let mut c = controller();
        let req = c.bind("s1").unwrap();
        let a = Message::assistant("first", None);
        let b = Message::assistant("second", None);
        let b_id = b.id.clone();
        c.complete(req.id, Completion::History(Ok(vec![a, b])));
        assert!(c.regenerate(&b_id).is_none());
    }

    #[test]
    fn regenerate_replaces_target_in_place() {
        let mut c = with_exchange();
        let req = c.send("second question").unwrap();
        c.complete(req.id, reply("second answer"));

        let target = c.messages()[1].clone();
        c.toggle_reaction(&target.id, Reaction::Like);
        assert_eq!(c.messages()[1].reaction, Some(Reaction::Like));

        let req = c.regenerate(&target.id).unwrap();
        assert!(c.is_typing());
        match &req.call {
            RemoteCall::Generate { content, regenerate, .. } => {
                assert_eq!(content, "hello");
                assert!(*regenerate);
            }
            other => panic!("unexpected call {:?}", other),
        }

        let metadata = ResponseMetadata { tokens: Some(12), latency_ms: Some(40), temperature: None };
        c.complete(
            req.id,
            Completion::Reply(
                Ok(GeneratedReply { content: "fresh".to_string(), metadata: Some(metadata.clone()) })
            )
        );

        assert_eq!(c.messages().len(), 4);
        let replaced = &c.messages()[1];
        assert_ne!(replaced.id, target.id);
        assert_eq!(replaced.content, "fresh");
        assert_eq!(replaced.reaction, None);
        assert_eq!(replaced.metadata, Some(metadata));
        assert_eq!(c.messages()[3].content, "second answer");
    }

    #[test]
    fn failed_regenerate_leaves_target_untouched() {
        let mut c = with_exchange();
        let before = c.messages().to_vec();
        let target_id = before[1].id.clone();

        let req = c.regenerate(&target_id).unwrap();
        c.complete(req.id, Completion::Reply(Err(transport_failure())));

        assert_eq!(c.messages(), before.as_slice());
        assert!(c.error().is_some());
    }

    #[test]
    fn reaction_toggle_round_trips_to_none() {
        let mut c = with_exchange();
        let id = c.messages()[1].id.clone();

        assert!(c.toggle_reaction(&id, Reaction::Dislike));
        assert_eq!(c.messages()[1].reaction, Some(Reaction::Dislike));
        assert!(c.toggle_reaction(&id, Reaction::Dislike));
        assert_eq!(c.messages()[1].reaction, None);

        assert!(!c.set_reaction("missing", Some(Reaction::Like)));
    }

    #[test]
    fn stale_history_is_discarded_after_rebind() {
        let mut c = controller();
        let load_a = c.bind("A").unwrap();
        let load_b = c.bind("B").unwrap();

        assert!(!c.complete(load_a.id, Completion::History(Ok(vec![Message::user("from A")]))));
        assert!(c.messages().is_empty());
        assert_eq!(c.session_id(), "B");
        assert!(c.is_loading());

        let from_b = Message::user("from B");
        assert!(c.complete(load_b.id, Completion::History(Ok(vec![from_b.clone()]))));
        assert_eq!(c.messages(), &[from_b]);
        assert!(!c.is_loading());
    }

    #[test]
    fn stale_send_reply_is_discarded_after_rebind() {
        let mut c = controller();
        let send = c.send("to s1").unwrap();
        let load = c.bind("s2").unwrap();
        c.complete(load.id, Completion::History(Ok(Vec::new())));

        assert!(!c.complete(send.id, reply("late")));
        assert!(c.messages().is_empty());
    }

    #[test]
    fn failed_load_clears_by_default() {
        let mut c = controller();
        let req = c.bind("s1").unwrap();
        c.complete(req.id, Completion::History(Err(ServiceError::Rejected("boom".to_string()))));
        assert!(c.messages().is_empty());
        assert_eq!(c.error(), Some("boom"));
    }

    #[test]
    fn failed_reload_can_preserve_messages() {
        let options = ControllerOptions {
            load_failure: LoadFailurePolicy::Preserve,
            ..ControllerOptions::default()
        };
        let mut c = SessionController::new("s1", GenerationConfig::default(), options);
        let req = c.send("keep me").unwrap();
        c.complete(req.id, reply("kept"));

        let req = c.reload().unwrap();
        c.complete(req.id, Completion::History(Err(transport_failure())));
        assert_eq!(c.messages().len(), 2);
        assert!(c.error().is_some());
    }

    #[test]
    fn reset_success_and_failure() {
        let mut c = with_exchange();
        let before = c.messages().to_vec();

        let req = c.reset().unwrap();
        assert!(c.is_loading());
        assert!(!c.is_typing());
        c.complete(req.id, Completion::Reset(Err(transport_failure())));
        assert_eq!(c.messages(), before.as_slice());
        assert!(c.error().is_some());

        let req = c.reset().unwrap();
        c.complete(req.id, Completion::Reset(Ok(())));
        assert!(c.messages().is_empty());
        assert!(c.error().is_none());
        assert_eq!(c.session_id(), "s1");
    }

    #[test]
    fn reset_policy_block_refuses_while_in_flight() {
        let options = ControllerOptions {
            reset_policy: ResetPolicy::Block,
            ..ControllerOptions::default()
        };
        let mut c = SessionController::new("s1", GenerationConfig::default(), options);
        let req = c.send("hello").unwrap();
        assert!(c.reset().is_none());
        c.complete(req.id, reply("hi"));
        assert!(c.reset().is_some());
    }

    #[test]
    fn history_load_is_not_typing() {
        let mut c = controller();
        c.bind("s1").unwrap();
        assert!(c.is_loading());
        assert!(!c.is_typing());
    }

    #[test]
    fn unavailable_service_blocks_mutations() {
        let mut c = with_exchange();
        c.set_service_available(false);
        let target = c.messages()[1].id.clone();

        assert!(c.send("hello").is_none());
        assert!(c.regenerate(&target).is_none());
        assert!(c.reset().is_none());
        assert_eq!(c.messages().len(), 2);
        assert_eq!(c.error(), Some(SERVICE_UNAVAILABLE_MESSAGE));

        c.clear_error();
        assert!(c.error().is_none());
    }

    #[test]
    fn observers_receive_snapshots() {
        let mut c = controller();
        let rx = c.subscribe();
        let req = c.send("hello").unwrap();
        {
            let snap = rx.borrow();
            assert_eq!(snap.messages.len(), 1);
            assert!(snap.is_typing);
        }
        c.complete(req.id, reply("hi"));
        let snap = rx.borrow();
        assert_eq!(snap.messages.len(), 2);
        assert!(!snap.is_loading);
    }
}
