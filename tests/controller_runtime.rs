use async_trait::async_trait;
use std::collections::{ HashMap, VecDeque };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Mutex };
use std::time::Duration;
use tokio::sync::oneshot;

use novachat::app::ChatApp;
use novachat::client::{ GeneratedReply, ServiceError, SessionService, NETWORK_ERROR_MESSAGE };
use novachat::config::prompt::{ PromptConfig, QuickAction };
use novachat::controller::{
    ControllerOptions,
    SessionController,
    SessionRuntime,
    SERVICE_UNAVAILABLE_MESSAGE,
};
use novachat::models::api::{ ExportFormat, HealthStatus };
use novachat::models::chat::{ GenerationConfig, Message, Reaction, Role, SessionSummary };

/// In-process service whose calls can be held back until the test releases them.
#[derive(Default)]
struct ScriptedService {
    histories: Mutex<HashMap<String, Vec<Message>>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    replies: Mutex<VecDeque<Result<GeneratedReply, ServiceError>>>,
    unhealthy: AtomicBool,
    deleted: Mutex<Vec<String>>,
}

impl ScriptedService {
    fn with_history(self, session_id: &str, messages: Vec<Message>) -> Self {
        self.histories.lock().unwrap().insert(session_id.to_string(), messages);
        self
    }

    fn hold(&self, key: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(key.to_string(), rx);
        tx
    }

    fn queue_reply(&self, reply: Result<GeneratedReply, ServiceError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    async fn wait_gate(&self, key: &str) {
        let gate = self.gates.lock().unwrap().remove(key);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }
}

#[async_trait]
impl SessionService for ScriptedService {
    async fn load_history(&self, session_id: &str) -> Result<Vec<Message>, ServiceError> {
        self.wait_gate(&format!("load:{}", session_id)).await;
        Ok(self.histories.lock().unwrap().get(session_id).cloned().unwrap_or_default())
    }

    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        _config: Option<&GenerationConfig>
    ) -> Result<GeneratedReply, ServiceError> {
        self.wait_gate(&format!("send:{}", session_id)).await;
        let scripted = self.replies.lock().unwrap().pop_front();
        scripted.unwrap_or_else(||
            Ok(GeneratedReply { content: format!("echo: {}", content), metadata: None })
        )
    }

    async fn regenerate_reply(
        &self,
        session_id: &str,
        content: &str,
        config: Option<&GenerationConfig>
    ) -> Result<GeneratedReply, ServiceError> {
        self.send_message(session_id, content, config).await
    }

    async fn reset_session(&self, session_id: &str) -> Result<(), ServiceError> {
        self.histories.lock().unwrap().remove(session_id);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ServiceError> {
        Ok(Vec::new())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ServiceError> {
        self.deleted.lock().unwrap().push(session_id.to_string());
        Ok(())
    }

    async fn update_session_title(&self, _session_id: &str, _title: &str) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn export_session(
        &self,
        session_id: &str,
        format: ExportFormat
    ) -> Result<String, ServiceError> {
        Ok(format!("{}:{}", session_id, format))
    }

    async fn health_check(&self) -> Result<Option<HealthStatus>, ServiceError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            Err(ServiceError::Transport("connection refused".to_string()))
        } else {
            Ok(None)
        }
    }
}

fn runtime(service: Arc<ScriptedService>) -> SessionRuntime {
    let controller = SessionController::new(
        "",
        GenerationConfig::default(),
        ControllerOptions::default()
    );
    SessionRuntime::new(controller, service)
}

fn contents(runtime: &SessionRuntime) -> Vec<String> {
    runtime
        .controller()
        .messages()
        .iter()
        .map(|m| m.content.clone())
        .collect()
}

#[tokio::test]
async fn late_history_of_previous_session_is_discarded() {
    let service = Arc::new(
        ScriptedService::default()
            .with_history("A", vec![Message::user("from A")])
            .with_history("B", vec![Message::user("from B")])
    );
    let release_a = service.hold("load:A");
    let mut rt = runtime(service.clone());

    let request = rt.controller_mut().bind("A");
    rt.dispatch(request);
    let request = rt.controller_mut().bind("B");
    rt.dispatch(request);

    let (_, applied) = rt.next_completion().await.unwrap();
    assert!(applied);
    assert_eq!(contents(&rt), ["from B"]);

    release_a.send(()).unwrap();
    let (_, applied) = rt.next_completion().await.unwrap();
    assert!(!applied);
    assert_eq!(contents(&rt), ["from B"]);
    assert_eq!(rt.controller().session_id(), "B");
    assert!(!rt.controller().is_loading());
    assert_eq!(rt.outstanding(), 0);
}

#[tokio::test]
async fn reply_arriving_after_rebind_is_discarded() {
    let service = Arc::new(ScriptedService::default());
    let mut rt = runtime(service.clone());
    rt.bind("A").await;

    let release_send = service.hold("send:A");
    let request = rt.controller_mut().send("hello?");
    rt.dispatch(request);
    assert!(rt.controller().is_typing());

    let request = rt.controller_mut().bind("B");
    rt.dispatch(request);
    let (_, applied) = rt.next_completion().await.unwrap();
    assert!(applied);
    assert!(!rt.controller().is_typing());

    release_send.send(()).unwrap();
    let (_, applied) = rt.next_completion().await.unwrap();
    assert!(!applied);
    assert!(rt.controller().messages().is_empty());
    assert!(rt.controller().error().is_none());
}

#[tokio::test]
async fn send_appends_reply_and_notifies_observers() {
    let service = Arc::new(ScriptedService::default());
    let mut rt = runtime(service);
    rt.bind("A").await;
    let mut observer = rt.subscribe();

    rt.send("  ping  ").await;

    assert!(observer.has_changed().unwrap());
    let snapshot = observer.borrow_and_update().clone();
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[0].role, Role::User);
    assert_eq!(snapshot.messages[0].content, "ping");
    assert_eq!(snapshot.messages[1].content, "echo: ping");
    assert!(!snapshot.is_loading);
    assert!(!snapshot.is_typing);
}

#[tokio::test]
async fn failed_send_rolls_back_the_optimistic_message() {
    let service = Arc::new(ScriptedService::default());
    let mut rt = runtime(service.clone());
    rt.bind("A").await;
    rt.send("first").await;

    service.queue_reply(Err(ServiceError::Transport("timed out".to_string())));
    rt.send("second").await;

    assert_eq!(contents(&rt), ["first", "echo: first"]);
    assert_eq!(rt.controller().error(), Some(NETWORK_ERROR_MESSAGE));
}

#[tokio::test]
async fn rejected_send_surfaces_service_message() {
    let service = Arc::new(ScriptedService::default());
    let mut rt = runtime(service.clone());
    rt.bind("A").await;

    service.queue_reply(Err(ServiceError::Rejected("Rate limit exceeded".to_string())));
    rt.send("hi").await;

    assert!(rt.controller().messages().is_empty());
    assert_eq!(rt.controller().error(), Some("Rate limit exceeded"));
}

#[tokio::test]
async fn regenerate_replaces_the_reply_in_place() {
    let service = Arc::new(ScriptedService::default());
    let mut rt = runtime(service.clone());
    rt.bind("A").await;
    rt.send("question").await;
    let old_id = rt.controller().messages()[1].id.clone();

    service.queue_reply(Ok(GeneratedReply { content: "better answer".to_string(), metadata: None }));
    rt.regenerate(&old_id).await;

    assert_eq!(contents(&rt), ["question", "better answer"]);
    assert_ne!(rt.controller().messages()[1].id, old_id);
}

#[tokio::test]
async fn reset_clears_after_confirmation() {
    let service = Arc::new(
        ScriptedService::default().with_history("A", vec![Message::user("old")])
    );
    let mut rt = runtime(service);
    rt.bind("A").await;
    assert_eq!(contents(&rt), ["old"]);

    rt.reset().await;
    assert!(rt.controller().messages().is_empty());
    assert!(rt.controller().error().is_none());
}

fn app(service: Arc<ScriptedService>) -> ChatApp {
    ChatApp::new(service, GenerationConfig::default(), ControllerOptions::default(), PromptConfig::default())
}

#[tokio::test]
async fn unhealthy_service_blocks_mutations() {
    let service = Arc::new(ScriptedService::default());
    service.unhealthy.store(true, Ordering::SeqCst);
    let mut app = app(service.clone());
    app.start(Some("A".to_string())).await;

    app.send("hello").await;
    let snapshot = app.snapshot();
    assert!(snapshot.messages.is_empty());
    assert_eq!(snapshot.error.as_deref(), Some(SERVICE_UNAVAILABLE_MESSAGE));

    service.unhealthy.store(false, Ordering::SeqCst);
    assert!(app.check_health().await);
    app.send("hello").await;
    assert_eq!(app.snapshot().messages.len(), 2);
}

#[tokio::test]
async fn deleting_the_active_session_starts_a_new_chat() {
    let service = Arc::new(ScriptedService::default());
    let persisted = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = persisted.clone();
    let mut app = app(service.clone()).with_persistence(
        Box::new(move |id: &str| sink.lock().unwrap().push(id.to_string()))
    );

    app.start(Some("A".to_string())).await;
    assert_eq!(app.current_session(), "A");
    assert_eq!(*persisted.lock().unwrap(), ["A"]);

    app.delete_session("A").await.unwrap();
    assert_ne!(app.current_session(), "A");
    assert!(!app.current_session().is_empty());
    assert_eq!(*service.deleted.lock().unwrap(), ["A"]);

    let persisted = persisted.lock().unwrap();
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted[1], app.current_session());
}

#[tokio::test]
async fn deleting_another_session_keeps_the_binding() {
    let service = Arc::new(ScriptedService::default());
    let mut app = app(service);
    app.start(Some("A".to_string())).await;
    app.delete_session("B").await.unwrap();
    assert_eq!(app.current_session(), "A");
}

#[tokio::test]
async fn quick_action_sends_the_rendered_template() {
    let service = Arc::new(ScriptedService::default());
    let mut app = app(service);
    app.start(Some("A".to_string())).await;

    app.quick_action(QuickAction::Summarize, "a long text").await;
    let snapshot = app.snapshot();
    let expected = PromptConfig::default().render(QuickAction::Summarize, "a long text");
    assert_eq!(snapshot.messages[0].content, expected);

    app.quick_action(QuickAction::Explain, "   ").await;
    assert_eq!(app.snapshot().messages.len(), 2);
}

#[tokio::test]
async fn reactions_toggle_on_the_last_reply() {
    let service = Arc::new(ScriptedService::default());
    let mut app = app(service);
    app.start(Some("A".to_string())).await;
    app.send("hi").await;
    let reply_id = app.snapshot().messages[1].id.clone();

    assert!(app.runtime_mut().toggle_reaction(&reply_id, Reaction::Like));
    assert_eq!(app.snapshot().messages[1].reaction, Some(Reaction::Like));
    assert!(app.runtime_mut().toggle_reaction(&reply_id, Reaction::Like));
    assert_eq!(app.snapshot().messages[1].reaction, None);
    assert!(!app.runtime_mut().toggle_reaction("missing", Reaction::Dislike));
}

/// Service whose every call crashes its task.
struct CrashingService;

#[async_trait]
impl SessionService for CrashingService {
    async fn load_history(&self, _session_id: &str) -> Result<Vec<Message>, ServiceError> {
        panic!("history backend crashed")
    }

    async fn send_message(
        &self,
        _session_id: &str,
        _content: &str,
        _config: Option<&GenerationConfig>
    ) -> Result<GeneratedReply, ServiceError> {
        panic!("reply backend crashed")
    }

    async fn regenerate_reply(
        &self,
        _session_id: &str,
        _content: &str,
        _config: Option<&GenerationConfig>
    ) -> Result<GeneratedReply, ServiceError> {
        panic!("reply backend crashed")
    }

    async fn reset_session(&self, _session_id: &str) -> Result<(), ServiceError> {
        panic!("reset backend crashed")
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ServiceError> {
        Ok(Vec::new())
    }

    async fn delete_session(&self, _session_id: &str) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn update_session_title(&self, _session_id: &str, _title: &str) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn export_session(
        &self,
        _session_id: &str,
        _format: ExportFormat
    ) -> Result<String, ServiceError> {
        Ok(String::new())
    }

    async fn health_check(&self) -> Result<Option<HealthStatus>, ServiceError> {
        Ok(None)
    }
}

#[tokio::test]
async fn crashed_calls_settle_with_an_error() {
    let controller = SessionController::new(
        "",
        GenerationConfig::default(),
        ControllerOptions::default()
    );
    let mut rt = SessionRuntime::new(controller, Arc::new(CrashingService));

    tokio::time::timeout(Duration::from_secs(2), rt.bind("A")).await.unwrap();
    assert!(!rt.controller().is_loading());
    assert_eq!(rt.outstanding(), 0);
    let error = rt.controller().error().unwrap().to_string();
    assert!(error.contains("task failed"), "unexpected error: {}", error);

    tokio::time::timeout(Duration::from_secs(2), rt.send("hello")).await.unwrap();
    assert!(rt.controller().messages().is_empty());
    assert!(!rt.controller().is_typing());
    assert!(rt.controller().error().is_some());
}
