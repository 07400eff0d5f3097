//! Async driver for [`SessionController`].
//!
//! Remote calls run on spawned tokio tasks; their outcomes are queued on a
//! channel and applied back on the task that owns the runtime, so every state
//! mutation still happens on one logical thread. Nothing is ever aborted: a
//! call that outlives its binding finishes and is then discarded by the
//! controller.

use log::{ debug, error };
use std::sync::Arc;
use tokio::sync::{ mpsc, watch };

use super::effects::{ self, Completion, Request, RequestId };
use super::{ SessionController, Snapshot };
use crate::client::{ ServiceError, SessionService };
use crate::models::chat::{ Attachment, Reaction };

pub struct SessionRuntime {
    controller: SessionController,
    service: Arc<dyn SessionService>,
    completions_tx: mpsc::UnboundedSender<(RequestId, Completion)>,
    completions_rx: mpsc::UnboundedReceiver<(RequestId, Completion)>,
    outstanding: usize,
}

impl SessionRuntime {
    pub fn new(controller: SessionController, service: Arc<dyn SessionService>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self { controller, service, completions_tx, completions_rx, outstanding: 0 }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut SessionController {
        &mut self.controller
    }

    pub fn service(&self) -> &Arc<dyn SessionService> {
        &self.service
    }

    pub fn snapshot(&self) -> Snapshot {
        self.controller.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.controller.subscribe()
    }

    /// Number of spawned calls whose outcome has not been applied yet,
    /// including calls the controller will discard as stale.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Spawns the remote call behind `request`, if any.
    pub fn dispatch(&mut self, request: Option<Request>) -> Option<RequestId> {
        let request = request?;
        let id = request.id;
        let service = Arc::clone(&self.service);
        let tx = self.completions_tx.clone();
        self.outstanding += 1;

        tokio::spawn(async move {
            let call = request.call.clone();
            let worker = tokio::spawn(async move { effects::execute(service.as_ref(), &call).await });
            let completion = match worker.await {
                Ok(completion) => completion,
                Err(e) => {
                    error!("Remote call {} {} failed to complete: {}", request.call.name(), request.id, e);
                    Completion::failed(&request.call, ServiceError::Internal(format!("task failed: {}", e)))
                }
            };
            if tx.send((request.id, completion)).is_err() {
                debug!("Runtime gone before completion {} arrived", request.id);
            }
        });
        Some(id)
    }

    /// Waits for the next finished call and applies it. Returns `None` when
    /// nothing is outstanding.
    pub async fn next_completion(&mut self) -> Option<(RequestId, bool)> {
        if self.outstanding == 0 {
            return None;
        }
        let (id, completion) = self.completions_rx.recv().await?;
        self.outstanding -= 1;
        let applied = self.controller.complete(id, completion);
        Some((id, applied))
    }

    /// Applies completions until no call is outstanding.
    pub async fn settle(&mut self) {
        while self.next_completion().await.is_some() {}
    }

    pub async fn bind(&mut self, session_id: &str) {
        let request = self.controller.bind(session_id);
        self.dispatch(request);
        self.settle().await;
    }

    pub async fn reload(&mut self) {
        let request = self.controller.reload();
        self.dispatch(request);
        self.settle().await;
    }

    pub async fn send(&mut self, content: &str) {
        let request = self.controller.send(content);
        self.dispatch(request);
        self.settle().await;
    }

    pub async fn send_with_attachments(&mut self, content: &str, attachments: Vec<Attachment>) {
        let request = self.controller.send_with_attachments(content, attachments);
        self.dispatch(request);
        self.settle().await;
    }

    pub async fn regenerate(&mut self, message_id: &str) {
        let request = self.controller.regenerate(message_id);
        self.dispatch(request);
        self.settle().await;
    }

    pub async fn reset(&mut self) {
        let request = self.controller.reset();
        self.dispatch(request);
        self.settle().await;
    }

    pub fn toggle_reaction(&mut self, message_id: &str, reaction: Reaction) -> bool {
        self.controller.toggle_reaction(message_id, reaction)
    }

    /// Checks the service and gates mutating operations on the result.
    pub async fn refresh_health(&mut self) -> bool {
        let healthy = match self.service.health_check().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        };
        self.controller.set_service_available(healthy);
        healthy
    }
}
