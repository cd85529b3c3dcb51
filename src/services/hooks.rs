//! Hook dispatch for refreshed merge requests.
//!
//! Handlers are registered per [`HookAction`] and looked up by that tag when a
//! refresh fires a hook. Failures are logged and never reach the caller: the
//! merge request state they report on is already committed.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::AppError;
use crate::models::MergeRequest;
use crate::services::events::{HookAction, MergeRequestEvent};

/// Receiver of merge request hooks.
#[async_trait::async_trait]
pub trait HookHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn on_hook(
        &self,
        merge_request: &MergeRequest,
        action: HookAction,
        old_rev: &str,
    ) -> Result<(), AppError>;
}

/// Handlers by action.
#[derive(Clone, Default)]
pub struct HookRegistry {
    handlers: HashMap<HookAction, Vec<Arc<dyn HookHandler>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: HookAction, handler: Arc<dyn HookHandler>) -> &mut Self {
        self.handlers.entry(action).or_default().push(handler);
        self
    }

    /// Register a handler for every action.
    pub fn register_all(&mut self, handler: Arc<dyn HookHandler>) -> &mut Self {
        for action in [HookAction::Update, HookAction::Merge, HookAction::Close] {
            self.register(action, handler.clone());
        }
        self
    }

    /// Handlers registered for `action`, in registration order.
    pub fn handlers_for(&self, action: HookAction) -> &[Arc<dyn HookHandler>] {
        self.handlers
            .get(&action)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.values().all(Vec::is_empty)
    }
}

/// Outcome of one hook dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookReport {
    pub fired: usize,
    pub failed: usize,
}

#[derive(Clone, Default)]
pub struct HookDispatcher {
    registry: HookRegistry,
}

impl HookDispatcher {
    pub fn new(registry: HookRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    /// Run every handler registered for `action`.
    ///
    /// Handlers run in registration order; a failing handler doesn't stop
    /// the ones after it.
    pub async fn execute_hooks(
        &self,
        merge_request: &MergeRequest,
        action: HookAction,
        old_rev: &str,
    ) -> HookReport {
        let mut report = HookReport::default();

        for handler in self.registry.handlers_for(action) {
            report.fired += 1;

            if let Err(e) = handler.on_hook(merge_request, action, old_rev).await {
                report.failed += 1;
                log::warn!(
                    "Hook {} failed for MR {} ({}): {}",
                    handler.name(),
                    merge_request.id,
                    action,
                    e
                );
            }
        }

        report
    }
}

/// Republishes hooks as [`MergeRequestEvent`]s for in-process subscribers.
#[derive(Clone)]
pub struct BroadcastHook {
    sender: broadcast::Sender<MergeRequestEvent>,
}

impl BroadcastHook {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MergeRequestEvent> {
        self.sender.subscribe()
    }
}

#[async_trait::async_trait]
impl HookHandler for BroadcastHook {
    fn name(&self) -> &str {
        "broadcast"
    }

    async fn on_hook(
        &self,
        merge_request: &MergeRequest,
        action: HookAction,
        old_rev: &str,
    ) -> Result<(), AppError> {
        let event = MergeRequestEvent::new(merge_request, action, old_rev);

        // No subscribers is not a failure
        if self.sender.send(event).is_err() {
            log::debug!("No subscribers for {} of MR {}", action, merge_request.id);
        }
        Ok(())
    }
}
