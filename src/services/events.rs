//! Event types published by the refresh engine.
//!
//! Hook handlers receive a [`HookAction`]; in-process subscribers of
//! [`super::hooks::BroadcastHook`] receive a [`MergeRequestEvent`].

use serde::Serialize;

use crate::models::MergeRequest;

/// Event: merge-request-updated
/// Emitted when a push changed the source branch of a merge request.
pub const MR_UPDATED_EVENT: &str = "merge-request-updated";

/// Event: merge-request-merged
/// Emitted when a push landed a merge request in its target branch.
pub const MR_MERGED_EVENT: &str = "merge-request-merged";

/// Event: merge-request-closed
pub const MR_CLOSED_EVENT: &str = "merge-request-closed";

/// Kind of hook fired for a merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookAction {
    Update,
    Merge,
    Close,
}

impl HookAction {
    /// Name of the event published for this action.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Update => MR_UPDATED_EVENT,
            Self::Merge => MR_MERGED_EVENT,
            Self::Close => MR_CLOSED_EVENT,
        }
    }
}

impl std::fmt::Display for HookAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Update => write!(f, "update"),
            Self::Merge => write!(f, "merge"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// Payload published for every fired hook.
#[derive(Debug, Clone, Serialize)]
pub struct MergeRequestEvent {
    /// Event name (see the `*_EVENT` constants).
    pub event: &'static str,

    pub action: HookAction,

    pub merge_request_id: i64,

    /// Project-scoped number.
    pub iid: i64,

    pub source_project_id: i64,
    pub target_project_id: i64,

    /// Revision the source branch pointed at before the push.
    pub old_rev: String,

    /// State of the merge request after the refresh.
    pub state: String,
}

impl MergeRequestEvent {
    pub fn new(mr: &MergeRequest, action: HookAction, old_rev: &str) -> Self {
        Self {
            event: action.event_name(),
            action,
            merge_request_id: mr.id,
            iid: mr.iid,
            source_project_id: mr.source_project_id,
            target_project_id: mr.target_project_id,
            old_rev: old_rev.to_string(),
            state: mr.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_serialization() {
        assert_eq!(serde_json::to_value(HookAction::Merge).unwrap(), "merge");
        assert_eq!(HookAction::Update.to_string(), "update");
        assert_eq!(HookAction::Close.event_name(), MR_CLOSED_EVENT);
    }
}
