//! Build-failure todo resolution after a refresh.

use crate::config::TodoScope;
use crate::error::AppError;
use crate::models::MergeRequest;
use crate::services::store::MergeRequestStore;

/// What happened to a merge request during the refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoTrigger<'a> {
    Merged,
    /// Source branch moved to the given head.
    SourceUpdated(&'a str),
}

pub struct TodoUpdater<'a> {
    store: &'a dyn MergeRequestStore,
    scope: TodoScope,
    current_user_id: i64,
}

impl<'a> TodoUpdater<'a> {
    pub fn new(store: &'a dyn MergeRequestStore, scope: TodoScope, current_user_id: i64) -> Self {
        Self {
            store,
            scope,
            current_user_id,
        }
    }

    /// Mark resolved build-failure todos of `merge_request` done.
    ///
    /// # Returns
    /// Number of todos that moved to done.
    pub async fn resolve(
        &self,
        merge_request: &MergeRequest,
        trigger: TodoTrigger<'_>,
    ) -> Result<u64, AppError> {
        let user = match self.scope {
            TodoScope::PushingUser => Some(self.current_user_id),
            TodoScope::AllUsers => None,
        };

        let pending = self
            .store
            .pending_build_failed_todos(merge_request.id, user)
            .await?;

        let resolved: Vec<i64> = pending
            .iter()
            .filter(|todo| match trigger {
                TodoTrigger::Merged => true,
                TodoTrigger::SourceUpdated(head) => todo.resolved_by_head(head),
            })
            .map(|todo| todo.id)
            .collect();

        if resolved.is_empty() {
            return Ok(0);
        }

        let done = self.store.mark_todos_done(&resolved).await?;
        log::debug!("Marked {} build failure todo(s) done for MR {}", done, merge_request.id);
        Ok(done)
    }
}
