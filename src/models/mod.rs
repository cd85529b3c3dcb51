//! Data models for the refresh engine.
//!
//! These models represent the entities stored in the local SQLite database.
//! Row types derive `FromRow` for SQLx queries; each module also carries the
//! free query functions that read and write its table.

pub mod commit;
pub mod diff;
pub mod diff_line;
pub mod merge_request;
pub mod note;
pub mod project;
pub mod push;
pub mod refresh_log;
pub mod todo;

// Re-exports for convenient access
pub use commit::Commit;
pub use diff::{ChangeType, FileDiff, MergeRequestDiff, MergeRequestDiffFile, NewMergeRequestDiff};
pub use diff_line::{DiffFile, DiffLine, LineRenderer, LineType};
pub use merge_request::{MergeRequest, MergeRequestState, NewMergeRequest};
pub use note::{NewNote, Note};
pub use project::Project;
pub use push::Push;
pub use refresh_log::{LogStatus, NewRefreshLog, RefreshLog};
pub use todo::{NewTodo, Todo, TodoAction, TodoState};
