//! Business logic services.
//!
//! This module contains the refresh engine and the ports it talks to:
//! the repository, the merge request store, hook handlers and the issue
//! reference extractor.
//!
//! Services are designed to be testable against in-memory fakes of those ports.

pub mod commit_range;
pub mod events;
pub mod git_repository;
pub mod hooks;
pub mod locator;
pub mod references;
pub mod refresh;
pub mod repository;
pub mod store;
pub mod system_notes;
pub mod todos;

pub use git_repository::GitRepository;
pub use hooks::{BroadcastHook, HookDispatcher, HookHandler, HookRegistry};
pub use references::{ClosingPatternExtractor, ReferenceExtractor};
pub use refresh::{RefreshResult, RefreshService};
pub use repository::Repository;
pub use store::{MergeRequestStore, MergeRequestUpdate, SqliteStore};
