//! mr-refresh - merge request bookkeeping after repository pushes.
//!
//! A push (old revision, new revision, ref) enters [`services::RefreshService`],
//! which resolves the pushed commit range, locates the affected merge requests
//! and reconciles their diff, notes, work-in-progress flag, merge status,
//! closing-issue links and build-failure todos. Persistence and repository
//! access sit behind ports so the engine can run against SQLite and git, or
//! against fakes in tests.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use config::RefreshConfig;
pub use error::AppError;
pub use services::refresh::{RefreshResult, RefreshService};
