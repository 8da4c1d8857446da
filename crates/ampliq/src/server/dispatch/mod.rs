//! This module controls dispatch, the background process that moves pending
//! jobs onto the computing cluster: it checks partition capacity, copies job
//! inputs to the head node, verifies the copy and starts the analysis.
//!
//! Jobs stay `pending` until one dispatch attempt fully succeeds; a failed
//! attempt leaves no status change behind and the job is retried in a later
//! cycle.
pub mod admission;
pub mod command;
pub mod probe;
mod process;
mod service;
pub mod verify;

pub type DispatchResult<T> = anyhow::Result<T>;

pub use process::{DispatchStats, Dispatcher};
pub use service::{DispatchService, create_dispatch_service};
